//! Server configuration loaded from environment variables.
//!
//! Every setting has a default so the server starts with no configuration
//! for local development.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Env: `MURMUR_HOST` / `MURMUR_PORT`
    /// Default: `0.0.0.0:8000`
    pub addr: SocketAddr,

    /// SQLite database file.
    /// Env: `MURMUR_DB_PATH`
    /// Default: `murmur.db`
    pub db_path: PathBuf,

    /// Prefix the API is mounted under, e.g. `/chat`. Empty mounts at the root.
    /// Env: `MURMUR_BASE_PATH`
    pub base_path: String,

    /// Env: `MURMUR_MAX_MESSAGE_LEN`
    /// Default: `4000`
    pub max_message_len: usize,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("MURMUR_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let ip: IpAddr = host
            .trim()
            .trim_start_matches('[')
            .trim_end_matches(']')
            .parse()
            .with_context(|| format!("MURMUR_HOST must be an IP address, got {:?}", host))?;
        let port: u16 = lookup("MURMUR_PORT")
            .unwrap_or_else(|| "8000".into())
            .parse()
            .context("MURMUR_PORT must be a port number")?;
        let addr = SocketAddr::new(ip, port);

        let db_path: PathBuf = lookup("MURMUR_DB_PATH")
            .unwrap_or_else(|| "murmur.db".into())
            .into();

        let base_path = normalize_base_path(&lookup("MURMUR_BASE_PATH").unwrap_or_default())?;

        let max_message_len: usize = lookup("MURMUR_MAX_MESSAGE_LEN")
            .unwrap_or_else(|| "4000".into())
            .parse()
            .context("MURMUR_MAX_MESSAGE_LEN must be a positive integer")?;
        if max_message_len == 0 {
            bail!("MURMUR_MAX_MESSAGE_LEN must be a positive integer");
        }

        Ok(Self {
            addr,
            db_path,
            base_path,
            max_message_len,
        })
    }
}

/// `chat`, `/chat` and `/chat/` all become `/chat`; `` and `/` become ``.
fn normalize_base_path(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if trimmed.contains(['{', '}', '*']) {
        bail!("MURMUR_BASE_PATH must be a literal path, got {:?}", raw);
    }
    Ok(format!("/{}", trimmed))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.addr, "0.0.0.0:8000".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.db_path, PathBuf::from("murmur.db"));
        assert_eq!(cfg.base_path, "");
        assert_eq!(cfg.max_message_len, 4000);
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("MURMUR_HOST", "127.0.0.1"),
            ("MURMUR_PORT", "9000"),
            ("MURMUR_BASE_PATH", "chat/"),
            ("MURMUR_MAX_MESSAGE_LEN", "10"),
        ])
        .unwrap();
        assert_eq!(cfg.addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.base_path, "/chat");
        assert_eq!(cfg.max_message_len, 10);
    }

    #[test]
    fn ipv6_host() {
        let cfg = config(&[("MURMUR_HOST", "::"), ("MURMUR_PORT", "9000")]).unwrap();
        assert_eq!(cfg.addr, "[::]:9000".parse::<SocketAddr>().unwrap());

        let cfg = config(&[("MURMUR_HOST", "[::1]")]).unwrap();
        assert_eq!(cfg.addr, "[::1]:8000".parse::<SocketAddr>().unwrap());
    }

    #[test]
    fn invalid_values_are_errors() {
        assert!(config(&[("MURMUR_PORT", "http")]).is_err());
        assert!(config(&[("MURMUR_HOST", "localhost:80")]).is_err());
        assert!(config(&[("MURMUR_MAX_MESSAGE_LEN", "0")]).is_err());
        assert!(config(&[("MURMUR_BASE_PATH", "/{id}")]).is_err());
    }
}
