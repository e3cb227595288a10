use std::sync::LazyLock;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Json, extract::{State, rejection::JsonRejection}, response::IntoResponse};
use anyhow::anyhow;
use rand_core::OsRng;
use tracing::{info, warn};

use murmur_db::Database;
use murmur_db::models::UserRow;
use murmur_types::api::{AuthResponse, CredentialsRequest};
use murmur_types::models::User;

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// Random bytes in a token key; hex-encoded to 40 characters.
const TOKEN_BYTES: usize = 20;

/// Verified against when the username is unknown, so a miss costs the same
/// Argon2 work as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> = LazyLock::new(|| {
    hash_password("murmur-dummy-password")
        .inspect_err(|e| warn!("Failed to prepare dummy password hash: {}", e))
        .ok()
});

/// An authenticated user together with their bearer token.
#[derive(Debug)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

impl From<AuthSession> for AuthResponse {
    fn from(session: AuthSession) -> Self {
        AuthResponse {
            user: session.user.into(),
            token: session.token,
        }
    }
}

pub fn register_user(db: &Database, username: &str, password: &str) -> Result<AuthSession, ApiError> {
    validate_credentials(username, password)?;

    if db.get_user_by_username(username)?.is_some() {
        return Err(ApiError::Conflict);
    }

    let password_hash = hash_password(password)?;

    // A concurrent registration can still win the UNIQUE constraint.
    let id = db
        .create_user(username, &password_hash)?
        .ok_or(ApiError::Conflict)?;

    let token = issue_or_fetch_token(db, id)?;
    info!("Registered user {} ({})", username, id);

    Ok(AuthSession {
        user: User {
            id,
            username: username.to_string(),
        },
        token,
    })
}

pub fn login_user(db: &Database, username: &str, password: &str) -> Result<AuthSession, ApiError> {
    validate_credentials(username, password)?;

    let Some(user) = db.get_user_by_username(username)? else {
        warn!("Login attempt for unknown user {}", username);
        if let Some(dummy) = DUMMY_HASH.as_deref() {
            if let Ok(parsed) = PasswordHash::new(dummy) {
                let _ = Argon2::default().verify_password(password.as_bytes(), &parsed);
            }
        }
        return Err(ApiError::InvalidCredentials);
    };

    verify_password(&user, password)?;

    let token = issue_or_fetch_token(db, user.id)?;
    Ok(AuthSession {
        user: User {
            id: user.id,
            username: user.username,
        },
        token,
    })
}

/// Resolve a bearer token to its owner.
pub fn authenticate(db: &Database, token: &str) -> Result<User, ApiError> {
    let user = db.get_user_by_token(token)?.ok_or(ApiError::Unauthorized)?;
    Ok(User {
        id: user.id,
        username: user.username,
    })
}

/// Idempotent: returns the user's existing token or issues their first one.
pub fn issue_or_fetch_token(db: &Database, user_id: i64) -> Result<String, ApiError> {
    Ok(db.issue_or_fetch_token(user_id, generate_token_key)?)
}

fn generate_token_key() -> String {
    hex::encode(rand::random::<[u8; TOKEN_BYTES]>())
}

fn validate_credentials(username: &str, password: &str) -> Result<(), ApiError> {
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::Validation("username and password are required".into()));
    }
    Ok(())
}

/// Argon2id with a fresh random salt, in PHC string form.
fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow!("password hashing failed: {}", e))?
        .to_string())
}

fn verify_password(user: &UserRow, password: &str) -> Result<(), ApiError> {
    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow!("corrupt password hash for user {}: {}", user.id, e))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| {
            warn!("Failed login for user {}", user.username);
            ApiError::InvalidCredentials
        })
}

pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let session = blocking(&state, move |s| {
        register_user(&s.db, &req.username, &req.password)
    })
    .await?;

    Ok(Json(AuthResponse::from(session)))
}

pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<CredentialsRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;

    let session = blocking(&state, move |s| {
        login_user(&s.db, &req.username, &req.password)
    })
    .await?;

    Ok(Json(AuthResponse::from(session)))
}
