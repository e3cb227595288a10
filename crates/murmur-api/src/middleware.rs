use axum::{
    extract::{Request, State},
    http::{HeaderMap, header},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::auth::authenticate;
use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// Authorization schemes accepted for the bearer token.
const TOKEN_SCHEMES: &[&str] = &["Token ", "Bearer "];

/// Resolve the token in the Authorization header and attach the caller as a
/// request extension.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(req.headers())
        .ok_or(ApiError::Unauthorized)?
        .to_string();

    let user = blocking(&state, move |s| authenticate(&s.db, &token))
        .await
        .inspect_err(|e| debug!("Rejected request to {}: {}", req.uri().path(), e))?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}

fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;

    TOKEN_SCHEMES
        .iter()
        .find_map(|scheme| value.strip_prefix(scheme))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}
