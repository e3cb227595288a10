use axum::{
    Json, Router, middleware,
    routing::{MethodRouter, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::middleware::require_auth;
use crate::state::AppState;
use crate::{auth, messages, users};

/// The API mounted under `base_path` (empty for the root), with CORS and
/// request tracing applied.
pub fn app(state: AppState, base_path: &str) -> Router {
    let api = router(state);
    let app = if base_path.is_empty() {
        api
    } else {
        Router::new().nest(base_path, api)
    };

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Assemble the API. Every route answers with and without a trailing slash.
pub fn router(state: AppState) -> Router {
    let public_routes = [
        ("/register", post(auth::register)),
        ("/login", post(auth::login)),
    ]
    .into_iter()
    .fold(Router::new(), add_route);

    let protected_routes = [
        ("/current_user", get(users::get_current_user)),
        ("/users", get(users::get_users)),
        ("/messages/{user_id}", get(messages::get_messages)),
        ("/send_message", post(messages::post_message)),
    ]
    .into_iter()
    .fold(Router::new(), add_route)
    .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .route("/health", get(health))
        .with_state(state)
}

fn add_route(
    router: Router<AppState>,
    (path, handler): (&str, MethodRouter<AppState>),
) -> Router<AppState> {
    router
        .route(path, handler.clone())
        .route(&format!("{}/", path), handler)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
