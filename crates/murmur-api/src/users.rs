use axum::{Extension, Json, extract::State, response::IntoResponse};

use murmur_db::Database;
use murmur_types::api::UserResponse;
use murmur_types::models::User;

use crate::error::ApiError;
use crate::state::{AppState, blocking};

pub fn current_user(caller: &User) -> UserResponse {
    UserResponse::from(caller.clone())
}

/// Every registered user other than the caller.
pub fn list_users(db: &Database, caller: &User) -> Result<Vec<UserResponse>, ApiError> {
    let users = db.list_users_except(caller.id)?;
    Ok(users.into_iter().map(UserResponse::from).collect())
}

pub async fn get_current_user(Extension(caller): Extension<User>) -> impl IntoResponse {
    Json(current_user(&caller))
}

pub async fn get_users(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    let users = blocking(&state, move |s| list_users(&s.db, &caller)).await?;
    Ok(Json(users))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::register_user;

    #[test]
    fn list_users_never_includes_caller() {
        let db = Database::open_in_memory().unwrap();
        let users: Vec<User> = ["alice", "bob", "carol"]
            .iter()
            .map(|name| register_user(&db, name, "pw").unwrap().user)
            .collect();

        for caller in &users {
            let listed = list_users(&db, caller).unwrap();
            assert_eq!(listed.len(), users.len() - 1);
            assert!(listed.iter().all(|u| u.id != caller.id));
        }
    }

    #[test]
    fn current_user_projects_caller() {
        let caller = User { id: 3, username: "carol".into() };
        assert_eq!(
            current_user(&caller),
            UserResponse { id: 3, username: "carol".into() }
        );
    }
}
