use axum::{
    Extension, Json,
    extract::{Path, State, rejection::{JsonRejection, PathRejection}},
    response::IntoResponse,
};
use anyhow::anyhow;
use chrono::{DateTime, SubsecRound, Utc};
use tracing::debug;

use murmur_db::Database;
use murmur_db::models::MessageRow;
use murmur_types::api::{MessageResponse, SendMessageRequest};
use murmur_types::models::{ChatMessage, User};

use crate::error::ApiError;
use crate::state::{AppState, blocking};

/// The full thread between the caller and `other_user_id`, oldest first.
pub fn list_messages(
    db: &Database,
    caller: &User,
    other_user_id: i64,
) -> Result<Vec<ChatMessage>, ApiError> {
    if db.get_user_by_id(other_user_id)?.is_none() {
        return Err(ApiError::UserNotFound(other_user_id));
    }

    let rows = db.get_conversation(caller.id, other_user_id)?;
    rows.into_iter().map(into_chat_message).collect()
}

pub fn send_message(
    db: &Database,
    caller: &User,
    receiver_id: i64,
    content: &str,
    max_len: usize,
) -> Result<ChatMessage, ApiError> {
    if content.trim().is_empty() {
        return Err(ApiError::Validation("content is required".into()));
    }
    if content.chars().count() > max_len {
        return Err(ApiError::Validation(format!(
            "content exceeds {} characters",
            max_len
        )));
    }

    if db.get_user_by_id(receiver_id)?.is_none() {
        return Err(ApiError::UserNotFound(receiver_id));
    }

    // Stored with microsecond precision; truncate so the response matches later reads.
    let created_at = Utc::now().trunc_subsecs(6);
    let id = db.insert_message(caller.id, receiver_id, content, created_at)?;
    debug!("Message {} sent from {} to {}", id, caller.id, receiver_id);

    Ok(ChatMessage {
        id,
        sender_id: caller.id,
        sender_username: caller.username.clone(),
        receiver_id,
        content: content.to_string(),
        created_at,
    })
}

fn into_chat_message(row: MessageRow) -> Result<ChatMessage, ApiError> {
    let created_at = row.created_at.parse::<DateTime<Utc>>().map_err(|e| {
        anyhow!("corrupt created_at '{}' on message {}: {}", row.created_at, row.id, e)
    })?;

    Ok(ChatMessage {
        id: row.id,
        sender_id: row.sender_id,
        sender_username: row.sender_username,
        receiver_id: row.receiver_id,
        content: row.content,
        created_at,
    })
}

pub async fn get_messages(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
    user_id: Result<Path<i64>, PathRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Path(other_user_id) = user_id?;

    let messages = blocking(&state, move |s| list_messages(&s.db, &caller, other_user_id)).await?;

    let body: Vec<MessageResponse> = messages.into_iter().map(MessageResponse::from).collect();
    Ok(Json(body))
}

pub async fn post_message(
    State(state): State<AppState>,
    Extension(caller): Extension<User>,
    payload: Result<Json<SendMessageRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = payload?;
    let receiver_id = req
        .receiver_id
        .ok_or_else(|| ApiError::Validation("receiver_id is required".into()))?;

    let message = blocking(&state, move |s| {
        send_message(&s.db, &caller, receiver_id, &req.content, s.max_message_len)
    })
    .await?;

    Ok(Json(MessageResponse::from(message)))
}
