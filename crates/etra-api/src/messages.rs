use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use etra_db::models::MessageRow;
use etra_types::api::{Claims, ClearMessagesResponse, SendMessageRequest};
use etra_types::{FeedEvent, Message};

use crate::auth::AppState;
use crate::with_db;

/// Upper bound for a request body carrying a message. Media is capped at
/// 5 MiB before base64, which inflates it by a third, plus tag overhead.
pub const MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

/// GET /messages: full history, oldest first.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let rows = with_db(&state, |db| db.get_messages()).await?;

    let messages: Vec<Message> = rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id.clone();
            row.into_message()
                .map_err(|e| warn!("Skipping corrupt message '{}': {}", id, e))
                .ok()
        })
        .collect();

    Ok(Json(messages))
}

/// POST /messages: stores `content` verbatim; the payload encoding is the
/// client's business. A repeated `client_token` returns the stored row
/// instead of inserting a second copy.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    if req.content.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let message = Message {
        id: Uuid::new_v4(),
        sender_id: claims.sub,
        content: req.content,
        is_read: false,
        created_at: chrono::Utc::now(),
        client_token: req.client_token,
    };

    let row = MessageRow::new(&message);
    if let Some(existing) = with_db(&state, move |db| db.insert_message_once(&row)).await? {
        let stored = existing.into_message().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        info!("Duplicate send for token {:?}, returning {}", message.client_token, stored.id);
        return Ok((StatusCode::OK, Json(stored)));
    }

    state.dispatcher.broadcast(FeedEvent::MessageInsert {
        message: message.clone(),
    });

    Ok((StatusCode::CREATED, Json(message)))
}

/// DELETE /messages/{message_id}: either participant may delete any
/// message. Deleting an id that is already gone still succeeds.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let id = message_id.to_string();
    let deleted = with_db(&state, move |db| db.delete_message(&id)).await?;

    if deleted {
        info!("{} deleted message {}", claims.email, message_id);
        state
            .dispatcher
            .broadcast(FeedEvent::MessageDelete { id: message_id });
    }

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /messages: clear the whole conversation.
pub async fn clear_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let ids = with_db(&state, |db| db.clear_messages()).await?;

    info!("{} cleared {} messages", claims.email, ids.len());
    for id in &ids {
        match id.parse::<Uuid>() {
            Ok(id) => state.dispatcher.broadcast(FeedEvent::MessageDelete { id }),
            Err(e) => warn!("Corrupt message id '{}' during clear: {}", id, e),
        }
    }

    Ok(Json(ClearMessagesResponse { deleted: ids.len() }))
}
