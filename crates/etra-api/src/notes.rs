use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{info, warn};
use uuid::Uuid;

use etra_db::models::NoteRow;
use etra_types::api::{Claims, CreateNoteRequest, UpdateNoteRequest};
use etra_types::{FeedEvent, Note};

use crate::auth::AppState;
use crate::with_db;

/// GET /notes: newest first.
pub async fn get_notes(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let rows = with_db(&state, |db| db.get_notes()).await?;

    let notes: Vec<Note> = rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id.clone();
            row.into_note()
                .map_err(|e| warn!("Skipping corrupt note '{}': {}", id, e))
                .ok()
        })
        .collect();

    Ok(Json(notes))
}

pub async fn create_note(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateNoteRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let title = req.title.trim().to_string();
    if title.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    // The assignee has to be one of the two participants.
    let assignee = req.assigned_to.to_string();
    if with_db(&state, move |db| db.get_user_by_id(&assignee)).await?.is_none() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let content = req
        .content
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());

    let note = Note {
        id: Uuid::new_v4(),
        created_by: claims.sub,
        assigned_to: req.assigned_to,
        title,
        content,
        priority: req.priority,
        is_completed: false,
        created_at: chrono::Utc::now(),
    };

    let row = NoteRow::new(&note);
    with_db(&state, move |db| db.insert_note(&row)).await?;

    state
        .dispatcher
        .broadcast(FeedEvent::NoteInsert { note: note.clone() });

    Ok((StatusCode::CREATED, Json(note)))
}

/// PATCH /notes/{note_id}: either participant may change completion.
pub async fn update_note(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    Extension(_claims): Extension<Claims>,
    Json(req): Json<UpdateNoteRequest>,
) -> Result<impl IntoResponse, StatusCode> {
    let id = note_id.to_string();
    let row = with_db(&state, move |db| db.set_note_completed(&id, req.is_completed))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;
    let note = row.into_note().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    state
        .dispatcher
        .broadcast(FeedEvent::NoteUpdate { note: note.clone() });

    Ok(Json(note))
}

/// DELETE /notes/{note_id}: creator only.
pub async fn delete_note(
    State(state): State<AppState>,
    Path(note_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let id = note_id.to_string();
    let row = with_db(&state, move |db| db.get_note(&id))
        .await?
        .ok_or(StatusCode::NOT_FOUND)?;
    let note = row.into_note().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    if !note.can_delete(claims.sub) {
        warn!("{} tried to delete note {} they did not create", claims.email, note_id);
        return Err(StatusCode::FORBIDDEN);
    }

    let id = note_id.to_string();
    if with_db(&state, move |db| db.delete_note(&id)).await? {
        info!("{} deleted note {}", claims.email, note_id);
        state.dispatcher.broadcast(FeedEvent::NoteDelete { id: note_id });
    }

    Ok(StatusCode::NO_CONTENT)
}
