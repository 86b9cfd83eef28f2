use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::warn;

use etra_types::User;
use etra_types::api::Claims;

use crate::auth::AppState;
use crate::with_db;

/// GET /users: both participants, oldest account first.
pub async fn list_users(
    State(state): State<AppState>,
    Extension(_claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let rows = with_db(&state, |db| db.list_users()).await?;

    let users: Vec<User> = rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id.clone();
            row.into_user()
                .map_err(|e| warn!("Skipping corrupt user row '{}': {}", id, e))
                .ok()
        })
        .collect();

    Ok(Json(users))
}
