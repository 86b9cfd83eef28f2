//! REST surface of the ETRA backend: auth, users, messages and notes.
//!
//! Every write broadcasts the matching change event through the gateway
//! dispatcher, which is how the other participant hears about it.

pub mod auth;
pub mod gateway;
pub mod messages;
pub mod middleware;
pub mod notes;
pub mod users;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
};
use tracing::error;

use etra_db::Database;

use crate::auth::AppState;

/// Run a blocking DB call off the async runtime.
pub(crate) async fn with_db<F, T>(state: &AppState, f: F) -> Result<T, StatusCode>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("DB error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

/// All routes: REST, public and protected, plus the WebSocket gateway.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/gateway", get(gateway::ws_upgrade))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route("/auth/session", get(auth::session))
        .route("/auth/logout", post(auth::logout))
        .route("/users", get(users::list_users))
        .route(
            "/messages",
            get(messages::get_messages)
                .post(messages::send_message)
                .delete(messages::clear_messages),
        )
        .route("/messages/{message_id}", delete(messages::delete_message))
        .route("/notes", get(notes::get_notes).post(notes::create_note))
        .route(
            "/notes/{note_id}",
            patch(notes::update_note).delete(notes::delete_note),
        )
        .layer(from_fn_with_state(state.clone(), middleware::require_auth))
        .layer(DefaultBodyLimit::max(messages::MAX_BODY_BYTES))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}
