use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
};

use etra_gateway::connection;

use crate::auth::AppState;

/// Upgrade to the change feed. Authentication happens in the Identify
/// handshake, not on the upgrade request.
pub async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        connection::handle_connection(socket, state.dispatcher.clone(), state.jwt_secret.clone())
    })
}
