use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Priority, User};

/// Error text the auth endpoint returns for a wrong email/password pair.
/// Clients match on it to tell bad credentials apart from other failures.
pub const INVALID_CREDENTIALS: &str = "Invalid login credentials";

// -- JWT Claims --

/// JWT claims shared by the REST middleware and the gateway handshake.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

// -- Messages --

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub content: String,
    #[serde(default)]
    pub client_token: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearMessagesResponse {
    pub deleted: usize,
}

// -- Notes --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateNoteRequest {
    pub assigned_to: Uuid,
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateNoteRequest {
    pub is_completed: bool,
}
