use uuid::Uuid;

use etra_codec::PayloadError;

/// Failure talking to the backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// The backend answered, but said no.
    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("not signed in")]
    Unauthenticated,

    #[error("unexpected response: {0}")]
    Protocol(String),
}

impl BackendError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }
}

/// Login outcome shown inline on the login form.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// Email is not on the allow-list. No request was sent.
    #[error("Sorry, this account is not allowed to sign in")]
    NotAllowed,

    #[error("Incorrect login details")]
    InvalidCredentials,

    #[error("Something went wrong while signing in")]
    Failed(#[source] BackendError),
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("message is empty")]
    EmptyMessage,

    #[error("a send is already in progress")]
    Busy,

    #[error("file is {size} bytes, the limit is {limit}")]
    FileTooLarge { size: usize, limit: usize },

    #[error("invalid payload: {0}")]
    Payload(#[from] PayloadError),

    #[error("note title is empty")]
    EmptyTitle,

    #[error("the other participant is not known yet")]
    NoOtherParticipant,

    #[error("note {0} is not in the local list")]
    UnknownNote(Uuid),

    #[error("only the creator can delete note {0}")]
    NotCreator(Uuid),

    /// The user answered "no" to a confirmation prompt.
    #[error("cancelled")]
    Cancelled,

    #[error("engine is not running")]
    Stopped,

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Microphone failure.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("microphone unavailable: {0}")]
    Unavailable(String),

    #[error("recording failed: {0}")]
    Failed(String),
}
