use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use uuid::Uuid;

use etra_types::api::{CreateNoteRequest, SendMessageRequest};
use etra_types::{FeedEvent, Message, Note, User};

use crate::error::BackendError;

/// An authenticated user plus the bearer token that proves it.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: User,
    pub token: String,
}

/// Hosted identity service.
#[async_trait]
pub trait Auth: Send + Sync {
    /// The persisted session, if one is still valid.
    async fn get_session(&self) -> Result<Option<Session>, BackendError>;
    async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Session, BackendError>;
    async fn sign_out(&self) -> Result<(), BackendError>;
}

/// The two tables plus the user directory.
///
/// Every call is authenticated with the session the implementation was built
/// for. Inserts return the row as the store confirmed it.
#[async_trait]
pub trait Store: Send + Sync {
    async fn list_users(&self) -> Result<Vec<User>, BackendError>;

    /// All messages, oldest first.
    async fn fetch_messages(&self) -> Result<Vec<Message>, BackendError>;
    async fn insert_message(&self, request: SendMessageRequest) -> Result<Message, BackendError>;
    async fn delete_message(&self, id: Uuid) -> Result<(), BackendError>;
    /// Delete every message in the conversation.
    async fn clear_messages(&self) -> Result<(), BackendError>;

    /// All notes, newest first.
    async fn fetch_notes(&self) -> Result<Vec<Note>, BackendError>;
    async fn insert_note(&self, request: CreateNoteRequest) -> Result<Note, BackendError>;
    async fn set_note_completed(&self, id: Uuid, is_completed: bool) -> Result<Note, BackendError>;
    async fn delete_note(&self, id: Uuid) -> Result<(), BackendError>;
}

/// Live change notifications for both tables plus presence.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Open the feed and announce `self_id` as online.
    ///
    /// Events are buffered from the moment this returns, so nothing is lost
    /// between subscribing and the first read.
    async fn subscribe(&self, self_id: Uuid) -> Result<Subscription, BackendError>;
}

/// A live feed. Dropping it tears the underlying channel down.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<FeedEvent>,
    task: Option<AbortHandle>,
}

impl Subscription {
    /// `task` is whatever pumps `events`; it is aborted on drop.
    pub fn new(events: mpsc::UnboundedReceiver<FeedEvent>, task: Option<AbortHandle>) -> Self {
        Self { events, task }
    }

    /// Next event, or `None` once the feed is closed.
    pub async fn next(&mut self) -> Option<FeedEvent> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// A system notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Deduplication tag: notifications sharing a tag replace each other.
    pub tag: String,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Ask once for permission; `true` when notifications may be shown.
    async fn request_permission(&self) -> bool;
    fn show(&self, notification: Notification);
}

/// Blocking dialogs.
#[async_trait]
pub trait Prompt: Send + Sync {
    async fn confirm(&self, question: &str) -> bool;
    fn alert(&self, message: &str);
}
