//! ETRA client core.
//!
//! The [`Engine`] owns the local copy of the conversation and the shared
//! notes list. It applies the user's own actions, merges the change feed
//! pushed by the backend, and hands snapshots to whatever renders them.
//! Everything it talks to sits behind the traits in [`backend`], so the
//! same engine runs against the HTTP/WebSocket backend in [`http`] and
//! [`feed`] or against in-memory fakes.

pub mod auth;
pub mod backend;
pub mod engine;
pub mod error;
pub mod feed;
pub mod http;
pub mod notify;
pub mod policy;
pub mod recorder;
pub mod state;

pub use auth::AuthGate;
pub use backend::{Auth, ChangeFeed, Notification, Notifier, Prompt, Session, Store, Subscription};
pub use engine::{Engine, EngineContext, OutgoingFile};
pub use error::{BackendError, CaptureError, EngineError, LoginError};
pub use policy::{Operation, Policy};
pub use recorder::{AudioCapture, AudioClip, VoiceRecorder};
pub use state::{ChatState, NoteDraft, NoteForm};
