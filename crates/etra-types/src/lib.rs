//! Shared types for ETRA Connect.
//!
//! Both the reference backend (`etra-api`, `etra-gateway`, `etra-db`) and the
//! client engine (`etra-client`) speak in terms of these types, so the wire
//! format lives in exactly one place.

pub mod allowlist;
pub mod api;
pub mod events;
pub mod models;

pub use allowlist::{AllowList, Participant};
pub use events::{FeedEvent, GatewayCommand, Table};
pub use models::{Message, Note, Priority, User};
