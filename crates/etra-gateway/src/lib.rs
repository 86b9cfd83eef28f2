//! Realtime side of the ETRA backend: the change-feed dispatcher, presence
//! tracking, and the WebSocket connection loop that delivers both.

pub mod connection;
pub mod dispatcher;
