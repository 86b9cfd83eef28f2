use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, Note};

/// Logical tables a client can subscribe to on the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Messages,
    Notes,
}

/// Events pushed over the WebSocket gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum FeedEvent {
    /// Server confirms successful authentication
    Ready { user_id: Uuid, email: String },

    /// A message row was inserted
    MessageInsert { message: Message },

    /// A message row was deleted. Only the old id is carried.
    MessageDelete { id: Uuid },

    /// A note row was inserted
    NoteInsert { note: Note },

    /// A note row was updated
    NoteUpdate { note: Note },

    /// A note row was deleted
    NoteDelete { id: Uuid },

    /// Presence membership changed; carries every currently tracked identity
    PresenceSync { user_ids: Vec<Uuid> },

    /// Sent only to the connection whose Track was handled. Subscriptions
    /// sent before that Track are in effect.
    Tracked,
}

impl FeedEvent {
    /// Returns the table if this event is a row-level change.
    /// Events that return `None` are delivered to every connection.
    pub fn table(&self) -> Option<Table> {
        match self {
            Self::MessageInsert { .. } | Self::MessageDelete { .. } => Some(Table::Messages),
            Self::NoteInsert { .. } | Self::NoteUpdate { .. } | Self::NoteDelete { .. } => {
                Some(Table::Notes)
            }
            Self::Ready { .. } | Self::PresenceSync { .. } | Self::Tracked => None,
        }
    }
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum GatewayCommand {
    /// Authenticate the WebSocket connection
    Identify { token: String },

    /// Receive row-level changes for these tables only.
    Subscribe { tables: Vec<Table> },

    /// Announce this connection's user in the presence set
    Track,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_are_adjacently_tagged() {
        let id = Uuid::nil();
        let json = serde_json::to_value(FeedEvent::MessageDelete { id }).unwrap();
        assert_eq!(json["type"], "MessageDelete");
        assert_eq!(json["data"]["id"], id.to_string());

        let cmd: GatewayCommand =
            serde_json::from_str(r#"{"type":"Subscribe","data":{"tables":["messages","notes"]}}"#)
                .unwrap();
        assert_eq!(
            cmd,
            GatewayCommand::Subscribe {
                tables: vec![Table::Messages, Table::Notes]
            }
        );
    }

    #[test]
    fn presence_and_ready_are_global() {
        assert_eq!(FeedEvent::PresenceSync { user_ids: vec![] }.table(), None);
        assert_eq!(FeedEvent::Tracked.table(), None);
        assert_eq!(serde_json::to_value(FeedEvent::Tracked).unwrap()["type"], "Tracked");
        assert_eq!(FeedEvent::NoteDelete { id: Uuid::nil() }.table(), Some(Table::Notes));
    }
}
