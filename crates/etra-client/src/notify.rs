use uuid::Uuid;

use etra_codec::Payload;
use etra_types::{Message, Note};

use crate::backend::Notification;

const NOTE_TITLE_CHARS: usize = 50;

/// Notification for a pushed message, unless we sent it ourselves.
pub fn for_message(message: &Message, self_id: Uuid) -> Option<Notification> {
    if message.sender_id == self_id {
        return None;
    }
    Some(Notification {
        title: "New message".into(),
        body: Payload::decode(&message.content).summary(),
        tag: message.id.to_string(),
    })
}

/// Notification for a note the other person assigned to us.
pub fn for_note(note: &Note, self_id: Uuid) -> Option<Notification> {
    if note.assigned_to != self_id || note.created_by == self_id {
        return None;
    }
    Some(Notification {
        title: "New note for you 📝".into(),
        body: note.title.chars().take(NOTE_TITLE_CHARS).collect(),
        tag: note.id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use etra_types::Priority;

    use super::*;

    fn message(sender: Uuid, content: &str) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: sender,
            content: content.into(),
            is_read: false,
            created_at: Utc::now(),
            client_token: None,
        }
    }

    fn note(created_by: Uuid, assigned_to: Uuid, title: &str) -> Note {
        Note {
            id: Uuid::new_v4(),
            created_by,
            assigned_to,
            title: title.into(),
            content: None,
            priority: Priority::Medium,
            is_completed: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn own_messages_are_silent() {
        let me = Uuid::new_v4();
        assert!(for_message(&message(me, "hi"), me).is_none());
    }

    #[test]
    fn body_summarises_the_payload() {
        let me = Uuid::new_v4();
        let them = Uuid::new_v4();

        let text = message(them, &"x".repeat(80));
        let n = for_message(&text, me).unwrap();
        assert_eq!(n.body.chars().count(), 50);
        assert_eq!(n.tag, text.id.to_string());

        let voice = message(them, "[VOICE:3:data:audio/webm;base64,AAAA]");
        assert!(for_message(&voice, me).unwrap().body.starts_with("🎤"));
    }

    #[test]
    fn notes_notify_the_assignee_only_when_someone_else_wrote_them() {
        let me = Uuid::new_v4();
        let them = Uuid::new_v4();

        assert!(for_note(&note(them, me, "buy bread"), me).is_some());
        assert!(for_note(&note(me, me, "self reminder"), me).is_none());
        assert!(for_note(&note(me, them, "for them"), me).is_none());

        let long = note(them, me, &"t".repeat(70));
        assert_eq!(for_note(&long, me).unwrap().body.chars().count(), 50);
    }
}
