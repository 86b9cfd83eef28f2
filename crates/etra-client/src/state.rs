use uuid::Uuid;

use etra_codec::{DataUri, Payload};
use etra_types::{Message, Note, Priority, User};

/// Contents of the "new note" form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    pub title: String,
    pub content: String,
    /// `true` assigns the note to the author, `false` to the other person.
    pub assigned_to_self: bool,
    pub priority: Priority,
}

impl Default for NoteDraft {
    fn default() -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            assigned_to_self: true,
            priority: Priority::Medium,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteForm {
    pub open: bool,
    pub draft: NoteDraft,
}

impl NoteForm {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Everything the chat screen renders.
///
/// `messages` is ascending by creation time and holds no duplicate ids.
#[derive(Debug, Clone, Default)]
pub struct ChatState {
    pub messages: Vec<Message>,
    /// Newest first, exactly as last fetched.
    pub notes: Vec<Note>,
    pub other: Option<User>,
    pub other_online: bool,
    pub draft: String,
    pub sending: bool,
    pub uploading: bool,
    pub notifications_enabled: bool,
    pub note_form: NoteForm,
    notes_generation: u64,
}

impl ChatState {
    /// Replace the conversation with a freshly fetched list.
    pub fn load_messages(&mut self, mut messages: Vec<Message>) {
        messages.sort_by_key(|m| m.created_at);
        messages.dedup_by_key(|m| m.id);
        self.messages = messages;
    }

    /// Merge a confirmed or pushed message.
    ///
    /// A message matching an existing id, or the client token of one we sent,
    /// is dropped. Returns whether it was appended.
    pub fn merge_message(&mut self, message: Message) -> bool {
        let known = self.messages.iter().any(|m| {
            m.id == message.id || (message.client_token.is_some() && m.client_token == message.client_token)
        });
        if known {
            return false;
        }
        self.messages.push(message);
        true
    }

    /// Remove by id, keeping the order of the rest. Unknown ids are a no-op.
    pub fn remove_message(&mut self, id: Uuid) -> bool {
        let before = self.messages.len();
        self.messages.retain(|m| m.id != id);
        self.messages.len() != before
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }

    /// Install a fetched note list unless a newer fetch already landed.
    pub fn replace_notes(&mut self, generation: u64, notes: Vec<Note>) -> bool {
        if generation <= self.notes_generation {
            return false;
        }
        self.notes_generation = generation;
        self.notes = notes;
        true
    }

    /// The other participant is online when anybody but us is present.
    pub fn apply_presence(&mut self, self_id: Uuid, online: &[Uuid]) {
        self.other_online = online.iter().any(|id| *id != self_id);
    }

    /// Messages from the other person not yet marked read.
    pub fn unread_count(&self, self_id: Uuid) -> usize {
        self.messages
            .iter()
            .filter(|m| !m.is_read && m.sender_id != self_id)
            .count()
    }

    /// Decoded voice, image or file bytes of a message, for playback or
    /// saving.
    pub fn media(&self, message_id: Uuid) -> Option<DataUri> {
        let message = self.messages.iter().find(|m| m.id == message_id)?;
        Payload::decode(&message.content).media()
    }

    pub fn note(&self, id: Uuid) -> Option<&Note> {
        self.notes.iter().find(|n| n.id == id)
    }

    /// Notes assigned to `user_id`.
    pub fn notes_for(&self, user_id: Uuid) -> impl Iterator<Item = &Note> {
        self.notes.iter().filter(move |n| n.assigned_to == user_id)
    }
}
