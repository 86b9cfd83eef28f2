//! Database row types: these map directly to SQLite rows.
//! Distinct from etra-types API models to keep the DB layer independent.
use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use etra_types::{Message, Note, Priority, User};

pub struct UserRow {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub is_read: bool,
    pub client_token: Option<String>,
    pub created_at: String,
}

pub struct NoteRow {
    pub id: String,
    pub created_by: String,
    pub assigned_to: String,
    pub title: String,
    pub content: Option<String>,
    pub priority: String,
    pub is_completed: bool,
    pub created_at: String,
}

/// Timestamps are stored as fixed-width RFC 3339 strings so that
/// lexicographic order in SQL equals chronological order.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Corrupt timestamp '{}'", raw))?
        .with_timezone(&Utc))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse().with_context(|| format!("Corrupt id '{}'", raw))
}

impl UserRow {
    pub fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            email: self.email,
            name: self.name,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

impl MessageRow {
    pub fn new(message: &Message) -> Self {
        Self {
            id: message.id.to_string(),
            sender_id: message.sender_id.to_string(),
            content: message.content.clone(),
            is_read: message.is_read,
            client_token: message.client_token.map(|t| t.to_string()),
            created_at: timestamp(message.created_at),
        }
    }

    pub fn into_message(self) -> Result<Message> {
        Ok(Message {
            id: parse_id(&self.id)?,
            sender_id: parse_id(&self.sender_id)?,
            content: self.content,
            is_read: self.is_read,
            client_token: self.client_token.as_deref().map(parse_id).transpose()?,
            created_at: parse_time(&self.created_at)?,
        })
    }
}

impl NoteRow {
    pub fn new(note: &Note) -> Self {
        Self {
            id: note.id.to_string(),
            created_by: note.created_by.to_string(),
            assigned_to: note.assigned_to.to_string(),
            title: note.title.clone(),
            content: note.content.clone(),
            priority: note.priority.as_str().to_string(),
            is_completed: note.is_completed,
            created_at: timestamp(note.created_at),
        }
    }

    pub fn into_note(self) -> Result<Note> {
        Ok(Note {
            id: parse_id(&self.id)?,
            created_by: parse_id(&self.created_by)?,
            assigned_to: parse_id(&self.assigned_to)?,
            title: self.title,
            content: self.content,
            priority: self.priority.parse::<Priority>()?,
            is_completed: self.is_completed,
            created_at: parse_time(&self.created_at)?,
        })
    }
}
