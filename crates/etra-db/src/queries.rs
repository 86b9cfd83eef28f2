use crate::models::{MessageRow, NoteRow, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::{Connection, Row};

const USER_COLUMNS: &str = "id, email, name, password, created_at";
const MESSAGE_COLUMNS: &str = "id, sender_id, content, is_read, client_token, created_at";
const INSERT_MESSAGE: &str = "INSERT INTO messages (id, sender_id, content, is_read, client_token, created_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)";
const NOTE_COLUMNS: &str =
    "id, created_by, assigned_to, title, content, priority, is_completed, created_at";

impl Database {
    // -- Users --

    pub fn create_user(&self, row: &UserRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, name, password, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                (&row.id, &row.email, &row.name, &row.password, &row.created_at),
            )?;
            Ok(())
        })
    }

    /// Returns false when no user has that email.
    pub fn update_user_password(&self, email: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users SET password = ?1 WHERE email = ?2",
                (password_hash, email),
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
            conn.query_row(&sql, [email], user_from_row).optional()
        })
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
            conn.query_row(&sql, [id], user_from_row).optional()
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC");
            collect(conn, &sql, user_from_row)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, row: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            execute_message_insert(conn, INSERT_MESSAGE, row)?;
            Ok(())
        })
    }

    /// Store a message unless its client token is already taken. Returns the
    /// row stored earlier under that token, or `None` when `row` went in.
    /// Lookup and insert happen under one connection lock.
    pub fn insert_message_once(&self, row: &MessageRow) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("{INSERT_MESSAGE} ON CONFLICT DO NOTHING");
            if execute_message_insert(conn, &sql, row)? > 0 {
                return Ok(None);
            }
            let Some(token) = &row.client_token else {
                anyhow::bail!("message {} already exists", row.id);
            };
            let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE client_token = ?1");
            let existing = conn.query_row(&sql, [token], message_from_row)?;
            Ok(Some(existing))
        })
    }

    /// All messages, oldest first.
    pub fn get_messages(&self) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages ORDER BY created_at ASC, rowid ASC");
            collect(conn, &sql, message_from_row)
        })
    }

    pub fn delete_message(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }

    /// Delete every message. Returns the ids that were removed so callers can
    /// announce each deletion.
    pub fn clear_messages(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let ids = {
                let mut stmt = tx.prepare("SELECT id FROM messages ORDER BY created_at ASC")?;
                let ids = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ids
            };
            tx.execute("DELETE FROM messages", [])?;
            tx.commit()?;
            Ok(ids)
        })
    }

    // -- Notes --

    pub fn insert_note(&self, row: &NoteRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notes (id, created_by, assigned_to, title, content, priority, is_completed, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    row.id,
                    row.created_by,
                    row.assigned_to,
                    row.title,
                    row.content,
                    row.priority,
                    row.is_completed,
                    row.created_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_note(&self, id: &str) -> Result<Option<NoteRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1");
            conn.query_row(&sql, [id], note_from_row).optional()
        })
    }

    /// All notes, newest first.
    pub fn get_notes(&self) -> Result<Vec<NoteRow>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {NOTE_COLUMNS} FROM notes ORDER BY created_at DESC, rowid DESC");
            collect(conn, &sql, note_from_row)
        })
    }

    /// Set the completion flag and return the updated row, or `None` if the
    /// note does not exist.
    pub fn set_note_completed(&self, id: &str, is_completed: bool) -> Result<Option<NoteRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE notes SET is_completed = ?1 WHERE id = ?2",
                rusqlite::params![is_completed, id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            let sql = format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = ?1");
            conn.query_row(&sql, [id], note_from_row).optional()
        })
    }

    pub fn delete_note(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM notes WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password: row.get(3)?,
        created_at: row.get(4)?,
    })
}

fn execute_message_insert(conn: &Connection, sql: &str, row: &MessageRow) -> rusqlite::Result<usize> {
    conn.execute(
        sql,
        rusqlite::params![
            row.id,
            row.sender_id,
            row.content,
            row.is_read,
            row.client_token,
            row.created_at
        ],
    )
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        content: row.get(2)?,
        is_read: row.get(3)?,
        client_token: row.get(4)?,
        created_at: row.get(5)?,
    })
}

fn note_from_row(row: &Row<'_>) -> rusqlite::Result<NoteRow> {
    Ok(NoteRow {
        id: row.get(0)?,
        created_by: row.get(1)?,
        assigned_to: row.get(2)?,
        title: row.get(3)?,
        content: row.get(4)?,
        priority: row.get(5)?,
        is_completed: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn collect<T>(
    conn: &Connection,
    sql: &str,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map([], map)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, Utc};
    use uuid::Uuid;

    use etra_types::{Message, Note, Priority};

    use super::*;
    use crate::models::timestamp;

    fn seed_user(db: &Database, email: &str) -> Uuid {
        let id = Uuid::new_v4();
        db.create_user(&UserRow {
            id: id.to_string(),
            email: email.to_string(),
            name: email.to_string(),
            password: "hash".to_string(),
            created_at: timestamp(Utc::now()),
        })
        .unwrap();
        id
    }

    fn base_time() -> DateTime<Utc> {
        DateTime::from_timestamp(1_760_000_000, 0).unwrap()
    }

    fn message(sender: Uuid, content: &str, offset_ms: i64) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: sender,
            content: content.to_string(),
            is_read: false,
            created_at: base_time() + Duration::milliseconds(offset_ms),
            client_token: Some(Uuid::new_v4()),
        }
    }

    #[test]
    fn messages_come_back_oldest_first() {
        let db = Database::open_in_memory().unwrap();
        let user = seed_user(&db, "a@example.com");

        let late = message(user, "second", 10);
        let early = message(user, "first", 0);
        db.insert_message(&MessageRow::new(&late)).unwrap();
        db.insert_message(&MessageRow::new(&early)).unwrap();

        let rows: Vec<Message> = db
            .get_messages()
            .unwrap()
            .into_iter()
            .map(|r| r.into_message().unwrap())
            .collect();
        assert_eq!(rows, vec![early, late]);
    }

    #[test]
    fn delete_and_clear_messages() {
        let db = Database::open_in_memory().unwrap();
        let user = seed_user(&db, "a@example.com");
        let m1 = message(user, "one", 0);
        let m2 = message(user, "two", 1);
        let m3 = message(user, "three", 2);
        for m in [&m1, &m2, &m3] {
            db.insert_message(&MessageRow::new(m)).unwrap();
        }

        assert!(db.delete_message(&m2.id.to_string()).unwrap());
        assert!(!db.delete_message(&m2.id.to_string()).unwrap());

        let cleared = db.clear_messages().unwrap();
        assert_eq!(cleared, vec![m1.id.to_string(), m3.id.to_string()]);
        assert!(db.get_messages().unwrap().is_empty());
    }

    #[test]
    fn a_client_token_is_stored_once() {
        let db = Database::open_in_memory().unwrap();
        let user = seed_user(&db, "a@example.com");
        let first = message(user, "hello", 0);
        let retry = Message {
            id: Uuid::new_v4(),
            ..first.clone()
        };

        let results: Vec<_> = std::thread::scope(|s| {
            let handles: Vec<_> = [&first, &retry]
                .into_iter()
                .map(|m| {
                    let db = &db;
                    s.spawn(move || db.insert_message_once(&MessageRow::new(m)).unwrap())
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let stored = db.get_messages().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(results.iter().filter(|r| r.is_none()).count(), 1);
        let duplicate = results.into_iter().flatten().next().unwrap();
        assert_eq!(duplicate.id, stored[0].id);

        let untokened = Message {
            client_token: None,
            ..message(user, "plain", 1)
        };
        assert!(db.insert_message_once(&MessageRow::new(&untokened)).unwrap().is_none());
        assert!(db.insert_message_once(&MessageRow::new(&untokened)).is_err());
    }

    #[test]
    fn notes_newest_first_and_toggle() {
        let db = Database::open_in_memory().unwrap();
        let a = seed_user(&db, "a@example.com");
        let b = seed_user(&db, "b@example.com");

        let old = Note {
            id: Uuid::new_v4(),
            created_by: a,
            assigned_to: b,
            title: "buy milk".into(),
            content: None,
            priority: Priority::High,
            is_completed: false,
            created_at: Utc::now() - Duration::seconds(5),
        };
        let new = Note {
            id: Uuid::new_v4(),
            title: "call".into(),
            content: Some("after 5".into()),
            priority: Priority::Low,
            created_at: Utc::now(),
            ..old.clone()
        };
        db.insert_note(&NoteRow::new(&old)).unwrap();
        db.insert_note(&NoteRow::new(&new)).unwrap();

        let notes: Vec<Note> = db
            .get_notes()
            .unwrap()
            .into_iter()
            .map(|r| r.into_note().unwrap())
            .collect();
        assert_eq!(notes, vec![new.clone(), old.clone()]);

        let updated = db
            .set_note_completed(&old.id.to_string(), true)
            .unwrap()
            .unwrap()
            .into_note()
            .unwrap();
        assert!(updated.is_completed);
        assert!(db.set_note_completed(&Uuid::new_v4().to_string(), true).unwrap().is_none());

        assert!(db.delete_note(&new.id.to_string()).unwrap());
        assert!(db.get_note(&new.id.to_string()).unwrap().is_none());
    }

    #[test]
    fn password_update_targets_existing_user_only() {
        let db = Database::open_in_memory().unwrap();
        seed_user(&db, "a@example.com");
        assert!(db.update_user_password("a@example.com", "new").unwrap());
        assert!(!db.update_user_password("nobody@example.com", "new").unwrap());
        let user = db.get_user_by_email("a@example.com").unwrap().unwrap();
        assert_eq!(user.password, "new");
    }
}
