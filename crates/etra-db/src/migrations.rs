use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            email       TEXT NOT NULL UNIQUE,
            name        TEXT NOT NULL,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            sender_id       TEXT NOT NULL REFERENCES users(id),
            content         TEXT NOT NULL,
            is_read         INTEGER NOT NULL DEFAULT 0,
            client_token    TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_created
            ON messages(created_at);

        CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_client_token
            ON messages(client_token) WHERE client_token IS NOT NULL;

        CREATE TABLE IF NOT EXISTS notes (
            id              TEXT PRIMARY KEY,
            created_by      TEXT NOT NULL REFERENCES users(id),
            assigned_to     TEXT NOT NULL REFERENCES users(id),
            title           TEXT NOT NULL,
            content         TEXT,
            priority        TEXT NOT NULL DEFAULT 'medium'
                            CHECK (priority IN ('low', 'medium', 'high')),
            is_completed    INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_notes_created
            ON notes(created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
