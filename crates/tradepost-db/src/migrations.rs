use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            username    TEXT NOT NULL UNIQUE COLLATE NOCASE,
            email       TEXT NOT NULL UNIQUE COLLATE NOCASE,
            password    TEXT NOT NULL,
            description TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS services (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id             INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            title               TEXT NOT NULL,
            description         TEXT NOT NULL DEFAULT '',
            price               REAL NOT NULL DEFAULT 0 CHECK (price >= 0),
            equity_percentage   REAL,
            needs               TEXT,
            created_at          TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_services_owner
            ON services(user_id, created_at);

        -- Append-only; conversations are derived from these columns at read
        -- time, there is no thread table.
        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            sender_id   INTEGER NOT NULL REFERENCES users(id),
            receiver_id INTEGER NOT NULL REFERENCES users(id),
            service_id  INTEGER REFERENCES services(id),
            subject     TEXT,
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_sender
            ON messages(sender_id, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_receiver
            ON messages(receiver_id, created_at);

        CREATE TABLE IF NOT EXISTS ratings (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL REFERENCES users(id),
            service_id  INTEGER NOT NULL REFERENCES services(id) ON DELETE CASCADE,
            score       INTEGER NOT NULL CHECK (score BETWEEN 1 AND 5),
            comment     TEXT,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_ratings_service
            ON ratings(service_id);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
