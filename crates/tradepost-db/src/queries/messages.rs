use crate::Database;
use crate::models::MessageRow;
use crate::queries::OptionalExt;
use anyhow::{Result, anyhow};
use rusqlite::Connection;

const MESSAGE_SELECT: &str = "
    SELECT m.id, m.sender_id, m.receiver_id, m.service_id, m.subject, m.content,
           su.username, ru.username, s.title, m.created_at
    FROM messages m
    JOIN users su ON su.id = m.sender_id
    JOIN users ru ON ru.id = m.receiver_id
    LEFT JOIN services s ON s.id = m.service_id";

fn map_message(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageRow> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        service_id: row.get(3)?,
        subject: row.get(4)?,
        content: row.get(5)?,
        sender_username: row.get(6)?,
        receiver_username: row.get(7)?,
        service_title: row.get(8)?,
        created_at: row.get(9)?,
    })
}

impl Database {
    pub fn insert_message(
        &self,
        sender_id: i64,
        receiver_id: i64,
        service_id: Option<i64>,
        subject: Option<&str>,
        content: &str,
    ) -> Result<MessageRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (sender_id, receiver_id, service_id, subject, content)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![sender_id, receiver_id, service_id, subject, content],
            )?;
            let id = conn.last_insert_rowid();
            query_message(conn, id)?.ok_or_else(|| anyhow!("message {} vanished after insert", id))
        })
    }

    pub fn get_message(&self, id: i64) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| query_message(conn, id))
    }

    /// Messages received by `user_id`, newest-first.
    pub fn inbox(&self, user_id: i64, limit: u32, offset: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT}
                 WHERE m.receiver_id = ?1
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit, offset], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Messages sent by `user_id`, newest-first.
    pub fn sent(&self, user_id: i64, limit: u32, offset: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT}
                 WHERE m.sender_id = ?1
                 ORDER BY m.created_at DESC, m.id DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![user_id, limit, offset], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Thread reconstruction: every message between the unordered pair
    /// {user_a, user_b} whose service reference matches `service_id`
    /// (`IS` so that NULL matches NULL), oldest-first. There is no stored
    /// thread — this predicate is the conversation.
    pub fn thread(
        &self,
        user_a: i64,
        user_b: i64,
        service_id: Option<i64>,
    ) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{MESSAGE_SELECT}
                 WHERE ((m.sender_id = ?1 AND m.receiver_id = ?2)
                     OR (m.sender_id = ?2 AND m.receiver_id = ?1))
                   AND m.service_id IS ?3
                 ORDER BY m.created_at ASC, m.id ASC"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![user_a, user_b, service_id], map_message)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_message(conn: &Connection, id: i64) -> Result<Option<MessageRow>> {
    let mut stmt = conn.prepare(&format!("{MESSAGE_SELECT} WHERE m.id = ?1"))?;
    stmt.query_row([id], map_message).optional()
}
