use crate::Database;
use crate::models::UserRow;
use crate::queries::OptionalExt;
use anyhow::{Result, anyhow};
use rusqlite::Connection;

const USER_COLS: &str = "id, username, email, password, description, created_at, updated_at";

fn map_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password: row.get(3)?,
        description: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

impl Database {
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        description: Option<&str>,
    ) -> Result<UserRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (username, email, password, description) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![username, email, password_hash, description],
            )?;
            let id = conn.last_insert_rowid();
            query_user_by_id(conn, id)?.ok_or_else(|| anyhow!("user {} vanished after insert", id))
        })
    }

    pub fn get_user_by_id(&self, id: i64) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_id(conn, id))
    }

    /// Case-insensitive: the email column is COLLATE NOCASE.
    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {USER_COLS} FROM users WHERE email = ?1"))?;
            stmt.query_row([email], map_user).optional()
        })
    }

    /// Case-insensitive: the username column is COLLATE NOCASE.
    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {USER_COLS} FROM users WHERE username = ?1"))?;
            stmt.query_row([username], map_user).optional()
        })
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {USER_COLS} FROM users ORDER BY id"))?;
            let rows = stmt
                .query_map([], map_user)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Partial profile update; `None` fields keep their current value.
    /// Returns `None` when the user does not exist.
    pub fn update_user_profile(
        &self,
        id: i64,
        username: Option<&str>,
        description: Option<&str>,
    ) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE users
                 SET username = COALESCE(?2, username),
                     description = COALESCE(?3, description),
                     updated_at = datetime('now')
                 WHERE id = ?1",
                rusqlite::params![id, username, description],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_user_by_id(conn, id)
        })
    }
}

fn query_user_by_id(conn: &Connection, id: i64) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(&format!("SELECT {USER_COLS} FROM users WHERE id = ?1"))?;
    stmt.query_row([id], map_user).optional()
}
