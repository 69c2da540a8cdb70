use crate::Database;
use crate::models::RatingRow;
use crate::queries::OptionalExt;
use anyhow::{Result, anyhow};
use rusqlite::Connection;

const RATING_SELECT: &str = "
    SELECT r.id, r.user_id, r.service_id, r.score, r.comment, u.username, r.created_at
    FROM ratings r
    JOIN users u ON u.id = r.user_id";

fn map_rating(row: &rusqlite::Row<'_>) -> rusqlite::Result<RatingRow> {
    Ok(RatingRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        service_id: row.get(2)?,
        score: row.get(3)?,
        comment: row.get(4)?,
        username: row.get(5)?,
        created_at: row.get(6)?,
    })
}

impl Database {
    pub fn insert_rating(
        &self,
        user_id: i64,
        service_id: i64,
        score: i64,
        comment: Option<&str>,
    ) -> Result<RatingRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO ratings (user_id, service_id, score, comment) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![user_id, service_id, score, comment],
            )?;
            let id = conn.last_insert_rowid();
            query_rating(conn, id)?.ok_or_else(|| anyhow!("rating {} vanished after insert", id))
        })
    }

    pub fn ratings_for_service(&self, service_id: i64) -> Result<Vec<RatingRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{RATING_SELECT}
                 WHERE r.service_id = ?1
                 ORDER BY r.created_at DESC, r.id DESC"
            ))?;
            let rows = stmt
                .query_map([service_id], map_rating)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_rating(conn: &Connection, id: i64) -> Result<Option<RatingRow>> {
    let mut stmt = conn.prepare(&format!("{RATING_SELECT} WHERE r.id = ?1"))?;
    stmt.query_row([id], map_rating).optional()
}
