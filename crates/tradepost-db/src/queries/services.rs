use crate::Database;
use crate::models::{RatingAggregate, ServiceRow};
use crate::queries::OptionalExt;
use anyhow::{Result, anyhow};
use rusqlite::Connection;

const SERVICE_SELECT: &str = "
    SELECT s.id, s.user_id, u.username, s.title, s.description, s.price,
           s.equity_percentage, s.needs, s.created_at, s.updated_at
    FROM services s
    JOIN users u ON u.id = s.user_id";

fn map_service(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServiceRow> {
    Ok(ServiceRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        owner_username: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        price: row.get(5)?,
        equity_percentage: row.get(6)?,
        needs: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl Database {
    pub fn insert_service(
        &self,
        user_id: i64,
        title: &str,
        description: &str,
        price: f64,
        equity_percentage: Option<f64>,
        needs: Option<&str>,
    ) -> Result<ServiceRow> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO services (user_id, title, description, price, equity_percentage, needs)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![user_id, title, description, price, equity_percentage, needs],
            )?;
            let id = conn.last_insert_rowid();
            query_service(conn, id)?.ok_or_else(|| anyhow!("service {} vanished after insert", id))
        })
    }

    pub fn get_service(&self, id: i64) -> Result<Option<ServiceRow>> {
        self.with_conn(|conn| query_service(conn, id))
    }

    /// Newest-first page of services, optionally filtered to one owner.
    /// Returns the page plus the total matching count so the handler can
    /// compute `hasMore`.
    pub fn list_services(
        &self,
        owner_id: Option<i64>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<ServiceRow>, i64)> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{SERVICE_SELECT}
                 WHERE (?1 IS NULL OR s.user_id = ?1)
                 ORDER BY s.created_at DESC, s.id DESC
                 LIMIT ?2 OFFSET ?3"
            ))?;
            let rows = stmt
                .query_map(rusqlite::params![owner_id, limit, offset], map_service)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let total: i64 = conn.query_row(
                "SELECT COUNT(*) FROM services WHERE (?1 IS NULL OR user_id = ?1)",
                [owner_id],
                |row| row.get(0),
            )?;

            Ok((rows, total))
        })
    }

    /// Full-row update; the handler merges the patch into the existing row
    /// first. Returns `None` when the service does not exist.
    pub fn update_service(
        &self,
        id: i64,
        title: &str,
        description: &str,
        price: f64,
        equity_percentage: Option<f64>,
        needs: Option<&str>,
    ) -> Result<Option<ServiceRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE services
                 SET title = ?2, description = ?3, price = ?4,
                     equity_percentage = ?5, needs = ?6,
                     updated_at = datetime('now')
                 WHERE id = ?1",
                rusqlite::params![id, title, description, price, equity_percentage, needs],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_service(conn, id)
        })
    }

    pub fn delete_service(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute("DELETE FROM services WHERE id = ?1", [id])?;
            Ok(changed > 0)
        })
    }

    /// Batch aggregate for the listing endpoints: one grouped query over the
    /// requested service ids. Services with no ratings simply produce no row.
    pub fn rating_aggregates(&self, service_ids: &[i64]) -> Result<Vec<RatingAggregate>> {
        if service_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let placeholders: Vec<String> =
                (1..=service_ids.len()).map(|i| format!("?{}", i)).collect();
            let sql = format!(
                "SELECT service_id, ROUND(AVG(score), 2), COUNT(*)
                 FROM ratings
                 WHERE service_id IN ({})
                 GROUP BY service_id",
                placeholders.join(", ")
            );

            let mut stmt = conn.prepare(&sql)?;
            let params: Vec<&dyn rusqlite::types::ToSql> = service_ids
                .iter()
                .map(|id| id as &dyn rusqlite::types::ToSql)
                .collect();

            let rows = stmt
                .query_map(params.as_slice(), |row| {
                    Ok(RatingAggregate {
                        service_id: row.get(0)?,
                        avg_rating: row.get(1)?,
                        ratings_count: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }
}

fn query_service(conn: &Connection, id: i64) -> Result<Option<ServiceRow>> {
    let mut stmt = conn.prepare(&format!("{SERVICE_SELECT} WHERE s.id = ?1"))?;
    stmt.query_row([id], map_service).optional()
}

#[cfg(test)]
mod tests {
    use crate::Database;
    use crate::queries::test_support::{seed_user, test_db};

    fn seed_services(db: &Database, owner_id: i64, n: usize) -> Vec<i64> {
        (0..n)
            .map(|i| {
                db.insert_service(owner_id, &format!("service {i}"), "desc", 10.0, None, None)
                    .expect("insert service")
                    .id
            })
            .collect()
    }

    #[test]
    fn pagination_reports_has_more_correctly() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        seed_services(&db, alice.id, 5);

        let (page, total) = db.list_services(None, 2, 0).unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(total, 5);
        assert!((page.len() as i64) < total, "offset 0 still has more");

        let (page, total) = db.list_services(None, 2, 4).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(total, 5);
        assert!(4 + page.len() as i64 >= total, "offset 4 exhausts the set");
    }

    #[test]
    fn owner_filter_limits_the_listing() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        seed_services(&db, alice.id, 3);
        seed_services(&db, bob.id, 2);

        let (rows, total) = db.list_services(Some(bob.id), 50, 0).unwrap();
        assert_eq!(total, 2);
        assert!(rows.iter().all(|s| s.user_id == bob.id));
        assert!(rows.iter().all(|s| s.owner_username == "bob"));
    }

    #[test]
    fn listing_is_newest_first() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let ids = seed_services(&db, alice.id, 3);

        let (rows, _) = db.list_services(None, 50, 0).unwrap();
        // Same-second inserts fall back to id ordering.
        let got: Vec<i64> = rows.iter().map(|s| s.id).collect();
        let mut want = ids.clone();
        want.reverse();
        assert_eq!(got, want);
    }

    #[test]
    fn aggregates_round_to_two_decimals_and_skip_unrated() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let bob = seed_user(&db, "bob");
        let rated = db
            .insert_service(alice.id, "rated", "d", 1.0, None, None)
            .unwrap();
        let unrated = db
            .insert_service(alice.id, "unrated", "d", 1.0, None, None)
            .unwrap();

        for score in [4, 5, 5] {
            db.insert_rating(bob.id, rated.id, score, None).unwrap();
        }

        let aggs = db.rating_aggregates(&[rated.id, unrated.id]).unwrap();
        assert_eq!(aggs.len(), 1);
        assert_eq!(aggs[0].service_id, rated.id);
        assert_eq!(aggs[0].avg_rating, 4.67);
        assert_eq!(aggs[0].ratings_count, 3);
    }

    #[test]
    fn update_merges_and_delete_removes() {
        let db = test_db();
        let alice = seed_user(&db, "alice");
        let svc = db
            .insert_service(alice.id, "old title", "old desc", 5.0, None, None)
            .unwrap();

        let updated = db
            .update_service(svc.id, "new title", "old desc", 7.5, Some(2.5), None)
            .unwrap()
            .expect("row exists");
        assert_eq!(updated.title, "new title");
        assert_eq!(updated.price, 7.5);
        assert_eq!(updated.equity_percentage, Some(2.5));

        assert!(db.delete_service(svc.id).unwrap());
        assert!(!db.delete_service(svc.id).unwrap());
        assert!(db.get_service(svc.id).unwrap().is_none());
    }
}
