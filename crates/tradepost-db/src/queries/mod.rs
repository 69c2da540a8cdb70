pub mod messages;
pub mod ratings;
pub mod services;
pub mod users;

use anyhow::Result;

/// Extension trait for optional query results
pub(crate) trait OptionalExt<T> {
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
pub(crate) mod test_support {
    use crate::Database;
    use crate::models::UserRow;

    pub fn test_db() -> Database {
        Database::open_in_memory().expect("in-memory db")
    }

    pub fn seed_user(db: &Database, username: &str) -> UserRow {
        db.create_user(
            username,
            &format!("{username}@example.com"),
            "$argon2id$fake-hash",
            None,
        )
        .expect("seed user")
    }
}
