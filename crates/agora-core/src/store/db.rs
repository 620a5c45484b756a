use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::Connection;

use crate::error::StorageError;

/// SQLite-backed persistent store shared by the notification cache and the
/// identity provider's credential storage.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    pub fn open<P: AsRef<Path>>(db_dir: P) -> Result<Self, StorageError> {
        let db_dir = db_dir.as_ref();
        std::fs::create_dir_all(db_dir)?;
        let conn = Connection::open(db_dir.join("agora.db"))?;
        Self::init(conn)
    }

    /// In-memory database, used in tests.
    #[allow(dead_code)]
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY,
                owner TEXT NOT NULL,
                kind TEXT NOT NULL,
                source_event_id TEXT NOT NULL,
                message TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                UNIQUE (owner, kind, source_event_id)
            );
            CREATE INDEX IF NOT EXISTS idx_notifications_owner
                ON notifications (owner, created_at DESC);

            CREATE TABLE IF NOT EXISTS notification_settings (
                owner TEXT PRIMARY KEY,
                mentions INTEGER NOT NULL,
                replies INTEGER NOT NULL,
                zaps INTEGER NOT NULL,
                follows INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS credentials (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                secret TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with the connection locked.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StorageError> {
        let conn = self.conn.lock();
        Ok(f(&conn)?)
    }

    // ===== Credentials =====
    // A single row holding the raw nsec, or an ncryptsec when the user set a
    // password at login.

    pub fn store_credentials(&self, secret: &str) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO credentials (id, secret) VALUES (1, ?1)
                 ON CONFLICT (id) DO UPDATE SET secret = excluded.secret",
                [secret],
            )
            .map(|_| ())
        })
    }

    pub fn get_stored_credentials(&self) -> Result<Option<String>, StorageError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT secret FROM credentials WHERE id = 1", [], |row| {
                row.get(0)
            })
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })
    }

    pub fn has_stored_credentials(&self) -> bool {
        matches!(self.get_stored_credentials(), Ok(Some(_)))
    }

    pub fn clear_credentials(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| conn.execute("DELETE FROM credentials", []).map(|_| ()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_database_creation() {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path()).unwrap();

        let count: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM notifications", [], |row| row.get(0))
            })
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_credentials_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        assert!(!db.has_stored_credentials());

        db.store_credentials("nsec1example").unwrap();
        assert_eq!(
            db.get_stored_credentials().unwrap().as_deref(),
            Some("nsec1example")
        );

        // Overwrites, never accumulates rows
        db.store_credentials("ncryptsec1other").unwrap();
        assert_eq!(
            db.get_stored_credentials().unwrap().as_deref(),
            Some("ncryptsec1other")
        );

        db.clear_credentials().unwrap();
        assert!(!db.has_stored_credentials());
    }
}
