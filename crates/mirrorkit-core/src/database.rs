//! Shared database handle.

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use diesel::{Connection, QueryResult, SqliteConnection};
use mirrorkit_db::connection::DbConnection;
use mirrorkit_utils::fs::ensure_dir_exists;

use crate::error::{MirrorError, Result};

/// Thread-safe wrapper around [`DbConnection`].
///
/// Every collection and store in this crate shares one handle, so writes from
/// concurrent updates are serialized here and by SQLite's own locking.
#[derive(Clone)]
pub struct MirrorDatabase {
    conn: Arc<Mutex<DbConnection>>,
}

impl MirrorDatabase {
    /// Opens the database at `path`, creating its directory and running migrations.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            ensure_dir_exists(parent)?;
        }
        let conn = DbConnection::open(path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn conn(&self) -> Result<MutexGuard<'_, DbConnection>> {
        self.conn.lock().map_err(|_| MirrorError::PoisonError)
    }

    /// Executes a function with the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> QueryResult<T>,
    {
        let mut conn = self.conn()?;
        Ok(f(conn.conn())?)
    }

    /// Executes a function within a transaction. Any error rolls back every write.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T>,
    {
        let mut conn = self.conn()?;
        conn.conn().transaction(f)
    }
}

#[cfg(test)]
mod tests {
    use mirrorkit_db::repository::reflist::RefListRepository;
    use mirrorkit_db::models::reflist::NewRefList;
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_open_creates_parent_dir() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/db/mirrorkit.db");
        MirrorDatabase::open(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let dir = tempdir().unwrap();
        let db = MirrorDatabase::open(dir.path().join("mirrorkit.db")).unwrap();

        let result: Result<()> = db.transaction(|conn| {
            RefListRepository::insert_or_ignore(
                conn,
                &NewRefList {
                    key: "k1",
                    refs: json!(["a"]),
                    created_at: "2026-01-01T00:00:00Z".into(),
                },
            )?;
            Err(MirrorError::Custom("abort".into()))
        });
        assert!(result.is_err());

        let found = db
            .with_conn(|conn| RefListRepository::find_by_key(conn, "k1"))
            .unwrap();
        assert!(found.is_none());
    }
}
