//! Database connection management.

use std::path::Path;

use diesel::{sql_query, Connection, RunQueryDsl, SqliteConnection};

use crate::{error::Result, migration::apply_migrations};

/// Database connection wrapper with migration support.
pub struct DbConnection {
    conn: SqliteConnection,
}

impl DbConnection {
    /// Opens a database connection and runs migrations.
    ///
    /// The database is put in WAL mode with foreign keys enforced. Writers wait up to
    /// five seconds for a lock held by another process.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy();
        let mut conn = SqliteConnection::establish(&path_str)?;

        sql_query("PRAGMA journal_mode = WAL;").execute(&mut conn)?;
        sql_query("PRAGMA busy_timeout = 5000;").execute(&mut conn)?;
        sql_query("PRAGMA foreign_keys = ON;").execute(&mut conn)?;

        apply_migrations(&mut conn)?;

        Ok(Self { conn })
    }

    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}

impl std::ops::Deref for DbConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl std::ops::DerefMut for DbConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}
