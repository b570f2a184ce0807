use diesel::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::debug;

use crate::error::{DbError, Result};

pub const CORE_MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations/core");

pub fn apply_migrations(conn: &mut SqliteConnection) -> Result<()> {
    let applied = conn
        .run_pending_migrations(CORE_MIGRATIONS)
        .map_err(|err| DbError::MigrationError(err.to_string()))?;

    for version in applied {
        debug!(%version, "applied migration");
    }

    Ok(())
}
