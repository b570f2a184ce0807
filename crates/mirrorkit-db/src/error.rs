//! Error types for mirrorkit-db.

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum DbError {
    #[error("Database connection failed: {0}")]
    #[diagnostic(
        code(mirrorkit_db::connection),
        help("Check if the database file exists and is accessible")
    )]
    ConnectionError(String),

    #[error("Database query failed: {0}")]
    #[diagnostic(code(mirrorkit_db::query))]
    QueryError(String),

    #[error("Database migration failed: {0}")]
    #[diagnostic(
        code(mirrorkit_db::migration),
        help("The database schema may be corrupted or from a newer version")
    )]
    MigrationError(String),

    #[error("Record not found: {0}")]
    #[diagnostic(code(mirrorkit_db::not_found))]
    NotFound(String),

    #[error("Database integrity error: {0}")]
    #[diagnostic(
        code(mirrorkit_db::integrity),
        help("A stored record refers to data that no longer exists")
    )]
    IntegrityError(String),
}

impl From<diesel::result::Error> for DbError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => DbError::NotFound("Record not found".to_string()),
            diesel::result::Error::DatabaseError(_, info) => {
                DbError::QueryError(info.message().to_string())
            }
            other => DbError::QueryError(other.to_string()),
        }
    }
}

impl From<diesel::result::ConnectionError> for DbError {
    fn from(err: diesel::result::ConnectionError) -> Self {
        DbError::ConnectionError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
