//! Error types for provisioning, schema synchronization and query execution.
//!
//! Startup failures ([`DbError::Config`], [`DbError::Connect`],
//! [`DbError::Open`], [`DbError::Provision`], [`DbError::Sync`]) are fatal:
//! the server refuses to start rather than run against a missing or ambiguous
//! target. [`DbError::Query`] is the only variant produced per request.

use thiserror::Error;

/// SQLSTATE raised by PostgreSQL when `CREATE DATABASE` names an existing database.
pub const PG_DUPLICATE_DATABASE: &str = "42P04";

/// SQLSTATE raised by PostgreSQL when `CREATE SCHEMA` names an existing schema.
pub const PG_DUPLICATE_SCHEMA: &str = "42P06";

/// Errors surfaced by the storage layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// The data source is malformed or names an unusable target.
    #[error("invalid database configuration: {0}")]
    Config(String),

    /// A bootstrap connection could not be established.
    #[error("failed to connect to {target}: {source}")]
    Connect {
        /// Redacted connection target.
        target: String,
        /// The underlying driver error.
        source: AdminError,
    },

    /// Creating the database or schema failed.
    #[error("failed to provision {object}: {source}")]
    Provision {
        /// The object being created, e.g. `database vigil`.
        object: String,
        /// The underlying server error.
        source: AdminError,
    },

    /// The long-lived connection pool could not be opened.
    #[error("failed to open database {target}: {source}")]
    Open {
        /// Redacted connection target.
        target: String,
        /// The underlying error.
        source: QueryError,
    },

    /// Structural synchronization of an entity's table failed.
    #[error("failed to synchronize table for {entity}: {source}")]
    Sync {
        /// Entity whose table failed to synchronize.
        entity: &'static str,
        /// The underlying error.
        source: QueryError,
    },

    /// A statement issued against the provisioned database failed.
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// Errors raised by bootstrap connections used only to issue `CREATE` statements.
#[derive(Debug, Error)]
pub enum AdminError {
    /// The server rejected a statement with a SQLSTATE code.
    #[error("server error {code}: {message}")]
    Server {
        /// Five-character SQLSTATE.
        code: String,
        /// Server-supplied message.
        message: String,
    },

    /// Transport, protocol or configuration failure inside the driver.
    #[error("driver error: {0}")]
    Driver(sqlx::Error),
}

impl AdminError {
    /// Returns the SQLSTATE if the server rejected the statement.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Self::Server { code, .. } => Some(code),
            Self::Driver(_) => None,
        }
    }

    /// Whether the server reported exactly the given SQLSTATE.
    pub fn is_sqlstate(&self, code: &str) -> bool {
        self.sqlstate() == Some(code)
    }
}

impl From<sqlx::Error> for AdminError {
    fn from(err: sqlx::Error) -> Self {
        let server = err.as_database_error().and_then(|db| {
            db.code().map(|code| Self::Server {
                code: code.into_owned(),
                message: db.message().to_string(),
            })
        });
        server.unwrap_or(Self::Driver(err))
    }
}

/// Errors raised while executing statements against the long-lived handle.
#[derive(Debug, Error)]
pub enum QueryError {
    /// MySQL or PostgreSQL driver failure.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// SQLite failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// No SQLite connection could be checked out of the pool.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A blocking SQLite task panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// A row could not be converted to or from an entity.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An entity field held a value incompatible with its column.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Logical field name.
        field: String,
        /// What was wrong with it.
        reason: String,
    },
}

impl QueryError {
    /// Whether the statement violated a primary-key or unique constraint.
    pub fn is_unique_violation(&self) -> bool {
        match self {
            Self::Sqlx(err) => err
                .as_database_error()
                .is_some_and(|db| db.is_unique_violation()),
            Self::Sqlite(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.extended_code,
                rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
            ),
            _ => false,
        }
    }
}

impl DbError {
    /// Whether this is a per-request key conflict rather than a real failure.
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Query(err) if err.is_unique_violation())
    }
}
