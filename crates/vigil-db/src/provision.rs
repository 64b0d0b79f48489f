//! Idempotent database and schema bootstrap.
//!
//! [`provision`] runs once at startup, before the long-lived handle is
//! opened. Each engine family has its own [`ProvisionStrategy`]:
//!
//! | driver | steps |
//! |--------|-------|
//! | MySQL | `CREATE DATABASE IF NOT EXISTS` via the `mysql` system database |
//! | PostgreSQL | catalog lookup + `CREATE DATABASE` via `postgres`, then `CREATE SCHEMA IF NOT EXISTS` inside the target when a `search_path` is configured |
//! | anything else | nothing |
//!
//! Bootstrap connections are opened through [`AdminConnector`] and are always
//! closed before the step that opened them returns, whether it succeeded or
//! not.

use std::future::Future;

use url::Url;

use crate::dialect::Dialect;
use crate::error::{AdminError, DbError, PG_DUPLICATE_DATABASE, PG_DUPLICATE_SCHEMA};
use crate::naming::validate_identifier;
use crate::source::{redact, DataSource, Driver};

/// Character set and collation given to databases created on MySQL.
const MYSQL_CHARSET: &str = "DEFAULT CHARACTER SET utf8mb4 COLLATE utf8mb4_general_ci";

/// A short-lived connection that issues bootstrap statements.
pub trait AdminConnection: Send {
    /// Executes a statement that returns no rows.
    fn execute(&mut self, sql: &str) -> impl Future<Output = Result<(), AdminError>> + Send;

    /// Whether the server's catalog lists a database with this exact name.
    fn database_exists(
        &mut self,
        name: &str,
    ) -> impl Future<Output = Result<bool, AdminError>> + Send;

    /// Closes the connection. Failures are logged, never returned.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Opens bootstrap connections.
pub trait AdminConnector: Sync {
    /// The connection type produced.
    type Connection: AdminConnection;

    /// Connects to `url` using the driver for `dialect`.
    fn connect(
        &self,
        dialect: Dialect,
        url: &Url,
    ) -> impl Future<Output = Result<Self::Connection, AdminError>> + Send;
}

/// Provisioning algorithm for one engine family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStrategy {
    /// Create the database through the `mysql` system database.
    MySql,
    /// Create the database through `postgres`, then the schema inside it.
    Postgres,
    /// Engines without create-database semantics (SQLite, unknown drivers).
    Noop,
}

impl ProvisionStrategy {
    /// Selects the strategy for a driver.
    pub fn for_driver(driver: &Driver) -> Self {
        match driver {
            Driver::MySql => Self::MySql,
            Driver::Postgres => Self::Postgres,
            Driver::Sqlite | Driver::Other(_) => Self::Noop,
        }
    }

    /// Runs the strategy against `source`.
    ///
    /// # Errors
    ///
    /// See [`provision`].
    pub async fn run<C: AdminConnector>(
        self,
        source: &DataSource,
        connector: &C,
    ) -> Result<(), DbError> {
        match self {
            Self::MySql => provision_mysql(source, connector).await,
            Self::Postgres => provision_postgres(source, connector).await,
            Self::Noop => {
                tracing::debug!(driver = %source.driver(), "driver needs no provisioning");
                Ok(())
            }
        }
    }
}

/// Ensures the configured database (and PostgreSQL schema) exists.
///
/// Safe to call repeatedly: objects that already exist are left alone.
///
/// # Errors
///
/// - `DbError::Config` if the template or a configured name is invalid.
/// - `DbError::Connect` if a bootstrap connection cannot be opened.
/// - `DbError::Provision` if a `CREATE` fails for any reason other than the
///   object already existing.
pub async fn provision<C: AdminConnector>(
    source: &DataSource,
    connector: &C,
) -> Result<(), DbError> {
    ProvisionStrategy::for_driver(source.driver())
        .run(source, connector)
        .await
}

async fn provision_mysql<C: AdminConnector>(
    source: &DataSource,
    connector: &C,
) -> Result<(), DbError> {
    let database = source.database();
    validate_identifier("database", database)?;
    let admin_url = source.admin_url()?;

    let mut conn = open(connector, Dialect::MySql, &admin_url).await?;
    let outcome = conn
        .execute(&format!(
            "CREATE DATABASE IF NOT EXISTS {} {MYSQL_CHARSET}",
            Dialect::MySql.quote(database)
        ))
        .await;
    conn.close().await;

    outcome.map_err(|source| DbError::Provision {
        object: format!("database {database}"),
        source,
    })?;
    tracing::info!(database, "ensured mysql database exists");
    Ok(())
}

async fn provision_postgres<C: AdminConnector>(
    source: &DataSource,
    connector: &C,
) -> Result<(), DbError> {
    let database = source.database();
    validate_identifier("database", database)?;
    let schema = source.schema()?;
    let admin_url = source.admin_url()?;

    let mut conn = open(connector, Dialect::Postgres, &admin_url).await?;
    let outcome = ensure_pg_database(&mut conn, database).await;
    conn.close().await;
    outcome?;

    if let Some(schema) = schema {
        let target_url = source.target_url()?;
        let mut conn = open(connector, Dialect::Postgres, &target_url).await?;
        let outcome = ensure_pg_schema(&mut conn, &schema).await;
        conn.close().await;
        outcome?;
    }
    Ok(())
}

async fn ensure_pg_database<A: AdminConnection>(
    conn: &mut A,
    database: &str,
) -> Result<(), DbError> {
    let object = || format!("database {database}");

    let exists = conn
        .database_exists(database)
        .await
        .map_err(|source| DbError::Provision {
            object: object(),
            source,
        })?;
    if exists {
        tracing::debug!(database, "postgres database already exists");
        return Ok(());
    }

    match conn
        .execute(&format!(
            "CREATE DATABASE {}",
            Dialect::Postgres.quote(database)
        ))
        .await
    {
        Ok(()) => {
            tracing::info!(database, "created postgres database");
            Ok(())
        }
        Err(err) if err.is_sqlstate(PG_DUPLICATE_DATABASE) => {
            tracing::debug!(database, "postgres database created concurrently");
            Ok(())
        }
        Err(source) => Err(DbError::Provision {
            object: object(),
            source,
        }),
    }
}

async fn ensure_pg_schema<A: AdminConnection>(conn: &mut A, schema: &str) -> Result<(), DbError> {
    match conn
        .execute(&format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            Dialect::Postgres.quote(schema)
        ))
        .await
    {
        Ok(()) => {
            tracing::info!(schema, "ensured postgres schema exists");
            Ok(())
        }
        Err(err) if err.is_sqlstate(PG_DUPLICATE_SCHEMA) => {
            tracing::debug!(schema, "postgres schema created concurrently");
            Ok(())
        }
        Err(source) => Err(DbError::Provision {
            object: format!("schema {schema}"),
            source,
        }),
    }
}

async fn open<C: AdminConnector>(
    connector: &C,
    dialect: Dialect,
    url: &Url,
) -> Result<C::Connection, DbError> {
    connector
        .connect(dialect, url)
        .await
        .map_err(|source| DbError::Connect {
            target: redact(url.as_str()),
            source,
        })
}
