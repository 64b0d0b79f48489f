//! The long-lived database handle.
//!
//! A [`Database`] is opened once, after provisioning, against the fully
//! qualified target and shared (behind an `Arc`) with every request handler.
//! The underlying pools are safe for concurrent use; this type adds no
//! locking of its own.
//!
//! [`Database::shutdown`] is the authoritative release. If a handle is dropped
//! without it, `Drop` logs a warning and closes the server pools in the
//! background on a best-effort basis.

use std::str::FromStr;

use rusqlite::types::{ToSqlOutput, ValueRef};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use crate::dialect::{Dialect, Statement};
use crate::entity::{encode, ColumnDef, ColumnKind, Entity, EntityDescriptor, Row, Value};
use crate::error::{DbError, QueryError};
use crate::naming::TableNaming;
use crate::pool::{create_sqlite_pool, DbRuntimeSettings, SqlitePool};
use crate::source::{redact, DataSource, Driver};

enum Backend {
    MySql(MySqlPool),
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

/// Process-wide handle to the provisioned database.
pub struct Database {
    backend: Backend,
    naming: TableNaming,
    display: String,
    released: bool,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("dialect", &self.dialect())
            .field("target", &self.display)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Opens the long-lived pool against the configured database.
    ///
    /// For PostgreSQL the template's `search_path` becomes the search path of
    /// every pooled connection. Server pools connect eagerly, so an
    /// unreachable target fails here rather than on the first request.
    ///
    /// # Errors
    ///
    /// - `DbError::Config` for unsupported drivers or malformed templates.
    /// - `DbError::Open` if the pool cannot establish a connection.
    pub async fn open(
        source: &DataSource,
        naming: TableNaming,
        settings: DbRuntimeSettings,
    ) -> Result<Self, DbError> {
        let (backend, target) = match source.driver() {
            Driver::MySql => {
                let url = source.target_url()?;
                let target = redact(url.as_str());
                let pool = MySqlPoolOptions::new()
                    .max_connections(settings.pool_max_size)
                    .acquire_timeout(settings.acquire_timeout())
                    .connect(url.as_str())
                    .await
                    .map_err(|e| open_error(&target, e))?;
                (Backend::MySql(pool), target)
            }
            Driver::Postgres => {
                let url = source.target_url()?;
                let target = redact(url.as_str());
                let mut options =
                    PgConnectOptions::from_str(url.as_str()).map_err(|e| open_error(&target, e))?;
                if let Some(schema) = source.schema()? {
                    options = options.options([("search_path", schema)]);
                }
                let pool = PgPoolOptions::new()
                    .max_connections(settings.pool_max_size)
                    .acquire_timeout(settings.acquire_timeout())
                    .connect_with(options)
                    .await
                    .map_err(|e| open_error(&target, e))?;
                (Backend::Postgres(pool), target)
            }
            Driver::Sqlite => {
                let target = source.template().to_string();
                let pool = create_sqlite_pool(source.template(), settings).map_err(|e| {
                    DbError::Open {
                        target: target.clone(),
                        source: e.into(),
                    }
                })?;
                (Backend::Sqlite(pool), target)
            }
            Driver::Other(id) => {
                return Err(DbError::Config(format!("unsupported database driver: {id}")));
            }
        };

        tracing::info!(database = %target, "opened database connection pool");
        Ok(Self {
            backend,
            naming,
            display: target,
            released: false,
        })
    }

    /// The SQL dialect of the open connection.
    pub fn dialect(&self) -> Dialect {
        match self.backend {
            Backend::MySql(_) => Dialect::MySql,
            Backend::Postgres(_) => Dialect::Postgres,
            Backend::Sqlite(_) => Dialect::Sqlite,
        }
    }

    /// Physical table name of an entity.
    pub fn table_name(&self, entity: &EntityDescriptor) -> String {
        self.naming.table_name(entity.name)
    }

    /// Closes every pooled connection. The handle is consumed.
    pub async fn shutdown(mut self) {
        self.release().await;
    }

    async fn release(&mut self) {
        match &self.backend {
            Backend::MySql(pool) => pool.close().await,
            Backend::Postgres(pool) => pool.close().await,
            Backend::Sqlite(_) => {}
        }
        self.released = true;
        tracing::info!(database = %self.display, "closed database connection pool");
    }

    /// Inserts one entity.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Query` on encoding or SQL failure, including a
    /// primary-key conflict.
    pub async fn insert<E: Entity>(&self, entity: &E) -> Result<(), DbError> {
        let dialect = self.dialect();
        let descriptor = E::DESCRIPTOR;
        let values = encode(entity)?;

        let mut binder = crate::dialect::Binder::new(dialect);
        let columns: Vec<String> = descriptor
            .columns
            .iter()
            .map(|c| dialect.quote(&c.column_name()))
            .collect();
        let placeholders: Vec<String> = values.into_iter().map(|v| binder.bind(v)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            dialect.quote(&self.table_name(descriptor)),
            columns.join(", "),
            placeholders.join(", ")
        );

        self.execute(binder.finish(sql)).await?;
        Ok(())
    }

    /// Looks up one entity by its primary key, given in key-column order.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Query` if the key has the wrong arity or the query
    /// fails.
    pub async fn get<E: Entity>(&self, key: &[&str]) -> Result<Option<E>, DbError> {
        let dialect = self.dialect();
        let descriptor = E::DESCRIPTOR;
        let key_columns: Vec<&ColumnDef> = descriptor.key_columns().collect();
        if key_columns.len() != key.len() {
            return Err(QueryError::InvalidValue {
                field: descriptor.name.to_string(),
                reason: format!("expected {} key values, got {}", key_columns.len(), key.len()),
            }
            .into());
        }

        let mut binder = crate::dialect::Binder::new(dialect);
        let conditions: Vec<String> = key_columns
            .iter()
            .zip(key)
            .map(|(column, value)| {
                format!(
                    "{} = {}",
                    dialect.quote(&column.column_name()),
                    binder.bind(Value::from(*value))
                )
            })
            .collect();
        let sql = format!(
            "SELECT {} FROM {} WHERE {}",
            select_list(dialect, descriptor),
            dialect.quote(&self.table_name(descriptor)),
            conditions.join(" AND ")
        );

        let mut rows = self
            .fetch_rows(binder.finish(sql), descriptor.columns)
            .await?;
        match rows.pop() {
            Some(row) => Ok(Some(row.decode()?)),
            None => Ok(None),
        }
    }

    /// Executes a statement and returns the number of affected rows.
    pub(crate) async fn execute(&self, stmt: Statement) -> Result<u64, QueryError> {
        match &self.backend {
            Backend::MySql(pool) => Ok(bind_params(sqlx::query::<sqlx::MySql>(&stmt.sql), &stmt.params)
                .execute(pool)
                .await?
                .rows_affected()),
            Backend::Postgres(pool) => Ok(bind_params(
                sqlx::query::<sqlx::Postgres>(&stmt.sql),
                &stmt.params,
            )
            .execute(pool)
            .await?
            .rows_affected()),
            Backend::Sqlite(pool) => {
                let pool = pool.clone();
                tokio::task::spawn_blocking(move || -> Result<u64, QueryError> {
                    let conn = pool.get()?;
                    let affected =
                        conn.execute(&stmt.sql, rusqlite::params_from_iter(stmt.params.iter()))?;
                    Ok(affected as u64)
                })
                .await?
            }
        }
    }

    /// Fetches rows, decoding each selected column by its descriptor.
    ///
    /// The statement must select exactly `columns`, in order.
    pub(crate) async fn fetch_rows(
        &self,
        stmt: Statement,
        columns: &'static [ColumnDef],
    ) -> Result<Vec<Row>, QueryError> {
        match &self.backend {
            Backend::MySql(pool) => {
                let rows = bind_params(sqlx::query::<sqlx::MySql>(&stmt.sql), &stmt.params)
                    .fetch_all(pool)
                    .await?;
                Ok(rows
                    .iter()
                    .map(|row| decode_sqlx_row(row, columns))
                    .collect::<Result<_, _>>()?)
            }
            Backend::Postgres(pool) => {
                let rows = bind_params(sqlx::query::<sqlx::Postgres>(&stmt.sql), &stmt.params)
                    .fetch_all(pool)
                    .await?;
                Ok(rows
                    .iter()
                    .map(|row| decode_sqlx_row(row, columns))
                    .collect::<Result<_, _>>()?)
            }
            Backend::Sqlite(pool) => {
                let pool = pool.clone();
                tokio::task::spawn_blocking(move || -> Result<Vec<Row>, QueryError> {
                    let conn = pool.get()?;
                    let mut prepared = conn.prepare(&stmt.sql)?;
                    let rows = prepared.query_map(
                        rusqlite::params_from_iter(stmt.params.iter()),
                        |row| decode_sqlite_row(row, columns),
                    )?;
                    Ok(rows.collect::<Result<Vec<_>, _>>()?)
                })
                .await?
            }
        }
    }

    /// Fetches the first column of the first row as an integer.
    pub(crate) async fn fetch_count(&self, stmt: Statement) -> Result<i64, QueryError> {
        use sqlx::Row as _;

        match &self.backend {
            Backend::MySql(pool) => Ok(bind_params(sqlx::query::<sqlx::MySql>(&stmt.sql), &stmt.params)
                .fetch_one(pool)
                .await?
                .try_get::<i64, _>(0)?),
            Backend::Postgres(pool) => Ok(bind_params(
                sqlx::query::<sqlx::Postgres>(&stmt.sql),
                &stmt.params,
            )
            .fetch_one(pool)
            .await?
            .try_get::<i64, _>(0)?),
            Backend::Sqlite(pool) => {
                let pool = pool.clone();
                tokio::task::spawn_blocking(move || -> Result<i64, QueryError> {
                    let conn = pool.get()?;
                    let count = conn.query_row(
                        &stmt.sql,
                        rusqlite::params_from_iter(stmt.params.iter()),
                        |row| row.get::<_, i64>(0),
                    )?;
                    Ok(count)
                })
                .await?
            }
        }
    }

    /// Fetches the first column of every row as a string.
    pub(crate) async fn fetch_strings(&self, stmt: Statement) -> Result<Vec<String>, QueryError> {
        use sqlx::Row as _;

        match &self.backend {
            Backend::MySql(pool) => {
                let rows = bind_params(sqlx::query::<sqlx::MySql>(&stmt.sql), &stmt.params)
                    .fetch_all(pool)
                    .await?;
                Ok(rows
                    .iter()
                    .map(|row| row.try_get::<String, _>(0))
                    .collect::<Result<_, _>>()?)
            }
            Backend::Postgres(pool) => {
                let rows = bind_params(sqlx::query::<sqlx::Postgres>(&stmt.sql), &stmt.params)
                    .fetch_all(pool)
                    .await?;
                Ok(rows
                    .iter()
                    .map(|row| row.try_get::<String, _>(0))
                    .collect::<Result<_, _>>()?)
            }
            Backend::Sqlite(pool) => {
                let pool = pool.clone();
                tokio::task::spawn_blocking(move || -> Result<Vec<String>, QueryError> {
                    let conn = pool.get()?;
                    let mut prepared = conn.prepare(&stmt.sql)?;
                    let rows = prepared.query_map(
                        rusqlite::params_from_iter(stmt.params.iter()),
                        |row| row.get::<_, String>(0),
                    )?;
                    Ok(rows.collect::<Result<Vec<_>, _>>()?)
                })
                .await?
            }
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        tracing::warn!(
            database = %self.display,
            "database handle dropped without shutdown, closing connections in background"
        );
        match &self.backend {
            Backend::MySql(pool) => close_in_background(pool.clone()),
            Backend::Postgres(pool) => close_in_background(pool.clone()),
            Backend::Sqlite(_) => {}
        }
    }
}

/// Comma-separated, quoted column list of an entity, in descriptor order.
pub(crate) fn select_list(dialect: Dialect, entity: &EntityDescriptor) -> String {
    entity
        .columns
        .iter()
        .map(|c| dialect.quote(&c.column_name()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn open_error(display: &str, err: sqlx::Error) -> DbError {
    DbError::Open {
        target: display.to_string(),
        source: err.into(),
    }
}

fn close_in_background<DB: sqlx::Database>(pool: sqlx::Pool<DB>) {
    // Without a runtime the pool's connections are released when the last
    // handle drops.
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(async move { pool.close().await });
    }
}

type SqlxQuery<'q, DB> = sqlx::query::Query<'q, DB, <DB as sqlx::Database>::Arguments<'q>>;

fn bind_params<'q, DB>(mut query: SqlxQuery<'q, DB>, params: &'q [Value]) -> SqlxQuery<'q, DB>
where
    DB: sqlx::Database,
    i64: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    bool: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    &'q str: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
    Option<&'q str>: sqlx::Encode<'q, DB> + sqlx::Type<DB>,
{
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<&'q str>),
            Value::Int(i) => query.bind(*i),
            Value::Bool(b) => query.bind(*b),
            Value::Text(s) => query.bind(s.as_str()),
        };
    }
    query
}

fn decode_sqlx_row<R>(row: &R, columns: &'static [ColumnDef]) -> Result<Row, sqlx::Error>
where
    R: sqlx::Row,
    usize: sqlx::ColumnIndex<R>,
    for<'r> Option<String>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    for<'r> Option<i64>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
    for<'r> Option<bool>: sqlx::Decode<'r, R::Database> + sqlx::Type<R::Database>,
{
    let mut cells = Vec::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        let value = match column.kind {
            ColumnKind::Varchar(_) | ColumnKind::Text => {
                row.try_get::<Option<String>, _>(idx)?.map(Value::Text)
            }
            ColumnKind::BigInt => row.try_get::<Option<i64>, _>(idx)?.map(Value::Int),
            ColumnKind::Bool => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
        };
        cells.push((column.field, value.unwrap_or(Value::Null)));
    }
    Ok(Row::new(cells))
}

fn decode_sqlite_row(
    row: &rusqlite::Row<'_>,
    columns: &'static [ColumnDef],
) -> rusqlite::Result<Row> {
    let mut cells = Vec::with_capacity(columns.len());
    for (idx, column) in columns.iter().enumerate() {
        let value = match column.kind {
            ColumnKind::Varchar(_) | ColumnKind::Text => {
                row.get::<_, Option<String>>(idx)?.map(Value::Text)
            }
            ColumnKind::BigInt => row.get::<_, Option<i64>>(idx)?.map(Value::Int),
            ColumnKind::Bool => row.get::<_, Option<bool>>(idx)?.map(Value::Bool),
        };
        cells.push((column.field, value.unwrap_or(Value::Null)));
    }
    Ok(Row::new(cells))
}

impl rusqlite::ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Self::Int(i) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(*i)),
            Self::Bool(b) => ToSqlOutput::Owned(rusqlite::types::Value::Integer(i64::from(*b))),
            Self::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn lazy_postgres() -> (Database, PgPool) {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://vigil@127.0.0.1:1/vigil")
            .expect("lazy pool needs no server");
        let db = Database {
            backend: Backend::Postgres(pool.clone()),
            naming: TableNaming::default(),
            display: "postgres://vigil@127.0.0.1:1/vigil".to_string(),
            released: false,
        };
        (db, pool)
    }

    #[tokio::test]
    async fn release_closes_the_pool_and_marks_the_handle() {
        let (mut db, pool) = lazy_postgres();
        assert!(!db.released);

        db.release().await;
        assert!(db.released);
        assert!(pool.is_closed());
    }

    #[tokio::test]
    async fn release_marks_sqlite_handle() {
        let source = DataSource::new("sqlite", ":memory:", "vigil");
        let mut db = Database::open(&source, TableNaming::default(), DbRuntimeSettings::default())
            .await
            .expect("memory database should open");
        assert!(!db.released);
        db.release().await;
        assert!(db.released);
    }

    #[tokio::test]
    async fn dropped_handle_closes_server_pool_in_background() {
        let (db, pool) = lazy_postgres();
        drop(db);

        tokio::time::timeout(Duration::from_secs(5), async {
            while !pool.is_closed() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("pool should close after the handle is dropped");
    }

    #[test]
    fn dropping_outside_a_runtime_does_not_panic() {
        let runtime = tokio::runtime::Runtime::new().expect("runtime");
        let (db, pool) = runtime.block_on(async { lazy_postgres() });
        drop(runtime);

        drop(db);
        assert!(!pool.is_closed());
    }
}
