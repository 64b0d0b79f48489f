//! Database layer for Vigil.
//!
//! Covers the full startup path of the storage tier plus the request-time
//! query builder:
//!
//! 1. [`provision`] makes sure the configured database (and, on PostgreSQL,
//!    schema) exists, using short-lived bootstrap connections.
//! 2. [`Database::open`] opens the long-lived pool against that target.
//! 3. [`Database::sync_all`] creates missing tables and adds missing columns.
//! 4. [`Database::session`] turns untyped request parameters into a safe,
//!    parameterized query.
//!
//! # Design decisions
//!
//! - **sqlx for server engines, rusqlite for embedded**: MySQL and PostgreSQL
//!   are reached through async `sqlx` pools; SQLite keeps the `r2d2` pool with
//!   WAL initialization and runs on the blocking thread pool.
//! - **Descriptors instead of reflection**: each stored type declares its
//!   columns once in an [`EntityDescriptor`]. Schema sync and the query
//!   builder's field allow-list both read from it.
//! - **Bootstrap behind a trait**: [`AdminConnector`] lets provisioning be
//!   exercised against fakes without a live server.

mod admin;
mod database;
mod dialect;
mod entities;
mod entity;
mod error;
mod naming;
mod pool;
mod provision;
mod session;
mod source;
mod sync;

pub use admin::{ServerConnection, ServerConnector};
pub use database::Database;
pub use dialect::{Dialect, Statement};
pub use entities::ENTITIES;
pub use entity::{encode, ColumnDef, ColumnKind, Entity, EntityDescriptor, Row, Value};
pub use error::{AdminError, DbError, QueryError, PG_DUPLICATE_DATABASE, PG_DUPLICATE_SCHEMA};
pub use naming::{is_safe_field_name, snake_case, validate_identifier, TableNaming};
pub use pool::{create_sqlite_pool, DbRuntimeSettings, SqlitePool, SQLITE_MEMORY};
pub use provision::{provision, AdminConnection, AdminConnector, ProvisionStrategy};
pub use session::{
    Page, Predicate, QueryPlan, QuerySession, QuerySpec, SortDirection, ASCEND, NO_PAGINATION,
};
pub use source::{
    DataSource, Driver, MYSQL_ADMIN_DATABASE, POSTGRES_ADMIN_DATABASE, SEARCH_PATH_PARAM,
};
pub use sync::SyncReport;
