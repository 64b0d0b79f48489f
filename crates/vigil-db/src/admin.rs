//! sqlx-backed bootstrap connections for MySQL and PostgreSQL.

use sqlx::{Connection, Executor, MySqlConnection, PgConnection};
use url::Url;

use crate::dialect::Dialect;
use crate::error::AdminError;
use crate::provision::{AdminConnection, AdminConnector};

/// Opens single, unpooled server connections for provisioning.
#[derive(Debug, Clone, Copy, Default)]
pub struct ServerConnector;

/// A bootstrap connection to a MySQL or PostgreSQL server.
pub enum ServerConnection {
    /// MySQL connection.
    MySql(MySqlConnection),
    /// PostgreSQL connection.
    Postgres(PgConnection),
}

impl AdminConnector for ServerConnector {
    type Connection = ServerConnection;

    async fn connect(&self, dialect: Dialect, url: &Url) -> Result<ServerConnection, AdminError> {
        match dialect {
            Dialect::MySql => Ok(ServerConnection::MySql(
                MySqlConnection::connect(url.as_str()).await?,
            )),
            Dialect::Postgres => Ok(ServerConnection::Postgres(
                PgConnection::connect(url.as_str()).await?,
            )),
            Dialect::Sqlite => Err(AdminError::Driver(sqlx::Error::Configuration(
                "sqlite has no bootstrap connection".into(),
            ))),
        }
    }
}

impl AdminConnection for ServerConnection {
    async fn execute(&mut self, sql: &str) -> Result<(), AdminError> {
        match self {
            Self::MySql(conn) => {
                conn.execute(sql).await?;
            }
            Self::Postgres(conn) => {
                conn.execute(sql).await?;
            }
        }
        Ok(())
    }

    async fn database_exists(&mut self, name: &str) -> Result<bool, AdminError> {
        let found = match self {
            Self::MySql(conn) => {
                sqlx::query("SELECT 1 FROM information_schema.schemata WHERE schema_name = ?")
                    .bind(name)
                    .fetch_optional(&mut *conn)
                    .await?
                    .is_some()
            }
            Self::Postgres(conn) => sqlx::query("SELECT 1 FROM pg_database WHERE datname = $1")
                .bind(name)
                .fetch_optional(&mut *conn)
                .await?
                .is_some(),
        };
        Ok(found)
    }

    async fn close(self) {
        let result = match self {
            Self::MySql(conn) => conn.close().await,
            Self::Postgres(conn) => conn.close().await,
        };
        if let Err(e) = result {
            tracing::warn!("failed to close bootstrap connection cleanly: {}", e);
        }
    }
}
