//! Connection descriptors: driver identifiers and data-source templates.
//!
//! A [`DataSource`] holds the driver identifier, the raw connection template
//! and the configured database name exactly as they came from configuration.
//! Nothing is parsed until a provisioning strategy or [`crate::Database::open`]
//! asks for a concrete URL, so drivers that need no provisioning never touch
//! the template.

use std::fmt;

use url::Url;

use crate::error::DbError;
use crate::naming::validate_identifier;

/// Query parameter in a PostgreSQL template that names the target schema.
pub const SEARCH_PATH_PARAM: &str = "search_path";

/// Administrative database every MySQL server has.
pub const MYSQL_ADMIN_DATABASE: &str = "mysql";

/// Administrative database every PostgreSQL server has.
pub const POSTGRES_ADMIN_DATABASE: &str = "postgres";

/// Database engine family selected by the configured driver identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Driver {
    /// `mysql`
    MySql,
    /// `postgres` or `postgresql`
    Postgres,
    /// `sqlite` or `sqlite3`; the template is a file path or `:memory:`.
    Sqlite,
    /// Any other identifier. Provisioning is a no-op and opening fails.
    Other(String),
}

impl Driver {
    /// Parses a driver identifier. Matching is case-insensitive.
    pub fn parse(id: &str) -> Self {
        match id.trim().to_ascii_lowercase().as_str() {
            "mysql" => Self::MySql,
            "postgres" | "postgresql" => Self::Postgres,
            "sqlite" | "sqlite3" => Self::Sqlite,
            _ => Self::Other(id.to_string()),
        }
    }

    /// Returns the canonical identifier.
    pub fn as_str(&self) -> &str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
            Self::Other(id) => id,
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Driver, connection template and target database of the backing store.
#[derive(Clone, PartialEq, Eq)]
pub struct DataSource {
    driver: Driver,
    template: String,
    database: String,
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataSource")
            .field("driver", &self.driver)
            .field("template", &redact(&self.template))
            .field("database", &self.database)
            .finish()
    }
}

impl DataSource {
    /// Creates a descriptor from raw configuration values.
    pub fn new(driver: &str, template: &str, database: &str) -> Self {
        Self {
            driver: Driver::parse(driver),
            template: template.to_string(),
            database: database.to_string(),
        }
    }

    /// The engine family.
    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    /// The raw connection template.
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The configured database name.
    pub fn database(&self) -> &str {
        &self.database
    }

    /// The schema named by the template's `search_path` parameter.
    ///
    /// Only PostgreSQL templates carry a schema; every other driver returns
    /// `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Config` if the template is not a URL or the schema
    /// name is not a plain identifier.
    pub fn schema(&self) -> Result<Option<String>, DbError> {
        if self.driver != Driver::Postgres {
            return Ok(None);
        }
        let url = self.parse_template()?;
        let schema = url
            .query_pairs()
            .find(|(key, _)| key == SEARCH_PATH_PARAM)
            .map(|(_, value)| value.trim().to_string())
            .filter(|value| !value.is_empty());
        if let Some(schema) = &schema {
            validate_identifier("schema", schema)?;
        }
        Ok(schema)
    }

    /// URL of the engine's administrative database, used for bootstrap only.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Config` for non-server drivers or malformed templates.
    pub fn admin_url(&self) -> Result<Url, DbError> {
        let admin = match self.driver {
            Driver::MySql => MYSQL_ADMIN_DATABASE,
            Driver::Postgres => POSTGRES_ADMIN_DATABASE,
            _ => return Err(self.not_a_server()),
        };
        self.url_for(admin)
    }

    /// URL of the configured database.
    ///
    /// The `search_path` parameter is stripped; callers apply the schema
    /// through connection options instead.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Config` for non-server drivers, malformed templates
    /// or an invalid database name.
    pub fn target_url(&self) -> Result<Url, DbError> {
        validate_identifier("database", &self.database)?;
        self.url_for(&self.database)
    }

    /// The template with any password masked, suitable for logs.
    pub fn redacted(&self) -> String {
        redact(&self.template)
    }

    fn url_for(&self, database: &str) -> Result<Url, DbError> {
        if !matches!(self.driver, Driver::MySql | Driver::Postgres) {
            return Err(self.not_a_server());
        }
        let mut url = self.parse_template()?;
        url.set_path(&format!("/{database}"));

        let retained: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| key != SEARCH_PATH_PARAM)
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        url.set_query(None);
        if !retained.is_empty() {
            url.query_pairs_mut().extend_pairs(retained);
        }
        Ok(url)
    }

    fn parse_template(&self) -> Result<Url, DbError> {
        let url = Url::parse(&self.template).map_err(|e| {
            DbError::Config(format!(
                "{} data source is not a valid URL ({}): {e}",
                self.driver,
                self.redacted()
            ))
        })?;

        let scheme_matches = match self.driver {
            Driver::MySql => url.scheme() == "mysql",
            Driver::Postgres => matches!(url.scheme(), "postgres" | "postgresql"),
            _ => false,
        };
        if !scheme_matches {
            return Err(DbError::Config(format!(
                "data source scheme {:?} does not match driver {}",
                url.scheme(),
                self.driver
            )));
        }
        Ok(url)
    }

    fn not_a_server(&self) -> DbError {
        DbError::Config(format!("driver {} has no server URL", self.driver))
    }
}

/// Masks the password of a URL-shaped connection string.
pub(crate) fn redact(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) if url.password().is_some() => {
            // set_password only fails for cannot-be-a-base URLs, which have no password.
            let _ = url.set_password(Some("****"));
            url.to_string()
        }
        _ => raw.to_string(),
    }
}
