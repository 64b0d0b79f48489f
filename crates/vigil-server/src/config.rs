//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;
use vigil_db::{DataSource, DbRuntimeSettings};

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Driver identifier: `mysql`, `postgres`, `sqlite`.
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Connection template. A URL for server engines (the path is replaced by
    /// `db_name`), a file path or `:memory:` for SQLite.
    ///
    /// Only URL-shaped templates are accepted for server engines, e.g.
    /// `mysql://user:pw@host:3306/` or
    /// `postgres://user:pw@host:5432/?search_path=audit`. libpq keyword
    /// strings (`host=... dbname=...`) and `user:pw@tcp(host:3306)/` DSNs are
    /// rejected at startup as configuration errors.
    #[serde(default = "default_data_source")]
    pub data_source: String,

    /// Name of the database to provision and use.
    #[serde(default = "default_db_name")]
    pub db_name: String,

    /// Prefix prepended to every table name.
    #[serde(default)]
    pub table_prefix: String,

    /// Maximum number of pooled connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "vigil_db=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    19000
}

fn default_driver() -> String {
    "sqlite".to_string()
}

fn default_data_source() -> String {
    "vigil.db".to_string()
}

fn default_db_name() -> String {
    "vigil".to_string()
}

fn default_pool_max_size() -> u32 {
    DbRuntimeSettings::default().pool_max_size
}

fn default_busy_timeout_ms() -> u64 {
    DbRuntimeSettings::default().busy_timeout_ms
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: default_driver(),
            data_source: default_data_source(),
            db_name: default_db_name(),
            table_prefix: String::new(),
            pool_max_size: default_pool_max_size(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// The data source usually embeds credentials.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("driver", &self.driver)
            .field("data_source", &self.data_source().redacted())
            .field("db_name", &self.db_name)
            .field("table_prefix", &self.table_prefix)
            .field("pool_max_size", &self.pool_max_size)
            .field("busy_timeout_ms", &self.busy_timeout_ms)
            .finish()
    }
}

impl DatabaseConfig {
    /// The connection descriptor for this configuration.
    pub fn data_source(&self) -> DataSource {
        DataSource::new(&self.driver, &self.data_source, &self.db_name)
    }

    /// Pool tunables for this configuration.
    pub fn runtime_settings(&self) -> DbRuntimeSettings {
        DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
            ..DbRuntimeSettings::default()
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `VIGIL_HOST` overrides `server.host`
/// - `VIGIL_PORT` overrides `server.port`
/// - `VIGIL_DB_DRIVER` overrides `database.driver`
/// - `VIGIL_DATA_SOURCE` overrides `database.data_source`
/// - `VIGIL_DB_NAME` overrides `database.db_name`
/// - `VIGIL_TABLE_PREFIX` overrides `database.table_prefix`
/// - `VIGIL_LOG_LEVEL` overrides `logging.level`
/// - `VIGIL_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

/// Applies `VIGIL_*` overrides looked up through `var`.
///
/// Unparseable host and port values are ignored.
pub fn apply_overrides<F>(config: &mut Config, var: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(host) = var("VIGIL_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("VIGIL_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(driver) = var("VIGIL_DB_DRIVER") {
        config.database.driver = driver;
    }
    if let Some(data_source) = var("VIGIL_DATA_SOURCE") {
        config.database.data_source = data_source;
    }
    if let Some(db_name) = var("VIGIL_DB_NAME") {
        config.database.db_name = db_name;
    }
    if let Some(prefix) = var("VIGIL_TABLE_PREFIX") {
        config.database.table_prefix = prefix;
    }
    if let Some(level) = var("VIGIL_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("VIGIL_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
