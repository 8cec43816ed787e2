use std::path::PathBuf;

use axum::http::HeaderValue;
use thiserror::Error;

use crate::time::TimeSource;

/// Default listen port when none is configured.
pub const DEFAULT_PORT: u16 = 4004;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("DATABASE_URL is required")]
    MissingDatabaseUrl,

    #[error("unsupported DATABASE_URL scheme: {0}")]
    UnsupportedScheme(String),

    #[error("PORT must be a positive integer")]
    InvalidPort,

    #[error("CORS_ORIGIN is not a valid header value: {0:?}")]
    InvalidCorsOrigin(String),
}

/// Where expiry records live, resolved from the database URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    /// SQLite database file.
    Sqlite(PathBuf),
    /// Private in-memory SQLite database.
    SqliteInMemory,
    /// Process-local map; nothing survives a restart.
    Memory,
}

/// Process configuration, loaded once at startup.
///
/// The server binary fills this from flags and environment variables,
/// calls [`ServiceConfig::validate`], then hands it to storage
/// initialisation.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Storage connection string.
    ///
    /// Accepted forms:
    /// - `sqlite://PATH` / `sqlite:PATH` / `file:PATH`
    /// - `sqlite::memory:`
    /// - `memory:`
    /// - a bare filesystem path
    pub database_url: String,

    pub host: String,

    pub port: u16,

    /// Single allowed CORS origin. `None` allows any origin.
    pub cors_origin: Option<String>,

    pub time_source: TimeSource,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            cors_origin: None,
            time_source: TimeSource::System,
        }
    }
}

impl ServiceConfig {
    /// Check everything that must hold before the server starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort);
        }
        self.cors_header()?;
        self.storage_target().map(|_| ())
    }

    /// The configured origin as an `Access-Control-Allow-Origin` value.
    /// `None` means any origin.
    pub fn cors_header(&self) -> Result<Option<HeaderValue>, ConfigError> {
        self.cors_origin
            .as_deref()
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|_| ConfigError::InvalidCorsOrigin(origin.to_string()))
            })
            .transpose()
    }

    /// `host:port` for the TCP listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Resolve the database URL into a storage target.
    pub fn storage_target(&self) -> Result<StorageTarget, ConfigError> {
        let url = self.database_url.trim();
        if url.is_empty() {
            return Err(ConfigError::MissingDatabaseUrl);
        }

        if url == "memory:" {
            return Ok(StorageTarget::Memory);
        }
        if url == "sqlite::memory:" || url == "sqlite://:memory:" {
            return Ok(StorageTarget::SqliteInMemory);
        }

        let path = if let Some(rest) = url.strip_prefix("sqlite://") {
            rest
        } else if let Some(rest) = url.strip_prefix("sqlite:") {
            rest
        } else if let Some(rest) = url.strip_prefix("file:") {
            rest
        } else if let Some((scheme, _)) = url.split_once("://") {
            return Err(ConfigError::UnsupportedScheme(scheme.to_string()));
        } else {
            url
        };

        if path.is_empty() {
            return Err(ConfigError::MissingDatabaseUrl);
        }
        Ok(StorageTarget::Sqlite(PathBuf::from(path)))
    }

    /// Origin sent in `Access-Control-Allow-Origin`, `*` when unrestricted.
    pub fn cors_origin_label(&self) -> &str {
        self.cors_origin.as_deref().unwrap_or("*")
    }
}
