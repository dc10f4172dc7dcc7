//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::db::DbConfig;
use crate::load::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
use crate::notify::DEFAULT_WEBHOOK_TIMEOUT_SECS;
use crate::watermark::CursorKind;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default location of the source movie file.
pub const DEFAULT_SOURCE_PATH: &str = "data/imdb_movies_final.csv";

/// Default root for staging artifacts.
pub const DEFAULT_STAGING_DIR: &str = "data";

/// Default pipeline name, also the single-flight lock key.
pub const DEFAULT_PIPELINE_NAME: &str = "movies_etl_pipeline";

/// Default operator address for alerts.
pub const DEFAULT_ALERT_RECIPIENT: &str = "admin@example.com";

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EtlConfig {
    pub source_path: PathBuf,
    /// Root of `raw/` and `processed/`; `None` disables staging artifacts
    pub staging_dir: Option<PathBuf>,
    pub cursor: CursorKind,
    pub pipeline_name: String,
    pub insert_chunk_size: usize,
    pub alerts: AlertConfig,
    #[serde(skip)]
    pub database: DbConfig,
}

/// Alert delivery configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    pub recipient: String,
    pub webhook_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            recipient: DEFAULT_ALERT_RECIPIENT.to_string(),
            webhook_url: None,
            timeout_secs: DEFAULT_WEBHOOK_TIMEOUT_SECS,
        }
    }
}

impl EtlConfig {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_env()?;
        config.validate()?;

        Ok(config)
    }

    /// Read environment variables only, without validation
    pub fn from_env() -> anyhow::Result<Self> {
        let cursor = match std::env::var("ETL_CURSOR") {
            Ok(value) => value.parse::<CursorKind>().map_err(anyhow::Error::msg)?,
            Err(_) => CursorKind::default(),
        };

        let staging_dir = match std::env::var("ETL_STAGING_DIR") {
            Ok(dir) if dir.trim().is_empty() => None,
            Ok(dir) => Some(PathBuf::from(dir)),
            Err(_) => Some(PathBuf::from(DEFAULT_STAGING_DIR)),
        };

        Ok(Self {
            source_path: std::env::var("ETL_SOURCE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(DEFAULT_SOURCE_PATH)),
            staging_dir,
            cursor,
            pipeline_name: std::env::var("ETL_PIPELINE_NAME")
                .unwrap_or_else(|_| DEFAULT_PIPELINE_NAME.to_string()),
            insert_chunk_size: std::env::var("ETL_INSERT_CHUNK_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CHUNK_SIZE),
            alerts: AlertConfig {
                recipient: std::env::var("ETL_ALERT_RECIPIENT")
                    .unwrap_or_else(|_| DEFAULT_ALERT_RECIPIENT.to_string()),
                webhook_url: std::env::var("ETL_ALERT_WEBHOOK_URL").ok(),
                timeout_secs: std::env::var("ETL_ALERT_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_WEBHOOK_TIMEOUT_SECS),
            },
            database: DbConfig::from_env(),
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.source_path.as_os_str().is_empty() {
            anyhow::bail!("Source path cannot be empty");
        }

        if self.pipeline_name.trim().is_empty() {
            anyhow::bail!("Pipeline name cannot be empty");
        }

        if self.insert_chunk_size == 0 || self.insert_chunk_size > MAX_CHUNK_SIZE {
            anyhow::bail!(
                "Insert chunk size must be between 1 and {} (got {})",
                MAX_CHUNK_SIZE,
                self.insert_chunk_size
            );
        }

        if self.alerts.recipient.trim().is_empty() {
            anyhow::bail!("Alert recipient cannot be empty");
        }

        if let Some(url) = &self.alerts.webhook_url {
            if !url.is_empty() && !(url.starts_with("http://") || url.starts_with("https://")) {
                anyhow::bail!("Alert webhook URL must be http(s): {}", url);
            }
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.staging_dir.is_none() {
            tracing::warn!("No staging directory configured - staging artifacts are disabled");
        }

        Ok(())
    }
}

impl Default for EtlConfig {
    fn default() -> Self {
        Self {
            source_path: PathBuf::from(DEFAULT_SOURCE_PATH),
            staging_dir: Some(PathBuf::from(DEFAULT_STAGING_DIR)),
            cursor: CursorKind::default(),
            pipeline_name: DEFAULT_PIPELINE_NAME.to_string(),
            insert_chunk_size: DEFAULT_CHUNK_SIZE,
            alerts: AlertConfig::default(),
            database: DbConfig::default(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: &[&str] = &[
        "ETL_SOURCE_PATH",
        "ETL_STAGING_DIR",
        "ETL_CURSOR",
        "ETL_PIPELINE_NAME",
        "ETL_INSERT_CHUNK_SIZE",
        "ETL_ALERT_RECIPIENT",
        "ETL_ALERT_WEBHOOK_URL",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = EtlConfig::default();
        assert_eq!(config.cursor, CursorKind::PublishedDate);
        assert_eq!(config.pipeline_name, "movies_etl_pipeline");
        assert_eq!(config.alerts.recipient, "admin@example.com");
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        clear_env();
        std::env::set_var("ETL_SOURCE_PATH", "/srv/movies.csv");
        std::env::set_var("ETL_CURSOR", "year");
        std::env::set_var("ETL_STAGING_DIR", "");
        std::env::set_var("ETL_INSERT_CHUNK_SIZE", "250");

        let config = EtlConfig::from_env().unwrap();
        assert_eq!(config.source_path, PathBuf::from("/srv/movies.csv"));
        assert_eq!(config.cursor, CursorKind::Year);
        assert_eq!(config.staging_dir, None);
        assert_eq!(config.insert_chunk_size, 250);
        assert_eq!(config.alerts.webhook_url, None);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_unknown_cursor_is_rejected() {
        clear_env();
        std::env::set_var("ETL_CURSOR", "rating");
        assert!(EtlConfig::from_env().is_err());
        clear_env();
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = EtlConfig {
            insert_chunk_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let mut config = EtlConfig::default();
        config.alerts.webhook_url = Some("ftp://hooks".to_string());
        assert!(config.validate().is_err());

        let mut config = EtlConfig::default();
        config.database.min_connections = config.database.max_connections + 1;
        assert!(config.validate().is_err());
    }
}
