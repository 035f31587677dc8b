/// Server configuration
use crate::error::{Result, ServerError};
use mobility_sync::SyncConfig;
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound on parallel ETag lookups during verification
const MAX_ETAG_CONCURRENCY: usize = 50;

/// Share of copied objects whose ETags are sampled
const ETAG_SAMPLE_RATIOS: RangeInclusive<f64> = 0.05..=0.10;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_server")]
    pub server: ServerSettings,

    #[serde(default = "default_storage")]
    pub storage: StorageSettings,

    #[serde(default = "default_sync")]
    pub sync: SyncSettings,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageSettings {
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Directory whose subdirectories act as buckets
    #[serde(default = "default_objects_root")]
    pub objects_root: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncSettings {
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,

    #[serde(default = "default_copy_concurrency")]
    pub copy_concurrency: usize,

    #[serde(default = "default_etag_sample_ratio")]
    pub etag_sample_ratio: f64,

    #[serde(default = "default_etag_sample_cap")]
    pub etag_sample_cap: usize,

    #[serde(default = "default_etag_concurrency")]
    pub etag_concurrency: usize,

    #[serde(default)]
    pub destination_bucket: Option<String>,

    #[serde(default = "default_destination_prefix_template")]
    pub destination_prefix_template: String,
}

impl ServerConfig {
    /// Load configuration from file and environment
    ///
    /// Reads `path` (or `config.toml` when present), then applies
    /// `MOBILITY_<SECTION>__<FIELD>` environment overrides, e.g.
    /// `MOBILITY_SYNC__DESTINATION_BUCKET`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = config::Config::builder();

        match path {
            Some(path) => {
                settings = settings.add_source(config::File::from(path.to_path_buf()));
            }
            None => {
                let config_path = PathBuf::from("config.toml");
                if config_path.exists() {
                    settings = settings.add_source(config::File::from(config_path));
                }
            }
        }

        // Field names contain underscores, so sections are split on `__`
        settings = settings.add_source(
            config::Environment::with_prefix("MOBILITY")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = settings
            .build()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        config
            .try_deserialize()
            .map_err(|e| ServerError::Config(e.to_string()))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.storage.database_url.is_empty() {
            return Err(ServerError::Config(
                "database URL is required (set MOBILITY_STORAGE__DATABASE_URL)".to_string(),
            ));
        }

        let sync = &self.sync;
        if sync.copy_concurrency == 0 {
            return Err(ServerError::Config(
                "copy_concurrency must be at least 1".to_string(),
            ));
        }

        if !(1..=MAX_ETAG_CONCURRENCY).contains(&sync.etag_concurrency) {
            return Err(ServerError::Config(format!(
                "etag_concurrency must be in 1..={MAX_ETAG_CONCURRENCY}, got {}",
                sync.etag_concurrency
            )));
        }

        if !ETAG_SAMPLE_RATIOS.contains(&sync.etag_sample_ratio) {
            return Err(ServerError::Config(format!(
                "etag_sample_ratio must be in [{}, {}], got {}",
                ETAG_SAMPLE_RATIOS.start(),
                ETAG_SAMPLE_RATIOS.end(),
                sync.etag_sample_ratio
            )));
        }

        if sync.destination_bucket.as_deref() == Some("") {
            return Err(ServerError::Config(
                "destination_bucket must not be empty when set".to_string(),
            ));
        }

        Ok(())
    }

    /// Engine settings derived from the `sync` section
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            progress_interval: Duration::from_secs(self.sync.progress_interval_secs),
            etag_sample_ratio: self.sync.etag_sample_ratio,
            etag_sample_cap: self.sync.etag_sample_cap,
            etag_concurrency: self.sync.etag_concurrency,
            destination_bucket: self.sync.destination_bucket.clone(),
            destination_prefix_template: self.sync.destination_prefix_template.clone(),
            ..SyncConfig::default()
        }
    }
}

// Default values
fn default_server() -> ServerSettings {
    ServerSettings {
        host: default_host(),
        port: default_port(),
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_storage() -> StorageSettings {
    StorageSettings {
        database_url: default_database_url(),
        objects_root: default_objects_root(),
    }
}

fn default_database_url() -> String {
    "sqlite://./data/mirror.db".to_string()
}

fn default_objects_root() -> PathBuf {
    PathBuf::from("./data/objects")
}

fn default_sync() -> SyncSettings {
    SyncSettings {
        progress_interval_secs: default_progress_interval_secs(),
        copy_concurrency: default_copy_concurrency(),
        etag_sample_ratio: default_etag_sample_ratio(),
        etag_sample_cap: default_etag_sample_cap(),
        etag_concurrency: default_etag_concurrency(),
        destination_bucket: None,
        destination_prefix_template: default_destination_prefix_template(),
    }
}

fn default_progress_interval_secs() -> u64 {
    5
}

fn default_copy_concurrency() -> usize {
    16
}

fn default_etag_sample_ratio() -> f64 {
    0.05
}

fn default_etag_sample_cap() -> usize {
    50
}

fn default_etag_concurrency() -> usize {
    50
}

fn default_destination_prefix_template() -> String {
    "jobs/{job_id}/".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            storage: default_storage(),
            sync: default_sync(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_engine_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.sync.copy_concurrency, 16);
        assert_eq!(config.sync_config(), SyncConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_impossible_values() {
        let mut config = ServerConfig::default();
        config.sync.etag_sample_ratio = 0.0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.sync.etag_sample_ratio = 0.5;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.sync.copy_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.sync.etag_concurrency = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.sync.etag_concurrency = 500;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.sync.destination_bucket = Some(String::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn accepts_sampling_bounds() {
        let mut config = ServerConfig::default();
        config.sync.etag_sample_ratio = 0.10;
        config.sync.etag_concurrency = 50;
        assert!(config.validate().is_ok());

        config.sync.etag_concurrency = 51;
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_partial_file_with_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[server]\nport = 9000\n\n[sync]\ndestination_bucket = \"archive\"\netag_sample_cap = 10"
        )
        .unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.sync.etag_sample_cap, 10);
        assert_eq!(config.sync.copy_concurrency, 16);

        let sync = config.sync_config();
        assert_eq!(sync.destination_bucket.as_deref(), Some("archive"));
        assert_eq!(sync.progress_interval, Duration::from_secs(5));
    }
}
