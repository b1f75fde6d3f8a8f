use crate::pipeline::PipelineConfig;
use crate::session::SessionConfig;
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Process configuration.
///
/// Layered as built-in defaults, then an optional TOML file, then
/// `TICKFLOW__*` environment variables (`TICKFLOW__SESSION__OPEN=09:00`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Width of the base candles in seconds
    pub granularity_secs: u64,
    pub flush_interval_ms: u64,
    pub max_concurrent_flushes: usize,
    pub max_clock_skew_secs: u64,
    pub redis_url: String,
    /// Strategy/watchlist store; without it strategies must come from elsewhere
    pub database_url: Option<String>,
    /// Used when `RUST_LOG` is unset
    pub log_filter: String,
    pub session: SessionConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            granularity_secs: 60,
            flush_interval_ms: 1000,
            max_concurrent_flushes: 4,
            max_clock_skew_secs: 5,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            database_url: None,
            log_filter: "tickflow=info".to_string(),
            session: SessionConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path` (TOML, optional) and the process environment
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_from(path, None)
    }

    fn load_from(
        path: &Path,
        env: Option<config::Map<String, String>>,
    ) -> Result<Self, ConfigError> {
        let path = path.to_string_lossy();
        let config: AppConfig = Config::builder()
            .add_source(File::new(&path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix("TICKFLOW")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.granularity_secs == 0 {
            return Err(ConfigError::Message("granularity_secs must be positive".to_string()));
        }
        if self.flush_interval_ms == 0 {
            return Err(ConfigError::Message("flush_interval_ms must be positive".to_string()));
        }
        Ok(())
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            granularity: chrono::Duration::seconds(self.granularity_secs as i64),
            max_clock_skew: chrono::Duration::seconds(self.max_clock_skew_secs as i64),
            max_concurrent_flushes: self.max_concurrent_flushes.max(1),
        }
    }

    pub fn flush_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.flush_interval_ms)
    }
}
