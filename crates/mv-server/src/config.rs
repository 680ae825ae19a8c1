//! Service configuration
//!
//! Loaded from a TOML file; every section and field is optional.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [storage]
//! reports_dir = "reports"
//! cache_ttl_secs = 60
//!
//! [execution]
//! check_timeout_secs = 30
//! stage_timeout_secs = 600
//! pipeline_timeout_secs = 1800
//! max_concurrent_checks = 8
//!
//! [target]
//! base_url = "http://localhost:9000/api/v2/"
//! manifest = "manifest.json"
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use mv_core::{ConfigError, Stage, StageKind, StageRegistry};
use mv_pipeline::{ExecutorConfig, RunnerConfig};
use mv_store::{LatestReportCache, ReportStore};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// HTTP listener
    pub server: ServerConfig,
    /// Report persistence
    pub storage: StorageConfig,
    /// Timeouts and concurrency
    pub execution: ExecutionConfig,
    /// V2 workspace under validation
    pub target: TargetConfig,
    /// Log output
    pub logging: LoggingConfig,
    /// Replaces the built-in stage registry when non-empty
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stages: Vec<Stage>,
}

/// HTTP listener
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address
    pub bind: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
        }
    }
}

/// Report persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Reports directory
    pub reports_dir: PathBuf,
    /// Expire cached latest reports; set when other processes write reports
    pub cache_ttl_secs: Option<u64>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            reports_dir: PathBuf::from(mv_store::DEFAULT_REPORTS_DIR),
            cache_ttl_secs: None,
        }
    }
}

impl StorageConfig {
    /// Report store for this configuration
    #[must_use]
    pub fn store(&self) -> ReportStore {
        let capacity = StageKind::ALL.len() as u64;
        let cache = match self.cache_ttl_secs {
            Some(ttl) => LatestReportCache::with_ttl(capacity, Duration::from_secs(ttl)),
            None => LatestReportCache::new(capacity),
        };
        ReportStore::with_cache(&self.reports_dir, cache)
    }
}

/// Timeouts and concurrency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Bound on a single item check
    pub check_timeout_secs: u64,
    /// Bound on one stage
    pub stage_timeout_secs: u64,
    /// Bound on a pipeline run; unbounded when absent
    pub pipeline_timeout_secs: Option<u64>,
    /// Checks in flight per stage
    pub max_concurrent_checks: usize,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            check_timeout_secs: 30,
            stage_timeout_secs: 600,
            pipeline_timeout_secs: None,
            max_concurrent_checks: 8,
        }
    }
}

impl ExecutionConfig {
    /// Executor limits
    #[must_use]
    pub fn executor(&self) -> ExecutorConfig {
        ExecutorConfig::default()
            .with_check_timeout(Duration::from_secs(self.check_timeout_secs))
            .with_max_concurrent_checks(self.max_concurrent_checks)
    }

    /// Runner limits
    #[must_use]
    pub fn runner(&self) -> RunnerConfig {
        RunnerConfig::default()
            .with_stage_timeout(Duration::from_secs(self.stage_timeout_secs))
            .with_pipeline_timeout(self.pipeline_timeout_secs.map(Duration::from_secs))
    }
}

/// V2 workspace under validation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// API base url
    pub base_url: String,
    /// Bearer token
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// Migration manifest path
    pub manifest: PathBuf,
    /// Per-request timeout
    pub request_timeout_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:9000/".to_string(),
            token: None,
            manifest: PathBuf::from("manifest.json"),
            request_timeout_secs: 30,
        }
    }
}

/// Log output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: String,
    /// Emit JSON lines
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ValidatorConfig {
    /// Load from a TOML file
    ///
    /// # Errors
    /// `ConfigError::Invalid` if the file is unreadable or malformed, or any
    /// stage override fails registry validation
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::Invalid(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    /// Parse from TOML text
    ///
    /// # Errors
    /// See [`load`](Self::load)
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    ///
    /// # Errors
    /// `ConfigError` describing the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.execution.check_timeout_secs == 0 || self.execution.stage_timeout_secs == 0 {
            return Err(ConfigError::Invalid("timeouts must be positive".into()));
        }
        if self.storage.cache_ttl_secs == Some(0) {
            return Err(ConfigError::Invalid("cache ttl must be positive".into()));
        }
        if self.execution.pipeline_timeout_secs == Some(0) {
            return Err(ConfigError::Invalid("pipeline timeout must be positive".into()));
        }
        if self.execution.max_concurrent_checks == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_checks must be at least 1".into(),
            ));
        }
        self.registry().map(|_| ())
    }

    /// Stage registry, the configured override or the built-in one
    ///
    /// # Errors
    /// Registry validation errors for an override
    pub fn registry(&self) -> Result<StageRegistry, ConfigError> {
        if self.stages.is_empty() {
            Ok(StageRegistry::default())
        } else {
            StageRegistry::new(self.stages.clone())
        }
    }

    /// Override the listen address
    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.server.bind = bind;
        self
    }

    /// Override the reports directory
    #[must_use]
    pub fn with_reports_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage.reports_dir = dir.into();
        self
    }

    /// Override the target token
    #[must_use]
    pub fn with_token(mut self, token: Option<String>) -> Self {
        if token.is_some() {
            self.target.token = token;
        }
        self
    }
}
