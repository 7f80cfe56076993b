use std::path::PathBuf;

use clap::ValueEnum;
use directories::ProjectDirs;
use lever_core::StrategyKind;
use lever_core::strategy::DEFAULT_EPSILON;
use serde::{Deserialize, Serialize};

/// Default host for the lever server
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default port for the lever server
pub const DEFAULT_PORT: u16 = 8080;
/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;
/// Default sweep period and max age
pub const DEFAULT_SWEEP_SECS: u64 = 60;
/// Longest accepted sweep max age (100 years)
pub const MAX_SWEEP_AGE_SECS: u64 = 100 * 365 * 24 * 60 * 60;
/// Storage path that selects an in-memory database
pub const MEMORY_PATH: &str = ":memory:";

/// Configuration as stored in TOML files (with optional fields for merging)
#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawLeverConfig {
    #[serde(default)]
    pub server: RawServerConfig,

    #[serde(default)]
    pub bandit: RawBanditConfig,

    #[serde(default)]
    pub sweep: RawSweepConfig,

    #[serde(default)]
    pub storage: RawStorageConfig,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub request_timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawBanditConfig {
    pub strategy: Option<StrategyName>,
    pub epsilon: Option<f64>,
    pub features: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawSweepConfig {
    pub period_secs: Option<u64>,
    pub max_age_secs: Option<u64>,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct RawStorageConfig {
    pub path: Option<PathBuf>,
    pub url: Option<String>,
    pub auth_token: Option<String>,
}

/// Final configuration with defaults applied
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LeverConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub bandit: BanditSection,

    #[serde(default)]
    pub sweep: SweepSection,

    #[serde(default)]
    pub storage: StorageSection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// Strategy names accepted in config files and on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StrategyName {
    #[default]
    EpsilonGreedy,
    Thompson,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditSection {
    pub strategy: StrategyName,
    pub epsilon: f64,
    /// One label per arm; the arm count is its length
    pub features: Vec<String>,
}

impl Default for BanditSection {
    fn default() -> Self {
        Self {
            strategy: StrategyName::default(),
            epsilon: DEFAULT_EPSILON,
            features: default_features(),
        }
    }
}

impl BanditSection {
    pub fn strategy_kind(&self) -> StrategyKind {
        match self.strategy {
            StrategyName::EpsilonGreedy => StrategyKind::EpsilonGreedy {
                epsilon: self.epsilon,
            },
            StrategyName::Thompson => StrategyKind::Thompson,
        }
    }
}

pub fn default_features() -> Vec<String> {
    ["red", "green", "blue"].map(String::from).to_vec()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepSection {
    pub period_secs: u64,
    pub max_age_secs: u64,
    pub namespace: String,
}

impl Default for SweepSection {
    fn default() -> Self {
        Self {
            period_secs: DEFAULT_SWEEP_SECS,
            max_age_secs: DEFAULT_SWEEP_SECS,
            namespace: lever_core::DEFAULT_NAMESPACE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSection {
    /// Local database file, or ":memory:"
    pub path: PathBuf,
    /// Remote Turso URL; takes precedence over `path`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            url: None,
            auth_token: None,
        }
    }
}

impl StorageSection {
    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }
}

/// Platform data directory database, or `lever.db` in the working directory
pub fn default_db_path() -> PathBuf {
    ProjectDirs::from("", "", "lever")
        .map(|dirs| dirs.data_dir().join("lever.db"))
        .unwrap_or_else(|| PathBuf::from("lever.db"))
}
