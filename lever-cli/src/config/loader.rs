use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;

use super::types::{
    BanditSection, DEFAULT_HOST, DEFAULT_PORT, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SWEEP_SECS,
    LeverConfig, MAX_SWEEP_AGE_SECS, RawBanditConfig, RawLeverConfig, RawServerConfig,
    RawStorageConfig, RawSweepConfig, ServerSection, StorageSection, SweepSection,
    default_db_path, default_features,
};

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load merged configuration (user, then project, then `explicit`)
    pub fn load(explicit: Option<&Path>) -> Result<LeverConfig> {
        let mut layers: Vec<PathBuf> = Vec::new();
        layers.extend(Self::user_config_path());
        layers.push(Self::project_config_path());

        if let Some(path) = explicit {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
            layers.push(path.to_path_buf());
        }

        Self::load_layers(&layers)
    }

    /// Merge every existing file in order, later files winning
    pub fn load_layers(paths: &[PathBuf]) -> Result<LeverConfig> {
        let mut raw = RawLeverConfig::default();

        for path in paths.iter().filter(|p| p.exists()) {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let layer: RawLeverConfig = toml::from_str(&contents)
                .with_context(|| format!("parsing {}", path.display()))?;
            tracing::debug!(path = %path.display(), "Loaded config layer");
            raw = Self::merge_raw(raw, layer);
        }

        Self::finalize(raw)
    }

    /// Get user config path (platform-specific)
    pub fn user_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "lever").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Get project config path
    /// Can be overridden with LEVER_PROJECT_CONFIG_DIR env var (useful for isolated e2e tests)
    pub fn project_config_path() -> PathBuf {
        if let Ok(dir) = std::env::var("LEVER_PROJECT_CONFIG_DIR") {
            PathBuf::from(dir).join("config.toml")
        } else {
            PathBuf::from(".lever/config.toml")
        }
    }

    /// Merge two raw configs (overlay values override base only if explicitly set)
    fn merge_raw(base: RawLeverConfig, overlay: RawLeverConfig) -> RawLeverConfig {
        RawLeverConfig {
            server: RawServerConfig {
                host: overlay.server.host.or(base.server.host),
                port: overlay.server.port.or(base.server.port),
                request_timeout_secs: overlay
                    .server
                    .request_timeout_secs
                    .or(base.server.request_timeout_secs),
            },
            bandit: RawBanditConfig {
                strategy: overlay.bandit.strategy.or(base.bandit.strategy),
                epsilon: overlay.bandit.epsilon.or(base.bandit.epsilon),
                features: overlay.bandit.features.or(base.bandit.features),
            },
            sweep: RawSweepConfig {
                period_secs: overlay.sweep.period_secs.or(base.sweep.period_secs),
                max_age_secs: overlay.sweep.max_age_secs.or(base.sweep.max_age_secs),
                namespace: overlay.sweep.namespace.or(base.sweep.namespace),
            },
            storage: RawStorageConfig {
                path: overlay.storage.path.or(base.storage.path),
                url: overlay.storage.url.or(base.storage.url),
                auth_token: overlay.storage.auth_token.or(base.storage.auth_token),
            },
        }
    }

    /// Convert raw config to final config with defaults applied
    fn finalize(raw: RawLeverConfig) -> Result<LeverConfig> {
        let config = LeverConfig {
            server: ServerSection {
                host: raw.server.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: raw.server.port.unwrap_or(DEFAULT_PORT),
                request_timeout_secs: raw
                    .server
                    .request_timeout_secs
                    .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
            },
            bandit: BanditSection {
                strategy: raw.bandit.strategy.unwrap_or_default(),
                epsilon: raw
                    .bandit
                    .epsilon
                    .unwrap_or(lever_core::strategy::DEFAULT_EPSILON),
                features: raw.bandit.features.unwrap_or_else(default_features),
            },
            sweep: SweepSection {
                period_secs: raw.sweep.period_secs.unwrap_or(DEFAULT_SWEEP_SECS),
                max_age_secs: raw.sweep.max_age_secs.unwrap_or(DEFAULT_SWEEP_SECS),
                namespace: raw
                    .sweep
                    .namespace
                    .unwrap_or_else(|| lever_core::DEFAULT_NAMESPACE.to_string()),
            },
            storage: StorageSection {
                path: raw.storage.path.unwrap_or_else(default_db_path),
                url: raw.storage.url,
                auth_token: raw.storage.auth_token,
            },
        };

        if config.bandit.features.is_empty() {
            bail!("bandit.features must name at least one arm");
        }
        if config.sweep.period_secs == 0 {
            bail!("sweep.period_secs must be positive");
        }
        if config.sweep.max_age_secs > MAX_SWEEP_AGE_SECS {
            bail!("sweep.max_age_secs must be at most {MAX_SWEEP_AGE_SECS}");
        }
        if config.server.request_timeout_secs == 0 {
            bail!("server.request_timeout_secs must be positive");
        }
        Ok(config)
    }
}
