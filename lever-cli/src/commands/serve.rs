//! Lever serve command
//!
//! Opens storage, rebuilds strategy state from stored selections, then runs
//! the HTTP server and the periodic sweep until Ctrl-C.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use lever_core::{Coordinator, ExpiryIndex, RecordStore};
use lever_server::{LeverServer, ServerConfig};
use lever_store::{TursoDatabase, TursoExpiryIndex, TursoRecordStore};
use tracing::info;

use crate::config::{ConfigLoader, LeverConfig, StrategyName};

/// Arguments for the serve command
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Selection strategy
    #[arg(long, value_enum)]
    pub strategy: Option<StrategyName>,

    /// Exploration rate for epsilon-greedy
    #[arg(long)]
    pub epsilon: Option<f64>,

    /// Database file, or ":memory:"
    #[arg(long)]
    pub db: Option<PathBuf>,
}

impl ServeArgs {
    /// Flags win over every config file
    fn apply(&self, config: &mut LeverConfig) {
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(strategy) = self.strategy {
            config.bandit.strategy = strategy;
        }
        if let Some(epsilon) = self.epsilon {
            config.bandit.epsilon = epsilon;
        }
        if let Some(db) = &self.db {
            config.storage.path = db.clone();
        }
    }
}

/// Run the serve command
pub async fn run(args: ServeArgs, config_path: Option<&Path>) -> Result<()> {
    let mut config = ConfigLoader::load(config_path)?;
    args.apply(&mut config);

    let coordinator = Arc::new(build_coordinator(&config).await?);
    let report = coordinator
        .recover()
        .await
        .context("recovering state from storage")?;
    info!(
        replayed = report.replayed,
        reindexed = report.reindexed,
        "Strategy state restored"
    );

    let server_config = ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        request_timeout: Duration::from_secs(config.server.request_timeout_secs),
        sweep_period: Duration::from_secs(config.sweep.period_secs),
        sweep_max_age: Duration::from_secs(config.sweep.max_age_secs),
    };

    info!(
        "Starting lever server on {}:{}",
        server_config.host, server_config.port
    );
    LeverServer::new(server_config, coordinator).run().await?;
    Ok(())
}

/// Open storage and wire the coordinator described by `config`
pub async fn build_coordinator(config: &LeverConfig) -> Result<Coordinator> {
    let db = open_database(config).await?;
    let records: Arc<dyn RecordStore> = Arc::new(TursoRecordStore::new(db.clone()));
    let index: Arc<dyn ExpiryIndex> = Arc::new(TursoExpiryIndex::with_namespace(
        db,
        config.sweep.namespace.clone(),
    ));

    let kind = config.bandit.strategy_kind();
    let strategy = kind.build(config.bandit.features.len())?;
    info!(
        strategy = kind.as_str(),
        arms = config.bandit.features.len(),
        "Built strategy"
    );

    Ok(Coordinator::new(
        strategy,
        records,
        index,
        config.bandit.features.clone(),
    )?)
}

async fn open_database(config: &LeverConfig) -> Result<TursoDatabase> {
    let storage = &config.storage;

    if let Some(url) = &storage.url {
        info!(url = %url, "Connecting to remote database");
        let token = storage.auth_token.as_deref().unwrap_or_default();
        return Ok(TursoDatabase::new_remote(url, token).await?);
    }

    if storage.is_memory() {
        info!("Using in-memory database; selections will not survive restart");
        return Ok(TursoDatabase::new_memory().await?);
    }

    if let Some(parent) = storage.path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    info!(path = %storage.path.display(), "Opening database");
    Ok(TursoDatabase::new_local(&storage.path).await?)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    fn args() -> ServeArgs {
        ServeArgs {
            port: None,
            host: None,
            strategy: None,
            epsilon: None,
            db: None,
        }
    }

    #[test]
    fn test_flags_override_config() {
        let mut config = LeverConfig::default();
        let args = ServeArgs {
            port: Some(9999),
            strategy: Some(StrategyName::Thompson),
            db: Some(PathBuf::from(":memory:")),
            ..args()
        };

        args.apply(&mut config);

        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.bandit.strategy, StrategyName::Thompson);
        assert!(config.storage.is_memory());
    }

    #[tokio::test]
    async fn test_build_coordinator_over_file_database() {
        let dir = TempDir::new().unwrap();
        let mut config = LeverConfig::default();
        config.storage.path = dir.path().join("nested").join("lever.db");

        let coordinator = build_coordinator(&config).await.unwrap();
        let selection = coordinator.select().await.unwrap();

        assert!(config.storage.path.exists());
        assert_eq!(coordinator.features().len(), 3);
        assert!(selection.arm < 3);
    }

    #[tokio::test]
    async fn test_invalid_epsilon_is_rejected() {
        let mut config = LeverConfig::default();
        config.storage.path = PathBuf::from(":memory:");
        config.bandit.epsilon = 1.5;

        assert!(build_coordinator(&config).await.is_err());
    }
}
