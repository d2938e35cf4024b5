//! Command handlers for the binary

use anyhow::{bail, Context};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};

use super::output::{print_statuses, print_success, OutputMode};
use crate::adapters::{BinanceKlineSource, PostgresStrategyStore};
use crate::config::AppConfig;
use crate::domain::StrategyId;
use crate::strategy::{StrategyRepository, StrategyStatusView, TaskSupervisor};

async fn connect(config: &AppConfig) -> anyhow::Result<PostgresStrategyStore> {
    PostgresStrategyStore::new(&config.database.url, config.database.max_connections)
        .await
        .context("connecting to database")
}

/// Resume stored active strategies, reconcile periodically, shut down on signal
pub async fn run_daemon(config: AppConfig) -> anyhow::Result<()> {
    let store = connect(&config).await?;
    store.migrate().await.context("running migrations")?;

    let market_data = BinanceKlineSource::new(&config.market_data)?;
    let supervisor = TaskSupervisor::new(
        Arc::new(store),
        Arc::new(market_data),
        config.engine.clone(),
    );

    let resumed = supervisor.resume_active().await?;
    info!("Engine running with {} strategies. Press Ctrl+C to stop.", resumed);

    let mut reconcile = tokio::time::interval(config.engine.reconcile_interval());
    // First tick completes immediately; resume_active just ran
    reconcile.tick().await;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
            _ = reconcile.tick() => {
                if let Err(e) = supervisor.reconcile().await {
                    warn!("Reconcile pass failed: {}", e);
                }
            }
        }
    }

    supervisor.shutdown().await;
    info!("Shutdown complete");
    Ok(())
}

pub async fn show_status(config: AppConfig, id: Option<i64>, json: bool) -> anyhow::Result<()> {
    let store = connect(&config).await?;

    let views: Vec<StrategyStatusView> = match id {
        Some(id) => {
            let id = StrategyId(id);
            match store.get_by_id(id).await? {
                Some(record) => vec![StrategyStatusView::new(record, false, None)],
                None => bail!("Strategy {} not found", id),
            }
        }
        None => store
            .list_all()
            .await?
            .into_iter()
            .map(|record| StrategyStatusView::new(record, false, None))
            .collect(),
    };

    print_statuses(&views, OutputMode::from_json_flag(json))
}

pub async fn set_active(config: AppConfig, id: i64, active: bool) -> anyhow::Result<()> {
    let store = connect(&config).await?;
    let id = StrategyId(id);

    if !store.set_active(id, active).await? {
        bail!("Strategy {} not found", id);
    }

    let verb = if active { "activated" } else { "deactivated" };
    print_success(&format!("Strategy {} {}", id, verb));
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
