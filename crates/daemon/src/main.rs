//! Coursework Generator - Main Entry Point
//! Composition root: config, logging, wiring, background tasks, shutdown.

mod config;
mod telemetry;

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use config::DaemonConfig;
use coursework_api_rpc::{RpcServer, RpcServerConfig};
use coursework_core::application::{
    shutdown_channel, JobIndex, JobQueue, PipelineConfig, PipelineExecutor, RetentionConfig,
    RetentionSweeper, WebhookDispatcher,
};
use coursework_core::domain::QueueConfig;
use coursework_core::port::id_provider::UuidProvider;
use coursework_core::port::time_provider::SystemTimeProvider;
use coursework_infra_sqlite::SqliteJobStore;
use coursework_infra_system::{
    AgentCommandConfig, HttpWebhookSender, MarkdownRenderer, SubprocessAgent,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const BACKGROUND_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let config = DaemonConfig::load()?;
    let telemetry = telemetry::init(&config)?;

    info!("Coursework generator v{} starting...", VERSION);

    // 2. Job store
    let db_path = config.db_path();
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    info!(db_path = %db_path.display(), "Opening job store...");
    let store = Arc::new(
        SqliteJobStore::initialize(&db_path.to_string_lossy())
            .await
            .map_err(|e| anyhow::anyhow!("Job store initialization failed: {}", e))?,
    );

    // 3. Dependencies
    let time_provider = Arc::new(SystemTimeProvider);
    let index = Arc::new(JobIndex::new(store.clone()));

    let agent = Arc::new(SubprocessAgent::new(AgentCommandConfig {
        command: config.agent_command.clone(),
        args: config.agent_args.clone(),
        env_allowlist: config.agent_env_allowlist.clone(),
        timeout: config.agent_timeout(),
    }));
    let renderer = Arc::new(MarkdownRenderer::new(config.output_dir()));
    let executor = Arc::new(PipelineExecutor::new(
        agent,
        renderer,
        PipelineConfig {
            quality_threshold: config.quality_threshold,
            ..Default::default()
        },
    ));

    let queue = Arc::new(JobQueue::new(
        index.clone(),
        executor,
        QueueConfig::new(config.max_concurrent_jobs),
        Arc::new(UuidProvider),
        time_provider.clone(),
    ));

    // 4. Background tasks (subscribe before recovery so no event is missed)
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let dispatcher = WebhookDispatcher::new(
        Arc::new(HttpWebhookSender::new(config.webhook_timeout())),
        time_provider.clone(),
    );
    let dispatcher_handle =
        tokio::spawn(dispatcher.run(queue.subscribe(), shutdown_rx.clone()));

    let sweeper = RetentionSweeper::new(
        index,
        time_provider,
        RetentionConfig {
            retention: config.retention(),
            interval: config.sweep_interval(),
        },
    );
    let sweeper_handle = tokio::spawn(sweeper.run(shutdown_rx));

    // 5. Crash recovery and startup admission
    let report = queue
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("Queue start failed: {}", e))?;
    info!(
        loaded = report.loaded,
        requeued = report.requeued,
        "Crash recovery completed"
    );

    // 6. JSON-RPC server
    let rpc_config = RpcServerConfig {
        host: config.rpc_host.clone(),
        port: config.rpc_port,
        rate_limit_burst: config.rate_limit_burst,
        rate_limit_per_sec: config.rate_limit_per_sec,
    };
    let (rpc_handle, rpc_addr) = RpcServer::new(rpc_config, queue.clone())
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(rpc_addr = %rpc_addr, "System ready. Press Ctrl+C to shutdown");

    // 7. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    // 8. Graceful shutdown
    shutdown_tx.shutdown();
    if let Err(e) = rpc_handle.stop() {
        error!(error = %e, "RPC server stop failed");
    }
    rpc_handle.stopped().await;

    let background = [
        ("webhook dispatcher", dispatcher_handle),
        ("retention sweeper", sweeper_handle),
    ];
    for (name, handle) in background {
        if tokio::time::timeout(BACKGROUND_STOP_TIMEOUT, handle).await.is_err() {
            error!(task = name, "Background task did not stop in time");
        }
    }

    store.close().await;
    info!("Shutdown complete.");
    telemetry.shutdown();

    Ok(())
}
