//! Binary entry point.
//!
//! Bootstrap sequence mirrors `ferroid-tonic-server::main`: allocator, env
//! file, CLI/env config, telemetry, then construct the service graph and
//! serve until a signal arrives, draining in-flight work before exit.

mod config;
mod dispatch;
mod gallery;
mod http;
mod llm;
mod pipeline;
mod pool;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use imagegate_core::BatchManager;
use mimalloc::MiMalloc;
use tokio::signal;

use crate::config::{CliArgs, ServerConfig};
use crate::dispatch::MailboxRegistry;
use crate::gallery::GalleryStore;
use crate::llm::LlmClient;
use crate::pipeline::SyntheticPipeline;
use crate::pool::WorkerPool;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

const BATCH_SWEEP_INTERVAL: Duration = Duration::from_millis(100);
const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Missing .env is fine; real deployments configure via the environment
    // or CLI flags directly.
    let _ = dotenvy::dotenv();

    let config: ServerConfig = CliArgs::parse().try_into()?;
    let _telemetry_guard = telemetry::init(&config.log_level, config.log_file.as_deref())?;

    tracing::info!(
        num_workers = config.num_workers,
        server_addr = %config.server_addr,
        model_path = %config.model_path.display(),
        "starting imagegate-server"
    );

    let pipeline = Arc::new(SyntheticPipeline::new(config.model_path.display().to_string()));
    let mailbox = MailboxRegistry::new();
    let gallery = Arc::new(GalleryStore::open(&config.gallery_dir).await?);
    let llm = LlmClient::new(config.llm_base_url.clone(), config.llm_api_key.clone());
    if !llm.is_configured() {
        tracing::info!("LLM_BASE_URL not set; prompt optimize/translate will pass text through unchanged");
    }

    let batch_manager = BatchManager::new(
        config.max_total_pixels,
        config.max_batch_size,
        config.batch_timeout,
        config.enable_prompt_batching,
    );
    // Single-GPU deployment is the only target spec.md §6 configures; a
    // multi-GPU `WorkerConfig::gpu_index` assignment is threaded through
    // the pool for a future real pipeline, not driven by config today.
    let gpu_count = 1;
    let pool = WorkerPool::spawn(
        config.num_workers,
        gpu_count,
        crate::pool::DEFAULT_STARTUP_STAGGER,
        pipeline,
        mailbox.clone(),
        batch_manager,
        config.shutdown_timeout,
    );

    let sweep_pool = pool.clone();
    let sweep_token = pool.shutdown_token();
    let sweep_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(BATCH_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => sweep_pool.sweep_timeouts().await,
                _ = sweep_token.cancelled() => break,
            }
        }
    });

    // Prints the ready banner exactly once, when every worker has reported
    // ready, and flips the pool's `is_ready` flag. Workers no longer toggle
    // readiness per batch, so this is the sole writer of `is_ready`.
    let readiness_pool = pool.clone();
    let readiness_token = pool.shutdown_token();
    let readiness_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(READINESS_POLL_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if readiness_pool.mark_ready_if_all_workers_are_up() {
                        tracing::info!(num_workers = readiness_pool.num_workers(), "all workers ready");
                        break;
                    }
                }
                _ = readiness_token.cancelled() => break,
            }
        }
    });

    let state = http::AppState {
        pool: pool.clone(),
        mailbox,
        gallery,
        llm,
        model_path: config.model_path.display().to_string(),
        max_total_pixels: config.max_total_pixels,
    };
    let app = http::router(state);

    let listener = tokio::net::TcpListener::bind(config.server_addr).await?;
    tracing::info!(addr = %config.server_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP listener stopped, draining worker pool");
    pool.shutdown().await;
    sweep_task.abort();
    readiness_task.abort();

    Ok(())
}

/// Waits for Ctrl+C or, on Unix, SIGTERM. Mirrors
/// `ferroid-tonic-server::main::shutdown_signal`.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C"),
        _ = terminate => tracing::info!("received SIGTERM"),
    }
}
