//! Command routing and execution

use anyhow::{bail, Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::{self, HttpStatusClient};
use crate::app::PayoutEngine;
use crate::cli::args::Commands;
use crate::cli::progress::ProgressObserver;
use crate::config::EngineConfig;
use crate::disbursement::{BatchPoller, DisbursementOrchestrator, PollOutcome, ResumeOutcome};
use crate::model::{BatchId, BatchStatus, CycleId};

/// Execute a CLI command with the loaded configuration
pub async fn execute_command(command: Commands, config: EngineConfig) -> Result<()> {
    match command {
        Commands::Serve { bind } => run_serve(config, bind).await,
        Commands::Watch { url, cycle, batch } => run_watch(config, &url, cycle, batch).await,
    }
}

async fn run_serve(mut config: EngineConfig, bind: Option<SocketAddr>) -> Result<()> {
    if let Some(bind) = bind {
        config.server.bind = bind.to_string();
    }
    let addr = config.bind_addr()?;
    let resume_interval = config.disbursement.resume_interval;

    let engine = PayoutEngine::from_config(config)
        .await
        .context("Failed to initialize the payout engine")?;
    let resumed = engine.disbursement().resume_incomplete_batches().await?;
    if !resumed.is_empty() {
        info!("Restarted {} batch worker(s)", resumed.len());
    }
    if !resume_interval.is_zero() {
        tokio::spawn(sweep_stalled_batches(
            engine.disbursement().clone(),
            resume_interval,
        ));
    }

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    api::serve(engine, listener, shutdown_signal()).await
}

/// Restart batches whose worker gave up, on a fixed interval
async fn sweep_stalled_batches(disbursement: Arc<DisbursementOrchestrator>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match disbursement.resume_incomplete_batches().await {
            Ok(handles) if !handles.is_empty() => {
                info!("Sweep restarted {} stalled batch(es)", handles.len())
            }
            Ok(_) => {}
            Err(e) => warn!("Stalled batch sweep failed: {}", e),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

async fn run_watch(
    config: EngineConfig,
    url: &str,
    cycle: Option<String>,
    batch: Option<String>,
) -> Result<()> {
    let client = HttpStatusClient::new(url, config.disbursement.provider_timeout)?;
    let poller = BatchPoller::new(Arc::new(client), config.poller.clone());
    let observer = ProgressObserver::new();

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(true);
        }
    });

    let outcome = match (cycle, batch) {
        (_, Some(batch)) => poller.poll(&BatchId::from(batch), &observer, stop_rx).await,
        (Some(cycle), None) => {
            let cycle = CycleId::from(cycle);
            match poller.resume(&cycle, &observer, stop_rx).await? {
                ResumeOutcome::NoActiveBatch => {
                    println!("Cycle {} has no disbursement batches", cycle);
                    return Ok(());
                }
                ResumeOutcome::AlreadyFinished(summary) => {
                    return finished(summary.status, &summary.batch_id);
                }
                ResumeOutcome::Resumed { outcome, .. } => outcome,
            }
        }
        (None, None) => bail!("either --cycle or --batch is required"),
    };

    match outcome {
        PollOutcome::Finished(view) => finished(view.status, &view.batch_id),
        PollOutcome::Stopped => {
            info!("Stopped watching; the batch keeps running on the server");
            Ok(())
        }
        PollOutcome::GaveUp {
            consecutive_errors,
            last_error,
        } => bail!(
            "gave up after {} failed status reads: {}",
            consecutive_errors,
            last_error
        ),
    }
}

fn finished(status: BatchStatus, batch_id: &BatchId) -> Result<()> {
    if status == BatchStatus::Failed {
        bail!("batch {} finished with failures", batch_id);
    }
    Ok(())
}
