//! Helmet Guard - crash detection for IMU-equipped helmets
//!
//! # Usage
//!
//! ```bash
//! # Synthetic ride with a crash 20 s in, 5x real time
//! helmet-guard --synthetic-crash-at 20 --speed 5
//!
//! # Live samples from a helmet bridge (JSON lines)
//! imu-bridge | helmet-guard --stdin
//!
//! # Replay a recorded ride
//! helmet-guard --replay ride.jsonl --speed 10
//! ```
//!
//! When samples are not read from stdin, type `cancel` or `confirm` (plus
//! an optional alert id) on stdin to answer an alert.
//!
//! # Environment Variables
//!
//! - `HELMET_GUARD_CONFIG`: Path to TOML config (default: ./helmet_guard.toml)
//! - `RUST_LOG`: Logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::RwLock;
use tokio::task::JoinSet;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use helmet_guard::alerts::{AlertController, PhaseKind};
use helmet_guard::config::{self, HelmetConfig};
use helmet_guard::connectivity::ConnectivityMonitor;
use helmet_guard::notify::{ContactBook, LogNotifier};
use helmet_guard::pipeline::processing_loop::ProcessingLoop;
use helmet_guard::pipeline::rider::run_rider_input;
use helmet_guard::pipeline::source::{JsonLinesSource, ReplaySource, SampleSource};
use helmet_guard::pipeline::synthetic::SyntheticRide;
use helmet_guard::pipeline::watchdog::run_connectivity_watchdog;
use helmet_guard::pipeline::{AppState, PipelineCoordinator};
use helmet_guard::storage::open_store;

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "helmet-guard")]
#[command(about = "Real-time crash detection and alert escalation for rider helmets")]
#[command(version)]
struct CliArgs {
    /// Read samples from stdin (one JSON sample per line)
    #[arg(long, conflicts_with = "replay")]
    stdin: bool,

    /// Replay a JSON-lines sample file
    #[arg(long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Replay speed multiplier (1 = real time, 0 = no delay)
    #[arg(long, default_value = "1")]
    speed: f64,

    /// Synthetic ride: inject a crash this many seconds in
    #[arg(long, value_name = "SECS")]
    synthetic_crash_at: Option<f64>,

    /// Synthetic ride length in seconds
    #[arg(long, default_value = "60")]
    synthetic_duration: f64,

    /// Write the default configuration to PATH and exit
    #[arg(long, value_name = "PATH")]
    write_default_config: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
enum TaskName {
    SampleProcessor,
    ConnectivityWatchdog,
    RiderInput,
}

impl std::fmt::Display for TaskName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskName::SampleProcessor => write!(f, "SampleProcessor"),
            TaskName::ConnectivityWatchdog => write!(f, "ConnectivityWatchdog"),
            TaskName::RiderInput => write!(f, "RiderInput"),
        }
    }
}

// ============================================================================
// Supervisor
// ============================================================================

async fn run_supervisor(
    task_set: &mut JoinSet<Result<TaskName>>,
    cancel_token: CancellationToken,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                info!("🛑 Shutdown requested, stopping tasks");
                break;
            }
            result = task_set.join_next() => {
                match result {
                    Some(Ok(Ok(task_name))) => {
                        info!(task = %task_name, "Task finished");
                    }
                    Some(Ok(Err(e))) => {
                        error!(error = %e, "Task failed, shutting down");
                        cancel_token.cancel();
                        return Err(e);
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "Task panicked, shutting down");
                        cancel_token.cancel();
                        return Err(anyhow::anyhow!("task panicked: {e}"));
                    }
                    None => break,
                }
            }
        }
    }

    // Let remaining tasks observe the cancellation
    while task_set.join_next().await.is_some() {}
    Ok(())
}

/// After the source is exhausted, keep timers running until any open alert
/// has resolved and the lock reopened.
async fn drain_alerts(controller: &AlertController, cancel_token: &CancellationToken) {
    loop {
        if controller.snapshot().phase == PhaseKind::Idle {
            return;
        }
        tokio::select! {
            _ = cancel_token.cancelled() => return,
            _ = sleep(Duration::from_millis(200)) => {}
        }
    }
}

// ============================================================================
// Pipeline Runner
// ============================================================================

async fn run_pipeline<S: SampleSource>(
    mut source: S,
    cfg: &HelmetConfig,
    rider_input: bool,
    cancel_token: CancellationToken,
) -> Result<()> {
    let store = open_store(&cfg.storage).context("Failed to open alert store")?;
    let controller = AlertController::new(
        &cfg.alert,
        store,
        Arc::new(LogNotifier),
        ContactBook::new(&cfg.contacts),
    );
    if let Some(last) = controller.latest_stored_alert().await {
        info!(
            alert_id = last.id,
            status = %last.status,
            created = %last.created_at,
            "Most recent stored alert"
        );
    }

    let app_state = Arc::new(RwLock::new(AppState::new(ConnectivityMonitor::new(
        &cfg.connectivity,
    ))));
    let coordinator = PipelineCoordinator::new(cfg, controller.clone());

    let mut task_set: JoinSet<Result<TaskName>> = JoinSet::new();

    // Task 1: Sample processor
    let proc_state = Arc::clone(&app_state);
    let proc_cancel = cancel_token.clone();
    let proc_controller = controller.clone();
    task_set.spawn(async move {
        info!("[SampleProcessor] Task starting");
        let processing_loop = ProcessingLoop::new(coordinator, proc_state, proc_cancel.clone());
        let stats = processing_loop.run(&mut source).await;
        info!("{}", stats);
        drain_alerts(&proc_controller, &proc_cancel).await;
        proc_controller.shutdown();
        proc_cancel.cancel();
        Ok(TaskName::SampleProcessor)
    });

    // Task 2: Connectivity watchdog
    let poll_ms = cfg.connectivity.poll_interval_ms;
    let watchdog_state = Arc::clone(&app_state);
    let watchdog_cancel = cancel_token.clone();
    task_set.spawn(async move {
        run_connectivity_watchdog(watchdog_state, poll_ms, watchdog_cancel).await;
        Ok(TaskName::ConnectivityWatchdog)
    });

    // Task 3: Rider responses on stdin
    if rider_input {
        let rider_cancel = cancel_token.clone();
        let rider_controller = controller.clone();
        task_set.spawn(async move {
            info!("[RiderInput] Type 'cancel' or 'confirm' to answer an alert");
            run_rider_input(BufReader::new(tokio::io::stdin()), rider_controller, rider_cancel).await;
            Ok(TaskName::RiderInput)
        });
    }

    run_supervisor(&mut task_set, cancel_token).await
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let args = CliArgs::parse();

    if let Some(path) = &args.write_default_config {
        HelmetConfig::default()
            .save_to_file(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("📝 Default configuration written to {}", path.display());
        return Ok(());
    }

    let helmet_config = HelmetConfig::load();
    info!(
        "Rider: {} | Device: {}",
        helmet_config.rider.name,
        if helmet_config.rider.device_id.is_empty() {
            "unset"
        } else {
            &helmet_config.rider.device_id
        }
    );
    config::init(helmet_config);
    let cfg = config::get();

    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("  Helmet Guard - crash detection and alert escalation");
    info!(
        "  impact ≥ {:.1} g | rotation ≥ {:.0} °/s | escalation {} s",
        cfg.classifier.impact_threshold_g,
        cfg.classifier.rotation_threshold_dps,
        cfg.alert.escalation_secs
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Ctrl+C cancels every task
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Ctrl+C received");
        shutdown_token.cancel();
    });

    let speed = (args.speed > 0.0).then_some(args.speed);

    if args.stdin {
        info!("📥 Input: stdin (JSON samples)");
        run_pipeline(JsonLinesSource::stdin(), cfg, false, cancel_token).await?;
    } else if let Some(path) = &args.replay {
        info!("📥 Input: replay {}", path.display());
        let source = JsonLinesSource::open(path).await?;
        let source = match speed {
            Some(s) => source.paced(s),
            None => source,
        };
        run_pipeline(source, cfg, true, cancel_token).await?;
    } else {
        let ride = SyntheticRide {
            duration_secs: args.synthetic_duration,
            crash_at_secs: args.synthetic_crash_at,
            ..Default::default()
        };
        let samples = ride.generate(&cfg.sensor)?;
        info!(
            "🧪 Input: synthetic ride ({} samples{})",
            samples.len(),
            ride.crash_at_secs
                .map(|s| format!(", crash at {s:.1} s"))
                .unwrap_or_default()
        );
        let source = ReplaySource::new(samples).named("synthetic");
        let source = match speed {
            Some(s) => source.paced(s),
            None => source,
        };
        run_pipeline(source, cfg, true, cancel_token).await?;
    }

    info!("✓ Helmet Guard shutdown complete");
    Ok(())
}
