//! Sample processing loop shared across all input modes.

use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::source::{SampleEvent, SampleSource};
use super::state::now_ms;
use super::{AppState, PipelineCoordinator, PipelineStats, SampleOutcome, SystemStatus};
use crate::alerts::PhaseKind;
use crate::types::RawSample;

/// Progress log interval (samples).
const PROGRESS_INTERVAL: u64 = 500;

/// Owns everything the per-sample loop needs.
///
/// Built with [`new()`](ProcessingLoop::new), then consumed by
/// [`run()`](ProcessingLoop::run).
pub struct ProcessingLoop {
    coordinator: PipelineCoordinator,
    app_state: Arc<RwLock<AppState>>,
    cancel_token: CancellationToken,
}

impl ProcessingLoop {
    pub fn new(
        coordinator: PipelineCoordinator,
        app_state: Arc<RwLock<AppState>>,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            coordinator,
            app_state,
            cancel_token,
        }
    }

    /// Run until the source is exhausted or cancellation.
    ///
    /// Returns final pipeline statistics.
    pub async fn run<S: SampleSource>(mut self, source: &mut S) -> PipelineStats {
        info!("📡 Reading helmet samples from {}...", source.source_name());

        if let Some(sample) = source.most_recent().await {
            info!(timestamp = sample.timestamp, "Seeding from most recent sample");
            self.ingest(&sample).await;
        }

        loop {
            let event = tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("[ProcessingLoop] Shutdown signal received");
                    break;
                }
                result = source.next_sample() => {
                    match result {
                        Ok(ev) => ev,
                        Err(e) => {
                            warn!("[ProcessingLoop] Source error: {}", e);
                            break;
                        }
                    }
                }
            };

            match event {
                SampleEvent::Sample(sample) => self.ingest(&sample).await,
                SampleEvent::Eof => {
                    info!(
                        "[ProcessingLoop] Source reached end ({} samples processed)",
                        self.coordinator.stats().samples_processed
                    );
                    break;
                }
            }
        }

        self.app_state.write().await.status = SystemStatus::Stopped;

        let stats = self.coordinator.stats();
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!("📊 FINAL STATISTICS");
        info!("   Samples Processed: {}", stats.samples_processed);
        info!("   Samples Dropped:   {}", stats.samples_dropped);
        info!("   Triggers:          {}", stats.triggers);
        info!("   Alerts Armed:      {}", stats.alerts_armed);
        info!("   Classifier Resets: {}", stats.classifier_resets);
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        stats
    }

    async fn ingest(&mut self, raw: &RawSample) {
        let outcome = self.coordinator.process_sample(raw);
        let alerts = self.coordinator.controller().snapshot();

        let mut state = self.app_state.write().await;
        state.connectivity.on_sample_received(now_ms());
        state.last_sample_time = Some(chrono::Utc::now());

        match outcome {
            Ok(SampleOutcome { sample, assessment, .. }) => {
                state.samples_processed += 1;
                state.latest_sample = Some(sample);
                state.latest_assessment = Some(assessment);
            }
            Err(_) => state.samples_dropped += 1,
        }
        state.status = if alerts.phase == PhaseKind::Idle {
            SystemStatus::Monitoring
        } else {
            SystemStatus::Alert
        };
        state.alerts = Some(alerts);

        if state.samples_processed > 0 && state.samples_processed % PROGRESS_INTERVAL == 0 {
            let danger = state
                .latest_assessment
                .map_or(0.0, |a| a.verdict.danger_percentage);
            info!(
                "📈 Progress: {} samples | danger {:.0}% | status {}",
                state.samples_processed, danger, state.status
            );
        }
    }
}
