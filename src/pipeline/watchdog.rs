//! Connectivity watchdog: polls feed liveness and publishes transitions.

use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::state::now_ms;
use super::{AppState, SystemStatus};

/// Re-evaluate liveness against `now_ms`. Returns the new verdict if it
/// changed.
pub async fn check_connectivity(app_state: &RwLock<AppState>, now_ms: u64) -> Option<bool> {
    let mut state = app_state.write().await;
    let live = state.connectivity.is_live(now_ms);
    if live == state.connected {
        return None;
    }
    state.connected = live;

    if live {
        info!("🔗 Helmet connected");
        if state.status == SystemStatus::Disconnected {
            state.status = SystemStatus::Monitoring;
        }
    } else {
        warn!(
            silence_ms = state.connectivity.silence_ms(now_ms),
            "📴 Helmet feed lost"
        );
        if state.status != SystemStatus::Stopped {
            state.status = SystemStatus::Disconnected;
        }
    }
    Some(live)
}

/// Poll every `poll_interval_ms` until cancelled.
pub async fn run_connectivity_watchdog(
    app_state: Arc<RwLock<AppState>>,
    poll_interval_ms: u64,
    cancel_token: CancellationToken,
) {
    let mut ticker = interval(Duration::from_millis(poll_interval_ms.max(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => break,
            _ = ticker.tick() => {
                check_connectivity(&app_state, now_ms()).await;
            }
        }
    }
}
