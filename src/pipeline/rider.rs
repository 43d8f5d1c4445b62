//! Rider responses read from a line-oriented input (terminal, companion app
//! bridge): `cancel`, `confirm` or `status`, optionally followed by an alert id.

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::alerts::AlertController;
use crate::types::AlertId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiderCommand {
    Cancel(Option<AlertId>),
    Confirm(Option<AlertId>),
    Status,
}

impl RiderCommand {
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let verb = parts.next()?.to_ascii_lowercase();
        let id = match parts.next() {
            Some(raw) => Some(raw.parse::<AlertId>().ok()?),
            None => None,
        };
        match verb.as_str() {
            "cancel" | "ok" => Some(Self::Cancel(id)),
            "confirm" | "sos" | "help" => Some(Self::Confirm(id)),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

/// Apply one command. Returns `true` if it changed the alert lifecycle.
pub fn apply_command(controller: &AlertController, command: RiderCommand) -> bool {
    let result = match command {
        RiderCommand::Cancel(id) => controller.cancel(id),
        RiderCommand::Confirm(id) => controller.confirm(id),
        RiderCommand::Status => {
            let snap = controller.snapshot();
            info!(
                phase = %snap.phase,
                active = ?snap.active.as_ref().map(|a| a.id),
                armed = snap.stats.armed,
                cancelled = snap.stats.cancelled,
                confirmed = snap.stats.confirmed,
                "Alert status"
            );
            return false;
        }
    };
    match result {
        Ok(_) => true,
        Err(rejected) => {
            warn!(%rejected, "Rider command ignored");
            false
        }
    }
}

/// Read commands until EOF or cancellation.
pub async fn run_rider_input<R: AsyncBufRead + Unpin>(
    reader: R,
    controller: AlertController,
    cancel_token: CancellationToken,
) {
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            _ = cancel_token.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match RiderCommand::parse(&line) {
                    Some(command) => {
                        apply_command(&controller, command);
                    }
                    None => warn!("Unknown command '{}' (try cancel, confirm, status)", line.trim()),
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Rider input error: {}", e);
                break;
            }
        }
    }
}
