//! Processing Pipeline Module
//!
//! ```text
//! SampleSource ──▶ ProcessingLoop ──▶ PipelineCoordinator ──▶ AlertController
//!                        │                (condition, classify,      │
//!                        ▼                 rollover)                 ▼
//!                    AppState ◀── connectivity watchdog        store / notifier
//! ```
//!
//! Samples are processed one at a time in arrival order; alert side effects
//! run on their own tasks.

mod coordinator;
mod state;
pub mod processing_loop;
pub mod rider;
pub mod source;
pub mod synthetic;
pub mod watchdog;

pub use coordinator::{PipelineCoordinator, PipelineStats, SampleOutcome};
pub use state::*;
