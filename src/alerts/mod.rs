//! Alert lifecycle: arming, rider confirmation window, escalation, cooldown.

mod controller;
mod state_machine;

pub use controller::{AlertController, AlertSnapshot};
pub use state_machine::{
    AlertEvent, AlertPhase, AlertStateMachine, AlertStats, Effect, PhaseKind, Rejected,
};
