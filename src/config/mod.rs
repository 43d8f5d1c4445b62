//! Helmet Configuration Module
//!
//! Detection thresholds, timing and recipients loaded from TOML, with
//! built-in defaults for every value.
//!
//! ## Loading Order
//!
//! 1. `HELMET_GUARD_CONFIG` environment variable (path to TOML file)
//! 2. `helmet_guard.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(HelmetConfig::load());
//!
//! // Anywhere in the codebase:
//! let window = config::get().classifier.window_ms;
//! ```
//!
//! Pipeline components take their section by value, so tests can build them
//! without touching the global.

mod helmet_config;
pub mod defaults;
pub mod validation;

pub use helmet_config::*;

use std::sync::OnceLock;

/// Global helmet configuration, initialized once at startup.
static HELMET_CONFIG: OnceLock<HelmetConfig> = OnceLock::new();

/// Initialize the global helmet configuration.
///
/// A second call is ignored with a warning.
pub fn init(config: HelmetConfig) {
    if HELMET_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once, ignoring");
    }
}

/// Get a reference to the global helmet configuration.
///
/// Falls back to built-in defaults if `init()` was never called.
pub fn get() -> &'static HelmetConfig {
    HELMET_CONFIG.get_or_init(|| {
        tracing::warn!("config::get() called before config::init(), using defaults");
        HelmetConfig::default()
    })
}

/// Check whether the config has been initialized.
pub fn is_initialized() -> bool {
    HELMET_CONFIG.get().is_some()
}
