//! notify-replay library: Exposes the replay components for testing.
//!
//! This is a thin library layer over the binary, allowing integration
//! tests to run scripts without spawning a process.

pub mod config;
pub mod runner;
pub mod script;
pub mod sink;

// Re-export key types for convenience
pub use config::load_config;
pub use runner::{ReplayError, ReplaySummary, run};
pub use script::{FailureKind, ReplayScript, ScriptError, ScriptStep};
pub use sink::{ShownAlert, TracingAlertSink};
