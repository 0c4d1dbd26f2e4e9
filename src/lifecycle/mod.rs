//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (controller.rs):
//!     Resolve config → Enrich → Assemble sinks → Ready → announce
//!
//! Shutdown (shutdown.rs):
//!     Ready → Draining → "shutting down" record → flush local
//!         → flush telemetry → bounded wait → close → Closed
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → controller shutdown
//!     second signal  → cancel the grace period
//! ```
//!
//! # Design Decisions
//! - One explicit controller object, no process-wide statics
//! - Transitions are guarded by an async mutex; the drain runs outside it
//! - Shutdown never fails: problems are reported, not returned
//! - A shut-down controller stays retired

pub mod controller;
pub mod shutdown;
pub mod signals;

pub use controller::{LifecycleController, PipelineState, StartupError};
pub use shutdown::{ShutdownOptions, ShutdownReport, WaitOutcome};
