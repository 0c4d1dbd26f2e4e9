//! Structured logging and telemetry bootstrap for client applications.
//!
//! Resolves logger settings, assembles console, rolling file, and remote
//! telemetry sinks that tag every record with the same enrichment fields, and
//! drains buffered telemetry before the host process exits.

pub mod config;
pub mod lifecycle;
pub mod observability;

pub use config::{ConfigResolver, ConfigSource, ResolvedConfig};
pub use lifecycle::{LifecycleController, PipelineState, ShutdownOptions, ShutdownReport, StartupError};
pub use observability::{Pipeline, PipelineBuildError, SinkKind, SinkRegistry};
