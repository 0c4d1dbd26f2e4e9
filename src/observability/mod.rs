//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! ResolvedConfig + EnrichmentFields
//!     → sinks.rs (SinkRegistry assembles layers)
//!         → console   (logging.rs EnrichedFormat → stdout)
//!         → file      (logging.rs EnrichedFormat → non-blocking → rolling.rs)
//!         → telemetry (telemetry.rs layer → transport.rs batches → HTTP)
//!     → pipeline.rs (one Dispatch + drain handles)
//!
//! Delivery counters:
//!     → metrics.rs (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Every record on every sink carries the same enrichment fields
//! - Local sinks drain synchronously; telemetry drains with a bounded flush
//! - A sink that cannot be built is reported and skipped

pub mod enrichment;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod rolling;
pub mod sinks;
pub mod telemetry;
pub mod transport;

pub use enrichment::{EnrichmentContext, EnrichmentFields};
pub use pipeline::Pipeline;
pub use sinks::{PipelineBuildError, SinkError, SinkKind, SinkRegistry};
pub use telemetry::{FlushError, TelemetryClient, TelemetryHandle, TelemetryRecord};
