//! The drain sequence run once per pipeline.
//!
//! # Responsibilities
//! - Announce shutdown through the pipeline itself
//! - Flush local sinks, then the telemetry client
//! - Give asynchronous transports a bounded, cancellable grace period
//! - Release the telemetry client and the file handle
//!
//! # Design Decisions
//! - Failures are recorded in the report and written to stderr, never returned
//! - The grace period is a `select!` against a `CancellationToken`
//! - Flush and close are each bounded by `flush_timeout`; close also stops
//!   waiting once the token is cancelled

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::observability::telemetry::{FlushError, DEFAULT_FLUSH_TIMEOUT};
use crate::observability::Pipeline;

/// Grace period given to asynchronous transports after the flush.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_millis(3500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownOptions {
    pub grace_period: Duration,
    /// Bound on the telemetry flush, and separately on the client close.
    pub flush_timeout: Duration,
}

impl Default for ShutdownOptions {
    fn default() -> Self {
        Self {
            grace_period: DEFAULT_GRACE_PERIOD,
            flush_timeout: DEFAULT_FLUSH_TIMEOUT,
        }
    }
}

/// How the grace period ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Elapsed,
    Cancelled,
}

/// What a `shutdown` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// False when the call was a no-op.
    pub performed: bool,
    pub local_flush_error: Option<String>,
    pub flush_error: Option<FlushError>,
    pub wait: Option<WaitOutcome>,
}

impl ShutdownReport {
    pub fn skipped() -> Self {
        Self::default()
    }

    /// Performed with no recorded failure.
    pub fn is_clean(&self) -> bool {
        self.performed && self.local_flush_error.is_none() && self.flush_error.is_none()
    }
}

/// Sleep for `grace` unless `cancel` fires first.
pub async fn bounded_wait(grace: Duration, cancel: &CancellationToken) -> WaitOutcome {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => WaitOutcome::Cancelled,
        _ = tokio::time::sleep(grace) => WaitOutcome::Elapsed,
    }
}

pub(crate) async fn drain(
    pipeline: Arc<Pipeline>,
    options: &ShutdownOptions,
    cancel: &CancellationToken,
) -> ShutdownReport {
    let mut report = ShutdownReport {
        performed: true,
        ..ShutdownReport::default()
    };

    pipeline.in_scope(|| tracing::info!("Application shutting down."));

    let local = Arc::clone(&pipeline);
    let local_result = tokio::task::spawn_blocking(move || local.flush_local()).await;
    match local_result {
        Ok(Ok(())) => {}
        Ok(Err(e)) => report.local_flush_error = Some(e.to_string()),
        Err(e) => report.local_flush_error = Some(e.to_string()),
    }
    if let Some(e) = &report.local_flush_error {
        eprintln!("function-logger: local sink flush failed: {e}");
    }

    let telemetry = pipeline.telemetry();
    if let Err(e) = telemetry.flush_within(options.flush_timeout).await {
        eprintln!("function-logger: {e}");
        report.flush_error = Some(e);
    }

    report.wait = Some(bounded_wait(options.grace_period, cancel).await);

    tokio::select! {
        biased;
        stopped = telemetry.close_within(options.flush_timeout) => {
            if !stopped {
                eprintln!(
                    "function-logger: telemetry client did not stop within {:?}",
                    options.flush_timeout
                );
            }
        }
        _ = cancel.cancelled() => {}
    }
    if let Err(e) = pipeline.close_local() {
        eprintln!("function-logger: failed to close log file: {e}");
        report.local_flush_error.get_or_insert_with(|| e.to_string());
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bounded_wait_elapses() {
        let cancel = CancellationToken::new();
        let outcome = bounded_wait(Duration::from_millis(10), &cancel).await;
        assert_eq!(outcome, WaitOutcome::Elapsed);
    }

    #[tokio::test]
    async fn test_bounded_wait_cancelled_early() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let outcome = bounded_wait(Duration::from_secs(30), &cancel).await;

        assert_eq!(outcome, WaitOutcome::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_precancelled_wait_returns_immediately() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            bounded_wait(Duration::from_secs(30), &cancel).await,
            WaitOutcome::Cancelled
        );
    }

    #[test]
    fn test_default_options() {
        let options = ShutdownOptions::default();
        assert_eq!(options.grace_period, Duration::from_millis(3500));
        assert_eq!(options.flush_timeout, Duration::from_secs(5));
        assert!(!ShutdownReport::skipped().performed);
    }
}
