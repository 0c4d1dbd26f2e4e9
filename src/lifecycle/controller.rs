//! One logging pipeline per controller, built once and drained once.

use std::fmt;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use thiserror::Error;
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

use crate::config::{ConfigResolver, ConfigSource};
use crate::lifecycle::shutdown::{self, ShutdownOptions, ShutdownReport};
use crate::observability::{EnrichmentContext, Pipeline, PipelineBuildError, SinkRegistry};

/// Lifecycle of the pipeline. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    Uninitialized,
    Ready,
    Draining,
    Closed,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Build(#[from] PipelineBuildError),

    #[error("logging pipeline has been shut down and cannot be restarted")]
    Retired,
}

/// Owns the logging pipeline for a process.
///
/// Construct one at the entry point and share it by `Arc`. `startup` builds
/// the pipeline exactly once even under concurrent callers; `shutdown` drains
/// it exactly once. After shutdown the controller is retired.
pub struct LifecycleController {
    source: Box<dyn ConfigSource>,
    registry: SinkRegistry,
    enrichment: EnrichmentContext,
    options: ShutdownOptions,
    slot: Mutex<Option<Arc<Pipeline>>>,
    state: Arc<watch::Sender<PipelineState>>,
    current: ArcSwapOption<Pipeline>,
}

impl LifecycleController {
    pub fn new(source: impl ConfigSource + 'static) -> Self {
        let (state, _) = watch::channel(PipelineState::Uninitialized);
        Self {
            source: Box::new(source),
            registry: SinkRegistry::default(),
            enrichment: EnrichmentContext::new(),
            options: ShutdownOptions::default(),
            slot: Mutex::new(None),
            state: Arc::new(state),
            current: ArcSwapOption::empty(),
        }
    }

    pub fn with_registry(mut self, registry: SinkRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.enrichment = EnrichmentContext::with_application_name(name);
        self
    }

    pub fn with_shutdown_options(mut self, options: ShutdownOptions) -> Self {
        self.options = options;
        self
    }

    pub fn state(&self) -> PipelineState {
        *self.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<PipelineState> {
        self.state.subscribe()
    }

    /// The ready pipeline, if any. Does not wait on startup or shutdown.
    pub fn pipeline(&self) -> Option<Arc<Pipeline>> {
        self.current.load_full()
    }

    /// Build the pipeline, or return the one already built.
    pub async fn startup(&self) -> Result<Arc<Pipeline>, StartupError> {
        let mut slot = self.slot.lock().await;
        match (self.state(), slot.as_ref()) {
            (PipelineState::Ready, Some(pipeline)) => return Ok(Arc::clone(pipeline)),
            (PipelineState::Draining | PipelineState::Closed, _) => {
                return Err(StartupError::Retired)
            }
            _ => {}
        }

        let resolved = ConfigResolver::new(self.source.as_ref()).resolve();
        for warning in &resolved.warnings {
            eprintln!("function-logger: {warning}");
        }

        let fields = self.enrichment.fields();
        let (pipeline, failures) = match self.registry.build(&resolved, fields) {
            Ok(built) => built,
            Err(e) => {
                eprintln!("function-logger: {e}");
                for failure in &e.failures {
                    eprintln!("function-logger:   {failure}");
                }
                return Err(e.into());
            }
        };
        for failure in &failures {
            eprintln!("function-logger: {failure}");
        }
        let pipeline = Arc::new(pipeline);

        pipeline.in_scope(|| {
            tracing::info!(
                environment = %resolved.environment,
                application = %fields.application_name,
                telemetry = resolved.telemetry_identity().unwrap_or("none"),
                sinks = ?pipeline.sinks(),
                "Starting logging"
            );
            for warning in &resolved.warnings {
                tracing::warn!(error = %warning, "Configuration value ignored");
            }
            for failure in &failures {
                tracing::warn!(error = %failure, "Sink unavailable");
            }
        });

        *slot = Some(Arc::clone(&pipeline));
        self.current.store(Some(Arc::clone(&pipeline)));
        self.state.send_replace(PipelineState::Ready);
        Ok(pipeline)
    }

    /// Drain with the full grace period.
    pub async fn shutdown(&self) -> ShutdownReport {
        self.shutdown_with(CancellationToken::new()).await
    }

    /// Drain the pipeline. Cancelling `cancel` cuts the grace period short.
    /// Calls after the first are no-ops.
    ///
    /// The drain runs on its own task. Dropping the returned future does not
    /// stop it, and the state still reaches `Closed`.
    pub async fn shutdown_with(&self, cancel: CancellationToken) -> ShutdownReport {
        let pipeline = {
            let mut slot = self.slot.lock().await;
            if self.state() != PipelineState::Ready {
                return ShutdownReport::skipped();
            }
            self.state.send_replace(PipelineState::Draining);
            self.current.store(None);
            slot.take()
        };

        let Some(pipeline) = pipeline else {
            self.state.send_replace(PipelineState::Closed);
            return ShutdownReport::skipped();
        };

        let state = Arc::clone(&self.state);
        let options = self.options;
        let drain = tokio::spawn(async move {
            let report = shutdown::drain(pipeline, &options, &cancel).await;
            state.send_replace(PipelineState::Closed);
            report
        });

        match drain.await {
            Ok(report) => report,
            Err(e) => {
                eprintln!("function-logger: shutdown task failed: {e}");
                self.state.send_replace(PipelineState::Closed);
                ShutdownReport {
                    performed: true,
                    local_flush_error: Some(e.to_string()),
                    ..ShutdownReport::default()
                }
            }
        }
    }
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("state", &self.state())
            .field("options", &self.options)
            .finish()
    }
}
