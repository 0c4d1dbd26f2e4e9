//! The assembled logging pipeline.

use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;

use tracing::dispatcher::{self, SetGlobalDefaultError};
use tracing::Dispatch;

use crate::observability::enrichment::EnrichmentFields;
use crate::observability::sinks::{FileSink, SinkKind};
use crate::observability::telemetry::TelemetryHandle;

/// A subscriber wired to its sinks, plus the handles needed to drain them.
///
/// Created by [`SinkRegistry::build`](crate::observability::sinks::SinkRegistry::build)
/// and owned by the lifecycle controller.
pub struct Pipeline {
    dispatch: Dispatch,
    sinks: Vec<SinkKind>,
    file: Option<FileSink>,
    telemetry: TelemetryHandle,
    fields: Arc<EnrichmentFields>,
    environment: String,
}

impl Pipeline {
    pub(crate) fn new(
        dispatch: Dispatch,
        sinks: Vec<SinkKind>,
        file: Option<FileSink>,
        telemetry: TelemetryHandle,
        fields: Arc<EnrichmentFields>,
        environment: String,
    ) -> Self {
        Self {
            dispatch,
            sinks,
            file,
            telemetry,
            fields,
            environment,
        }
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn sinks(&self) -> &[SinkKind] {
        &self.sinks
    }

    pub fn has_sink(&self, kind: SinkKind) -> bool {
        self.sinks.contains(&kind)
    }

    pub fn file_sink(&self) -> Option<&FileSink> {
        self.file.as_ref()
    }

    pub fn telemetry(&self) -> &TelemetryHandle {
        &self.telemetry
    }

    pub fn fields(&self) -> &EnrichmentFields {
        &self.fields
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Run `f` with this pipeline as the thread's default subscriber.
    pub fn in_scope<T>(&self, f: impl FnOnce() -> T) -> T {
        dispatcher::with_default(&self.dispatch, f)
    }

    /// Make this pipeline the process-wide subscriber. Succeeds at most once
    /// per process.
    pub fn install_global(&self) -> Result<(), SetGlobalDefaultError> {
        dispatcher::set_global_default(self.dispatch.clone())
    }

    /// Drain the local sinks. Blocks until the file writer has caught up.
    pub(crate) fn flush_local(&self) -> io::Result<()> {
        if let Some(file) = &self.file {
            file.flush();
        }
        io::stdout().flush()
    }

    /// Release the file handle. Later records are dropped by the file sink.
    pub(crate) fn close_local(&self) -> io::Result<()> {
        match &self.file {
            Some(file) => file.close(),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("sinks", &self.sinks)
            .field("file", &self.file)
            .field("telemetry", &self.telemetry)
            .field("environment", &self.environment)
            .finish()
    }
}
