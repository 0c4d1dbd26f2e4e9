//! Sink assembly.
//!
//! # Responsibilities
//! - Build the console, rolling file, and telemetry sinks from resolved config
//! - Tag every sink's records with the enrichment fields
//! - Keep going when one sink fails; fail only when nothing could be built
//!
//! # Design Decisions
//! - Sinks are `tracing-subscriber` layers on one `Dispatch` per pipeline
//! - File writes go through a non-blocking background writer
//! - Transport crates are filtered out so shipping never logs into itself

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing::Dispatch;
use tracing_appender::non_blocking::{NonBlocking, NonBlockingBuilder, WorkerGuard};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::config::schema::DEFAULT_LOG_FILTER;
use crate::config::{ResolvedConfig, TelemetryConnection};
use crate::observability::enrichment::EnrichmentFields;
use crate::observability::logging::EnrichedFormat;
use crate::observability::pipeline::Pipeline;
use crate::observability::rolling::{RollingFileWriter, RollingPolicy, SharedRollingWriter};
use crate::observability::telemetry::{TelemetryClient, TelemetryHandle};
use crate::observability::transport::HttpTelemetryClient;

const TRANSPORT_NOISE: &str = "hyper=off,hyper_util=off,h2=off,rustls=off,reqwest=off";

/// Which sinks a pipeline writes to, in assembly order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    Console,
    File,
    Telemetry,
}

/// One sink could not be constructed. The others still are.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("file sink: cannot open {path}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("telemetry sink: {0}")]
    Telemetry(String),
}

/// Not a single sink could be constructed.
#[derive(Debug, Error)]
#[error("no logging sink could be constructed ({} sink(s) failed)", failures.len())]
pub struct PipelineBuildError {
    pub failures: Vec<SinkError>,
}

/// Creates the telemetry client for a connection.
pub type ClientFactory =
    Arc<dyn Fn(&TelemetryConnection) -> Result<Arc<dyn TelemetryClient>, SinkError> + Send + Sync>;

type ConsoleFactory = Arc<dyn Fn() -> BoxMakeWriter + Send + Sync>;

/// `<root>-<user>-<pid>-.log`; the rolling writer inserts the date.
pub fn file_path_template(filename_root: &str, fields: &EnrichmentFields) -> PathBuf {
    PathBuf::from(format!(
        "{filename_root}-{}-{}-.log",
        fields.user_name, fields.process_id
    ))
}

/// The rolling file sink and its background writer.
pub struct FileSink {
    template: PathBuf,
    writer: SharedRollingWriter,
    guard: Mutex<Option<WorkerGuard>>,
}

impl FileSink {
    fn open(template: PathBuf, policy: RollingPolicy) -> Result<(Self, NonBlocking), SinkError> {
        let writer = RollingFileWriter::open(&template, policy).map_err(|source| SinkError::File {
            path: template.clone(),
            source,
        })?;
        let shared = SharedRollingWriter::new(writer);
        let (non_blocking, guard) = NonBlockingBuilder::default()
            .lossy(false)
            .thread_name("function-logger-file")
            .finish(shared.clone());

        let sink = Self {
            template,
            writer: shared,
            guard: Mutex::new(Some(guard)),
        };
        Ok((sink, non_blocking))
    }

    pub fn template(&self) -> &Path {
        &self.template
    }

    pub fn current_path(&self) -> Option<PathBuf> {
        self.writer.current_path()
    }

    /// Whether the underlying file handle is still held.
    pub fn is_open(&self) -> bool {
        self.writer.is_open()
    }

    /// Stop the background writer after it has written everything queued.
    /// Blocks until the writer is done.
    pub fn flush(&self) {
        let guard = match self.guard.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(guard);
    }

    /// Flush, then release the file handle.
    pub fn close(&self) -> io::Result<()> {
        self.flush();
        self.writer.close()
    }
}

impl fmt::Debug for FileSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileSink")
            .field("template", &self.template)
            .field("open", &self.is_open())
            .finish()
    }
}

/// Builds pipelines. Reusable, so a failed startup can be retried.
pub struct SinkRegistry {
    console: Option<ConsoleFactory>,
    client_factory: ClientFactory,
    rolling: RollingPolicy,
}

impl Default for SinkRegistry {
    fn default() -> Self {
        Self {
            console: Some(Arc::new(|| BoxMakeWriter::new(io::stdout))),
            client_factory: Arc::new(|conn: &TelemetryConnection| {
                HttpTelemetryClient::spawn(conn)
                    .map(|client| Arc::new(client) as Arc<dyn TelemetryClient>)
                    .map_err(|e| SinkError::Telemetry(e.to_string()))
            }),
            rolling: RollingPolicy::default(),
        }
    }
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Send console output somewhere other than stdout.
    pub fn with_console_writer<W>(mut self, make_writer: W) -> Self
    where
        W: for<'a> MakeWriter<'a> + Clone + Send + Sync + 'static,
    {
        self.console = Some(Arc::new(move || BoxMakeWriter::new(make_writer.clone())));
        self
    }

    /// For hosts without a console (e.g. an add-in inside a GUI process).
    pub fn without_console(mut self) -> Self {
        self.console = None;
        self
    }

    pub fn with_client_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&TelemetryConnection) -> Result<Arc<dyn TelemetryClient>, SinkError>
            + Send
            + Sync
            + 'static,
    {
        self.client_factory = Arc::new(factory);
        self
    }

    pub fn with_rolling_policy(mut self, policy: RollingPolicy) -> Self {
        self.rolling = policy;
        self
    }

    /// Assemble a pipeline. Individual sink failures are returned alongside
    /// it; only a pipeline with no sink at all is an error.
    pub fn build(
        &self,
        resolved: &ResolvedConfig,
        fields: &EnrichmentFields,
    ) -> Result<(Pipeline, Vec<SinkError>), PipelineBuildError> {
        let logger = &resolved.logger;
        let fields = Arc::new(fields.clone());
        let mut kinds = Vec::new();
        let mut failures = Vec::new();

        let console_layer = self.console.as_ref().map(|make_writer| {
            kinds.push(SinkKind::Console);
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(make_writer())
                .event_format(EnrichedFormat::new(Arc::clone(&fields)))
        });

        let mut file_sink = None;
        let file_layer = if logger.is_active && logger.log_to_file {
            let template = file_path_template(&logger.filename_root, &fields);
            match FileSink::open(template, self.rolling) {
                Ok((sink, writer)) => {
                    kinds.push(SinkKind::File);
                    file_sink = Some(sink);
                    Some(
                        tracing_subscriber::fmt::layer()
                            .with_ansi(false)
                            .with_writer(writer)
                            .event_format(EnrichedFormat::new(Arc::clone(&fields))),
                    )
                }
                Err(e) => {
                    failures.push(e);
                    None
                }
            }
        } else {
            None
        };

        let telemetry = match &resolved.connection {
            Some(conn) if logger.is_active => match (self.client_factory)(conn) {
                Ok(client) => {
                    kinds.push(SinkKind::Telemetry);
                    TelemetryHandle::connected(conn.clone(), client)
                }
                Err(e) => {
                    failures.push(e);
                    TelemetryHandle::disconnected()
                }
            },
            _ => TelemetryHandle::disconnected(),
        };
        let telemetry_layer = telemetry.layer(Arc::clone(&fields));

        if kinds.is_empty() && logger.is_active {
            return Err(PipelineBuildError { failures });
        }

        let filter = if logger.is_active {
            EnvFilter::try_new(format!("{},{TRANSPORT_NOISE}", logger.log_filter))
                .unwrap_or_else(|_| EnvFilter::new(format!("{DEFAULT_LOG_FILTER},{TRANSPORT_NOISE}")))
        } else {
            EnvFilter::new("off")
        };

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .with(telemetry_layer);

        let pipeline = Pipeline::new(
            Dispatch::new(subscriber),
            kinds,
            file_sink,
            telemetry,
            fields,
            resolved.environment.clone(),
        );
        Ok((pipeline, failures))
    }
}
