//! HTTP delivery for telemetry records.
//!
//! Records are queued on a bounded channel and batched by a background task
//! on the tokio runtime. A batch is POSTed as JSON when it is full, when the
//! send interval elapses, and on every flush. Failed batches are dropped,
//! never retried. Records that find the queue full are dropped and counted.
//! `close` aborts any request in flight.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::TelemetryConnection;
use crate::observability::metrics;
use crate::observability::telemetry::{FlushError, TelemetryClient, TelemetryRecord};

/// Events from this module are kept out of the telemetry stream.
pub(crate) const TRANSPORT_TARGET: &str = module_path!();

const TRACK_PATH: &str = "v2/track";

#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub max_batch_size: usize,
    pub send_interval: Duration,
    pub request_timeout: Duration,
    /// Records queued ahead of the worker before new ones are dropped.
    pub queue_capacity: usize,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            max_batch_size: 100,
            send_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            queue_capacity: 8192,
        }
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no tokio runtime available to run the telemetry client")]
    NoRuntime,

    #[error("invalid ingestion endpoint: {0}")]
    Endpoint(#[from] url::ParseError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

enum Command {
    Record(TelemetryRecord),
    Flush(oneshot::Sender<Result<(), FlushError>>),
    Close(oneshot::Sender<()>),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    instrumentation_key: Option<&'a str>,
    records: &'a [TelemetryRecord],
}

/// Default `TelemetryClient`, backed by `reqwest`.
#[derive(Debug)]
pub struct HttpTelemetryClient {
    tx: mpsc::Sender<Command>,
    endpoint: Url,
    abort: CancellationToken,
}

impl HttpTelemetryClient {
    /// Spawn the delivery task on the current runtime.
    pub fn spawn(connection: &TelemetryConnection) -> Result<Self, TransportError> {
        Self::spawn_with(connection, TransportOptions::default())
    }

    pub fn spawn_with(
        connection: &TelemetryConnection,
        options: TransportOptions,
    ) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;
        let endpoint = connection.ingestion_endpoint()?.join(TRACK_PATH)?;
        let http = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()?;

        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let abort = CancellationToken::new();
        let worker = Worker {
            rx,
            http,
            endpoint: endpoint.clone(),
            instrumentation_key: connection.instrumentation_key().map(str::to_string),
            buffer: Vec::new(),
            abort: abort.clone(),
            options,
        };
        runtime.spawn(worker.run());

        tracing::debug!(target: TRANSPORT_TARGET, endpoint = %endpoint, "Telemetry client started");
        Ok(Self { tx, endpoint, abort })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl TelemetryClient for HttpTelemetryClient {
    fn send(&self, record: TelemetryRecord) {
        match self.tx.try_send(Command::Record(record)) {
            Ok(()) => metrics::record_enqueued(),
            Err(TrySendError::Full(_)) => metrics::record_dropped("full", 1),
            Err(TrySendError::Closed(_)) => metrics::record_dropped("closed", 1),
        }
    }

    async fn flush(&self) -> Result<(), FlushError> {
        let (ack, done) = oneshot::channel();
        self.tx
            .send(Command::Flush(ack))
            .await
            .map_err(|_| FlushError::Disconnected)?;
        done.await.map_err(|_| FlushError::Disconnected)?
    }

    /// Stops the worker at once. Records not yet shipped are dropped.
    async fn close(&self) {
        self.abort.cancel();
        let (ack, done) = oneshot::channel();
        if self.tx.send(Command::Close(ack)).await.is_ok() {
            let _ = done.await;
        }
    }
}

struct Worker {
    rx: mpsc::Receiver<Command>,
    http: reqwest::Client,
    endpoint: Url,
    instrumentation_key: Option<String>,
    buffer: Vec<TelemetryRecord>,
    abort: CancellationToken,
    options: TransportOptions,
}

impl Worker {
    async fn run(mut self) {
        let mut ticker = interval(self.options.send_interval);
        ticker.tick().await; // first tick is immediate

        loop {
            tokio::select! {
                biased;
                _ = self.abort.cancelled() => break,
                cmd = self.rx.recv() => match cmd {
                    Some(Command::Record(record)) => {
                        self.buffer.push(record);
                        if self.buffer.len() >= self.options.max_batch_size {
                            let _ = self.ship().await;
                        }
                    }
                    Some(Command::Flush(ack)) => {
                        let result = self.ship().await;
                        let _ = ack.send(result);
                    }
                    Some(Command::Close(ack)) => {
                        let _ = ack.send(());
                        break;
                    }
                    None => {
                        let _ = self.ship().await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    let _ = self.ship().await;
                }
            }
        }

        self.discard_pending();
        tracing::debug!(target: TRANSPORT_TARGET, "Telemetry client stopped");
    }

    async fn ship(&mut self) -> Result<(), FlushError> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buffer);
        let count = batch.len();
        let envelope = Envelope {
            instrumentation_key: self.instrumentation_key.as_deref(),
            records: &batch,
        };

        let request = self.http.post(self.endpoint.clone()).json(&envelope).send();
        let result = tokio::select! {
            biased;
            _ = self.abort.cancelled() => {
                metrics::record_dropped("closed", count);
                return Err(FlushError::Disconnected);
            }
            response = request => response.and_then(reqwest::Response::error_for_status),
        };

        match result {
            Ok(_) => {
                metrics::record_batch(true, count);
                tracing::trace!(target: TRANSPORT_TARGET, records = count, "Telemetry batch shipped");
                Ok(())
            }
            Err(e) => {
                metrics::record_batch(false, count);
                metrics::record_dropped("transport", count);
                tracing::warn!(
                    target: TRANSPORT_TARGET,
                    records = count,
                    error = %e,
                    "Telemetry batch rejected; dropping"
                );
                Err(FlushError::Transport(e.to_string()))
            }
        }
    }

    /// Drop whatever is still buffered or queued once the worker stops.
    fn discard_pending(&mut self) {
        self.rx.close();
        let mut dropped = std::mem::take(&mut self.buffer).len();
        while let Ok(cmd) = self.rx.try_recv() {
            if let Command::Record(_) = cmd {
                dropped += 1;
            }
        }
        if dropped > 0 {
            metrics::record_dropped("closed", dropped);
        }
    }
}
