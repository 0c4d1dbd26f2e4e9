//! Remote telemetry sink.
//!
//! # Responsibilities
//! - Convert `tracing` events into `TelemetryRecord`s tagged with enrichment
//! - Hand records to a `TelemetryClient` without blocking the caller
//! - Expose a bounded `flush` that drains client-side buffering
//!
//! This is the only part of the pipeline that knows delivery is asynchronous.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;
use uuid::Uuid;

use crate::config::TelemetryConnection;
use crate::observability::enrichment::EnrichmentFields;
use crate::observability::metrics;
use crate::observability::transport::TRANSPORT_TARGET;

/// Upper bound on a single `flush` call.
pub const DEFAULT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// One structured record as shipped to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TelemetryRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
    /// Event fields plus the enrichment fields.
    pub properties: BTreeMap<String, String>,
}

/// Errors from draining a telemetry client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlushError {
    #[error("telemetry flush timed out after {0:?}")]
    Timeout(Duration),

    #[error("telemetry client is no longer running")]
    Disconnected,

    #[error("telemetry delivery failed: {0}")]
    Transport(String),
}

/// A buffering client that ships records in the background.
#[async_trait]
pub trait TelemetryClient: Send + Sync {
    /// Queue a record. Must not block.
    fn send(&self, record: TelemetryRecord);

    /// Resolve once every queued record has been handed to the transport.
    /// Network acknowledgment is not implied.
    async fn flush(&self) -> Result<(), FlushError>;

    /// Stop background delivery. Records sent afterwards are dropped.
    async fn close(&self) {}
}

/// Owner-side wrapper around an optional client.
pub struct TelemetryHandle {
    connection: Option<TelemetryConnection>,
    client: Option<Arc<dyn TelemetryClient>>,
}

impl TelemetryHandle {
    /// Handle with no backend; every operation is a no-op.
    pub fn disconnected() -> Self {
        Self {
            connection: None,
            client: None,
        }
    }

    pub fn connected(connection: TelemetryConnection, client: Arc<dyn TelemetryClient>) -> Self {
        Self {
            connection: Some(connection),
            client: Some(client),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    pub fn connection(&self) -> Option<&TelemetryConnection> {
        self.connection.as_ref()
    }

    pub fn identity(&self) -> Option<&str> {
        self.connection
            .as_ref()
            .and_then(TelemetryConnection::instrumentation_key)
    }

    pub fn send(&self, record: TelemetryRecord) {
        if let Some(client) = &self.client {
            client.send(record);
        }
    }

    /// Drain the client, giving up after [`DEFAULT_FLUSH_TIMEOUT`].
    pub async fn flush(&self) -> Result<(), FlushError> {
        self.flush_within(DEFAULT_FLUSH_TIMEOUT).await
    }

    /// Drain the client, giving up after `timeout`.
    pub async fn flush_within(&self, timeout: Duration) -> Result<(), FlushError> {
        let Some(client) = &self.client else {
            return Ok(());
        };

        match tokio::time::timeout(timeout, client.flush()).await {
            Ok(Ok(())) => {
                metrics::record_flush("success");
                Ok(())
            }
            Ok(Err(e)) => {
                metrics::record_flush("failure");
                Err(e)
            }
            Err(_) => {
                metrics::record_flush("timeout");
                Err(FlushError::Timeout(timeout))
            }
        }
    }

    /// Stop the client. Returns `false` if it did not stop within `timeout`.
    pub async fn close_within(&self, timeout: Duration) -> bool {
        match &self.client {
            Some(client) => tokio::time::timeout(timeout, client.close()).await.is_ok(),
            None => true,
        }
    }

    /// Subscriber layer feeding this handle's client, if connected.
    pub fn layer(&self, fields: Arc<EnrichmentFields>) -> Option<TelemetryLayer> {
        self.client.as_ref().map(|client| TelemetryLayer {
            client: Arc::clone(client),
            fields,
        })
    }
}

impl fmt::Debug for TelemetryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryHandle")
            .field("identity", &self.identity())
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// `tracing` layer that forwards every event to a telemetry client.
pub struct TelemetryLayer {
    client: Arc<dyn TelemetryClient>,
    fields: Arc<EnrichmentFields>,
}

impl<S: Subscriber> Layer<S> for TelemetryLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(TRANSPORT_TARGET) {
            return;
        }

        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let mut properties = visitor.fields;
        for (name, value) in self.fields.pairs() {
            properties.insert(name.to_string(), value);
        }

        self.client.send(TelemetryRecord {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            level: meta.level().to_string(),
            target: meta.target().to_string(),
            message: visitor.message,
            properties,
        });
    }
}

#[derive(Default)]
struct RecordVisitor {
    message: String,
    fields: BTreeMap<String, String>,
}

impl RecordVisitor {
    fn put(&mut self, field: &Field, value: String) {
        if field.name() == "message" {
            self.message = value;
        } else {
            self.fields.insert(field.name().to_string(), value);
        }
    }
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }
}
