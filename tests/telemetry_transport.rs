mod common;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use common::{controller, start_mock_ingestion, start_silent_ingestion, CaptureWriter};
use function_logger::config::{MapSource, TelemetryConnection};
use function_logger::lifecycle::WaitOutcome;
use function_logger::observability::transport::{HttpTelemetryClient, TransportOptions};
use function_logger::observability::{FlushError, TelemetryClient, TelemetryRecord};
use function_logger::{PipelineState, ShutdownOptions, SinkKind, SinkRegistry};

fn record(message: &str) -> TelemetryRecord {
    TelemetryRecord {
        id: uuid::Uuid::new_v4(),
        timestamp: chrono::Utc::now(),
        level: "INFO".into(),
        target: "telemetry_transport".into(),
        message: message.into(),
        properties: BTreeMap::new(),
    }
}

fn connection(url: &str) -> TelemetryConnection {
    TelemetryConnection::parse(&format!("InstrumentationKey=ik-9;IngestionEndpoint={url}")).unwrap()
}

#[tokio::test]
async fn test_flush_ships_pending_batch() {
    let server = start_mock_ingestion(200).await;
    let client = HttpTelemetryClient::spawn(&connection(&server.url())).unwrap();

    client.send(record("first"));
    client.send(record("second"));
    client.flush().await.unwrap();

    let bodies = server.bodies();
    assert_eq!(bodies.len(), 1);
    let envelope: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
    assert_eq!(envelope["instrumentationKey"], "ik-9");
    let records = envelope["records"].as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["message"], "first");
    assert_eq!(records[1]["message"], "second");

    client.close().await;
}

#[tokio::test]
async fn test_full_batch_ships_without_flush() {
    let server = start_mock_ingestion(200).await;
    let options = TransportOptions {
        max_batch_size: 2,
        send_interval: Duration::from_secs(60),
        ..TransportOptions::default()
    };
    let client = HttpTelemetryClient::spawn_with(&connection(&server.url()), options).unwrap();

    for n in 0..3 {
        client.send(record(&format!("record {n}")));
    }
    client.flush().await.unwrap();

    let bodies = server.bodies();
    assert_eq!(bodies.len(), 2);
    assert!(bodies[0].contains("record 0") && bodies[0].contains("record 1"));
    assert!(bodies[1].contains("record 2"));

    client.close().await;
}

#[tokio::test]
async fn test_rejected_batch_is_a_transport_error() {
    let server = start_mock_ingestion(500).await;
    let client = HttpTelemetryClient::spawn(&connection(&server.url())).unwrap();

    client.send(record("lost"));
    let err = client.flush().await.unwrap_err();
    assert!(matches!(err, FlushError::Transport(_)));

    // Not retried.
    assert_eq!(client.flush().await, Ok(()));
    assert_eq!(server.bodies().len(), 1);

    client.close().await;
}

#[tokio::test]
async fn test_shutdown_delivers_final_records() {
    let server = start_mock_ingestion(200).await;
    let source = MapSource::new()
        .with("FunctionLogger.IsActive", "true")
        .with(
            "Telemetry.ConnectionString",
            format!("InstrumentationKey=ik-9;IngestionEndpoint={}", server.url()),
        );
    let controller = controller(
        source,
        SinkRegistry::new().with_console_writer(CaptureWriter::default()),
    );

    let pipeline = controller.startup().await.unwrap();
    assert!(pipeline.has_sink(SinkKind::Telemetry));
    pipeline.in_scope(|| tracing::info!(desk = "rates", "Order booked"));

    let report = controller.shutdown().await;
    assert!(report.is_clean());

    let shipped = server.bodies().concat();
    assert!(shipped.contains("Starting logging"));
    assert!(shipped.contains("Order booked"));
    assert!(shipped.contains("Application shutting down."));
    assert!(shipped.contains("\"application_name\":\"integration\""));
}

#[tokio::test]
async fn test_close_aborts_request_in_flight() {
    let addr = start_silent_ingestion().await;
    let client = HttpTelemetryClient::spawn(&connection(&format!("http://{addr}/"))).unwrap();

    client.send(record("never answered"));
    let flushed = tokio::time::timeout(Duration::from_millis(100), client.flush()).await;
    assert!(flushed.is_err());

    tokio::time::timeout(Duration::from_secs(1), client.close())
        .await
        .unwrap();
    assert_eq!(client.flush().await, Err(FlushError::Disconnected));
}

#[tokio::test]
async fn test_full_queue_drops_instead_of_blocking() {
    let addr = start_silent_ingestion().await;
    let options = TransportOptions {
        max_batch_size: 1,
        queue_capacity: 1,
        ..TransportOptions::default()
    };
    let client =
        HttpTelemetryClient::spawn_with(&connection(&format!("http://{addr}/")), options).unwrap();

    let started = Instant::now();
    for n in 0..1_000 {
        client.send(record(&format!("record {n}")));
    }
    assert!(started.elapsed() < Duration::from_secs(1));

    tokio::time::timeout(Duration::from_secs(1), client.close())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_shutdown_against_silent_backend_is_bounded() {
    let addr = start_silent_ingestion().await;
    let source = MapSource::new()
        .with("FunctionLogger.IsActive", "true")
        .with(
            "Telemetry.ConnectionString",
            format!("InstrumentationKey=ik-9;IngestionEndpoint=http://{addr}/"),
        );
    let flush_timeout = Duration::from_millis(200);
    let controller = controller(
        source,
        SinkRegistry::new().with_console_writer(CaptureWriter::default()),
    )
    .with_shutdown_options(ShutdownOptions {
        grace_period: Duration::from_millis(50),
        flush_timeout,
    });
    controller.startup().await.unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let started = Instant::now();
    let report = controller.shutdown_with(cancel).await;

    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(report.flush_error, Some(FlushError::Timeout(flush_timeout)));
    assert_eq!(report.wait, Some(WaitOutcome::Cancelled));
    assert_eq!(controller.state(), PipelineState::Closed);
}
