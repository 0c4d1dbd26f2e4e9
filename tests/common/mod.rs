//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tracing_subscriber::fmt::MakeWriter;

use function_logger::config::MapSource;
use function_logger::observability::{FlushError, TelemetryClient, TelemetryRecord};
use function_logger::{LifecycleController, ShutdownOptions, SinkRegistry};

/// Telemetry client double that records everything it is asked to do.
#[derive(Default)]
pub struct RecordingClient {
    pub records: Mutex<Vec<TelemetryRecord>>,
    pub flushes: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_flush: bool,
    pub hang_close: bool,
}

impl RecordingClient {
    pub fn failing() -> Self {
        Self {
            fail_flush: true,
            ..Self::default()
        }
    }

    /// A client whose `close` never returns.
    pub fn stuck_on_close() -> Self {
        Self {
            hang_close: true,
            ..Self::default()
        }
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn messages(&self) -> Vec<String> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.message.clone())
            .collect()
    }
}

#[async_trait]
impl TelemetryClient for RecordingClient {
    fn send(&self, record: TelemetryRecord) {
        self.records.lock().unwrap().push(record);
    }

    async fn flush(&self) -> Result<(), FlushError> {
        self.flushes.fetch_add(1, Ordering::SeqCst);
        if self.fail_flush {
            return Err(FlushError::Transport("backend unavailable".into()));
        }
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.hang_close {
            std::future::pending::<()>().await;
        }
    }
}

/// Registry whose telemetry sink is `client`, counting factory invocations.
pub fn registry_with_client(
    client: Arc<RecordingClient>,
    builds: Arc<AtomicUsize>,
    console: CaptureWriter,
) -> SinkRegistry {
    SinkRegistry::new()
        .with_console_writer(console)
        .with_client_factory(move |_| {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(client.clone() as Arc<dyn TelemetryClient>)
        })
}

/// Controller with a short grace period and captured console output.
pub fn controller(source: MapSource, registry: SinkRegistry) -> LifecycleController {
    LifecycleController::new(source)
        .with_application_name("integration")
        .with_registry(registry)
        .with_shutdown_options(ShutdownOptions {
            grace_period: Duration::from_millis(20),
            ..ShutdownOptions::default()
        })
}

/// In-memory console.
#[derive(Clone, Default)]
pub struct CaptureWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl CaptureWriter {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.contents().lines().map(str::to_string).collect()
    }
}

impl io::Write for CaptureWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CaptureWriter {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Mock ingestion endpoint. Answers every POST with `status` and keeps the
/// request bodies.
pub struct MockIngestion {
    pub addr: SocketAddr,
    pub bodies: Arc<Mutex<Vec<String>>>,
}

impl MockIngestion {
    pub fn url(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }
}

pub async fn start_mock_ingestion(status: u16) -> MockIngestion {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let bodies = Arc::new(Mutex::new(Vec::new()));
    let seen = bodies.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let seen = seen.clone();
                    tokio::spawn(async move {
                        let mut reader = BufReader::new(socket);
                        let mut content_length = 0usize;
                        loop {
                            let mut line = String::new();
                            if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                                return;
                            }
                            let line = line.trim_end();
                            if line.is_empty() {
                                break;
                            }
                            if let Some((name, value)) = line.split_once(':') {
                                if name.eq_ignore_ascii_case("content-length") {
                                    content_length = value.trim().parse().unwrap_or(0);
                                }
                            }
                        }

                        let mut body = vec![0u8; content_length];
                        if reader.read_exact(&mut body).await.is_err() {
                            return;
                        }
                        seen.lock()
                            .unwrap()
                            .push(String::from_utf8_lossy(&body).into_owned());

                        let status_text = match status {
                            200 => "200 OK",
                            400 => "400 Bad Request",
                            500 => "500 Internal Server Error",
                            503 => "503 Service Unavailable",
                            _ => "200 OK",
                        };
                        let response = format!(
                            "HTTP/1.1 {status_text}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                        );
                        let mut socket = reader.into_inner();
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockIngestion { addr, bodies }
}

/// Ingestion endpoint that accepts connections and never answers.
pub async fn start_silent_ingestion() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _held = socket;
                tokio::time::sleep(Duration::from_secs(3600)).await;
            });
        }
    });

    addr
}
