//! Function logger host.
//!
//! Loads settings from an optional TOML file overlaid by the environment,
//! starts the logging pipeline, and drains it when the process is asked to
//! exit.
//!
//! ```text
//! settings.toml ─┐
//!                ├─▶ LayeredSource ─▶ LifecycleController ─▶ Pipeline
//! environment ───┘                          │                   ├─ console
//!                                           │                   ├─ rolling file
//!                                           │                   └─ telemetry
//!                     SIGTERM/SIGINT ───────┘ shutdown: flush → wait → close
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use function_logger::config::loader::load_layered;
use function_logger::lifecycle::signals::spawn_exit_hook;
use function_logger::observability::metrics::init_metrics;
use function_logger::{LifecycleController, ShutdownOptions};

#[derive(Debug, Parser)]
#[command(name = "function-logger", version, about = "Logging pipeline host")]
struct Cli {
    /// TOML settings file; environment variables override it.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Application name attached to every record.
    #[arg(long)]
    app_name: Option<String>,

    /// Grace period after the telemetry flush, in milliseconds.
    #[arg(long, default_value_t = 3500)]
    grace_ms: u64,

    /// Serve delivery metrics for Prometheus on this address.
    #[arg(long)]
    metrics_address: Option<SocketAddr>,

    /// Start, log once, and shut down without waiting for a signal.
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let source = match load_layered(cli.config.as_deref()) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("function-logger: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut controller = LifecycleController::new(source).with_shutdown_options(ShutdownOptions {
        grace_period: Duration::from_millis(cli.grace_ms),
        ..ShutdownOptions::default()
    });
    if let Some(name) = cli.app_name {
        controller = controller.with_application_name(name);
    }
    let controller = Arc::new(controller);

    // Build failures are already on stderr.
    let pipeline = match controller.startup().await {
        Ok(pipeline) => pipeline,
        Err(_) => return ExitCode::FAILURE,
    };
    if let Err(e) = pipeline.install_global() {
        eprintln!("function-logger: {e}");
    }

    if let Some(addr) = cli.metrics_address {
        init_metrics(addr);
    }

    tracing::info!(
        sinks = ?pipeline.sinks(),
        grace_ms = cli.grace_ms,
        "Logging pipeline ready"
    );

    // Shutdown problems are reported on stderr; the exit status stays clean.
    if cli.once {
        controller.shutdown().await;
    } else if let Err(e) = spawn_exit_hook(Arc::clone(&controller)).await {
        eprintln!("function-logger: exit hook failed: {e}");
        controller.shutdown().await;
    }

    ExitCode::SUCCESS
}
