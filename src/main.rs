//! tracemart: a synthetic e-commerce service mesh that emits correlated traces and logs.
//!
//! # Architecture Overview
//!
//! ```text
//!   ┌───────────────────┐      ┌──────────────────────────────────────────────┐
//!   │ traffic-generator │      │                 service nodes                │
//!   │                   │      │                                              │
//!   │  scenario loops ──┼─────▶│  order-service ──▶ user-service              │
//!   │  health loop      │      │        │                │                    │
//!   │                   │      │        └──────▶ product-service ◀───┘        │
//!   └─────────┬─────────┘      └──────────────────────┬───────────────────────┘
//!             │                                       │
//!             ▼                                       ▼
//!   ┌──────────────────────────────────────────────────────────────────────────┐
//!   │ observability: trace context headers, span exporter (NDJSON),            │
//!   │ correlated logs (stdout), tracing (stderr), Prometheus metrics           │
//!   └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One binary runs any single role, or every role in one process.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use tracemart::config::{load_config, MeshConfig};
use tracemart::generator::{self, Generator};
use tracemart::lifecycle::{wait_for_signal, Shutdown, Supervisor};
use tracemart::observability::logging::{init_logging, CorrelatedLogger, LogWriter, StdoutWriter};
use tracemart::observability::metrics::init_metrics;
use tracemart::observability::sink::{span_pipeline, SpanDestination, SpanSink};
use tracemart::observability::span::SpanRecorder;
use tracemart::services::activity::{sources_for, ActivitySimulator};
use tracemart::services::NodeKind;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(name = "tracemart")]
#[command(about = "Synthetic e-commerce service mesh for distributed tracing", long_about = None)]
struct Cli {
    /// Path to a TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(value_enum)]
    role: Role,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Role {
    Identity,
    Catalog,
    Orders,
    Generator,
    All,
}

impl Role {
    fn nodes(self) -> Vec<NodeKind> {
        match self {
            Role::Identity => vec![NodeKind::Identity],
            Role::Catalog => vec![NodeKind::Catalog],
            Role::Orders => vec![NodeKind::Orders],
            Role::Generator => Vec::new(),
            Role::All => NodeKind::ALL.to_vec(),
        }
    }

    fn runs_generator(self) -> bool {
        matches!(self, Role::Generator | Role::All)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // 1. Configuration
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => MeshConfig::default(),
    };

    // 2. Ambient logging and metrics
    init_logging(&config.observability);
    tracing::info!(role = ?cli.role, "tracemart v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    // 3. Span export runs under its own shutdown so it outlives every producer.
    let (span_sink, exporter) = span_pipeline(
        SpanDestination::from_setting(&config.observability.span_sink),
        config.observability.span_buffer,
    );
    let mut export_supervisor = Supervisor::new(Shutdown::new());
    export_supervisor.spawn("span-exporter", move |shutdown| async move {
        if let Err(e) = exporter.run(shutdown).await {
            tracing::error!(error = %e, "Span exporter failed");
        }
    });

    let sink: Arc<dyn SpanSink> = span_sink;
    let writer: Arc<dyn LogWriter> = Arc::new(StdoutWriter);
    let shutdown = Shutdown::new();
    let mut stopped = shutdown.subscribe();
    let mut supervisor = Supervisor::new(shutdown.clone());

    // 4. Service nodes
    for kind in cli.role.nodes() {
        let telemetry = kind.telemetry(&config, sink.clone(), writer.clone());
        let logger = telemetry.logger.clone();
        let server = kind.build(&config, telemetry)?;

        let listener = TcpListener::bind(kind.bind_address(&config)).await?;
        tracing::info!(service = %kind, address = %listener.local_addr()?, "Listening for connections");

        supervisor.spawn(format!("server:{}", kind), move |shutdown| async move {
            if let Err(e) = server.run(listener, shutdown).await {
                tracing::error!(service = %kind, error = %e, "HTTP server failed");
            }
        });

        if config.activity.enabled {
            let period = Duration::from_secs(config.activity.interval_secs.max(1));
            for (name, source) in sources_for(kind.service_name()) {
                let simulator = ActivitySimulator::new(name, logger.clone(), period, source);
                supervisor.spawn(format!("activity:{}:{}", kind, name), move |shutdown| simulator.run(shutdown));
            }
        }
    }

    tokio::spawn(wait_for_signal(shutdown.clone()));

    // 5. Workload generator, once every node answers /health
    if cli.role.runs_generator() && config.generator.enabled {
        let generator = Arc::new(Generator::new(
            &config,
            SpanRecorder::new(generator::SERVICE_NAME, sink.clone()),
            CorrelatedLogger::new(generator::SERVICE_NAME, writer.clone()),
        )?);

        let mut ready_shutdown = shutdown.subscribe();
        if generator.wait_until_ready(&mut ready_shutdown).await {
            generator.spawn_loops(&mut supervisor);
            tracing::info!(loops = generator.loops().len(), "Traffic generator started");
        }
    }

    tracing::info!(tasks = ?supervisor.task_names(), "All tasks started");
    let _ = stopped.recv().await;

    // 6. Drain: producers first, then the exporter.
    supervisor.stop(SHUTDOWN_GRACE).await;
    drop(sink);
    export_supervisor.stop(SHUTDOWN_GRACE).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
