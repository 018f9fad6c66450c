//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use tracemart::config::{ChaosMode, MeshConfig};
use tracemart::lifecycle::{Shutdown, Supervisor};
use tracemart::observability::context::TraceId;
use tracemart::observability::logging::MemoryWriter;
use tracemart::observability::sink::MemorySink;
use tracemart::services::NodeKind;

/// The three service nodes running in-process on ephemeral ports.
pub struct Mesh {
    pub config: MeshConfig,
    pub spans: Arc<MemorySink>,
    pub logs: Arc<MemoryWriter>,
    pub client: reqwest::Client,
    supervisor: Supervisor,
}

impl Mesh {
    /// Start with chaos off.
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    /// Start with chaos off, then apply `configure` before the nodes are built.
    pub async fn start_with(configure: impl FnOnce(&mut MeshConfig)) -> Self {
        let identity = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let catalog = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let orders = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let mut config = MeshConfig::default();
        config.chaos.mode = ChaosMode::Off;
        config.chaos.latency_scale = 0.0;
        config.timeouts.upstream_ms = 1_000;
        config.peers.identity_url = format!("http://{}", identity.local_addr().unwrap());
        config.peers.catalog_url = format!("http://{}", catalog.local_addr().unwrap());
        config.peers.orders_url = format!("http://{}", orders.local_addr().unwrap());
        configure(&mut config);

        let spans = Arc::new(MemorySink::new());
        let logs = Arc::new(MemoryWriter::new());
        let mut supervisor = Supervisor::new(Shutdown::new());

        for (kind, listener) in [
            (NodeKind::Identity, identity),
            (NodeKind::Catalog, catalog),
            (NodeKind::Orders, orders),
        ] {
            let telemetry = kind.telemetry(&config, spans.clone(), logs.clone());
            let server = kind.build(&config, telemetry).unwrap();
            supervisor.spawn(kind.to_string(), move |shutdown| async move {
                let _ = server.run(listener, shutdown).await;
            });
        }

        Self {
            config,
            spans,
            logs,
            client: reqwest::Client::builder().no_proxy().build().unwrap(),
            supervisor,
        }
    }

    pub fn identity_url(&self, path: &str) -> String {
        format!("{}{}", self.config.peers.identity_url, path)
    }

    pub fn catalog_url(&self, path: &str) -> String {
        format!("{}{}", self.config.peers.catalog_url, path)
    }

    pub fn orders_url(&self, path: &str) -> String {
        format!("{}{}", self.config.peers.orders_url, path)
    }

    pub async fn stop(self) {
        self.supervisor.stop(Duration::from_secs(5)).await;
    }
}

/// Trace id a node reported in its response headers.
pub fn response_trace_id(response: &reqwest::Response) -> TraceId {
    response.headers()["x-trace-id"].to_str().unwrap().parse().unwrap()
}

/// Read one HTTP/1.1 request (headers plus a Content-Length body).
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => n,
        };
        buf.extend_from_slice(&chunk[..n]);

        let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
            continue;
        };
        let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
        let length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        if buf.len() >= end + 4 + length {
            return;
        }
    }
}

/// Start a backend that answers every request with `status` and `body`.
pub async fn start_stub_backend(status: u16, body: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                read_request(&mut socket).await;
                let response = format!(
                    "HTTP/1.1 {} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status,
                    body.len(),
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    format!("http://{}", addr)
}

/// Start a backend that accepts connections and never answers.
pub async fn start_hanging_backend() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    format!("http://{}", addr)
}

/// A base URL nothing listens on.
pub async fn closed_port() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}
