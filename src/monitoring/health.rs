//! Metrics snapshot HTTP endpoint.
//!
//! A tiny localhost HTTP server that returns the monitor's current
//! snapshot as JSON. Used by external uptime checks and ad-hoc curl.

use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::monitoring::metrics::PerformanceMonitor;

/// Spawn the metrics HTTP server. Returns a handle that can be aborted.
pub fn spawn_metrics_server(monitor: Arc<PerformanceMonitor>, port: u16) -> JoinHandle<()> {
    tokio::spawn(async move {
        let addr = format!("127.0.0.1:{port}");
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => {
                info!(addr, "Metrics server listening");
                l
            }
            Err(e) => {
                warn!(error = %e, addr, "Failed to bind metrics server, continuing without it");
                return;
            }
        };

        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, "Failed to accept metrics connection");
                    continue;
                }
            };

            let monitor = monitor.clone();
            tokio::spawn(async move {
                // Drain the request; contents are irrelevant.
                let mut buf = [0u8; 1024];
                let _ = tokio::io::AsyncReadExt::read(&mut socket, &mut buf).await;

                let snapshot = monitor.snapshot();
                let body = serde_json::to_string(&snapshot).unwrap_or_else(|_| {
                    r#"{"status":"error","message":"serialization failed"}"#.to_string()
                });

                let response = format!(
                    "HTTP/1.1 200 OK\r\n\
                     Content-Type: application/json\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\
                     \r\n\
                     {}",
                    body.len(),
                    body
                );

                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    })
}
