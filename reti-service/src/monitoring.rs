// Copyright (c) Zefchain Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

use axum::{http::StatusCode, routing::get, Router};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Serves `/ready` and `/metrics` until `shutdown_signal` fires.
pub fn start_monitoring(port: u16, shutdown_signal: CancellationToken) -> JoinHandle<()> {
    let app = Router::new()
        .route("/ready", get(|| async { "ready" }))
        .route("/metrics", get(serve_metrics));

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
            .await
            .expect("Failed to bind monitoring port");
        let address = listener.local_addr().expect("Failed to get local address");

        info!(%address, "serving /ready and /metrics");
        if let Err(error) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal.cancelled_owned())
            .await
        {
            panic!("Error serving metrics: {}", error);
        }
    })
}

async fn serve_metrics() -> Result<String, (StatusCode, String)> {
    let metric_families = prometheus::gather();
    prometheus::TextEncoder::new()
        .encode_to_string(&metric_families)
        .map_err(|error| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Something went wrong: {error}"),
            )
        })
}
