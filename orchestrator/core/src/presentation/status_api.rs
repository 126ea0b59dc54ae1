// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Status API
//!
//! Answers the capacity probes of other processes (`GET /status`) and exposes
//! health and Prometheus metrics.
//!
//! `/status` replies `200 {"status": "accept" | "full"}` normally and
//! `503 {"status": "loading"}` while this process is still starting, which
//! probes map to `Loading` even when they cannot read the body.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::domain::server_status::{ServerStatus, StatusReply};
use crate::domain::world::CapacityReporter;

/// Capacity derived from the online player count.
#[derive(Debug, Default)]
pub struct PlayerCapacity {
    max_players: Option<u32>,
    online: AtomicU32,
    ready: AtomicBool,
}

impl PlayerCapacity {
    pub fn new(max_players: Option<u32>) -> Self {
        Self {
            max_players,
            online: AtomicU32::new(0),
            ready: AtomicBool::new(false),
        }
    }

    pub fn set_online(&self, players: u32) {
        self.online.store(players, Ordering::Relaxed);
    }

    /// Stops answering `loading`.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }
}

impl CapacityReporter for PlayerCapacity {
    fn current_status(&self) -> ServerStatus {
        if !self.ready.load(Ordering::Acquire) {
            return ServerStatus::Loading;
        }
        match self.max_players {
            Some(max) if self.online.load(Ordering::Relaxed) >= max => ServerStatus::Full,
            _ => ServerStatus::Accept,
        }
    }
}

pub struct StatusApiState {
    pub capacity: Arc<dyn CapacityReporter>,
    pub metrics: Option<PrometheusHandle>,
}

pub fn app(capacity: Arc<dyn CapacityReporter>, metrics: Option<PrometheusHandle>) -> Router {
    let state = Arc::new(StatusApiState { capacity, metrics });

    Router::new()
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Serves the status API until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!("Status API listening on {}", addr);
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn status_handler(State(state): State<Arc<StatusApiState>>) -> Response {
    let status = state.capacity.current_status();
    let code = match status {
        ServerStatus::Loading => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (code, Json(StatusReply { status })).into_response()
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn metrics_handler(State(state): State<Arc<StatusApiState>>) -> Response {
    match &state.metrics {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed").into_response(),
    }
}
