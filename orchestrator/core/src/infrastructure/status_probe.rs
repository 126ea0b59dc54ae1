// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Remote Status Probe
//!
//! HTTP implementation of `ServerStatusProbe`: `GET http://{address}/status`
//! answered by the status API of the remote process.
//!
//! # Timeouts
//!
//! The whole round trip (connect, send, read body) is bounded by the caller's
//! timeout. Anything that does not produce a well-formed answer in time is
//! `Unreachable`; a response that arrives but cannot be understood is
//! `UnknownError`.

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::domain::config::WarpgateConfig;
use crate::domain::server_status::{ServerStatus, ServerStatusProbe, StatusReply};

pub const STATUS_PATH: &str = "/status";

/// Probe over plain HTTP with `reqwest`.
pub struct HttpStatusProbe {
    client: Client,
}

impl HttpStatusProbe {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().build()?;
        Ok(Self { client })
    }

    /// Probe wrapped in the unreachable backoff configured for this process.
    pub fn from_config(config: &WarpgateConfig) -> Result<BackoffProbe<Self>, reqwest::Error> {
        Ok(BackoffProbe::new(Self::new()?, config.unreachable_backoff))
    }

    fn build_url(address: &str) -> String {
        if address.starts_with("http://") || address.starts_with("https://") {
            format!("{}{}", address.trim_end_matches('/'), STATUS_PATH)
        } else {
            format!("http://{}{}", address, STATUS_PATH)
        }
    }

    async fn round_trip(&self, url: &str, timeout: Duration) -> ServerStatus {
        let response = match self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                debug!(url, error = %e, "Status probe got no response");
                return ServerStatus::Unreachable;
            }
            Err(e) => {
                warn!(url, error = %e, "Status probe failed");
                return ServerStatus::UnknownError;
            }
        };

        match response.status() {
            StatusCode::OK => {}
            StatusCode::SERVICE_UNAVAILABLE => return ServerStatus::Loading,
            status => {
                warn!(url, %status, "Status probe got unexpected HTTP status");
                return ServerStatus::UnknownError;
            }
        }

        match response.json::<StatusReply>().await {
            Ok(reply) => reply.status,
            Err(e) if e.is_timeout() => ServerStatus::Unreachable,
            Err(e) => {
                warn!(url, error = %e, "Status probe got a malformed reply");
                ServerStatus::UnknownError
            }
        }
    }
}

#[async_trait]
impl ServerStatusProbe for HttpStatusProbe {
    async fn query(&self, address: &str, timeout: Duration) -> ServerStatus {
        let url = Self::build_url(address);
        let status = tokio::time::timeout(timeout, self.round_trip(&url, timeout))
            .await
            .unwrap_or(ServerStatus::Unreachable);

        counter!("warpgate_status_probes_total", "status" => status.as_str()).increment(1);
        debug!(address, %status, "Status probe finished");
        status
    }
}

/// Answers `Unreachable` from cache for `backoff` after an address was
/// found unreachable, instead of probing it again.
pub struct BackoffProbe<P> {
    inner: P,
    backoff: Duration,
    unreachable_until: DashMap<String, Instant>,
}

impl<P: ServerStatusProbe> BackoffProbe<P> {
    pub fn new(inner: P, backoff: Duration) -> Self {
        Self {
            inner,
            backoff,
            unreachable_until: DashMap::new(),
        }
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    pub fn is_backing_off(&self, address: &str) -> bool {
        self.unreachable_until
            .get(address)
            .map(|until| Instant::now() < *until)
            .unwrap_or(false)
    }
}

#[async_trait]
impl<P: ServerStatusProbe> ServerStatusProbe for BackoffProbe<P> {
    async fn query(&self, address: &str, timeout: Duration) -> ServerStatus {
        if self.is_backing_off(address) {
            debug!(address, "Address is backing off, answering unreachable from cache");
            return ServerStatus::Unreachable;
        }

        let status = self.inner.query(address, timeout).await;
        if status == ServerStatus::Unreachable {
            self.unreachable_until
                .insert(address.to_string(), Instant::now() + self.backoff);
        } else {
            self.unreachable_until.remove(address);
        }
        status
    }
}
