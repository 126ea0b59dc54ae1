// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Acceptance state of a remote process, as answered to a capacity probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerStatus {
    Accept,
    Full,
    Unreachable,
    Loading,
    UnknownError,
}

impl ServerStatus {
    /// Only `Accept` lets a jump proceed.
    pub fn is_accept(&self) -> bool {
        matches!(self, ServerStatus::Accept)
    }

    /// Message shown to the acting player when a jump is refused.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            ServerStatus::Accept => None,
            ServerStatus::Full => Some("Destination server is FULL!"),
            ServerStatus::Unreachable => Some("Destination server is not responding!"),
            ServerStatus::Loading => Some("Destination server is in loading, please wait."),
            ServerStatus::UnknownError => {
                Some("Unknown error while checking the destination server, please try again.")
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ServerStatus::Accept => "accept",
            ServerStatus::Full => "full",
            ServerStatus::Unreachable => "unreachable",
            ServerStatus::Loading => "loading",
            ServerStatus::UnknownError => "unknown_error",
        }
    }
}

impl std::fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of a status response: `{"status": "accept"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: ServerStatus,
}

/// Out-of-band capacity query of a remote process.
///
/// Never fails: connection errors and timeouts resolve to `Unreachable`,
/// malformed answers to `UnknownError`.
#[async_trait]
pub trait ServerStatusProbe: Send + Sync {
    async fn query(&self, address: &str, timeout: Duration) -> ServerStatus;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_refusal_has_a_distinct_message() {
        let refusals = [
            ServerStatus::Full,
            ServerStatus::Unreachable,
            ServerStatus::Loading,
            ServerStatus::UnknownError,
        ];
        let messages: std::collections::HashSet<&str> =
            refusals.iter().filter_map(|s| s.user_message()).collect();
        assert_eq!(messages.len(), refusals.len());
        assert!(ServerStatus::Accept.user_message().is_none());
    }

    #[test]
    fn test_reply_wire_shape() {
        let json = serde_json::to_string(&StatusReply { status: ServerStatus::Full }).unwrap();
        assert_eq!(json, r#"{"status":"full"}"#);
        let parsed: StatusReply = serde_json::from_str(r#"{"status":"accept"}"#).unwrap();
        assert!(parsed.status.is_accept());
    }
}
