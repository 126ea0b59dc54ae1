// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Destination
//!
//! Resolved jump targets and the request/reply document exchanged through a
//! jump device's custom data.
//!
//! A client-side picker writes a request with `plugin_request = true` and the
//! chosen `destination` id. The host answers on the same surface with
//! `plugin_request = false` and the current list of allowed destination ids,
//! so the picker can refresh.

use serde::{Deserialize, Serialize};

use crate::domain::geometry::Position;

/// Where a jump goes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Destination {
    /// A portal hosted by this process; handled as an in-place move.
    Local { portal: String },
    /// A portal hosted by another process at `address` (`host:port`).
    Remote { portal: String, address: String },
    RawCoordinate { position: Position },
}

impl Destination {
    pub fn is_remote(&self) -> bool {
        matches!(self, Destination::Remote { .. })
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Local { portal } => write!(f, "{}", portal),
            Destination::Remote { portal, address } => write!(f, "{}@{}", portal, address),
            Destination::RawCoordinate { position } => {
                write!(f, "({:.0}, {:.0}, {:.0})", position.x, position.y, position.z)
            }
        }
    }
}

/// Outcome of destination resolution for one device.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedDestination {
    /// Allowed-destination id the player picked (or auto-send chose).
    pub destination_id: String,
    pub display_name: String,
    pub destination: Destination,
}

/// Request/reply document stored in a jump device's custom data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationRequest {
    #[serde(default)]
    pub plugin_request: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,

    #[serde(default)]
    pub destinations: Vec<String>,
}

impl DestinationRequest {
    /// Parses custom data; anything that is not a request document yields `None`.
    pub fn parse(custom_data: &str) -> Option<Self> {
        if custom_data.trim().is_empty() {
            return None;
        }
        serde_json::from_str(custom_data).ok()
    }

    pub fn reply(destinations: Vec<String>) -> Self {
        Self {
            plugin_request: false,
            destination: None,
            destinations,
        }
    }

    /// The requested destination id, if this is a pending picker request.
    pub fn requested(&self) -> Option<&str> {
        if !self.plugin_request {
            return None;
        }
        self.destination
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }

    pub fn to_custom_data(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_request() {
        let request =
            DestinationRequest::parse(r#"{"plugin_request":true,"destination":" beta "}"#).unwrap();
        assert_eq!(request.requested(), Some("beta"));
        assert!(request.destinations.is_empty());
    }

    #[test]
    fn test_reply_is_not_a_request() {
        let reply = DestinationRequest::reply(vec!["beta".to_string(), "home".to_string()]);
        let data = reply.to_custom_data().unwrap();
        let parsed = DestinationRequest::parse(&data).unwrap();
        assert_eq!(parsed, reply);
        assert_eq!(parsed.requested(), None);
    }

    #[test]
    fn test_non_request_custom_data() {
        assert!(DestinationRequest::parse("").is_none());
        assert!(DestinationRequest::parse("[Drive]\nname=Main").is_none());
    }
}
