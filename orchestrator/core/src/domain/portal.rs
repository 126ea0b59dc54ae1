// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Portal
//!
//! Provides the named, positioned spatial gate and the destinations it allows.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Immutable runtime view of configured gates (see `domain::config`)

use serde::{Deserialize, Serialize};

use crate::domain::geometry::{BoundingSphere, Position};

/// One destination a portal allows, as configured by the operator.
///
/// `id` is the key a player picks on the device; it is unique per portal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AllowedDestination {
    /// Another gate, hosted locally or by a remote process.
    Gate {
        id: String,
        #[serde(default)]
        display_name: String,
        gate: String,
    },
    /// A raw coordinate in `GPS:name:x:y:z:` form.
    Coordinate {
        id: String,
        #[serde(default)]
        display_name: String,
        gps: String,
    },
}

impl AllowedDestination {
    pub fn id(&self) -> &str {
        match self {
            AllowedDestination::Gate { id, .. } | AllowedDestination::Coordinate { id, .. } => id,
        }
    }

    pub fn display_name(&self) -> &str {
        let (id, display_name) = match self {
            AllowedDestination::Gate { id, display_name, .. }
            | AllowedDestination::Coordinate { id, display_name, .. } => (id, display_name),
        };
        if display_name.is_empty() {
            id
        } else {
            display_name
        }
    }
}

/// Parses a `GPS:name:x:y:z:` coordinate string.
///
/// Trailing segments after `z` (colour, description) are ignored.
pub fn parse_gps(text: &str) -> Option<Position> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if parts.len() < 5 || parts[0] != "GPS" {
        return None;
    }
    let x = parts[2].trim().parse::<f64>().ok()?;
    let y = parts[3].trim().parse::<f64>().ok()?;
    let z = parts[4].trim().parse::<f64>().ok()?;
    [x, y, z]
        .iter()
        .all(|v| v.is_finite())
        .then(|| Position::new(x, y, z))
}

/// A named spatial gate. Name is the unique, case-sensitive key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portal {
    pub name: String,
    pub position: Position,
    pub radius: f64,
    pub destinations: Vec<AllowedDestination>,
}

impl Portal {
    pub fn capture_sphere(&self) -> BoundingSphere {
        BoundingSphere::new(self.position, self.radius)
    }

    pub fn destination(&self, id: &str) -> Option<&AllowedDestination> {
        self.destinations.iter().find(|d| d.id() == id)
    }

    pub fn destination_ids(&self) -> Vec<String> {
        self.destinations.iter().map(|d| d.id().to_string()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gps() {
        assert_eq!(
            parse_gps("GPS:Outpost:100.5:-20:3e3:#FF75C9F1:"),
            Some(Position::new(100.5, -20.0, 3000.0))
        );
        assert_eq!(parse_gps("GPS:Outpost:1:2:3"), Some(Position::new(1.0, 2.0, 3.0)));
        assert_eq!(parse_gps("GPS:Outpost:1:2"), None);
        assert_eq!(parse_gps("XYZ:Outpost:1:2:3:"), None);
        assert_eq!(parse_gps("GPS:Outpost:one:2:3:"), None);
        assert_eq!(parse_gps("GPS:Outpost:NaN:2:3:"), None);
    }

    #[test]
    fn test_display_name_falls_back_to_id() {
        let dest = AllowedDestination::Gate {
            id: "beta".to_string(),
            display_name: String::new(),
            gate: "Beta".to_string(),
        };
        assert_eq!(dest.display_name(), "beta");
    }

    #[test]
    fn test_destination_lookup() {
        let portal = Portal {
            name: "Alpha".to_string(),
            position: Position::zeros(),
            radius: 180.0,
            destinations: vec![AllowedDestination::Coordinate {
                id: "home".to_string(),
                display_name: "Home".to_string(),
                gps: "GPS:Home:0:0:0:".to_string(),
            }],
        };
        assert!(portal.destination("home").is_some());
        assert!(portal.destination("Home").is_none());
        assert_eq!(portal.destination_ids(), vec!["home".to_string()]);
    }
}
