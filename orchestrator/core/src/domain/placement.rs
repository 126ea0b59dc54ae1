// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Free Space Placement
//!
//! Provides the landing-point search used when structures arrive at a portal.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Find a point whose exclusion sphere overlaps no occupied
//!   volume, searching outward in rings from a random point on the portal sphere
//!
//! The protected zone around a portal (a safe-zone marker) is itself an
//! occupied volume; the search ignores that one marker so structures may land
//! inside the protected area.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::config::FreeSpaceSettings;
use crate::domain::geometry::{random_unit_vector, BoundingSphere, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeKind {
    Entity,
    ProtectedZone,
}

/// Space already taken near a landing site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OccupiedVolume {
    pub sphere: BoundingSphere,
    pub kind: VolumeKind,
}

impl OccupiedVolume {
    pub fn entity(sphere: BoundingSphere) -> Self {
        Self {
            sphere,
            kind: VolumeKind::Entity,
        }
    }

    pub fn protected_zone(sphere: BoundingSphere) -> Self {
        Self {
            sphere,
            kind: VolumeKind::ProtectedZone,
        }
    }
}

/// The protected-zone marker overlapping `area`, if any.
pub fn protected_zone_in(area: &BoundingSphere, occupied: &[OccupiedVolume]) -> Option<BoundingSphere> {
    occupied
        .iter()
        .filter(|v| v.kind == VolumeKind::ProtectedZone)
        .map(|v| v.sphere)
        .find(|zone| zone.intersects(area) || area.contains(&zone.center))
}

#[derive(Debug, Clone, Copy)]
pub struct FreeSpaceFinder {
    settings: FreeSpaceSettings,
}

impl FreeSpaceFinder {
    pub fn new(settings: FreeSpaceSettings) -> Self {
        Self { settings }
    }

    /// Finds a position for a group with bounding radius `excluded_radius`.
    ///
    /// Tests the random base point first, then `rings` rings at distance
    /// `ring * step * excluded_radius` from it with `attempts_per_ring`
    /// random directions each. Returns `None` when the budget is exhausted.
    pub fn find_free_position<R: Rng + ?Sized>(
        &self,
        center: &BoundingSphere,
        excluded_radius: f64,
        protected_zone: Option<&BoundingSphere>,
        occupied: &[OccupiedVolume],
        rng: &mut R,
    ) -> Option<Position> {
        let base = center.random_surface_point(rng);
        let blocking: Vec<&BoundingSphere> = occupied
            .iter()
            .filter(|v| !(v.kind == VolumeKind::ProtectedZone && Some(&v.sphere) == protected_zone))
            .map(|v| &v.sphere)
            .collect();

        let is_free = |candidate: Position| {
            let exclusion = BoundingSphere::new(candidate, excluded_radius);
            !blocking.iter().any(|sphere| sphere.intersects(&exclusion))
        };

        if is_free(base) {
            return Some(base);
        }

        // A zero radius still needs to move away from the base point.
        let unit = if excluded_radius > 0.0 { excluded_radius } else { 1.0 };

        for ring in 1..=self.settings.rings {
            let distance = ring as f64 * self.settings.step * unit;
            for _ in 0..self.settings.attempts_per_ring {
                let candidate = base + random_unit_vector(rng) * distance;
                if is_free(candidate) {
                    debug!(ring, distance, "Found free position");
                    return Some(candidate);
                }
            }
        }

        debug!(
            rings = self.settings.rings,
            attempts_per_ring = self.settings.attempts_per_ring,
            "Free space search exhausted"
        );
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn finder() -> FreeSpaceFinder {
        FreeSpaceFinder::new(FreeSpaceSettings::default())
    }

    #[test]
    fn test_empty_space_returns_point_on_sphere() {
        let mut rng = StdRng::seed_from_u64(1);
        let gate = BoundingSphere::new(Position::new(500.0, 0.0, 0.0), 180.0);
        let pos = finder()
            .find_free_position(&gate, 40.0, None, &[], &mut rng)
            .unwrap();
        assert!(((pos - gate.center).norm() - 180.0).abs() < 1e-6);
    }

    #[test]
    fn test_never_overlaps_occupied_volumes() {
        let gate = BoundingSphere::new(Position::zeros(), 180.0);
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            let occupied: Vec<OccupiedVolume> = (0..12)
                .map(|_| {
                    let center = gate.random_surface_point(&mut rng)
                        + random_unit_vector(&mut rng) * rng.random_range(0.0..60.0);
                    OccupiedVolume::entity(BoundingSphere::new(center, rng.random_range(5.0..80.0)))
                })
                .collect();
            let radius = rng.random_range(1.0..50.0);

            if let Some(pos) = finder().find_free_position(&gate, radius, None, &occupied, &mut rng) {
                let exclusion = BoundingSphere::new(pos, radius);
                assert!(
                    occupied.iter().all(|v| !v.sphere.intersects(&exclusion)),
                    "seed {} produced an overlapping placement",
                    seed
                );
            }
        }
    }

    #[test]
    fn test_exhausted_budget_returns_none() {
        let mut rng = StdRng::seed_from_u64(3);
        let gate = BoundingSphere::new(Position::zeros(), 100.0);
        let wall = [OccupiedVolume::entity(BoundingSphere::new(Position::zeros(), 1.0e6))];
        assert!(finder()
            .find_free_position(&gate, 10.0, None, &wall, &mut rng)
            .is_none());
    }

    #[test]
    fn test_protected_zone_marker_does_not_block() {
        let mut rng = StdRng::seed_from_u64(4);
        let gate = BoundingSphere::new(Position::zeros(), 100.0);
        let zone = BoundingSphere::new(Position::zeros(), 1.0e5);
        let occupied = [OccupiedVolume::protected_zone(zone)];

        let protected = protected_zone_in(&gate, &occupied);
        assert_eq!(protected, Some(zone));
        assert!(finder()
            .find_free_position(&gate, 10.0, protected.as_ref(), &occupied, &mut rng)
            .is_some());

        // Without the override the marker is an obstacle like any other.
        assert!(finder()
            .find_free_position(&gate, 10.0, None, &occupied, &mut rng)
            .is_none());
    }
}
