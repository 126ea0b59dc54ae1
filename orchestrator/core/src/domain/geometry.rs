// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Geometry
//!
//! Spatial value objects shared by portals, structures and placement.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Bounding spheres and random directions over `nalgebra` vectors

use nalgebra::{UnitQuaternion, Vector3};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// World-space position in metres.
pub type Position = Vector3<f64>;

/// World-space orientation.
pub type Orientation = UnitQuaternion<f64>;

/// Sphere used for portal capture areas, exclusion checks and group bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingSphere {
    pub center: Position,
    pub radius: f64,
}

impl BoundingSphere {
    pub fn new(center: Position, radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn contains(&self, point: &Position) -> bool {
        (point - self.center).norm_squared() <= self.radius * self.radius
    }

    /// Strict overlap; spheres that only touch do not intersect.
    pub fn intersects(&self, other: &BoundingSphere) -> bool {
        let reach = self.radius + other.radius;
        (other.center - self.center).norm_squared() < reach * reach
    }

    /// Smallest sphere centred on `self.center` that also encloses `other`.
    pub fn include(&self, other: &BoundingSphere) -> BoundingSphere {
        let reach = (other.center - self.center).norm() + other.radius;
        BoundingSphere::new(self.center, self.radius.max(reach))
    }

    /// Uniformly distributed point on the surface of the sphere.
    pub fn random_surface_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Position {
        self.center + random_unit_vector(rng) * self.radius
    }
}

/// Uniformly distributed unit vector (Archimedes' cylinder projection).
pub fn random_unit_vector<R: Rng + ?Sized>(rng: &mut R) -> Vector3<f64> {
    let z: f64 = rng.random_range(-1.0..=1.0);
    let theta: f64 = rng.random_range(0.0..std::f64::consts::TAU);
    let r = (1.0 - z * z).max(0.0).sqrt();
    Vector3::new(r * theta.cos(), r * theta.sin(), z)
}

/// Bounding sphere of a set of spheres, anchored on the first one.
///
/// Returns `None` for an empty input.
pub fn enclosing_sphere<'a, I>(spheres: I) -> Option<BoundingSphere>
where
    I: IntoIterator<Item = &'a BoundingSphere>,
{
    let mut iter = spheres.into_iter();
    let first = *iter.next()?;
    Some(iter.fold(first, |acc, sphere| acc.include(sphere)))
}
