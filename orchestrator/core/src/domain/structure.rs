// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Structure Graph
//!
//! Serializable snapshot of a structure (a grid of blocks) as it travels
//! between processes. The live structure belongs to the host world; these
//! types are the detached copy that is placed into a transfer envelope.
//!
//! Ownership fields (`owner`, `built_by`) and seat occupants carry identity
//! ids of the process that produced the snapshot until they are remapped on
//! arrival (see `application::identity_remapper`).

use serde::{Deserialize, Serialize};

use crate::domain::geometry::{enclosing_sphere, BoundingSphere, Orientation, Position};
use crate::domain::identity::IdentityId;

/// Entity id of a live structure inside one host process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StructureId(pub i64);

impl std::fmt::Display for StructureId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entity id of a block inside a structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockId(pub i64);

/// Pose of a structure in world space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Position,
    pub orientation: Orientation,
}

impl Pose {
    pub fn at(position: Position) -> Self {
        Self {
            position,
            orientation: Orientation::identity(),
        }
    }
}

/// A character sitting in a seat block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occupant {
    /// Identity that owns the character (`OwningPlayerIdentityId`).
    pub identity_id: IdentityId,
    pub display_name: String,
}

/// Block-specific state that the transfer engine needs to see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BlockKind {
    Generic,
    Seat {
        /// Cryo chambers are filled last when re-seating occupants.
        cryo: bool,
        pilot: Option<Occupant>,
    },
    Projector {
        enabled: bool,
        /// Opaque blueprint of the projected structure, if any.
        projected_blueprint: Option<Vec<u8>>,
    },
    JumpDrive {
        enabled: bool,
        stored_power: f64,
        custom_data: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub subtype_id: String,
    /// Owning identity; `IdentityId::NOBODY` when unowned.
    pub owner: IdentityId,
    pub built_by: IdentityId,
    pub kind: BlockKind,
}

impl Block {
    pub fn generic(id: i64, subtype_id: impl Into<String>, owner: IdentityId) -> Self {
        Self {
            id: BlockId(id),
            subtype_id: subtype_id.into(),
            owner,
            built_by: owner,
            kind: BlockKind::Generic,
        }
    }

    pub fn pilot(&self) -> Option<&Occupant> {
        match &self.kind {
            BlockKind::Seat { pilot, .. } => pilot.as_ref(),
            _ => None,
        }
    }

    /// Every non-zero identity referenced by this block.
    pub fn referenced_identities(&self) -> impl Iterator<Item = IdentityId> + '_ {
        [Some(self.owner), Some(self.built_by), self.pilot().map(|p| p.identity_id)]
            .into_iter()
            .flatten()
            .filter(|id| !id.is_nobody())
    }
}

/// Detached snapshot of one structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureGraph {
    pub id: StructureId,
    pub display_name: String,
    pub pose: Pose,
    /// Radius of the structure's bounding sphere around `pose.position`.
    pub bounding_radius: f64,
    pub linear_velocity: Position,
    pub angular_velocity: Position,
    pub blocks: Vec<Block>,
}

impl StructureGraph {
    pub fn bounding_sphere(&self) -> BoundingSphere {
        BoundingSphere::new(self.pose.position, self.bounding_radius)
    }

    pub fn blocks_mut(&mut self) -> impl Iterator<Item = &mut Block> {
        self.blocks.iter_mut()
    }
}

/// Bounding sphere of a group of structures travelling together.
pub fn group_bounding_sphere(structures: &[StructureGraph]) -> Option<BoundingSphere> {
    let spheres: Vec<BoundingSphere> = structures.iter().map(StructureGraph::bounding_sphere).collect();
    enclosing_sphere(spheres.iter())
}

/// Index of the structure with the most blocks; the group is placed relative to it.
fn anchor_index(structures: &[StructureGraph]) -> Option<usize> {
    structures
        .iter()
        .enumerate()
        .max_by_key(|(_, s)| s.blocks.len())
        .map(|(i, _)| i)
}

/// Moves a group so that its bounding sphere is centred on `target`,
/// preserving relative offsets and zeroing all velocities.
///
/// Returns `false` (and leaves the group untouched) when the group is empty.
pub fn relocate_group(structures: &mut [StructureGraph], target: Position) -> bool {
    let (Some(bounds), Some(anchor)) = (group_bounding_sphere(structures), anchor_index(structures)) else {
        return false;
    };

    let anchor_offset = structures[anchor].pose.position - bounds.center;
    let anchor_target = target + anchor_offset;
    let delta = anchor_target - structures[anchor].pose.position;

    for structure in structures.iter_mut() {
        structure.pose.position += delta;
        structure.linear_velocity = Position::zeros();
        structure.angular_velocity = Position::zeros();
    }
    true
}
