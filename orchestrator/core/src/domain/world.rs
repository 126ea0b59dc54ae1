// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! World Collaborators
//!
//! Provides the narrow interfaces through which the transfer engine reads and
//! mutates the host world.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Versioned contract between the engine and the host process
//!
//! World-mutating calls are synchronous and are only issued by the
//! orchestrator while it holds its commit lock. The visual task is the only
//! asynchronous collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::geometry::{BoundingSphere, Position};
use crate::domain::identity::{AccountId, CharacterId, IdentityId, IdentityRecord, PlayerRef};
use crate::domain::jump::JumpStatus;
use crate::domain::placement::OccupiedVolume;
use crate::domain::portal::Portal;
use crate::domain::server_status::ServerStatus;
use crate::domain::structure::{BlockId, Occupant, StructureGraph, StructureId};

/// A jump-capable device on a live structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JumpDevice {
    pub structure_id: StructureId,
    pub block_id: BlockId,
    pub subtype_id: String,
    pub enabled: bool,
    pub custom_data: String,
}

/// Relation of a player to a structure's main owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    Owner,
    FactionShare,
    Neutral,
    Enemy,
}

/// Live host world: structure queries and mutations.
pub trait WorldHost: Send + Sync {
    /// Top-most structures whose bounds intersect `area`.
    fn structures_in_sphere(&self, area: &BoundingSphere) -> Vec<StructureId>;

    fn jump_devices(&self, structure: StructureId) -> Vec<JumpDevice>;

    fn controlling_player(&self, structure: StructureId) -> Option<PlayerRef>;

    fn set_device_custom_data(
        &self,
        structure: StructureId,
        device: BlockId,
        custom_data: &str,
    ) -> anyhow::Result<()>;

    fn set_devices_enabled(
        &self,
        structure: StructureId,
        devices: &[BlockId],
        enabled: bool,
    ) -> anyhow::Result<()>;

    fn drain_device_power(&self, structure: StructureId, device: BlockId) -> anyhow::Result<()>;

    /// Detached snapshot of one live structure.
    fn snapshot(&self, structure: StructureId) -> Option<StructureGraph>;

    /// Detached snapshots of the structure and everything attached to it.
    /// `include_connected` widens mechanical connections to physical ones
    /// (connectors, landing gear).
    fn structure_group(&self, structure: StructureId, include_connected: bool) -> Vec<StructureGraph>;

    /// Moves live structures so the group is centred on `target` and stops them.
    fn teleport_group(&self, structures: &[StructureId], target: Position) -> anyhow::Result<()>;

    fn close_structures(&self, structures: &[StructureId]) -> anyhow::Result<()>;

    /// Materializes snapshots; returns the new live ids in input order.
    fn spawn(&self, structures: Vec<StructureGraph>) -> anyhow::Result<Vec<StructureId>>;

    fn occupied_volumes(&self, area: &BoundingSphere) -> Vec<OccupiedVolume>;

    /// Places a respawned character into an empty seat.
    fn seat_occupant(
        &self,
        structure: StructureId,
        seat: BlockId,
        occupant: Occupant,
    ) -> anyhow::Result<()>;
}

/// Persistent identities and their links to accounts and live characters.
pub trait IdentityDirectory: Send + Sync {
    fn identity(&self, id: IdentityId) -> Option<IdentityRecord>;

    fn identity_for_account(&self, account: AccountId) -> Option<IdentityId>;

    fn account_for_identity(&self, id: IdentityId) -> Option<AccountId>;

    fn is_npc(&self, id: IdentityId) -> bool;

    /// Allocates a new local identity from `template` and links it to `account`.
    fn create_identity(&self, template: &IdentityRecord, account: AccountId) -> anyhow::Result<IdentityId>;

    /// Refreshes the last-seen time so idle sweeps keep the identity.
    fn touch(&self, id: IdentityId);

    fn is_connected(&self, account: AccountId) -> bool;

    fn live_character(&self, id: IdentityId) -> Option<CharacterId>;

    fn kill_character(&self, character: CharacterId) -> anyhow::Result<()>;
}

pub trait AccessControl: Send + Sync {
    fn relation(&self, player: &PlayerRef, structure: StructureId) -> Relation;

    fn can_use_device(&self, player: &PlayerRef, structure: StructureId, device: BlockId) -> bool;

    fn has_move_rights(&self, player: &PlayerRef, structure: StructureId, allow_in_faction: bool) -> bool {
        match self.relation(player, structure) {
            Relation::Owner => true,
            Relation::FactionShare => allow_in_faction,
            Relation::Neutral | Relation::Enemy => false,
        }
    }
}

/// Jump visuals and cooldown, run alongside envelope preparation.
#[async_trait]
pub trait VisualEffects: Send + Sync {
    /// Runs the jump animation/cooldown for a structure leaving `portal`.
    async fn play_jump(&self, portal: &Portal, structure: StructureId) -> anyhow::Result<()>;

    /// Fire-and-forget status update.
    fn notify_jump_status_changed(
        &self,
        status: JumpStatus,
        portal: &str,
        structure: StructureId,
        position: Option<Position>,
    );
}

pub trait PlayerNotifier: Send + Sync {
    fn notify(&self, identity: IdentityId, message: &str);

    fn broadcast(&self, message: &str);

    /// Tells a player's client to reconnect to `address`.
    fn redirect(&self, account: AccountId, address: &str);
}

/// Best-effort persistence trigger.
pub trait SaveScheduler: Send + Sync {
    fn save(&self);
}

/// What a transfer guard sees before a jump commits.
#[derive(Debug, Clone)]
pub struct TransferContext<'a> {
    pub player: &'a PlayerRef,
    pub portal: &'a str,
    pub destination: &'a str,
    pub structures: &'a [StructureGraph],
}

/// Pluggable veto over jumps; `Err` carries the message for the player.
pub trait TransferGuard: Send + Sync {
    fn before_transfer(&self, context: &TransferContext<'_>) -> Result<(), String>;
}

/// Source of this process's answer to remote capacity probes.
pub trait CapacityReporter: Send + Sync {
    fn current_status(&self) -> ServerStatus;
}

/// Fixed answer, for tooling and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticCapacity(pub ServerStatus);

impl CapacityReporter for StaticCapacity {
    fn current_status(&self) -> ServerStatus {
        self.0
    }
}

/// Everything the orchestrator talks to, wired once at process start.
#[derive(Clone)]
pub struct Collaborators {
    pub world: Arc<dyn WorldHost>,
    pub identities: Arc<dyn IdentityDirectory>,
    pub access: Arc<dyn AccessControl>,
    pub visuals: Arc<dyn VisualEffects>,
    pub notifier: Arc<dyn PlayerNotifier>,
    pub saver: Arc<dyn SaveScheduler>,
    pub guards: Vec<Arc<dyn TransferGuard>>,
}
