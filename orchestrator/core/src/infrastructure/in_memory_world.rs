// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory World Host
//!
//! A self-contained host world implementing every collaborator trait the
//! orchestrator consumes. Used by tests and by operator dry runs; it records
//! notifications, redirects, saves and visual status changes so callers can
//! assert on them.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::geometry::{BoundingSphere, Position};
use crate::domain::identity::{AccountId, CharacterId, IdentityId, IdentityRecord, PlayerRef};
use crate::domain::jump::JumpStatus;
use crate::domain::placement::OccupiedVolume;
use crate::domain::portal::Portal;
use crate::domain::structure::{relocate_group, BlockId, BlockKind, Occupant, StructureGraph, StructureId};
use crate::domain::world::{
    AccessControl, Collaborators, IdentityDirectory, JumpDevice, PlayerNotifier, Relation,
    SaveScheduler, VisualEffects, WorldHost,
};

#[derive(Debug, Clone)]
struct LiveStructure {
    graph: StructureGraph,
    controller: Option<IdentityId>,
    /// Structures sharing a group id are physically connected.
    group: Option<u64>,
}

#[derive(Debug, Clone)]
struct IdentityEntry {
    record: IdentityRecord,
    account: Option<AccountId>,
    npc: bool,
    character: Option<CharacterId>,
    faction: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub status: JumpStatus,
    pub portal: String,
    pub structure: StructureId,
    pub position: Option<Position>,
}

#[derive(Debug, Default)]
struct WorldState {
    structures: BTreeMap<StructureId, LiveStructure>,
    next_entity_id: i64,
    identities: BTreeMap<IdentityId, IdentityEntry>,
    next_identity_id: i64,
    next_character_id: i64,
    connected: HashSet<AccountId>,
    protected_zones: Vec<BoundingSphere>,
    denied_devices: HashSet<(IdentityId, BlockId)>,
    killed_characters: Vec<CharacterId>,
    notifications: Vec<(IdentityId, String)>,
    broadcasts: Vec<String>,
    redirects: Vec<(AccountId, String)>,
    saves: usize,
    status_changes: Vec<StatusChange>,
    visual_delay: Duration,
    fail_visuals: bool,
    fail_spawn: bool,
}

/// In-memory host world.
#[derive(Clone, Default)]
pub struct InMemoryWorld {
    state: Arc<RwLock<WorldState>>,
}

impl InMemoryWorld {
    pub fn new() -> Self {
        let world = Self::default();
        {
            let mut state = world.state.write();
            state.next_entity_id = 1000;
            state.next_identity_id = 100;
            state.next_character_id = 1;
        }
        world
    }

    /// Wires this world in as every collaborator.
    pub fn collaborators(&self) -> Collaborators {
        let shared = Arc::new(self.clone());
        Collaborators {
            world: shared.clone(),
            identities: shared.clone(),
            access: shared.clone(),
            visuals: shared.clone(),
            notifier: shared.clone(),
            saver: shared,
            guards: Vec::new(),
        }
    }

    /// Adds a player identity with a live character; returns its reference.
    pub fn add_player(&self, name: &str, account: AccountId, connected: bool) -> PlayerRef {
        let mut state = self.state.write();
        let identity_id = IdentityId(state.next_identity_id);
        state.next_identity_id += 1;
        let character = CharacterId(state.next_character_id);
        state.next_character_id += 1;
        state.identities.insert(
            identity_id,
            IdentityEntry {
                record: IdentityRecord::new(identity_id, name),
                account: Some(account),
                npc: false,
                character: Some(character),
                faction: None,
            },
        );
        if connected {
            state.connected.insert(account);
        }
        PlayerRef {
            identity_id,
            account_id: account,
            display_name: name.to_string(),
        }
    }

    /// Registers an identity with a fixed id (as if created by an earlier session).
    pub fn add_identity(&self, identity_id: IdentityId, name: &str, account: Option<AccountId>, npc: bool) {
        let mut state = self.state.write();
        state.identities.insert(
            identity_id,
            IdentityEntry {
                record: IdentityRecord::new(identity_id, name),
                account,
                npc,
                character: None,
                faction: None,
            },
        );
        state.next_identity_id = state.next_identity_id.max(identity_id.0 + 1);
    }

    pub fn set_faction(&self, identity: IdentityId, faction: Option<u64>) {
        if let Some(entry) = self.state.write().identities.get_mut(&identity) {
            entry.faction = faction;
        }
    }

    /// Adds a live structure; its id is kept as given.
    pub fn add_structure(&self, graph: StructureGraph, controller: Option<IdentityId>, group: Option<u64>) -> StructureId {
        let id = graph.id;
        let mut state = self.state.write();
        state.next_entity_id = state.next_entity_id.max(id.0 + 1);
        state.structures.insert(
            id,
            LiveStructure {
                graph,
                controller,
                group,
            },
        );
        id
    }

    pub fn add_protected_zone(&self, zone: BoundingSphere) {
        self.state.write().protected_zones.push(zone);
    }

    pub fn deny_device(&self, identity: IdentityId, device: BlockId) {
        self.state.write().denied_devices.insert((identity, device));
    }

    pub fn connect(&self, account: AccountId) {
        self.state.write().connected.insert(account);
    }

    pub fn disconnect(&self, account: AccountId) {
        self.state.write().connected.remove(&account);
    }

    pub fn set_visual_delay(&self, delay: Duration) {
        self.state.write().visual_delay = delay;
    }

    pub fn set_fail_visuals(&self, fail: bool) {
        self.state.write().fail_visuals = fail;
    }

    pub fn set_fail_spawn(&self, fail: bool) {
        self.state.write().fail_spawn = fail;
    }

    pub fn structure(&self, id: StructureId) -> Option<StructureGraph> {
        self.state.read().structures.get(&id).map(|s| s.graph.clone())
    }

    pub fn structures(&self) -> Vec<StructureGraph> {
        self.state.read().structures.values().map(|s| s.graph.clone()).collect()
    }

    pub fn structure_count(&self) -> usize {
        self.state.read().structures.len()
    }

    pub fn identity_count(&self) -> usize {
        self.state.read().identities.len()
    }

    pub fn killed_characters(&self) -> Vec<CharacterId> {
        self.state.read().killed_characters.clone()
    }

    pub fn notifications(&self) -> Vec<(IdentityId, String)> {
        self.state.read().notifications.clone()
    }

    pub fn broadcasts(&self) -> Vec<String> {
        self.state.read().broadcasts.clone()
    }

    pub fn redirects(&self) -> Vec<(AccountId, String)> {
        self.state.read().redirects.clone()
    }

    pub fn save_count(&self) -> usize {
        self.state.read().saves
    }

    pub fn status_changes(&self) -> Vec<StatusChange> {
        self.state.read().status_changes.clone()
    }

    pub fn last_seen(&self, id: IdentityId) -> Option<chrono::DateTime<Utc>> {
        self.state.read().identities.get(&id).map(|e| e.record.last_seen_at)
    }

    /// Owner with the most blocks, ignoring unowned blocks.
    fn main_owner(graph: &StructureGraph) -> IdentityId {
        let mut counts: HashMap<IdentityId, usize> = HashMap::new();
        for block in &graph.blocks {
            if !block.owner.is_nobody() {
                *counts.entry(block.owner).or_default() += 1;
            }
        }
        counts
            .into_iter()
            .max_by_key(|(id, count)| (*count, std::cmp::Reverse(id.0)))
            .map(|(id, _)| id)
            .unwrap_or(IdentityId::NOBODY)
    }
}

impl WorldHost for InMemoryWorld {
    fn structures_in_sphere(&self, area: &BoundingSphere) -> Vec<StructureId> {
        self.state
            .read()
            .structures
            .values()
            .filter(|s| s.graph.bounding_sphere().intersects(area) || area.contains(&s.graph.pose.position))
            .map(|s| s.graph.id)
            .collect()
    }

    fn jump_devices(&self, structure: StructureId) -> Vec<JumpDevice> {
        let state = self.state.read();
        let Some(live) = state.structures.get(&structure) else {
            return Vec::new();
        };
        live.graph
            .blocks
            .iter()
            .filter_map(|block| match &block.kind {
                BlockKind::JumpDrive {
                    enabled, custom_data, ..
                } => Some(JumpDevice {
                    structure_id: structure,
                    block_id: block.id,
                    subtype_id: block.subtype_id.clone(),
                    enabled: *enabled,
                    custom_data: custom_data.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    fn controlling_player(&self, structure: StructureId) -> Option<PlayerRef> {
        let state = self.state.read();
        let controller = state.structures.get(&structure)?.controller?;
        let entry = state.identities.get(&controller)?;
        Some(PlayerRef {
            identity_id: controller,
            account_id: entry.account.unwrap_or(AccountId(0)),
            display_name: entry.record.display_name.clone(),
        })
    }

    fn set_device_custom_data(&self, structure: StructureId, device: BlockId, data: &str) -> Result<()> {
        let mut state = self.state.write();
        let live = state
            .structures
            .get_mut(&structure)
            .ok_or_else(|| anyhow!("structure {} not found", structure))?;
        for block in live.graph.blocks_mut() {
            if block.id == device {
                if let BlockKind::JumpDrive { custom_data, .. } = &mut block.kind {
                    *custom_data = data.to_string();
                    return Ok(());
                }
            }
        }
        Err(anyhow!("jump device {:?} not found on {}", device, structure))
    }

    fn set_devices_enabled(&self, structure: StructureId, devices: &[BlockId], value: bool) -> Result<()> {
        let mut state = self.state.write();
        let live = state
            .structures
            .get_mut(&structure)
            .ok_or_else(|| anyhow!("structure {} not found", structure))?;
        for block in live.graph.blocks_mut() {
            if devices.contains(&block.id) {
                if let BlockKind::JumpDrive { enabled, .. } = &mut block.kind {
                    *enabled = value;
                }
            }
        }
        Ok(())
    }

    fn drain_device_power(&self, structure: StructureId, device: BlockId) -> Result<()> {
        let mut state = self.state.write();
        let live = state
            .structures
            .get_mut(&structure)
            .ok_or_else(|| anyhow!("structure {} not found", structure))?;
        for block in live.graph.blocks_mut() {
            if block.id == device {
                if let BlockKind::JumpDrive { stored_power, .. } = &mut block.kind {
                    *stored_power = 0.0;
                }
            }
        }
        Ok(())
    }

    fn snapshot(&self, structure: StructureId) -> Option<StructureGraph> {
        self.structure(structure)
    }

    fn structure_group(&self, structure: StructureId, include_connected: bool) -> Vec<StructureGraph> {
        let state = self.state.read();
        let Some(root) = state.structures.get(&structure) else {
            return Vec::new();
        };
        match (include_connected, root.group) {
            (true, Some(group)) => state
                .structures
                .values()
                .filter(|s| s.group == Some(group))
                .map(|s| s.graph.clone())
                .collect(),
            _ => vec![root.graph.clone()],
        }
    }

    fn teleport_group(&self, structures: &[StructureId], target: Position) -> Result<()> {
        let mut state = self.state.write();
        let mut group: Vec<StructureGraph> = structures
            .iter()
            .filter_map(|id| state.structures.get(id).map(|s| s.graph.clone()))
            .collect();
        if !relocate_group(&mut group, target) {
            return Err(anyhow!("nothing to teleport"));
        }
        for graph in group {
            if let Some(live) = state.structures.get_mut(&graph.id) {
                live.graph = graph;
            }
        }
        Ok(())
    }

    fn close_structures(&self, structures: &[StructureId]) -> Result<()> {
        let mut state = self.state.write();
        for id in structures {
            state.structures.remove(id);
        }
        Ok(())
    }

    fn spawn(&self, structures: Vec<StructureGraph>) -> Result<Vec<StructureId>> {
        let mut state = self.state.write();
        if state.fail_spawn {
            return Err(anyhow!("spawn rejected by host"));
        }
        let mut ids = Vec::with_capacity(structures.len());
        for mut graph in structures {
            let id = StructureId(state.next_entity_id);
            state.next_entity_id += 1;
            graph.id = id;
            state.structures.insert(
                id,
                LiveStructure {
                    graph,
                    controller: None,
                    group: None,
                },
            );
            ids.push(id);
        }
        Ok(ids)
    }

    fn occupied_volumes(&self, area: &BoundingSphere) -> Vec<OccupiedVolume> {
        let state = self.state.read();
        let entities = state
            .structures
            .values()
            .map(|s| s.graph.bounding_sphere())
            .filter(|sphere| sphere.intersects(area))
            .map(OccupiedVolume::entity);
        let zones = state
            .protected_zones
            .iter()
            .filter(|zone| zone.intersects(area))
            .copied()
            .map(OccupiedVolume::protected_zone);
        entities.chain(zones).collect()
    }

    fn seat_occupant(&self, structure: StructureId, seat: BlockId, occupant: Occupant) -> Result<()> {
        let mut state = self.state.write();
        let character = CharacterId(state.next_character_id);
        state.next_character_id += 1;

        let identity = occupant.identity_id;
        let live = state
            .structures
            .get_mut(&structure)
            .ok_or_else(|| anyhow!("structure {} not found", structure))?;
        let block = live
            .graph
            .blocks_mut()
            .find(|b| b.id == seat)
            .ok_or_else(|| anyhow!("seat {:?} not found on {}", seat, structure))?;
        match &mut block.kind {
            BlockKind::Seat { pilot, .. } if pilot.is_none() => *pilot = Some(occupant),
            _ => return Err(anyhow!("block {:?} is not an empty seat", seat)),
        }
        live.controller = Some(identity);

        if let Some(entry) = state.identities.get_mut(&identity) {
            entry.character = Some(character);
        }
        Ok(())
    }
}

impl IdentityDirectory for InMemoryWorld {
    fn identity(&self, id: IdentityId) -> Option<IdentityRecord> {
        self.state.read().identities.get(&id).map(|e| e.record.clone())
    }

    fn identity_for_account(&self, account: AccountId) -> Option<IdentityId> {
        self.state
            .read()
            .identities
            .iter()
            .find(|(_, e)| e.account == Some(account))
            .map(|(id, _)| *id)
    }

    fn account_for_identity(&self, id: IdentityId) -> Option<AccountId> {
        self.state.read().identities.get(&id).and_then(|e| e.account)
    }

    fn is_npc(&self, id: IdentityId) -> bool {
        self.state.read().identities.get(&id).map(|e| e.npc).unwrap_or(false)
    }

    fn create_identity(&self, template: &IdentityRecord, account: AccountId) -> Result<IdentityId> {
        let mut state = self.state.write();
        if state.identities.values().any(|e| e.account == Some(account)) {
            return Err(anyhow!("account {} already has an identity", account));
        }
        let id = IdentityId(state.next_identity_id);
        state.next_identity_id += 1;
        let mut record = template.clone();
        record.identity_id = id;
        state.identities.insert(
            id,
            IdentityEntry {
                record,
                account: Some(account),
                npc: false,
                character: None,
                faction: None,
            },
        );
        Ok(id)
    }

    fn touch(&self, id: IdentityId) {
        if let Some(entry) = self.state.write().identities.get_mut(&id) {
            entry.record.last_seen_at = Utc::now();
        }
    }

    fn is_connected(&self, account: AccountId) -> bool {
        self.state.read().connected.contains(&account)
    }

    fn live_character(&self, id: IdentityId) -> Option<CharacterId> {
        self.state.read().identities.get(&id).and_then(|e| e.character)
    }

    fn kill_character(&self, character: CharacterId) -> Result<()> {
        let mut state = self.state.write();
        let owner = state
            .identities
            .values_mut()
            .find(|e| e.character == Some(character))
            .ok_or_else(|| anyhow!("character {:?} not found", character))?;
        owner.character = None;
        state.killed_characters.push(character);
        Ok(())
    }
}

impl AccessControl for InMemoryWorld {
    fn relation(&self, player: &PlayerRef, structure: StructureId) -> Relation {
        let state = self.state.read();
        let Some(live) = state.structures.get(&structure) else {
            return Relation::Neutral;
        };
        let owner = Self::main_owner(&live.graph);
        if owner.is_nobody() || owner == player.identity_id {
            return Relation::Owner;
        }
        let faction_of = |id: &IdentityId| state.identities.get(id).and_then(|e| e.faction);
        match (faction_of(&player.identity_id), faction_of(&owner)) {
            (Some(a), Some(b)) if a == b => Relation::FactionShare,
            _ => Relation::Enemy,
        }
    }

    fn can_use_device(&self, player: &PlayerRef, _structure: StructureId, device: BlockId) -> bool {
        !self
            .state
            .read()
            .denied_devices
            .contains(&(player.identity_id, device))
    }
}

#[async_trait]
impl VisualEffects for InMemoryWorld {
    async fn play_jump(&self, _portal: &Portal, _structure: StructureId) -> Result<()> {
        let (delay, fail) = {
            let state = self.state.read();
            (state.visual_delay, state.fail_visuals)
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(anyhow!("visual task failed"));
        }
        Ok(())
    }

    fn notify_jump_status_changed(
        &self,
        status: JumpStatus,
        portal: &str,
        structure: StructureId,
        position: Option<Position>,
    ) {
        self.state.write().status_changes.push(StatusChange {
            status,
            portal: portal.to_string(),
            structure,
            position,
        });
    }
}

impl PlayerNotifier for InMemoryWorld {
    fn notify(&self, identity: IdentityId, message: &str) {
        self.state.write().notifications.push((identity, message.to_string()));
    }

    fn broadcast(&self, message: &str) {
        self.state.write().broadcasts.push(message.to_string());
    }

    fn redirect(&self, account: AccountId, address: &str) {
        self.state.write().redirects.push((account, address.to_string()));
    }
}

impl SaveScheduler for InMemoryWorld {
    fn save(&self) {
        self.state.write().saves += 1;
    }
}
