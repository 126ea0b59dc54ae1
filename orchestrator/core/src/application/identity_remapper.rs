// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Identity Remapper
//!
//! Rewrites the foreign identity ids inside an arriving envelope to identities
//! of this process, linked by account id.
//!
//! # DDD Pattern: Domain Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Resolve `foreign id -> local id` and rewrite ownership
//! - **Collaborators:**
//!   - Domain: TransferEnvelope, StructureGraph
//!   - World: IdentityDirectory

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::domain::identity::{AccountId, IdentityId, IdentityRecord};
use crate::domain::jump::TransferError;
use crate::domain::structure::{BlockId, BlockKind, StructureGraph};
use crate::domain::transfer::TransferEnvelope;
use crate::domain::world::IdentityDirectory;

/// A pilot lifted out of its seat before remapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachedOccupant {
    /// Index into the envelope's structure list.
    pub structure_index: usize,
    pub seat: BlockId,
    pub source_identity: IdentityId,
    /// Local identity, when the source identity maps to one.
    pub local_identity: Option<IdentityId>,
    pub account_id: Option<AccountId>,
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemapOutcome {
    pub mapping: BTreeMap<IdentityId, IdentityId>,
    pub detached: Vec<DetachedOccupant>,
}

pub struct IdentityRemapper {
    identities: Arc<dyn IdentityDirectory>,
    keep_ownership: bool,
}

impl IdentityRemapper {
    pub fn new(identities: Arc<dyn IdentityDirectory>, keep_ownership: bool) -> Self {
        Self {
            identities,
            keep_ownership,
        }
    }

    /// Builds `source id -> local id` for every identity with an account.
    ///
    /// Allocates a local identity for accounts seen for the first time, so a
    /// second call against the same directory yields the same map. Local
    /// identities of offline accounts are touched.
    pub fn build_mapping(&self, envelope: &TransferEnvelope) -> Result<BTreeMap<IdentityId, IdentityId>, TransferError> {
        let mut mapping = BTreeMap::new();

        for (source_id, account) in &envelope.player_accounts {
            if account.is_none() {
                continue;
            }

            let local_id = match self.identities.identity_for_account(*account) {
                Some(existing) => existing,
                None => {
                    let template = envelope
                        .identities
                        .get(source_id)
                        .cloned()
                        .unwrap_or_else(|| IdentityRecord::new(*source_id, format!("Player{}", account)));
                    let created = self
                        .identities
                        .create_identity(&template, *account)
                        .map_err(|e| TransferError::Host(format!("failed to create identity for account {}: {}", account, e)))?;
                    info!(
                        account = %account,
                        source_identity = %source_id,
                        local_identity = %created,
                        name = %template.display_name,
                        "Created local identity for arriving account"
                    );
                    created
                }
            };

            if !self.identities.is_connected(*account) {
                self.identities.touch(local_id);
            }
            mapping.insert(*source_id, local_id);
        }

        debug!(entries = mapping.len(), "Built identity mapping");
        Ok(mapping)
    }

    /// Remaps an envelope in place.
    ///
    /// Seated pilots are lifted out first and reported in the outcome. With
    /// `keep_ownership` every owner/builder field is rewritten through the
    /// mapping (unknown ids become unowned); without it everything is handed
    /// to `requester`'s local identity when it has one.
    pub fn remap(&self, envelope: &mut TransferEnvelope, requester: AccountId) -> Result<RemapOutcome, TransferError> {
        let mapping = self.build_mapping(envelope)?;
        let mut detached = detach_occupants(&mut envelope.structures);
        for occupant in &mut detached {
            occupant.local_identity = mapping.get(&occupant.source_identity).copied();
            occupant.account_id = envelope.player_accounts.get(&occupant.source_identity).copied();
        }

        let requester_identity = (!requester.is_none())
            .then(|| self.identities.identity_for_account(requester))
            .flatten();

        match (self.keep_ownership, requester_identity) {
            (false, Some(new_owner)) => {
                for block in envelope.structures.iter_mut().flat_map(|s| s.blocks.iter_mut()) {
                    block.owner = new_owner;
                    block.built_by = new_owner;
                }
            }
            _ => {
                let lookup = |id: IdentityId| mapping.get(&id).copied().unwrap_or(IdentityId::NOBODY);
                for block in envelope.structures.iter_mut().flat_map(|s| s.blocks.iter_mut()) {
                    block.owner = lookup(block.owner);
                    block.built_by = lookup(block.built_by);
                }
            }
        }

        Ok(RemapOutcome { mapping, detached })
    }
}

/// Clears every occupied seat and returns who sat where.
pub fn detach_occupants(structures: &mut [StructureGraph]) -> Vec<DetachedOccupant> {
    let mut detached = Vec::new();
    for (index, structure) in structures.iter_mut().enumerate() {
        for block in structure.blocks_mut() {
            if let BlockKind::Seat { pilot, .. } = &mut block.kind {
                if let Some(occupant) = pilot.take() {
                    detached.push(DetachedOccupant {
                        structure_index: index,
                        seat: block.id,
                        source_identity: occupant.identity_id,
                        local_identity: None,
                        account_id: None,
                        display_name: occupant.display_name,
                    });
                }
            }
        }
    }
    detached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::Position;
    use crate::domain::structure::{Block, Occupant, Pose, StructureId};
    use crate::domain::world::IdentityDirectory;
    use crate::infrastructure::in_memory_world::InMemoryWorld;

    fn envelope() -> TransferEnvelope {
        let mut seat = Block::generic(2, "LargeBlockCockpit", IdentityId(7));
        seat.kind = BlockKind::Seat {
            cryo: false,
            pilot: Some(Occupant {
                identity_id: IdentityId(7),
                display_name: "Jane".to_string(),
            }),
        };
        let mut foreign = Block::generic(3, "LargeBlockArmorBlock", IdentityId(8));
        foreign.built_by = IdentityId(99);

        TransferEnvelope {
            structures: vec![StructureGraph {
                id: StructureId(1),
                display_name: "Courier".to_string(),
                pose: Pose::at(Position::zeros()),
                bounding_radius: 10.0,
                linear_velocity: Position::zeros(),
                angular_velocity: Position::zeros(),
                blocks: vec![Block::generic(1, "LargeBlockArmorBlock", IdentityId(7)), seat, foreign],
            }],
            identities: [
                (IdentityId(7), IdentityRecord::new(IdentityId(7), "Jane")),
                (IdentityId(8), IdentityRecord::new(IdentityId(8), "Max")),
            ]
            .into_iter()
            .collect(),
            player_accounts: [(IdentityId(7), AccountId(555)), (IdentityId(8), AccountId(777))]
                .into_iter()
                .collect(),
            source_gate: "Alpha".to_string(),
            source_destination_id: "beta".to_string(),
        }
    }

    #[test]
    fn test_new_account_gets_new_identity() {
        let world = InMemoryWorld::new();
        let remapper = IdentityRemapper::new(Arc::new(world.clone()), true);
        let mut env = envelope();

        let outcome = remapper.remap(&mut env, AccountId(555)).unwrap();

        let local = world.identity_for_account(AccountId(555)).unwrap();
        assert_eq!(outcome.mapping[&IdentityId(7)], local);
        assert_eq!(env.structures[0].blocks[0].owner, local);
        assert_eq!(world.identity(local).unwrap().display_name, "Jane");
    }

    #[test]
    fn test_existing_account_is_reused() {
        let world = InMemoryWorld::new();
        let existing = world.add_player("Max", AccountId(777), false);
        let remapper = IdentityRemapper::new(Arc::new(world.clone()), true);
        let mut env = envelope();

        let outcome = remapper.remap(&mut env, AccountId(555)).unwrap();

        assert_eq!(outcome.mapping[&IdentityId(8)], existing.identity_id);
        assert_eq!(env.structures[0].blocks[2].owner, existing.identity_id);
        // Builder 99 has no account in the envelope.
        assert_eq!(env.structures[0].blocks[2].built_by, IdentityId::NOBODY);
    }

    #[test]
    fn test_mapping_is_stable() {
        let world = InMemoryWorld::new();
        let remapper = IdentityRemapper::new(Arc::new(world.clone()), true);
        let env = envelope();

        let first = remapper.build_mapping(&env).unwrap();
        let second = remapper.build_mapping(&env).unwrap();
        assert_eq!(first, second);
        assert_eq!(world.identity_count(), 2);
    }

    #[test]
    fn test_offline_identities_are_touched() {
        let world = InMemoryWorld::new();
        let existing = world.add_player("Max", AccountId(777), false);
        let before = world.last_seen(existing.identity_id).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));

        let remapper = IdentityRemapper::new(Arc::new(world.clone()), true);
        remapper.build_mapping(&envelope()).unwrap();

        assert!(world.last_seen(existing.identity_id).unwrap() > before);
    }

    #[test]
    fn test_without_keep_ownership_requester_owns_everything() {
        let world = InMemoryWorld::new();
        let remapper = IdentityRemapper::new(Arc::new(world.clone()), false);
        let mut env = envelope();

        remapper.remap(&mut env, AccountId(555)).unwrap();

        let jane = world.identity_for_account(AccountId(555)).unwrap();
        assert!(env.structures[0]
            .blocks
            .iter()
            .all(|b| b.owner == jane && b.built_by == jane));
    }

    #[test]
    fn test_pilots_are_detached() {
        let world = InMemoryWorld::new();
        let remapper = IdentityRemapper::new(Arc::new(world.clone()), true);
        let mut env = envelope();

        let outcome = remapper.remap(&mut env, AccountId(555)).unwrap();

        assert_eq!(outcome.detached.len(), 1);
        let occupant = &outcome.detached[0];
        assert_eq!(occupant.seat, BlockId(2));
        assert_eq!(occupant.account_id, Some(AccountId(555)));
        assert_eq!(occupant.local_identity, world.identity_for_account(AccountId(555)));
        assert!(env.structures[0].blocks.iter().all(|b| b.pilot().is_none()));
    }
}
