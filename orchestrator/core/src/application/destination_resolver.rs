// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Destination Resolver
//!
//! Decides where a structure sitting in a portal wants to go.
//!
//! # DDD Pattern: Domain Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Turn a jump device's request into a `Destination`
//! - **Collaborators:**
//!   - Domain: Portal, DestinationRequest, WarpgateConfig
//!   - World: WorldHost (devices, controller), AccessControl (rights)
//!
//! Resolution order for each usable device:
//! 1. `auto_send` with exactly one allowed destination picks it.
//! 2. Otherwise the device must carry a picker request naming one of the
//!    portal's allowed destination ids.
//!
//! A picker request that names nothing usable is answered in place with the
//! current destination list. A request naming a valid destination stays on
//! the device until the jump commits (see [`DestinationResolver::acknowledge`]),
//! so a jump refused by the destination is retried on the next scan.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::config::WarpgateConfig;
use crate::domain::destination::{Destination, DestinationRequest, ResolvedDestination};
use crate::domain::identity::PlayerRef;
use crate::domain::jump::TransferError;
use crate::domain::portal::{parse_gps, AllowedDestination, Portal};
use crate::domain::structure::StructureId;
use crate::domain::world::{AccessControl, JumpDevice, WorldHost};

/// A resolved jump: who asked, through which device, and where to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedJump {
    pub player: PlayerRef,
    pub device: JumpDevice,
    pub resolved: ResolvedDestination,
}

pub struct DestinationResolver {
    config: Arc<WarpgateConfig>,
    world: Arc<dyn WorldHost>,
    access: Arc<dyn AccessControl>,
}

impl DestinationResolver {
    pub fn new(config: Arc<WarpgateConfig>, world: Arc<dyn WorldHost>, access: Arc<dyn AccessControl>) -> Self {
        Self { config, world, access }
    }

    /// Enabled devices of a configured jump-drive subtype.
    pub fn candidate_devices(&self, structure: StructureId) -> Vec<JumpDevice> {
        self.world
            .jump_devices(structure)
            .into_iter()
            .filter(|device| device.enabled && self.config.is_jump_drive_subtype(&device.subtype_id))
            .collect()
    }

    fn auto_send_target<'a>(&self, portal: &'a Portal) -> Option<&'a AllowedDestination> {
        match portal.destinations.as_slice() {
            [only] if self.config.auto_send => Some(only),
            _ => None,
        }
    }

    /// Whether any device on `structure` asks for attention this scan.
    ///
    /// Cheap pre-check so idle structures parked in a portal do not start
    /// jump attempts every tick.
    pub fn is_triggered(&self, portal: &Portal, structure: StructureId) -> bool {
        let devices = self.candidate_devices(structure);
        if devices.is_empty() {
            return false;
        }
        if self.auto_send_target(portal).is_some() {
            return true;
        }
        devices.iter().any(|device| {
            DestinationRequest::parse(&device.custom_data)
                .map(|request| request.plugin_request)
                .unwrap_or(false)
        })
    }

    /// Resolves the destination for a structure inside `portal`.
    ///
    /// Never mutates world state beyond answering picker requests.
    pub fn resolve(&self, portal: &Portal, structure: StructureId) -> Result<ResolvedJump, TransferError> {
        if portal.destinations.is_empty() {
            return Err(TransferError::Resolution(format!(
                "gate '{}' has no allowed destinations",
                portal.name
            )));
        }

        let devices = self.candidate_devices(structure);
        if devices.is_empty() {
            return Err(TransferError::Resolution("no usable jump device".to_string()));
        }

        let player = self
            .world
            .controlling_player(structure)
            .ok_or_else(|| TransferError::Resolution("nobody is controlling the structure".to_string()))?;

        let mut selected = None;
        for device in devices {
            if !self.access.can_use_device(&player, structure, device.block_id) {
                debug!(structure = %structure, player = %player.display_name, "Player may not use jump device");
                continue;
            }

            if let Some(target) = self.auto_send_target(portal) {
                selected = Some((device, target));
                break;
            }

            let Some(request) = DestinationRequest::parse(&device.custom_data) else {
                continue;
            };
            if !request.plugin_request {
                continue;
            }
            match request.requested().and_then(|id| portal.destination(id)) {
                Some(target) => {
                    selected = Some((device, target));
                    break;
                }
                None => self.answer(portal, &device),
            }
        }

        let (device, target) = selected.ok_or_else(|| {
            TransferError::Resolution("no destination selected on an accessible device".to_string())
        })?;

        if !self
            .access
            .has_move_rights(&player, structure, self.config.allow_in_faction)
        {
            return Err(TransferError::Resolution(format!(
                "{} has no right to move structure {}",
                player.display_name, structure
            )));
        }

        let destination = self.destination_for(portal, target)?;
        Ok(ResolvedJump {
            player,
            device,
            resolved: ResolvedDestination {
                destination_id: target.id().to_string(),
                display_name: target.display_name().to_string(),
                destination,
            },
        })
    }

    fn destination_for(&self, portal: &Portal, target: &AllowedDestination) -> Result<Destination, TransferError> {
        match target {
            AllowedDestination::Gate { gate, .. } => {
                if gate == &portal.name {
                    return Err(TransferError::Resolution(format!(
                        "gate '{}' lists itself as a destination",
                        gate
                    )));
                }
                if self.config.gates.iter().any(|g| &g.name == gate) {
                    return Ok(Destination::Local { portal: gate.clone() });
                }
                match self.config.remote_address(gate) {
                    Some(address) => Ok(Destination::Remote {
                        portal: gate.clone(),
                        address: address.to_string(),
                    }),
                    None => Err(TransferError::Resolution(format!("unknown gate '{}'", gate))),
                }
            }
            AllowedDestination::Coordinate { id, gps, .. } => parse_gps(gps)
                .map(|position| Destination::RawCoordinate { position })
                .ok_or_else(|| {
                    TransferError::Serialization(format!("destination '{}' has a malformed coordinate '{}'", id, gps))
                }),
        }
    }

    /// Writes the current destination list back onto a device.
    fn answer(&self, portal: &Portal, device: &JumpDevice) {
        let reply = DestinationRequest::reply(portal.destination_ids());
        match reply.to_custom_data() {
            Ok(data) => {
                if let Err(e) = self
                    .world
                    .set_device_custom_data(device.structure_id, device.block_id, &data)
                {
                    warn!(structure = %device.structure_id, error = %e, "Failed to answer destination request");
                }
            }
            Err(e) => warn!(error = %e, "Failed to encode destination reply"),
        }
    }

    /// Consumes the request on a device after its jump committed.
    pub fn acknowledge(&self, portal: &Portal, device: &JumpDevice) {
        if DestinationRequest::parse(&device.custom_data).is_some() {
            self.answer(portal, device);
        }
    }
}
