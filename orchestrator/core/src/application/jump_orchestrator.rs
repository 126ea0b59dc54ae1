// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Jump Orchestrator
//!
//! Drives outbound jumps through portals and materializes inbound deliveries.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Run the jump state machine and the intake protocol
//! - **Collaborators:**
//!   - Domain: Portal, JumpAttempt, TransferEnvelope, FreeSpaceFinder
//!   - Application: DestinationResolver, IdentityRemapper, InboundQueue
//!   - Infrastructure: WireFormat, FilesystemMailbox, ServerStatusProbe, EventBus
//!   - World: every collaborator in `Collaborators`
//!
//! # Concurrency
//!
//! Each triggered structure gets its own task, so a slow remote probe never
//! holds up other portals. Probing and the jump visual run jointly; every
//! world mutation then happens under a single commit lock. Failures before
//! the commit leave the world untouched, and the structure is considered
//! again on the next tick.

use chrono::Utc;
use dashmap::DashSet;
use metrics::counter;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::application::destination_resolver::{DestinationResolver, ResolvedJump};
use crate::application::identity_remapper::{DetachedOccupant, IdentityRemapper};
use crate::application::inbound_queue::{InboundQueue, QueuedInbound};
use crate::domain::config::WarpgateConfig;
use crate::domain::destination::Destination;
use crate::domain::events::TransferEvent;
use crate::domain::geometry::{BoundingSphere, Position};
use crate::domain::identity::{AccountId, IdentityId, PlayerRef};
use crate::domain::jump::{JumpAttempt, JumpId, JumpState, JumpStatus, TransferError};
use crate::domain::placement::{protected_zone_in, FreeSpaceFinder, OccupiedVolume};
use crate::domain::portal::Portal;
use crate::domain::server_status::ServerStatusProbe;
use crate::domain::structure::{
    group_bounding_sphere, relocate_group, BlockId, BlockKind, Occupant, StructureGraph, StructureId,
};
use crate::domain::transfer::{TransferEnvelope, TransferFileInfo};
use crate::domain::world::{Collaborators, JumpDevice, TransferContext};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::mailbox::{FilesystemMailbox, PendingFile};
use crate::infrastructure::wire_format::WireFormat;

/// Outcome of a delivered jump.
#[derive(Debug, Clone, PartialEq)]
pub struct JumpReport {
    pub jump_id: JumpId,
    pub portal: String,
    pub structure_id: StructureId,
    pub destination: Destination,
    /// Payload written to the mailbox, for remote jumps.
    pub published: Option<PathBuf>,
    /// Landing point, for in-place jumps.
    pub landed_at: Option<Position>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InboundReport {
    pub materialized: usize,
    pub queued: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Result of one scheduler tick. Outbound jumps keep running after the tick
/// returns; await the handles to observe them.
#[derive(Debug)]
pub struct TickReport {
    pub jumps: Vec<JoinHandle<Result<JumpReport, TransferError>>>,
    pub inbound: InboundReport,
}

enum IntakeOutcome {
    Materialized,
    Queued,
    Skipped,
    Failed,
}

/// Removes a structure from the in-flight set when its jump task ends.
struct InFlightGuard {
    set: Arc<DashSet<StructureId>>,
    structure: StructureId,
}

impl InFlightGuard {
    fn acquire(set: &Arc<DashSet<StructureId>>, structure: StructureId) -> Option<Self> {
        set.insert(structure).then(|| Self {
            set: Arc::clone(set),
            structure,
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.remove(&self.structure);
    }
}

pub struct JumpOrchestrator {
    config: Arc<WarpgateConfig>,
    portals: Vec<Portal>,
    collaborators: Collaborators,
    resolver: DestinationResolver,
    remapper: IdentityRemapper,
    probe: Arc<dyn ServerStatusProbe>,
    mailbox: FilesystemMailbox,
    wire: WireFormat,
    finder: FreeSpaceFinder,
    event_bus: Arc<EventBus>,
    queue: InboundQueue,
    commit_lock: tokio::sync::Mutex<()>,
    in_flight: Arc<DashSet<StructureId>>,
    /// Stems of payloads materialized by this process.
    delivered: DashSet<String>,
    rng: Mutex<StdRng>,
}

impl JumpOrchestrator {
    /// Wires the orchestrator; fails on an invalid configuration or a
    /// missing mailbox folder.
    pub fn new(
        config: WarpgateConfig,
        collaborators: Collaborators,
        probe: Arc<dyn ServerStatusProbe>,
        event_bus: Arc<EventBus>,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        let folder = config
            .folder
            .clone()
            .ok_or_else(|| anyhow::anyhow!("folder must be configured to exchange transfers"))?;

        let config = Arc::new(config);
        let portals = config.portals();
        let resolver = DestinationResolver::new(
            Arc::clone(&config),
            Arc::clone(&collaborators.world),
            Arc::clone(&collaborators.access),
        );
        let remapper = IdentityRemapper::new(Arc::clone(&collaborators.identities), config.keep_ownership);

        info!(
            gates = portals.len(),
            remote_gates = config.remote_gates.len(),
            folder = %folder.display(),
            "Jump orchestrator initialized"
        );

        Ok(Self {
            mailbox: FilesystemMailbox::new(folder, config.confirm_markers),
            finder: FreeSpaceFinder::new(config.free_space),
            portals,
            resolver,
            remapper,
            probe,
            wire: WireFormat::default(),
            event_bus,
            queue: InboundQueue::new(),
            commit_lock: tokio::sync::Mutex::new(()),
            in_flight: Arc::new(DashSet::new()),
            delivered: DashSet::new(),
            rng: Mutex::new(StdRng::from_os_rng()),
            collaborators,
            config,
        })
    }

    /// Makes landing positions reproducible.
    pub fn with_rng_seed(self, seed: u64) -> Self {
        *self.rng.lock() = StdRng::seed_from_u64(seed);
        self
    }

    pub fn portals(&self) -> &[Portal] {
        &self.portals
    }

    pub fn portal(&self, name: &str) -> Option<&Portal> {
        self.portals.iter().find(|p| p.name == name)
    }

    pub fn mailbox(&self) -> &FilesystemMailbox {
        &self.mailbox
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn queued_deliveries(&self) -> Vec<QueuedInbound> {
        self.queue.snapshot()
    }

    /// One scheduler tick: outbound scans are started before intake runs.
    pub async fn run_tick(self: &Arc<Self>) -> TickReport {
        let jumps = self.attempt_outbound_tick();
        let inbound = self.attempt_inbound_tick().await;
        TickReport { jumps, inbound }
    }

    /// Starts a jump task for every triggered structure in every portal.
    pub fn attempt_outbound_tick(self: &Arc<Self>) -> Vec<JoinHandle<Result<JumpReport, TransferError>>> {
        let mut handles = Vec::new();
        for portal in &self.portals {
            let area = portal.capture_sphere();
            for structure in self.collaborators.world.structures_in_sphere(&area) {
                if !self.resolver.is_triggered(portal, structure) {
                    continue;
                }
                let Some(guard) = InFlightGuard::acquire(&self.in_flight, structure) else {
                    debug!(portal = %portal.name, structure = %structure, "Jump already in flight");
                    continue;
                };

                let this = Arc::clone(self);
                let portal = portal.clone();
                handles.push(tokio::spawn(async move {
                    let _guard = guard;
                    this.run_jump(portal, structure).await
                }));
            }
        }
        handles
    }

    /// Runs one jump attempt to completion.
    pub async fn run_jump(&self, portal: Portal, structure: StructureId) -> Result<JumpReport, TransferError> {
        let mut attempt = JumpAttempt::new(portal.name.clone(), structure);
        attempt.advance(JumpState::Resolving)?;
        self.event_bus.publish(TransferEvent::JumpStarted {
            jump_id: attempt.id,
            portal: portal.name.clone(),
            structure_id: structure,
            started_at: attempt.started_at,
        });

        let jump = match self.resolver.resolve(&portal, structure) {
            Ok(jump) => jump,
            Err(e) => return Err(self.abort(&mut attempt, None, e)),
        };
        debug!(
            jump_id = %attempt.id,
            portal = %portal.name,
            structure = %structure,
            destination = %jump.resolved.destination,
            player = %jump.player.display_name,
            "Destination resolved"
        );
        self.collaborators
            .visuals
            .notify_jump_status_changed(JumpStatus::Ready, &portal.name, structure, None);

        match self.execute(&mut attempt, &portal, &jump).await {
            Ok(report) => {
                counter!("warpgate_jumps_total", "outcome" => "delivered").increment(1);
                Ok(report)
            }
            Err(e) => {
                self.collaborators
                    .visuals
                    .notify_jump_status_changed(JumpStatus::Cancelled, &portal.name, structure, None);
                Err(self.abort(&mut attempt, Some(&jump.player), e))
            }
        }
    }

    fn abort(&self, attempt: &mut JumpAttempt, player: Option<&PlayerRef>, error: TransferError) -> TransferError {
        if let Err(e) = attempt.abort(error.to_string()) {
            warn!(jump_id = %attempt.id, error = %e, "Jump attempt was already finished");
        }

        match &error {
            TransferError::Resolution(reason) => {
                debug!(jump_id = %attempt.id, portal = %attempt.portal, %reason, "Jump not resolved")
            }
            TransferError::Capacity(status) => {
                info!(jump_id = %attempt.id, portal = %attempt.portal, %status, "Destination refused jump")
            }
            TransferError::Serialization(_) => {
                error!(jump_id = %attempt.id, portal = %attempt.portal, error = %error, "Jump failed")
            }
            _ => warn!(jump_id = %attempt.id, portal = %attempt.portal, error = %error, "Jump aborted"),
        }

        if let (Some(player), Some(message)) = (player, error.user_message()) {
            self.collaborators.notifier.notify(player.identity_id, &message);
        }

        counter!("warpgate_jumps_total", "outcome" => error.kind()).increment(1);
        self.event_bus.publish(TransferEvent::JumpAborted {
            jump_id: attempt.id,
            portal: attempt.portal.clone(),
            structure_id: attempt.structure_id,
            kind: error.kind().to_string(),
            reason: error.to_string(),
            aborted_at: Utc::now(),
        });
        error
    }

    async fn execute(
        &self,
        attempt: &mut JumpAttempt,
        portal: &Portal,
        jump: &ResolvedJump,
    ) -> Result<JumpReport, TransferError> {
        let structure = attempt.structure_id;
        let group = self
            .collaborators
            .world
            .structure_group(structure, self.config.include_connected_grids);
        if group.is_empty() {
            return Err(TransferError::Host(format!("structure {} vanished", structure)));
        }

        let context = TransferContext {
            player: &jump.player,
            portal: &portal.name,
            destination: &jump.resolved.destination_id,
            structures: &group,
        };
        for guard in &self.collaborators.guards {
            guard.before_transfer(&context).map_err(TransferError::Cancelled)?;
        }

        let probe_address = match &jump.resolved.destination {
            Destination::Remote { address, .. } if self.config.check_if_target_server_full => Some(address.as_str()),
            _ => None,
        };
        if probe_address.is_some() {
            attempt.advance(JumpState::Probing)?;
        }

        let probe = async {
            let Some(address) = probe_address else {
                return Ok(());
            };
            let status = self.probe.query(address, self.config.status_probe_timeout).await;
            if status.is_accept() {
                Ok(())
            } else {
                Err(TransferError::Capacity(status))
            }
        };
        let visual = async {
            self.collaborators
                .visuals
                .play_jump(portal, structure)
                .await
                .map_err(|e| TransferError::Host(format!("jump visual failed: {}", e)))
        };
        tokio::try_join!(probe, visual)?;

        attempt.advance(JumpState::Serializing)?;

        match &jump.resolved.destination {
            Destination::Remote { portal: target, address } => {
                self.commit_remote(attempt, portal, jump, group, target, address).await
            }
            Destination::Local { portal: target } => {
                let center = self
                    .portal(target)
                    .map(Portal::capture_sphere)
                    .ok_or_else(|| TransferError::Resolution(format!("local gate '{}' disappeared", target)))?;
                self.commit_local(attempt, portal, jump, center).await
            }
            Destination::RawCoordinate { position } => {
                let center = BoundingSphere::new(*position, self.config.gate_radius);
                self.commit_local(attempt, portal, jump, center).await
            }
        }
    }

    /// Moves the group in place to a landing point around `center`.
    async fn commit_local(
        &self,
        attempt: &mut JumpAttempt,
        portal: &Portal,
        jump: &ResolvedJump,
        center: BoundingSphere,
    ) -> Result<JumpReport, TransferError> {
        let world = &self.collaborators.world;
        let _commit = self.commit_lock.lock().await;

        let group = world.structure_group(attempt.structure_id, self.config.include_connected_grids);
        let bounds = group_bounding_sphere(&group).ok_or_else(|| {
            TransferError::Host(format!("structure {} vanished before commit", attempt.structure_id))
        })?;
        let ids: Vec<StructureId> = group.iter().map(|s| s.id).collect();

        attempt.advance(JumpState::Publishing)?;
        self.collaborators
            .visuals
            .notify_jump_status_changed(JumpStatus::Perform, &portal.name, attempt.structure_id, None);

        let target = self
            .find_landing(&center, bounds.radius, &group)
            .ok_or_else(|| TransferError::Placement(jump.resolved.display_name.clone()))?;
        world
            .teleport_group(&ids, target)
            .map_err(|e| TransferError::Host(format!("teleport failed: {}", e)))?;

        self.spend_device(&jump.device);
        self.resolver.acknowledge(portal, &jump.device);
        attempt.advance(JumpState::Delivered)?;

        self.collaborators.visuals.notify_jump_status_changed(
            JumpStatus::Succeeded,
            &portal.name,
            attempt.structure_id,
            Some(target),
        );
        self.event_bus.publish(TransferEvent::LocalJumpCompleted {
            jump_id: attempt.id,
            portal: portal.name.clone(),
            destination: jump.resolved.destination_id.clone(),
            completed_at: Utc::now(),
        });
        info!(
            jump_id = %attempt.id,
            portal = %portal.name,
            destination = %jump.resolved.destination,
            structures = ids.len(),
            "Local jump completed"
        );

        Ok(JumpReport {
            jump_id: attempt.id,
            portal: portal.name.clone(),
            structure_id: attempt.structure_id,
            destination: jump.resolved.destination.clone(),
            published: None,
            landed_at: Some(target),
        })
    }

    /// Publishes the group to a remote gate and closes it here.
    async fn commit_remote(
        &self,
        attempt: &mut JumpAttempt,
        portal: &Portal,
        jump: &ResolvedJump,
        group: Vec<StructureGraph>,
        target_gate: &str,
        address: &str,
    ) -> Result<JumpReport, TransferError> {
        let envelope = self.build_envelope(portal, jump, group)?;
        let payload = self
            .wire
            .serialize(&envelope)
            .map_err(|e| TransferError::Serialization(e.to_string()))?;
        let anchor_name = envelope
            .structures
            .iter()
            .max_by_key(|s| s.blocks.len())
            .map(|s| s.display_name.clone())
            .unwrap_or_default();
        let ids: Vec<StructureId> = envelope.structures.iter().map(|s| s.id).collect();

        let (info, path) = {
            let world = &self.collaborators.world;
            let _commit = self.commit_lock.lock().await;

            if let Some(missing) = ids.iter().find(|id| world.snapshot(**id).is_none()) {
                return Err(TransferError::Host(format!("structure {} vanished before commit", missing)));
            }

            attempt.advance(JumpState::Publishing)?;
            self.collaborators
                .visuals
                .notify_jump_status_changed(JumpStatus::Perform, &portal.name, attempt.structure_id, None);

            // Named under the lock so concurrent jumps never share a file.
            let info = self
                .mailbox
                .unused_file_info(TransferFileInfo::new(
                    target_gate,
                    jump.player.account_id,
                    &jump.player.display_name,
                    &anchor_name,
                    Utc::now(),
                ))
                .await;
            let path = self.mailbox.publish(&info, &payload).await?;
            if let Err(e) = world.close_structures(&ids) {
                let published = PendingFile {
                    path: path.clone(),
                    stem: info.create_file_name(),
                };
                if let Err(retract) = self.mailbox.discard(&published).await {
                    error!(file = %path.display(), error = %retract, "Failed to retract payload after close failure");
                }
                return Err(TransferError::Host(format!("failed to close source structures: {}", e)));
            }
            (info, path)
        };

        counter!("warpgate_transfers_published_total").increment(1);
        info!(
            jump_id = %attempt.id,
            portal = %portal.name,
            file = %path.display(),
            blocks = envelope.block_count(),
            "{}",
            info.create_log_string()
        );

        if self.config.outgoing_backup {
            if let Err(e) = self.mailbox.backup_outgoing(&info, &payload).await {
                warn!(file = %path.display(), error = %e, "Failed to keep outgoing backup");
            }
        }
        self.hand_over_players(&envelope, &jump.player, address);
        self.announce_jump_out(jump);
        if self.config.save_on_exit {
            self.collaborators.saver.save();
        }

        attempt.advance(JumpState::Delivered)?;
        self.collaborators.visuals.notify_jump_status_changed(
            JumpStatus::Succeeded,
            &portal.name,
            attempt.structure_id,
            None,
        );
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.event_bus.publish(TransferEvent::TransferPublished {
            jump_id: attempt.id,
            portal: portal.name.clone(),
            destination: target_gate.to_string(),
            file_name,
            published_at: Utc::now(),
        });

        Ok(JumpReport {
            jump_id: attempt.id,
            portal: portal.name.clone(),
            structure_id: attempt.structure_id,
            destination: jump.resolved.destination.clone(),
            published: Some(path),
            landed_at: None,
        })
    }

    /// Detached envelope for a group leaving through `portal`.
    fn build_envelope(
        &self,
        portal: &Portal,
        jump: &ResolvedJump,
        mut structures: Vec<StructureGraph>,
    ) -> Result<TransferEnvelope, TransferError> {
        let identities_dir = &self.collaborators.identities;

        for block in structures.iter_mut().flat_map(|s| s.blocks.iter_mut()) {
            match &mut block.kind {
                BlockKind::Projector {
                    enabled,
                    projected_blueprint,
                } => {
                    *enabled = false;
                    if !self.config.export_projector_blueprints {
                        *projected_blueprint = None;
                    }
                }
                BlockKind::JumpDrive {
                    enabled,
                    stored_power,
                    custom_data,
                } => {
                    *enabled = false;
                    *stored_power = 0.0;
                    custom_data.clear();
                }
                _ => {}
            }
        }

        let referenced: BTreeSet<IdentityId> = structures
            .iter()
            .flat_map(|s| s.blocks.iter())
            .flat_map(|b| b.referenced_identities())
            .chain(std::iter::once(jump.player.identity_id))
            .collect();

        let mut identities = BTreeMap::new();
        let mut player_accounts = BTreeMap::new();
        for id in referenced {
            if id.is_nobody() || identities_dir.is_npc(id) {
                continue;
            }
            let Some(record) = identities_dir.identity(id) else {
                continue;
            };
            identities.insert(id, record);
            if let Some(account) = identities_dir.account_for_identity(id).filter(|a| !a.is_none()) {
                player_accounts.insert(id, account);
            }
        }

        if identities.is_empty() {
            return Err(TransferError::Serialization(
                "no known player identity is referenced by the structures".to_string(),
            ));
        }

        Ok(TransferEnvelope {
            structures,
            identities,
            player_accounts,
            source_gate: portal.name.clone(),
            source_destination_id: jump.resolved.destination_id.clone(),
        })
    }

    /// Redirects everyone aboard to the destination and removes their
    /// characters here.
    fn hand_over_players(&self, envelope: &TransferEnvelope, player: &PlayerRef, address: &str) {
        let identities = &self.collaborators.identities;
        let pilots: BTreeSet<IdentityId> = envelope
            .structures
            .iter()
            .flat_map(|s| s.blocks.iter())
            .filter_map(|b| b.pilot().map(|p| p.identity_id))
            .collect();

        let mut accounts: BTreeSet<AccountId> = pilots
            .iter()
            .filter_map(|id| identities.account_for_identity(*id))
            .collect();
        accounts.insert(player.account_id);
        for account in accounts.into_iter().filter(|a| !a.is_none()) {
            self.collaborators.notifier.redirect(account, address);
        }

        for identity in pilots {
            if let Some(character) = identities.live_character(identity) {
                if let Err(e) = identities.kill_character(character) {
                    warn!(identity = %identity, error = %e, "Failed to remove character of departed player");
                }
            }
        }
    }

    fn announce_jump_out(&self, jump: &ResolvedJump) {
        let template = self.config.jump_out_notification.trim();
        if template.is_empty() {
            return;
        }
        let message = template
            .replace("{PlayerName}", &jump.player.display_name)
            .replace("{JumpTo}", &jump.resolved.display_name);
        self.collaborators.notifier.broadcast(&message);
    }

    fn spend_device(&self, device: &JumpDevice) {
        let world = &self.collaborators.world;
        if let Err(e) = world.drain_device_power(device.structure_id, device.block_id) {
            warn!(structure = %device.structure_id, error = %e, "Failed to drain jump device");
        }
        if let Err(e) = world.set_devices_enabled(device.structure_id, &[device.block_id], false) {
            warn!(structure = %device.structure_id, error = %e, "Failed to disable jump device");
        }
    }

    /// Free landing point for a group of radius `radius` around `center`,
    /// ignoring the volumes of `moving` itself.
    fn find_landing(&self, center: &BoundingSphere, radius: f64, moving: &[StructureGraph]) -> Option<Position> {
        let settings = self.config.free_space;
        let reach = center.radius + 2.0 * radius + settings.rings as f64 * settings.step * radius.max(1.0);
        let area = BoundingSphere::new(center.center, reach);

        let own: Vec<BoundingSphere> = moving.iter().map(StructureGraph::bounding_sphere).collect();
        let occupied: Vec<OccupiedVolume> = self
            .collaborators
            .world
            .occupied_volumes(&area)
            .into_iter()
            .filter(|volume| !own.contains(&volume.sphere))
            .collect();
        let zone = protected_zone_in(center, &occupied);

        let mut rng = self.rng.lock();
        self.finder
            .find_free_position(center, radius, zone.as_ref(), &occupied, &mut *rng)
    }

    /// Scans the intake folder for every local portal.
    pub async fn attempt_inbound_tick(&self) -> InboundReport {
        let mut report = InboundReport::default();
        for portal in &self.portals {
            let files = match self.mailbox.list_for_gate(&portal.name).await {
                Ok(files) => files,
                Err(e) => {
                    warn!(portal = %portal.name, error = %e, "Failed to scan intake folder");
                    continue;
                }
            };
            for file in files {
                match self.intake(portal, file).await {
                    IntakeOutcome::Materialized => report.materialized += 1,
                    IntakeOutcome::Queued => report.queued += 1,
                    IntakeOutcome::Skipped => report.skipped += 1,
                    IntakeOutcome::Failed => report.failed += 1,
                }
            }
        }

        if report.materialized > 0 && self.config.save_on_enter {
            self.collaborators.saver.save();
        }
        if report != InboundReport::default() {
            debug!(?report, "Inbound tick finished");
        }
        report
    }

    async fn intake(&self, portal: &Portal, file: PendingFile) -> IntakeOutcome {
        if self.delivered.contains(&file.stem) || self.mailbox.is_marked_received(&file.stem).await {
            warn!(file = %file.file_name(), "Payload was already materialized, discarding duplicate");
            if let Err(e) = self.mailbox.discard(&file).await {
                warn!(file = %file.file_name(), error = %e, "Failed to discard duplicate payload");
            }
            return IntakeOutcome::Skipped;
        }
        if self.queue.contains_file(&file.stem) {
            return IntakeOutcome::Skipped;
        }

        let info = match file.info() {
            Ok(info) => info,
            Err(e) => {
                self.intake_failed(&file.file_name(), &TransferError::Serialization(e.to_string()));
                return IntakeOutcome::Failed;
            }
        };
        let envelope = match self.load(&file).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => {
                debug!(file = %file.file_name(), "Payload vanished before it was read");
                return IntakeOutcome::Skipped;
            }
            Err(e) => {
                self.intake_failed(&file.file_name(), &e);
                return IntakeOutcome::Failed;
            }
        };

        let account = info.account_id;
        self.retire_stale_character(account);
        if !account.is_none() && !self.collaborators.identities.is_connected(account) {
            if self.queue.contains_account(account) {
                debug!(file = %file.file_name(), account = %account, "Account already has a queued delivery");
                return IntakeOutcome::Skipped;
            }
            let file_name = file.file_name();
            self.queue.push(QueuedInbound {
                portal: portal.name.clone(),
                file,
                info,
                queued_at: Utc::now(),
            });
            info!(file = %file_name, account = %account, "Target account is offline, delivery queued");
            self.event_bus.publish(TransferEvent::DeliveryQueued {
                file_name,
                account_id: account,
                queued_at: Utc::now(),
            });
            return IntakeOutcome::Queued;
        }

        match self.materialize(portal, &file, envelope, &info).await {
            Ok(Some(_)) => IntakeOutcome::Materialized,
            Ok(None) => IntakeOutcome::Skipped,
            Err(e) => {
                self.intake_failed(&file.file_name(), &e);
                IntakeOutcome::Failed
            }
        }
    }

    async fn load(&self, file: &PendingFile) -> Result<Option<TransferEnvelope>, TransferError> {
        let Some(bytes) = self.mailbox.read(&file.path).await? else {
            return Ok(None);
        };
        self.wire
            .deserialize(&bytes)
            .map(Some)
            .map_err(|e| TransferError::Serialization(e.to_string()))
    }

    fn intake_failed(&self, file_name: &str, error: &TransferError) {
        match error {
            TransferError::Placement(_) => {
                warn!(file = %file_name, error = %error, "No room at the gate, payload kept for the next scan")
            }
            _ => error!(file = %file_name, error = %error, "Payload left in place for inspection"),
        }
        counter!("warpgate_intake_failures_total", "kind" => error.kind()).increment(1);
        self.event_bus.publish(TransferEvent::IntakeFailed {
            file_name: file_name.to_string(),
            kind: error.kind().to_string(),
            reason: error.to_string(),
            failed_at: Utc::now(),
        });
    }

    /// Claims, lands and spawns a payload, then retires the file.
    ///
    /// Returns `None` when another process claimed the payload first.
    async fn materialize(
        &self,
        portal: &Portal,
        file: &PendingFile,
        envelope: TransferEnvelope,
        info: &TransferFileInfo,
    ) -> Result<Option<Vec<StructureId>>, TransferError> {
        let _commit = self.commit_lock.lock().await;

        let Some(claimed) = self.mailbox.claim(file).await? else {
            debug!(file = %file.file_name(), "Payload was claimed elsewhere");
            return Ok(None);
        };

        let (ids, position) = match self.land(portal, envelope, info.account_id) {
            Ok(landed) => landed,
            Err(e) => {
                if let Err(release) = self.mailbox.release(claimed).await {
                    error!(file = %file.file_name(), error = %release, "Failed to release claimed payload");
                }
                return Err(e);
            }
        };
        self.delivered.insert(file.stem.clone());

        match self.mailbox.complete(&claimed, self.config.grid_backup).await {
            Ok(backup) => debug!(file = %file.file_name(), backup = ?backup, "Payload retired"),
            Err(e) => {
                warn!(file = %file.file_name(), error = %e, "Failed to retire payload after spawn");
                counter!("warpgate_intake_failures_total", "kind" => "io").increment(1);
            }
        }

        counter!("warpgate_transfers_received_total").increment(1);
        if let Some(first) = ids.first() {
            self.collaborators.visuals.notify_jump_status_changed(
                JumpStatus::Succeeded,
                &portal.name,
                *first,
                Some(position),
            );
        }
        info!(portal = %portal.name, structures = ids.len(), "Delivery materialized: {}", info.create_log_string());
        self.event_bus.publish(TransferEvent::DeliveryMaterialized {
            file_name: file.file_name(),
            portal: portal.name.clone(),
            account_id: info.account_id,
            structure_ids: ids.clone(),
            materialized_at: Utc::now(),
        });
        Ok(Some(ids))
    }

    /// Places, remaps and spawns an envelope at `portal`. Must run under the
    /// commit lock.
    fn land(
        &self,
        portal: &Portal,
        mut envelope: TransferEnvelope,
        requester: AccountId,
    ) -> Result<(Vec<StructureId>, Position), TransferError> {
        let bounds = group_bounding_sphere(&envelope.structures)
            .ok_or_else(|| TransferError::Serialization("envelope carries no structures".to_string()))?;
        let target = self
            .find_landing(&portal.capture_sphere(), bounds.radius, &[])
            .ok_or_else(|| TransferError::Placement(portal.name.clone()))?;

        let outcome = self.remapper.remap(&mut envelope, requester)?;
        let travellers: BTreeSet<AccountId> = envelope.player_accounts.values().copied().collect();
        for account in travellers {
            self.retire_stale_character(account);
        }
        relocate_group(&mut envelope.structures, target);
        let seats = respawn_seats(&envelope.structures);

        let ids = self
            .collaborators
            .world
            .spawn(envelope.structures)
            .map_err(|e| TransferError::Host(format!("spawn failed: {}", e)))?;

        if self.config.player_respawn {
            self.respawn_occupants(&outcome.detached, &seats, &ids);
        }
        Ok((ids, target))
    }

    /// Terminates the live character of `account`, if it has one here.
    fn retire_stale_character(&self, account: AccountId) {
        if account.is_none() {
            return;
        }
        let identities = &self.collaborators.identities;
        let Some(identity) = identities.identity_for_account(account) else {
            return;
        };
        let Some(character) = identities.live_character(identity) else {
            return;
        };
        match identities.kill_character(character) {
            Ok(()) => debug!(account = %account, identity = %identity, "Stale character removed before delivery"),
            Err(e) => warn!(account = %account, identity = %identity, error = %e, "Failed to remove stale character"),
        }
    }

    /// Seats connected pilots in the spawned structures, replacing any
    /// character they still have here.
    fn respawn_occupants(&self, detached: &[DetachedOccupant], seats: &[(usize, BlockId)], ids: &[StructureId]) {
        let identities = &self.collaborators.identities;
        let mut seats = seats.iter();

        for occupant in detached {
            let (Some(identity), Some(account)) = (occupant.local_identity, occupant.account_id) else {
                continue;
            };
            if !identities.is_connected(account) {
                continue;
            }
            let Some((index, seat)) = seats.next() else {
                warn!(identity = %identity, "No free seat left to respawn pilot");
                break;
            };
            let Some(structure) = ids.get(*index) else {
                continue;
            };

            if let Some(stale) = identities.live_character(identity) {
                if let Err(e) = identities.kill_character(stale) {
                    warn!(identity = %identity, error = %e, "Failed to remove stale character");
                }
            }
            let seated = Occupant {
                identity_id: identity,
                display_name: occupant.display_name.clone(),
            };
            if let Err(e) = self.collaborators.world.seat_occupant(*structure, *seat, seated) {
                warn!(identity = %identity, structure = %structure, error = %e, "Failed to respawn pilot");
            }
        }
    }

    /// Replays the queued delivery of an account that just connected.
    pub async fn on_player_connected(&self, account: AccountId) -> Result<Option<Vec<StructureId>>, TransferError> {
        let Some(entry) = self.queue.take(account) else {
            return Ok(None);
        };
        let file_name = entry.file.file_name();
        let Some(portal) = self.portal(&entry.portal) else {
            warn!(file = %file_name, portal = %entry.portal, "Queued delivery targets an unknown gate");
            return Ok(None);
        };

        let result = match self.load(&entry.file).await {
            Ok(Some(envelope)) => {
                self.retire_stale_character(account);
                self.materialize(portal, &entry.file, envelope, &entry.info).await
            }
            Ok(None) => {
                warn!(file = %file_name, "Queued payload vanished before replay");
                Ok(None)
            }
            Err(e) => Err(e),
        };

        match &result {
            Ok(Some(_)) if self.config.save_on_enter => self.collaborators.saver.save(),
            Err(e) => self.intake_failed(&file_name, e),
            _ => {}
        }
        result
    }
}

/// Empty seats of a group, ordinary seats before cryo chambers.
fn respawn_seats(structures: &[StructureGraph]) -> Vec<(usize, BlockId)> {
    let mut seats: Vec<(bool, usize, BlockId)> = structures
        .iter()
        .enumerate()
        .flat_map(|(index, structure)| {
            structure.blocks.iter().filter_map(move |block| match &block.kind {
                BlockKind::Seat { cryo, pilot: None } => Some((*cryo, index, block.id)),
                _ => None,
            })
        })
        .collect();
    seats.sort_by_key(|(cryo, _, _)| *cryo);
    seats.into_iter().map(|(_, index, seat)| (index, seat)).collect()
}
