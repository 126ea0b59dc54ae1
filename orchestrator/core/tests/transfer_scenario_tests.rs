// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! End-to-end transfer tests between two in-memory host processes.
//!
//! Both processes share one temporary mailbox folder: "Alpha" hosts the
//! sending gate, "Beta" hosts the receiving gate.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

use warpgate_core::application::{IdentityRemapper, JumpOrchestrator, JumpReport};
use warpgate_core::domain::config::{GateConfig, RemoteGate, WarpgateConfig};
use warpgate_core::domain::destination::{Destination, DestinationRequest};
use warpgate_core::domain::events::TransferEvent;
use warpgate_core::domain::geometry::{BoundingSphere, Position};
use warpgate_core::domain::identity::{AccountId, IdentityId, IdentityRecord, PlayerRef};
use warpgate_core::domain::jump::TransferError;
use warpgate_core::domain::portal::AllowedDestination;
use warpgate_core::domain::server_status::{ServerStatus, ServerStatusProbe};
use warpgate_core::domain::structure::{Block, BlockKind, Occupant, Pose, StructureGraph, StructureId};
use warpgate_core::domain::transfer::TransferEnvelope;
use warpgate_core::domain::world::{IdentityDirectory, TransferContext, TransferGuard, WorldHost};
use warpgate_core::infrastructure::mailbox::{EntryState, BACKUP_DIR};
use warpgate_core::infrastructure::{EventBus, HttpStatusProbe, InMemoryWorld};

const BETA_ADDRESS: &str = "10.0.0.2:27080";

struct FixedProbe {
    status: ServerStatus,
    delay: Duration,
}

#[async_trait]
impl ServerStatusProbe for FixedProbe {
    async fn query(&self, _address: &str, _timeout: Duration) -> ServerStatus {
        tokio::time::sleep(self.delay).await;
        self.status
    }
}

fn accepting() -> Arc<dyn ServerStatusProbe> {
    Arc::new(FixedProbe {
        status: ServerStatus::Accept,
        delay: Duration::ZERO,
    })
}

fn gate_to(id: &str, gate: &str) -> AllowedDestination {
    AllowedDestination::Gate {
        id: id.to_string(),
        display_name: String::new(),
        gate: gate.to_string(),
    }
}

fn alpha_config(folder: &Path, beta_address: &str) -> WarpgateConfig {
    WarpgateConfig {
        folder: Some(folder.to_path_buf()),
        auto_send: true,
        gates: vec![GateConfig {
            name: "Alpha".to_string(),
            position: Position::zeros(),
            destinations: vec![gate_to("beta", "Beta")],
        }],
        remote_gates: vec![RemoteGate {
            name: "Beta".to_string(),
            address: beta_address.to_string(),
        }],
        ..WarpgateConfig::default()
    }
}

fn beta_config(folder: &Path) -> WarpgateConfig {
    WarpgateConfig {
        folder: Some(folder.to_path_buf()),
        gates: vec![GateConfig {
            name: "Beta".to_string(),
            position: Position::new(5_000.0, 0.0, 0.0),
            destinations: Vec::new(),
        }],
        ..WarpgateConfig::default()
    }
}

fn orchestrator(config: WarpgateConfig, world: &InMemoryWorld, probe: Arc<dyn ServerStatusProbe>) -> Arc<JumpOrchestrator> {
    let orchestrator = JumpOrchestrator::new(config, world.collaborators(), probe, Arc::new(EventBus::new(64)))
        .unwrap()
        .with_rng_seed(7);
    Arc::new(orchestrator)
}

fn ship(id: i64, name: &str, pilot: &PlayerRef, position: Position) -> StructureGraph {
    let mut cockpit = Block::generic(2, "LargeBlockCockpit", pilot.identity_id);
    cockpit.kind = BlockKind::Seat {
        cryo: false,
        pilot: Some(Occupant {
            identity_id: pilot.identity_id,
            display_name: pilot.display_name.clone(),
        }),
    };
    let mut drive = Block::generic(3, "WormholeDrive", pilot.identity_id);
    drive.kind = BlockKind::JumpDrive {
        enabled: true,
        stored_power: 5.0,
        custom_data: String::new(),
    };
    StructureGraph {
        id: StructureId(id),
        display_name: name.to_string(),
        pose: Pose::at(position),
        bounding_radius: 15.0,
        linear_velocity: Position::new(3.0, 0.0, 0.0),
        angular_velocity: Position::zeros(),
        blocks: vec![Block::generic(1, "LargeBlockArmorBlock", pilot.identity_id), cockpit, drive],
    }
}

async fn run_outbound(orchestrator: &Arc<JumpOrchestrator>) -> Vec<Result<JumpReport, TransferError>> {
    let mut results = Vec::new();
    for handle in orchestrator.attempt_outbound_tick() {
        results.push(handle.await.expect("jump task panicked"));
    }
    results
}

async fn pending_payloads(orchestrator: &JumpOrchestrator) -> usize {
    orchestrator
        .mailbox()
        .entries()
        .await
        .unwrap()
        .iter()
        .filter(|entry| entry.state == EntryState::Pending)
        .count()
}

fn backup_count(folder: &Path) -> usize {
    std::fs::read_dir(folder.join(BACKUP_DIR))
        .map(|entries| entries.count())
        .unwrap_or(0)
}

/// Publishes one ship from Alpha and returns the shared folder.
async fn publish_from_alpha(folder: &TempDir) -> (InMemoryWorld, JumpReport) {
    let world = InMemoryWorld::new();
    let jane = world.add_player("Jane", AccountId(555), true);
    world.add_structure(ship(1, "Courier", &jane, Position::new(50.0, 0.0, 0.0)), Some(jane.identity_id), None);

    let alpha = orchestrator(alpha_config(folder.path(), BETA_ADDRESS), &world, accepting());
    let mut results = run_outbound(&alpha).await;
    assert_eq!(results.len(), 1);
    let report = results.remove(0).unwrap();
    (world, report)
}

#[tokio::test]
async fn test_remote_jump_end_to_end() {
    let folder = TempDir::new().unwrap();
    let alpha_world = InMemoryWorld::new();
    let jane = alpha_world.add_player("Jane", AccountId(555), true);
    alpha_world.add_structure(
        ship(1, "Courier", &jane, Position::new(50.0, 0.0, 0.0)),
        Some(jane.identity_id),
        None,
    );
    let alpha = orchestrator(alpha_config(folder.path(), BETA_ADDRESS), &alpha_world, accepting());
    let mut events = alpha.event_bus().subscribe();

    let results = run_outbound(&alpha).await;
    let report = results.into_iter().next().unwrap().unwrap();

    assert!(matches!(report.destination, Destination::Remote { .. }));
    assert!(report.published.as_ref().unwrap().exists());
    assert_eq!(alpha_world.structure_count(), 0);
    assert_eq!(alpha_world.redirects(), vec![(AccountId(555), BETA_ADDRESS.to_string())]);
    assert_eq!(alpha_world.killed_characters().len(), 1);

    let mut published = false;
    while let Ok(event) = events.try_recv() {
        published |= matches!(event, TransferEvent::TransferPublished { .. });
    }
    assert!(published);

    // Beta knows Jane under a different local identity.
    let beta_world = InMemoryWorld::new();
    beta_world.add_identity(IdentityId(900), "Somebody", None, false);
    let jane_here = beta_world.add_player("Jane", AccountId(555), true);
    let beta = orchestrator(beta_config(folder.path()), &beta_world, accepting());

    let inbound = beta.attempt_inbound_tick().await;
    assert_eq!(inbound.materialized, 1);
    assert_eq!(pending_payloads(&beta).await, 0);
    assert_eq!(backup_count(folder.path()), 1);

    let arrived = beta_world.structures();
    assert_eq!(arrived.len(), 1);
    let structure = &arrived[0];
    assert!(structure.blocks.iter().all(|b| b.owner == jane_here.identity_id));
    assert_eq!(structure.linear_velocity, Position::zeros());
    let gate = BoundingSphere::new(Position::new(5_000.0, 0.0, 0.0), 180.0);
    assert!((structure.pose.position - gate.center).norm() <= gate.radius + 1e-6);

    // Jane was re-seated and her stale character replaced.
    let pilot = structure.blocks.iter().find_map(|b| b.pilot()).unwrap();
    assert_eq!(pilot.identity_id, jane_here.identity_id);
    assert_eq!(beta_world.killed_characters().len(), 1);

    // Arrived jump drives are spent and cleared.
    assert!(structure.blocks.iter().all(|b| match &b.kind {
        BlockKind::JumpDrive { enabled, stored_power, custom_data } =>
            !enabled && *stored_power == 0.0 && custom_data.is_empty(),
        _ => true,
    }));
}

#[test]
fn test_new_account_is_allocated_and_owns_block() {
    let world = InMemoryWorld::new();
    let mut envelope = TransferEnvelope {
        structures: vec![StructureGraph {
            id: StructureId(1),
            display_name: "Crate".to_string(),
            pose: Pose::at(Position::zeros()),
            bounding_radius: 2.0,
            linear_velocity: Position::zeros(),
            angular_velocity: Position::zeros(),
            blocks: vec![Block::generic(1, "LargeBlockArmorBlock", IdentityId(7))],
        }],
        identities: [(IdentityId(7), IdentityRecord::new(IdentityId(7), "Jane"))]
            .into_iter()
            .collect(),
        player_accounts: [(IdentityId(7), AccountId(555))].into_iter().collect(),
        source_gate: "Alpha".to_string(),
        source_destination_id: "beta".to_string(),
    };
    assert!(world.identity_for_account(AccountId(555)).is_none());

    let remapper = IdentityRemapper::new(Arc::new(world.clone()), true);
    let outcome = remapper.remap(&mut envelope, AccountId(555)).unwrap();

    let local = world.identity_for_account(AccountId(555)).unwrap();
    assert_ne!(local, IdentityId(7));
    assert_eq!(outcome.mapping.get(&IdentityId(7)), Some(&local));
    assert_eq!(envelope.structures[0].blocks[0].owner, local);
}

#[tokio::test]
async fn test_unreachable_destination_aborts_untouched() {
    let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let address = closed.local_addr().unwrap().to_string();
    drop(closed);

    let probe = HttpStatusProbe::new().unwrap();
    let started = Instant::now();
    let status = probe.query(&address, Duration::from_secs(2)).await;
    assert_eq!(status, ServerStatus::Unreachable);
    assert!(started.elapsed() < Duration::from_secs(3));

    let folder = TempDir::new().unwrap();
    let world = InMemoryWorld::new();
    let jane = world.add_player("Jane", AccountId(555), true);
    let id = world.add_structure(
        ship(1, "Courier", &jane, Position::new(50.0, 0.0, 0.0)),
        Some(jane.identity_id),
        None,
    );
    let before = world.structure(id).unwrap();
    let alpha = orchestrator(alpha_config(folder.path(), &address), &world, Arc::new(probe));

    let results = run_outbound(&alpha).await;
    assert!(matches!(
        results[0],
        Err(TransferError::Capacity(ServerStatus::Unreachable))
    ));
    assert_eq!(world.structure(id).unwrap(), before);
    assert_eq!(pending_payloads(&alpha).await, 0);
    assert!(world.redirects().is_empty());
    assert_eq!(
        world.notifications(),
        vec![(jane.identity_id, "Destination server is not responding!".to_string())]
    );
}

#[tokio::test]
async fn test_full_destination_gets_distinct_message() {
    let folder = TempDir::new().unwrap();
    let world = InMemoryWorld::new();
    let jane = world.add_player("Jane", AccountId(555), true);
    world.add_structure(ship(1, "Courier", &jane, Position::new(50.0, 0.0, 0.0)), Some(jane.identity_id), None);
    let probe = Arc::new(FixedProbe {
        status: ServerStatus::Full,
        delay: Duration::ZERO,
    });
    let alpha = orchestrator(alpha_config(folder.path(), BETA_ADDRESS), &world, probe);

    let results = run_outbound(&alpha).await;
    assert!(matches!(results[0], Err(TransferError::Capacity(ServerStatus::Full))));
    assert_eq!(world.structure_count(), 1);
    assert_eq!(world.notifications()[0].1, "Destination server is FULL!");

    // The attempt is retried on the next tick.
    assert_eq!(alpha.attempt_outbound_tick().len(), 1);
}

#[tokio::test]
async fn test_two_structures_in_one_tick_jump_independently() {
    let folder = TempDir::new().unwrap();
    let world = InMemoryWorld::new();
    let jane = world.add_player("Jane", AccountId(555), true);
    let max = world.add_player("Max", AccountId(777), true);
    world.add_structure(ship(1, "Courier", &jane, Position::new(40.0, 0.0, 0.0)), Some(jane.identity_id), None);
    world.add_structure(ship(2, "Hauler", &max, Position::new(-40.0, 0.0, 0.0)), Some(max.identity_id), None);

    let probe = Arc::new(FixedProbe {
        status: ServerStatus::Accept,
        delay: Duration::from_millis(50),
    });
    let alpha = orchestrator(alpha_config(folder.path(), BETA_ADDRESS), &world, probe);

    let started = Instant::now();
    let results = run_outbound(&alpha).await;
    assert!(started.elapsed() < Duration::from_millis(1_000));

    assert_eq!(results.len(), 2);
    let files: Vec<_> = results
        .into_iter()
        .map(|r| r.unwrap().published.unwrap())
        .collect();
    assert_ne!(files[0], files[1]);
    assert_eq!(world.structure_count(), 0);
    assert_eq!(pending_payloads(&alpha).await, 2);
}

#[tokio::test]
async fn test_same_named_ships_of_one_account_get_distinct_files() {
    for _ in 0..10 {
        let folder = TempDir::new().unwrap();
        let world = InMemoryWorld::new();
        let jane = world.add_player("Jane", AccountId(555), true);
        world.add_structure(ship(1, "Courier", &jane, Position::new(40.0, 0.0, 0.0)), Some(jane.identity_id), None);
        world.add_structure(ship(2, "Courier", &jane, Position::new(-40.0, 0.0, 0.0)), Some(jane.identity_id), None);
        let alpha = orchestrator(alpha_config(folder.path(), BETA_ADDRESS), &world, accepting());

        let files: Vec<_> = run_outbound(&alpha)
            .await
            .into_iter()
            .map(|r| r.unwrap().published.unwrap())
            .collect();
        assert_eq!(files.len(), 2);
        assert_ne!(files[0], files[1]);
        assert_eq!(world.structure_count(), 0);
        assert_eq!(pending_payloads(&alpha).await, 2);
    }
}

#[tokio::test]
async fn test_stale_character_is_removed_without_respawn() {
    let folder = TempDir::new().unwrap();
    publish_from_alpha(&folder).await;

    let beta_world = InMemoryWorld::new();
    let jane_here = beta_world.add_player("Jane", AccountId(555), true);
    let stale = beta_world.live_character(jane_here.identity_id).unwrap();
    let mut config = beta_config(folder.path());
    config.player_respawn = false;
    let beta = orchestrator(config, &beta_world, accepting());

    assert_eq!(beta.attempt_inbound_tick().await.materialized, 1);
    assert_eq!(beta_world.killed_characters(), vec![stale]);
    assert!(beta_world.live_character(jane_here.identity_id).is_none());
}

#[tokio::test]
async fn test_stale_character_of_offline_account_is_removed_when_queued() {
    let folder = TempDir::new().unwrap();
    publish_from_alpha(&folder).await;

    let beta_world = InMemoryWorld::new();
    let jane_here = beta_world.add_player("Jane", AccountId(555), false);
    let beta = orchestrator(beta_config(folder.path()), &beta_world, accepting());

    assert_eq!(beta.attempt_inbound_tick().await.queued, 1);
    assert!(beta_world.live_character(jane_here.identity_id).is_none());
    assert_eq!(beta_world.killed_characters().len(), 1);
}

#[tokio::test]
async fn test_offline_account_is_queued_until_connect() {
    let folder = TempDir::new().unwrap();
    publish_from_alpha(&folder).await;

    let beta_world = InMemoryWorld::new();
    beta_world.add_player("Jane", AccountId(555), false);
    let beta = orchestrator(beta_config(folder.path()), &beta_world, accepting());

    let first = beta.attempt_inbound_tick().await;
    assert_eq!(first.queued, 1);
    assert_eq!(beta_world.structure_count(), 0);
    assert_eq!(pending_payloads(&beta).await, 1);
    assert_eq!(beta.queued_deliveries().len(), 1);

    // Rescanning leaves the queued payload alone.
    let second = beta.attempt_inbound_tick().await;
    assert_eq!(second.queued, 0);
    assert_eq!(second.skipped, 1);

    beta_world.connect(AccountId(555));
    let spawned = beta.on_player_connected(AccountId(555)).await.unwrap().unwrap();
    assert_eq!(spawned.len(), 1);
    assert_eq!(beta_world.structure_count(), 1);
    assert_eq!(pending_payloads(&beta).await, 0);

    assert!(beta.on_player_connected(AccountId(555)).await.unwrap().is_none());
    assert_eq!(beta.attempt_inbound_tick().await.materialized, 0);
    assert_eq!(beta_world.structure_count(), 1);
}

#[tokio::test]
async fn test_reappearing_payload_is_not_materialized_twice() {
    let folder = TempDir::new().unwrap();
    let (_, report) = publish_from_alpha(&folder).await;
    let payload_path = report.published.unwrap();
    let payload = std::fs::read(&payload_path).unwrap();

    let beta_world = InMemoryWorld::new();
    beta_world.add_player("Jane", AccountId(555), true);
    let beta = orchestrator(beta_config(folder.path()), &beta_world, accepting());

    assert_eq!(beta.attempt_inbound_tick().await.materialized, 1);
    assert!(!payload_path.exists());

    // A crash-and-retry puts the same payload back into intake.
    std::fs::write(&payload_path, &payload).unwrap();
    let retry = beta.attempt_inbound_tick().await;
    assert_eq!(retry.materialized, 0);
    assert_eq!(retry.skipped, 1);
    assert_eq!(beta_world.structure_count(), 1);
    assert!(!payload_path.exists());
    assert_eq!(backup_count(folder.path()), 1);
}

#[tokio::test]
async fn test_confirm_markers_survive_restart() {
    let folder = TempDir::new().unwrap();
    let world = InMemoryWorld::new();
    let jane = world.add_player("Jane", AccountId(555), true);
    world.add_structure(ship(1, "Courier", &jane, Position::new(50.0, 0.0, 0.0)), Some(jane.identity_id), None);
    let mut config = alpha_config(folder.path(), BETA_ADDRESS);
    config.confirm_markers = true;
    let alpha = orchestrator(config, &world, accepting());
    let report = run_outbound(&alpha).await.remove(0).unwrap();
    let payload_path = report.published.unwrap();
    let payload = std::fs::read(&payload_path).unwrap();

    let beta_world = InMemoryWorld::new();
    beta_world.add_player("Jane", AccountId(555), true);
    let mut config = beta_config(folder.path());
    config.confirm_markers = true;
    let beta = orchestrator(config.clone(), &beta_world, accepting());
    assert_eq!(beta.attempt_inbound_tick().await.materialized, 1);

    // A fresh process sees the payload again but also the received marker.
    std::fs::write(&payload_path, &payload).unwrap();
    let restarted = orchestrator(config, &beta_world, accepting());
    assert_eq!(restarted.attempt_inbound_tick().await.materialized, 0);
    assert_eq!(beta_world.structure_count(), 1);
}

#[tokio::test]
async fn test_no_free_space_keeps_payload_for_retry() {
    let folder = TempDir::new().unwrap();
    publish_from_alpha(&folder).await;

    let beta_world = InMemoryWorld::new();
    beta_world.add_player("Jane", AccountId(555), true);
    let blocker = beta_world.add_structure(
        StructureGraph {
            id: StructureId(50),
            display_name: "Station".to_string(),
            pose: Pose::at(Position::new(5_000.0, 0.0, 0.0)),
            bounding_radius: 100_000.0,
            linear_velocity: Position::zeros(),
            angular_velocity: Position::zeros(),
            blocks: vec![Block::generic(1, "LargeBlockArmorBlock", IdentityId::NOBODY)],
        },
        None,
        None,
    );
    let beta = orchestrator(beta_config(folder.path()), &beta_world, accepting());
    let mut events = beta.event_bus().subscribe();

    let blocked = beta.attempt_inbound_tick().await;
    assert_eq!(blocked.failed, 1);
    assert_eq!(pending_payloads(&beta).await, 1);
    assert!(matches!(
        events.try_recv().unwrap(),
        TransferEvent::IntakeFailed { ref kind, .. } if kind.as_str() == "placement"
    ));

    beta_world.close_structures(&[blocker]).unwrap();
    assert_eq!(beta.attempt_inbound_tick().await.materialized, 1);
    assert_eq!(pending_payloads(&beta).await, 0);
}

#[tokio::test]
async fn test_corrupt_payload_is_left_in_place() {
    let folder = TempDir::new().unwrap();
    let beta_world = InMemoryWorld::new();
    let beta = orchestrator(beta_config(folder.path()), &beta_world, accepting());
    beta.mailbox().ensure_directories().await.unwrap();

    let path = beta
        .mailbox()
        .intake_dir()
        .join("Beta_555_Jane_Courier_1700000000000.wgt");
    std::fs::write(&path, b"definitely not an envelope").unwrap();

    let report = beta.attempt_inbound_tick().await;
    assert_eq!(report.failed, 1);
    assert!(path.exists());
    assert_eq!(beta_world.structure_count(), 0);
}

#[tokio::test]
async fn test_local_jump_moves_in_place() {
    let folder = TempDir::new().unwrap();
    let config = WarpgateConfig {
        folder: Some(folder.path().to_path_buf()),
        gates: vec![
            GateConfig {
                name: "Alpha".to_string(),
                position: Position::zeros(),
                destinations: vec![gate_to("home", "Home"), gate_to("beta", "Beta")],
            },
            GateConfig {
                name: "Home".to_string(),
                position: Position::new(20_000.0, 0.0, 0.0),
                destinations: Vec::new(),
            },
        ],
        ..WarpgateConfig::default()
    };

    let world = InMemoryWorld::new();
    let jane = world.add_player("Jane", AccountId(555), true);
    let mut graph = ship(1, "Courier", &jane, Position::new(50.0, 0.0, 0.0));
    if let BlockKind::JumpDrive { custom_data, .. } = &mut graph.blocks[2].kind {
        *custom_data = r#"{"plugin_request":true,"destination":"home"}"#.to_string();
    }
    let id = world.add_structure(graph, Some(jane.identity_id), None);
    let alpha = orchestrator(config, &world, accepting());

    let report = run_outbound(&alpha).await.remove(0).unwrap();
    let landed = report.landed_at.unwrap();
    assert!((landed - Position::new(20_000.0, 0.0, 0.0)).norm() <= 180.0 + 1e-6);

    let moved = world.structure(id).unwrap();
    assert!((moved.pose.position - landed).norm() < 1e-6);
    assert_eq!(pending_payloads(&alpha).await, 0);

    let device = world.jump_devices(id).remove(0);
    assert!(!device.enabled);
    let reply = DestinationRequest::parse(&device.custom_data).unwrap();
    assert!(!reply.plugin_request);
    assert_eq!(reply.destinations, vec!["home".to_string(), "beta".to_string()]);

    // A spent device does not trigger again.
    assert!(alpha.attempt_outbound_tick().is_empty());
}

struct NoCargoGuard;

impl TransferGuard for NoCargoGuard {
    fn before_transfer(&self, context: &TransferContext<'_>) -> Result<(), String> {
        if context.destination == "beta" {
            return Err("Jumps to Beta are closed today.".to_string());
        }
        Ok(())
    }
}

#[tokio::test]
async fn test_transfer_guard_cancels_jump() {
    let folder = TempDir::new().unwrap();
    let world = InMemoryWorld::new();
    let jane = world.add_player("Jane", AccountId(555), true);
    world.add_structure(ship(1, "Courier", &jane, Position::new(50.0, 0.0, 0.0)), Some(jane.identity_id), None);

    let mut collaborators = world.collaborators();
    collaborators.guards.push(Arc::new(NoCargoGuard));
    let alpha = Arc::new(
        JumpOrchestrator::new(
            alpha_config(folder.path(), BETA_ADDRESS),
            collaborators,
            accepting(),
            Arc::new(EventBus::new(16)),
        )
        .unwrap(),
    );

    let results = run_outbound(&alpha).await;
    assert!(matches!(results[0], Err(TransferError::Cancelled(_))));
    assert_eq!(world.structure_count(), 1);
    assert_eq!(world.notifications()[0].1, "Jumps to Beta are closed today.");
}

#[tokio::test]
async fn test_jump_out_broadcast_and_save() {
    let folder = TempDir::new().unwrap();
    let world = InMemoryWorld::new();
    let jane = world.add_player("Jane", AccountId(555), true);
    world.add_structure(ship(1, "Courier", &jane, Position::new(50.0, 0.0, 0.0)), Some(jane.identity_id), None);

    let mut config = alpha_config(folder.path(), BETA_ADDRESS);
    config.jump_out_notification = "{PlayerName} jumped to {JumpTo}".to_string();
    config.save_on_exit = true;
    config.outgoing_backup = true;
    let alpha = orchestrator(config, &world, accepting());

    run_outbound(&alpha).await.remove(0).unwrap();
    assert_eq!(world.broadcasts(), vec!["Jane jumped to beta".to_string()]);
    assert_eq!(world.save_count(), 1);
    let outgoing = folder.path().join("admingates_outgoing").join("555");
    assert_eq!(std::fs::read_dir(outgoing).unwrap().count(), 1);
}
