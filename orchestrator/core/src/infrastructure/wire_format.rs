// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Wire Format
//!
//! Provides the on-disk encoding of transfer envelopes.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Tagged protobuf messages (`prost`) wrapped in `zstd`
//!
//! Every field is tagged, so readers skip fields they do not know and new
//! optional fields never break older processes. Compression is an outer
//! layer: `deserialize` accepts both compressed and bare protobuf payloads.

use chrono::{DateTime, Utc};
use nalgebra::Quaternion;
use prost::Message;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::geometry::{Orientation, Position};
use crate::domain::identity::{AccountId, IdentityId, IdentityRecord};
use crate::domain::structure::{Block, BlockId, BlockKind, Occupant, Pose, StructureGraph, StructureId};
use crate::domain::transfer::TransferEnvelope;

/// Bumped when a change would make older readers misinterpret a payload.
pub const FORMAT_VERSION: u32 = 1;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

#[derive(Debug, Error)]
pub enum WireError {
    #[error("corrupt envelope: {0}")]
    Corrupt(String),

    #[error("envelope cannot be written: {0}")]
    Invalid(String),

    #[error("compression failed: {0}")]
    Compression(#[from] std::io::Error),
}

#[derive(Clone, PartialEq, Message)]
pub struct Vec3Proto {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
    #[prost(double, tag = "3")]
    pub z: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct QuatProto {
    #[prost(double, tag = "1")]
    pub w: f64,
    #[prost(double, tag = "2")]
    pub i: f64,
    #[prost(double, tag = "3")]
    pub j: f64,
    #[prost(double, tag = "4")]
    pub k: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct OccupantProto {
    #[prost(int64, tag = "1")]
    pub identity_id: i64,
    #[prost(string, tag = "2")]
    pub display_name: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct SeatProto {
    #[prost(bool, tag = "1")]
    pub cryo: bool,
    #[prost(message, optional, tag = "2")]
    pub pilot: Option<OccupantProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct ProjectorProto {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(bytes = "vec", optional, tag = "2")]
    pub projected_blueprint: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, Message)]
pub struct JumpDriveProto {
    #[prost(bool, tag = "1")]
    pub enabled: bool,
    #[prost(double, tag = "2")]
    pub stored_power: f64,
    #[prost(string, tag = "3")]
    pub custom_data: String,
}

#[derive(Clone, PartialEq, Message)]
pub struct BlockProto {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub subtype_id: String,
    #[prost(int64, tag = "3")]
    pub owner: i64,
    #[prost(int64, tag = "4")]
    pub built_by: i64,
    #[prost(oneof = "block_proto::Kind", tags = "10, 11, 12")]
    pub kind: Option<block_proto::Kind>,
}

pub mod block_proto {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Kind {
        #[prost(message, tag = "10")]
        Seat(super::SeatProto),
        #[prost(message, tag = "11")]
        Projector(super::ProjectorProto),
        #[prost(message, tag = "12")]
        JumpDrive(super::JumpDriveProto),
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct StructureProto {
    #[prost(int64, tag = "1")]
    pub id: i64,
    #[prost(string, tag = "2")]
    pub display_name: String,
    #[prost(message, optional, tag = "3")]
    pub position: Option<Vec3Proto>,
    #[prost(message, optional, tag = "4")]
    pub orientation: Option<QuatProto>,
    #[prost(double, tag = "5")]
    pub bounding_radius: f64,
    #[prost(message, optional, tag = "6")]
    pub linear_velocity: Option<Vec3Proto>,
    #[prost(message, optional, tag = "7")]
    pub angular_velocity: Option<Vec3Proto>,
    #[prost(message, repeated, tag = "8")]
    pub blocks: Vec<BlockProto>,
}

#[derive(Clone, PartialEq, Message)]
pub struct IdentityProto {
    #[prost(int64, tag = "1")]
    pub identity_id: i64,
    #[prost(string, tag = "2")]
    pub display_name: String,
    #[prost(int64, tag = "3")]
    pub created_at_seconds: i64,
    #[prost(uint32, tag = "4")]
    pub created_at_nanos: u32,
    #[prost(int64, tag = "5")]
    pub last_seen_at_seconds: i64,
    #[prost(uint32, tag = "6")]
    pub last_seen_at_nanos: u32,
}

#[derive(Clone, PartialEq, Message)]
pub struct TransferEnvelopeProto {
    #[prost(uint32, tag = "1")]
    pub format_version: u32,
    #[prost(message, repeated, tag = "2")]
    pub structures: Vec<StructureProto>,
    #[prost(btree_map = "int64, message", tag = "3")]
    pub identities: BTreeMap<i64, IdentityProto>,
    #[prost(btree_map = "int64, uint64", tag = "4")]
    pub player_accounts: BTreeMap<i64, u64>,
    #[prost(string, tag = "5")]
    pub source_gate: String,
    #[prost(string, tag = "6")]
    pub source_destination_id: String,
}

/// Envelope codec with an outer `zstd` layer.
#[derive(Debug, Clone, Copy)]
pub struct WireFormat {
    compression_level: i32,
}

impl Default for WireFormat {
    fn default() -> Self {
        Self {
            compression_level: zstd::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl WireFormat {
    pub fn new(compression_level: i32) -> Self {
        Self { compression_level }
    }

    pub fn serialize(&self, envelope: &TransferEnvelope) -> Result<Vec<u8>, WireError> {
        let raw = encode_envelope(envelope)?;
        Ok(zstd::encode_all(raw.as_slice(), self.compression_level)?)
    }

    pub fn deserialize(&self, bytes: &[u8]) -> Result<TransferEnvelope, WireError> {
        if bytes.starts_with(&ZSTD_MAGIC) {
            let raw = zstd::decode_all(bytes)
                .map_err(|e| WireError::Corrupt(format!("decompression failed: {}", e)))?;
            decode_envelope(&raw)
        } else {
            decode_envelope(bytes)
        }
    }
}

/// Bare protobuf encoding, without compression.
pub fn encode_envelope(envelope: &TransferEnvelope) -> Result<Vec<u8>, WireError> {
    if envelope.structures.is_empty() {
        return Err(WireError::Invalid("envelope has no structures".to_string()));
    }
    if envelope.identities.is_empty() {
        return Err(WireError::Invalid("envelope has no identities".to_string()));
    }

    let proto = TransferEnvelopeProto {
        format_version: FORMAT_VERSION,
        structures: envelope.structures.iter().map(structure_to_proto).collect(),
        identities: envelope
            .identities
            .iter()
            .map(|(id, record)| (id.0, identity_to_proto(record)))
            .collect(),
        player_accounts: envelope
            .player_accounts
            .iter()
            .map(|(id, account)| (id.0, account.0))
            .collect(),
        source_gate: envelope.source_gate.clone(),
        source_destination_id: envelope.source_destination_id.clone(),
    };
    Ok(proto.encode_to_vec())
}

pub fn decode_envelope(bytes: &[u8]) -> Result<TransferEnvelope, WireError> {
    let proto = TransferEnvelopeProto::decode(bytes)
        .map_err(|e| WireError::Corrupt(e.to_string()))?;

    if proto.format_version > FORMAT_VERSION {
        return Err(WireError::Corrupt(format!(
            "unsupported format version {}",
            proto.format_version
        )));
    }
    if proto.structures.is_empty() {
        return Err(WireError::Corrupt("envelope has no structures".to_string()));
    }
    if proto.identities.is_empty() {
        return Err(WireError::Corrupt("envelope has no identities".to_string()));
    }

    let structures = proto
        .structures
        .into_iter()
        .map(structure_from_proto)
        .collect::<Result<Vec<_>, _>>()?;

    let identities = proto
        .identities
        .into_iter()
        .map(|(id, record)| identity_from_proto(record).map(|r| (IdentityId(id), r)))
        .collect::<Result<BTreeMap<_, _>, _>>()?;

    let player_accounts = proto
        .player_accounts
        .into_iter()
        .map(|(id, account)| (IdentityId(id), AccountId(account)))
        .collect();

    Ok(TransferEnvelope {
        structures,
        identities,
        player_accounts,
        source_gate: proto.source_gate,
        source_destination_id: proto.source_destination_id,
    })
}

fn vec3_to_proto(v: &Position) -> Vec3Proto {
    Vec3Proto {
        x: v.x,
        y: v.y,
        z: v.z,
    }
}

fn vec3_from_proto(v: Option<Vec3Proto>) -> Position {
    v.map(|v| Position::new(v.x, v.y, v.z))
        .unwrap_or_else(Position::zeros)
}

fn quat_to_proto(q: &Orientation) -> QuatProto {
    QuatProto {
        w: q.w,
        i: q.i,
        j: q.j,
        k: q.k,
    }
}

fn quat_from_proto(q: Option<QuatProto>) -> Result<Orientation, WireError> {
    let Some(q) = q else {
        return Ok(Orientation::identity());
    };
    let raw = Quaternion::new(q.w, q.i, q.j, q.k);
    let norm = raw.norm();
    if !norm.is_finite() || norm < 1e-9 {
        return Err(WireError::Corrupt("degenerate orientation".to_string()));
    }
    if (norm - 1.0).abs() < 1e-9 {
        Ok(Orientation::new_unchecked(raw))
    } else {
        Ok(Orientation::new_normalize(raw))
    }
}

fn occupant_to_proto(o: &Occupant) -> OccupantProto {
    OccupantProto {
        identity_id: o.identity_id.0,
        display_name: o.display_name.clone(),
    }
}

fn occupant_from_proto(o: OccupantProto) -> Occupant {
    Occupant {
        identity_id: IdentityId(o.identity_id),
        display_name: o.display_name,
    }
}

fn block_to_proto(block: &Block) -> BlockProto {
    let kind = match &block.kind {
        BlockKind::Generic => None,
        BlockKind::Seat { cryo, pilot } => Some(block_proto::Kind::Seat(SeatProto {
            cryo: *cryo,
            pilot: pilot.as_ref().map(occupant_to_proto),
        })),
        BlockKind::Projector {
            enabled,
            projected_blueprint,
        } => Some(block_proto::Kind::Projector(ProjectorProto {
            enabled: *enabled,
            projected_blueprint: projected_blueprint.clone(),
        })),
        BlockKind::JumpDrive {
            enabled,
            stored_power,
            custom_data,
        } => Some(block_proto::Kind::JumpDrive(JumpDriveProto {
            enabled: *enabled,
            stored_power: *stored_power,
            custom_data: custom_data.clone(),
        })),
    };
    BlockProto {
        id: block.id.0,
        subtype_id: block.subtype_id.clone(),
        owner: block.owner.0,
        built_by: block.built_by.0,
        kind,
    }
}

fn block_from_proto(block: BlockProto) -> Block {
    let kind = match block.kind {
        None => BlockKind::Generic,
        Some(block_proto::Kind::Seat(seat)) => BlockKind::Seat {
            cryo: seat.cryo,
            pilot: seat.pilot.map(occupant_from_proto),
        },
        Some(block_proto::Kind::Projector(projector)) => BlockKind::Projector {
            enabled: projector.enabled,
            projected_blueprint: projector.projected_blueprint,
        },
        Some(block_proto::Kind::JumpDrive(drive)) => BlockKind::JumpDrive {
            enabled: drive.enabled,
            stored_power: drive.stored_power,
            custom_data: drive.custom_data,
        },
    };
    Block {
        id: BlockId(block.id),
        subtype_id: block.subtype_id,
        owner: IdentityId(block.owner),
        built_by: IdentityId(block.built_by),
        kind,
    }
}

fn structure_to_proto(structure: &StructureGraph) -> StructureProto {
    StructureProto {
        id: structure.id.0,
        display_name: structure.display_name.clone(),
        position: Some(vec3_to_proto(&structure.pose.position)),
        orientation: Some(quat_to_proto(&structure.pose.orientation)),
        bounding_radius: structure.bounding_radius,
        linear_velocity: Some(vec3_to_proto(&structure.linear_velocity)),
        angular_velocity: Some(vec3_to_proto(&structure.angular_velocity)),
        blocks: structure.blocks.iter().map(block_to_proto).collect(),
    }
}

fn structure_from_proto(structure: StructureProto) -> Result<StructureGraph, WireError> {
    if !(structure.bounding_radius.is_finite() && structure.bounding_radius >= 0.0) {
        return Err(WireError::Corrupt(format!(
            "structure {} has an invalid bounding radius",
            structure.id
        )));
    }
    Ok(StructureGraph {
        id: StructureId(structure.id),
        display_name: structure.display_name,
        pose: Pose {
            position: vec3_from_proto(structure.position),
            orientation: quat_from_proto(structure.orientation)?,
        },
        bounding_radius: structure.bounding_radius,
        linear_velocity: vec3_from_proto(structure.linear_velocity),
        angular_velocity: vec3_from_proto(structure.angular_velocity),
        blocks: structure.blocks.into_iter().map(block_from_proto).collect(),
    })
}

fn identity_to_proto(record: &IdentityRecord) -> IdentityProto {
    IdentityProto {
        identity_id: record.identity_id.0,
        display_name: record.display_name.clone(),
        created_at_seconds: record.created_at.timestamp(),
        created_at_nanos: record.created_at.timestamp_subsec_nanos(),
        last_seen_at_seconds: record.last_seen_at.timestamp(),
        last_seen_at_nanos: record.last_seen_at.timestamp_subsec_nanos(),
    }
}

fn timestamp_from_proto(seconds: i64, nanos: u32) -> Result<DateTime<Utc>, WireError> {
    DateTime::from_timestamp(seconds, nanos)
        .ok_or_else(|| WireError::Corrupt(format!("timestamp out of range: {}s {}ns", seconds, nanos)))
}

fn identity_from_proto(record: IdentityProto) -> Result<IdentityRecord, WireError> {
    Ok(IdentityRecord {
        identity_id: IdentityId(record.identity_id),
        display_name: record.display_name,
        created_at: timestamp_from_proto(record.created_at_seconds, record.created_at_nanos)?,
        last_seen_at: timestamp_from_proto(record.last_seen_at_seconds, record.last_seen_at_nanos)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn envelope() -> TransferEnvelope {
        let mut seat = Block::generic(2, "LargeBlockCockpit", IdentityId(7));
        seat.kind = BlockKind::Seat {
            cryo: false,
            pilot: Some(Occupant {
                identity_id: IdentityId(7),
                display_name: "Jane".to_string(),
            }),
        };
        let mut projector = Block::generic(3, "LargeProjector", IdentityId(8));
        projector.kind = BlockKind::Projector {
            enabled: false,
            projected_blueprint: Some(vec![1, 2, 3, 4]),
        };
        let mut drive = Block::generic(4, "WormholeDrive", IdentityId(7));
        drive.kind = BlockKind::JumpDrive {
            enabled: true,
            stored_power: 0.0,
            custom_data: r#"{"plugin_request":false,"destinations":["beta"]}"#.to_string(),
        };

        let structure = StructureGraph {
            id: StructureId(1001),
            display_name: "Red Wing".to_string(),
            pose: Pose {
                position: Position::new(1.5, -2.0, 1.0e6),
                orientation: Orientation::from_axis_angle(&Vector3::z_axis(), 0.7),
            },
            bounding_radius: 42.0,
            linear_velocity: Position::new(0.0, 10.0, 0.0),
            angular_velocity: Position::zeros(),
            blocks: vec![Block::generic(1, "LargeBlockArmorBlock", IdentityId(7)), seat, projector, drive],
        };

        TransferEnvelope {
            structures: vec![structure],
            identities: BTreeMap::from([
                (IdentityId(7), IdentityRecord::new(IdentityId(7), "Jane")),
                (IdentityId(8), IdentityRecord::new(IdentityId(8), "Bob")),
            ]),
            player_accounts: BTreeMap::from([(IdentityId(7), AccountId(555))]),
            source_gate: "Alpha".to_string(),
            source_destination_id: "beta".to_string(),
        }
    }

    #[test]
    fn test_round_trip_preserves_envelope() {
        let wire = WireFormat::default();
        let original = envelope();
        let bytes = wire.serialize(&original).unwrap();
        assert!(bytes.starts_with(&ZSTD_MAGIC));
        assert_eq!(wire.deserialize(&bytes).unwrap(), original);
    }

    #[test]
    fn test_round_trip_keeps_unlinked_account() {
        let wire = WireFormat::default();
        let mut original = envelope();
        original.player_accounts.insert(IdentityId(8), AccountId(0));
        let decoded = wire.deserialize(&wire.serialize(&original).unwrap()).unwrap();
        assert_eq!(decoded.player_accounts.get(&IdentityId(8)), Some(&AccountId(0)));
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_uncompressed_payload_is_accepted() {
        let original = envelope();
        let raw = encode_envelope(&original).unwrap();
        assert_eq!(WireFormat::default().deserialize(&raw).unwrap(), original);
    }

    #[test]
    fn test_empty_envelope_is_corrupt() {
        let empty = TransferEnvelopeProto {
            format_version: FORMAT_VERSION,
            ..Default::default()
        };
        let err = decode_envelope(&empty.encode_to_vec()).unwrap_err();
        assert!(matches!(err, WireError::Corrupt(_)));

        let mut no_identities = envelope();
        no_identities.identities.clear();
        assert!(matches!(
            encode_envelope(&no_identities),
            Err(WireError::Invalid(_))
        ));
    }

    #[test]
    fn test_garbage_is_corrupt() {
        let wire = WireFormat::default();
        assert!(matches!(
            wire.deserialize(b"not an envelope at all"),
            Err(WireError::Corrupt(_))
        ));

        let mut truncated = wire.serialize(&envelope()).unwrap();
        truncated.truncate(truncated.len() / 2);
        assert!(matches!(wire.deserialize(&truncated), Err(WireError::Corrupt(_))));
    }

    #[test]
    fn test_unknown_fields_are_skipped() {
        let original = envelope();
        let mut raw = encode_envelope(&original).unwrap();
        // Field 99, length-delimited, "future".
        raw.extend_from_slice(&[0x9A, 0x06, 0x06]);
        raw.extend_from_slice(b"future");
        assert_eq!(decode_envelope(&raw).unwrap(), original);
    }
}
