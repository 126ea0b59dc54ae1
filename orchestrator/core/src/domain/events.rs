// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::identity::AccountId;
use crate::domain::jump::JumpId;
use crate::domain::structure::StructureId;

/// Jump and delivery events, published on the event bus for observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TransferEvent {
    JumpStarted {
        jump_id: JumpId,
        portal: String,
        structure_id: StructureId,
        started_at: DateTime<Utc>,
    },
    JumpAborted {
        jump_id: JumpId,
        portal: String,
        structure_id: StructureId,
        kind: String,
        reason: String,
        aborted_at: DateTime<Utc>,
    },
    /// Structures moved in place to a local portal or coordinate.
    LocalJumpCompleted {
        jump_id: JumpId,
        portal: String,
        destination: String,
        completed_at: DateTime<Utc>,
    },
    TransferPublished {
        jump_id: JumpId,
        portal: String,
        destination: String,
        file_name: String,
        published_at: DateTime<Utc>,
    },
    DeliveryQueued {
        file_name: String,
        account_id: AccountId,
        queued_at: DateTime<Utc>,
    },
    DeliveryMaterialized {
        file_name: String,
        portal: String,
        account_id: AccountId,
        structure_ids: Vec<StructureId>,
        materialized_at: DateTime<Utc>,
    },
    IntakeFailed {
        file_name: String,
        kind: String,
        reason: String,
        failed_at: DateTime<Utc>,
    },
}

impl TransferEvent {
    pub fn name(&self) -> &'static str {
        match self {
            TransferEvent::JumpStarted { .. } => "jump_started",
            TransferEvent::JumpAborted { .. } => "jump_aborted",
            TransferEvent::LocalJumpCompleted { .. } => "local_jump_completed",
            TransferEvent::TransferPublished { .. } => "transfer_published",
            TransferEvent::DeliveryQueued { .. } => "delivery_queued",
            TransferEvent::DeliveryMaterialized { .. } => "delivery_materialized",
            TransferEvent::IntakeFailed { .. } => "intake_failed",
        }
    }

    pub fn jump_id(&self) -> Option<JumpId> {
        match self {
            TransferEvent::JumpStarted { jump_id, .. }
            | TransferEvent::JumpAborted { jump_id, .. }
            | TransferEvent::LocalJumpCompleted { jump_id, .. }
            | TransferEvent::TransferPublished { jump_id, .. } => Some(*jump_id),
            _ => None,
        }
    }
}
