// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Jump
//!
//! Provides the per-attempt jump state machine and the transfer error taxonomy.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Guard the `Idle → Resolving → (Probing) → Serializing →
//!   Publishing → Delivered | Aborted` lifecycle of one jump attempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::server_status::ServerStatus;
use crate::domain::structure::StructureId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JumpId(pub Uuid);

impl JumpId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JumpId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JumpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpState {
    Idle,
    Resolving,
    Probing,
    Serializing,
    Publishing,
    Delivered,
    Aborted,
}

impl JumpState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JumpState::Delivered | JumpState::Aborted)
    }

    pub fn can_transition_to(&self, next: JumpState) -> bool {
        use JumpState::*;
        matches!(
            (*self, next),
            (Idle, Resolving)
                | (Resolving, Probing)
                | (Resolving, Serializing)
                | (Probing, Serializing)
                | (Serializing, Publishing)
                | (Publishing, Delivered)
                | (Resolving | Probing | Serializing | Publishing, Aborted)
        )
    }
}

impl std::fmt::Display for JumpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            JumpState::Idle => "idle",
            JumpState::Resolving => "resolving",
            JumpState::Probing => "probing",
            JumpState::Serializing => "serializing",
            JumpState::Publishing => "publishing",
            JumpState::Delivered => "delivered",
            JumpState::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid jump transition {from} -> {to}")]
pub struct JumpStateError {
    pub from: JumpState,
    pub to: JumpState,
}

/// Status reported to the visual-effects collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JumpStatus {
    Ready,
    Perform,
    Succeeded,
    Cancelled,
}

/// Failure taxonomy for jumps and deliveries.
#[derive(Debug, Error)]
pub enum TransferError {
    /// No destination, no device access or no move rights. Never mutates state.
    #[error("destination resolution failed: {0}")]
    Resolution(String),

    #[error("destination refused the jump: {0}")]
    Capacity(ServerStatus),

    /// A transfer guard vetoed the jump.
    #[error("transfer cancelled: {0}")]
    Cancelled(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("no free space at gate '{0}'")]
    Placement(String),

    #[error("world host failure: {0}")]
    Host(String),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    InvalidTransition(#[from] JumpStateError),
}

impl TransferError {
    /// Label used for metrics and events.
    pub fn kind(&self) -> &'static str {
        match self {
            TransferError::Resolution(_) => "resolution",
            TransferError::Capacity(_) => "capacity",
            TransferError::Cancelled(_) => "cancelled",
            TransferError::Serialization(_) => "serialization",
            TransferError::Placement(_) => "placement",
            TransferError::Host(_) => "host",
            TransferError::Io(_) => "io",
            TransferError::InvalidTransition(_) => "invalid_transition",
        }
    }

    /// Message for the acting player, when one should be shown.
    pub fn user_message(&self) -> Option<String> {
        match self {
            TransferError::Capacity(status) => status.user_message().map(str::to_string),
            TransferError::Cancelled(reason) => Some(reason.clone()),
            TransferError::Serialization(_) | TransferError::Host(_) => {
                Some("The jump failed, please contact an administrator.".to_string())
            }
            _ => None,
        }
    }
}

/// One attempt to move a structure group through a portal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JumpAttempt {
    pub id: JumpId,
    pub portal: String,
    pub structure_id: StructureId,
    state: JumpState,
    pub abort_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl JumpAttempt {
    pub fn new(portal: impl Into<String>, structure_id: StructureId) -> Self {
        Self {
            id: JumpId::new(),
            portal: portal.into(),
            structure_id,
            state: JumpState::Idle,
            abort_reason: None,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn state(&self) -> JumpState {
        self.state
    }

    pub fn advance(&mut self, next: JumpState) -> Result<(), JumpStateError> {
        if !self.state.can_transition_to(next) {
            return Err(JumpStateError {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        if next.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        Ok(())
    }

    pub fn abort(&mut self, reason: impl Into<String>) -> Result<(), JumpStateError> {
        self.advance(JumpState::Aborted)?;
        self.abort_reason = Some(reason.into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_lifecycle() {
        let mut attempt = JumpAttempt::new("Alpha", StructureId(1));
        for state in [
            JumpState::Resolving,
            JumpState::Probing,
            JumpState::Serializing,
            JumpState::Publishing,
            JumpState::Delivered,
        ] {
            attempt.advance(state).unwrap();
        }
        assert!(attempt.state().is_terminal());
        assert!(attempt.ended_at.is_some());
    }

    #[test]
    fn test_probe_cannot_be_skipped_back_into() {
        let mut attempt = JumpAttempt::new("Alpha", StructureId(1));
        attempt.advance(JumpState::Resolving).unwrap();
        attempt.advance(JumpState::Serializing).unwrap();
        let err = attempt.advance(JumpState::Probing).unwrap_err();
        assert_eq!(err.from, JumpState::Serializing);
        assert_eq!(err.to, JumpState::Probing);
    }

    #[test]
    fn test_abort_is_terminal() {
        let mut attempt = JumpAttempt::new("Alpha", StructureId(1));
        assert!(attempt.abort("too early").is_err());
        attempt.advance(JumpState::Resolving).unwrap();
        attempt.abort("no destination").unwrap();
        assert_eq!(attempt.abort_reason.as_deref(), Some("no destination"));
        assert!(attempt.advance(JumpState::Serializing).is_err());
        assert!(attempt.abort("again").is_err());
    }

    #[test]
    fn test_capacity_errors_carry_status_message() {
        let err = TransferError::Capacity(ServerStatus::Loading);
        assert_eq!(err.kind(), "capacity");
        assert_eq!(
            err.user_message().as_deref(),
            Some("Destination server is in loading, please wait.")
        );
        assert!(TransferError::Resolution("none".into()).user_message().is_none());
    }
}
