// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Identity
//!
//! Persistent player-owned records, distinct from live connections. Identity
//! ids are local to one process; account ids are stable across processes and
//! are what links an identity on one server to its counterpart on another.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Process-local identity id. Zero means "nobody".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityId(pub i64);

impl IdentityId {
    pub const NOBODY: IdentityId = IdentityId(0);

    pub fn is_nobody(&self) -> bool {
        self.0 <= 0
    }
}

impl std::fmt::Display for IdentityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable player account id shared by all processes. Zero means "no account".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u64);

impl AccountId {
    pub fn is_none(&self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of an identity as carried inside a transfer envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub identity_id: IdentityId,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
    /// Refreshed whenever the identity is touched so idle-account sweeps skip it.
    pub last_seen_at: DateTime<Utc>,
}

impl IdentityRecord {
    pub fn new(identity_id: IdentityId, display_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            identity_id,
            display_name: display_name.into(),
            created_at: now,
            last_seen_at: now,
        }
    }
}

/// The player acting on a structure (the one controlling it).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRef {
    pub identity_id: IdentityId,
    pub account_id: AccountId,
    pub display_name: String,
}

/// Live character entity of a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CharacterId(pub i64);
