// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Transfer Envelope & File Info
//!
//! The envelope is the unit handed from a sending process to a receiving
//! process. `TransferFileInfo` is the metadata encoded into the payload's file
//! name so that the shared folder stays human-diagnosable and a receiver can
//! route a file without opening it.
//!
//! File names have the shape
//! `<destinationGate>_<accountId>_<playerName>_<structureName>_<unixMillis>`.
//! Every free-text segment is reduced to letters and digits before encoding,
//! which keeps `_` free for use as the separator.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::identity::{AccountId, IdentityId, IdentityRecord};
use crate::domain::structure::StructureGraph;

/// One in-flight or at-rest transfer.
///
/// # Invariants
///
/// - `structures` is never empty for an envelope that reaches the wire.
/// - Identity ids referenced by blocks that are absent from `identities` are
///   treated as unowned on arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferEnvelope {
    pub structures: Vec<StructureGraph>,
    pub identities: BTreeMap<IdentityId, IdentityRecord>,
    /// Source identity id -> account id; identities without an account are absent.
    pub player_accounts: BTreeMap<IdentityId, AccountId>,
    pub source_gate: String,
    pub source_destination_id: String,
}

impl TransferEnvelope {
    pub fn block_count(&self) -> usize {
        self.structures.iter().map(|s| s.blocks.len()).sum()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FileNameError {
    #[error("file name '{0}' does not have five '_'-separated segments")]
    SegmentCount(String),

    #[error("file name '{name}' has an invalid {field}: '{value}'")]
    InvalidField {
        name: String,
        field: &'static str,
        value: String,
    },
}

/// Metadata derived from an envelope at publish time and re-derived from the
/// file name on receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferFileInfo {
    pub destination_gate: String,
    pub account_id: AccountId,
    pub player_name: String,
    pub structure_name: String,
    pub created_at: DateTime<Utc>,
}

impl TransferFileInfo {
    /// Builds file info with name segments sanitized and the timestamp
    /// truncated to millisecond precision, so the info survives a file-name
    /// round trip unchanged.
    pub fn new(
        destination_gate: &str,
        account_id: AccountId,
        player_name: &str,
        structure_name: &str,
        created_at: DateTime<Utc>,
    ) -> Self {
        let millis = created_at.timestamp_millis();
        Self {
            destination_gate: legal_chars_only(destination_gate),
            account_id,
            player_name: legal_chars_only(player_name),
            structure_name: legal_chars_only(structure_name),
            created_at: Utc
                .timestamp_millis_opt(millis)
                .single()
                .unwrap_or(created_at),
        }
    }

    /// File stem (no extension).
    pub fn create_file_name(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}",
            legal_chars_only(&self.destination_gate),
            self.account_id.0,
            legal_chars_only(&self.player_name),
            legal_chars_only(&self.structure_name),
            self.created_at.timestamp_millis()
        )
    }

    /// Parses a file name, with or without directory or extension.
    pub fn parse_file_name(file_name: &str) -> Result<Self, FileNameError> {
        let base = file_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(file_name);
        let stem = base.split('.').next().unwrap_or(base);

        let parts: Vec<&str> = stem.split('_').collect();
        let [gate, account, player, structure, millis] = parts.as_slice() else {
            return Err(FileNameError::SegmentCount(file_name.to_string()));
        };

        let invalid = |field: &'static str, value: &str| FileNameError::InvalidField {
            name: file_name.to_string(),
            field,
            value: value.to_string(),
        };

        if gate.is_empty() {
            return Err(invalid("destination gate", *gate));
        }
        let account_id = account
            .parse::<u64>()
            .map(AccountId)
            .map_err(|_| invalid("account id", *account))?;
        let created_at = millis
            .parse::<i64>()
            .ok()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| invalid("timestamp", *millis))?;

        Ok(Self {
            destination_gate: gate.to_string(),
            account_id,
            player_name: player.to_string(),
            structure_name: structure.to_string(),
            created_at,
        })
    }

    /// Gate segment of a file name, used to route intake without a full parse.
    pub fn destination_of(file_name: &str) -> Option<&str> {
        file_name.split('_').next().filter(|gate| !gate.is_empty())
    }

    pub fn create_log_string(&self) -> String {
        format!(
            "dest={} account={} player={} structure={} time={}",
            self.destination_gate,
            self.account_id,
            self.player_name,
            self.structure_name,
            self.created_at.to_rfc3339()
        )
    }
}

/// Keeps only letters and digits.
pub fn legal_chars_only(text: &str) -> String {
    text.chars().filter(|c| c.is_alphanumeric()).collect()
}
