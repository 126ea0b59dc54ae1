// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Inbound Queue
//!
//! Deliveries waiting for their account to connect.
//!
//! # DDD Pattern: Application Service
//!
//! - **Layer:** Application
//! - **Responsibility:** Hold at most one deferred delivery per offline account
//! - **Collaborators:**
//!   - Domain: TransferFileInfo, AccountId
//!   - Infrastructure: PendingFile
//!
//! In-memory only: a restart forgets the queue, and the next intake scan
//! finds the untouched payloads and queues them again.

use chrono::{DateTime, Utc};
use metrics::gauge;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::domain::identity::AccountId;
use crate::domain::transfer::TransferFileInfo;
use crate::infrastructure::mailbox::PendingFile;

/// A delivery deferred until `info.account_id` connects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedInbound {
    pub portal: String,
    pub file: PendingFile,
    pub info: TransferFileInfo,
    pub queued_at: DateTime<Utc>,
}

/// At most one queued delivery per account.
#[derive(Debug, Default)]
pub struct InboundQueue {
    entries: Mutex<HashMap<AccountId, QueuedInbound>>,
}

impl InboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a delivery; returns `false` if the account already has one.
    pub fn push(&self, entry: QueuedInbound) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&entry.info.account_id) {
            return false;
        }
        entries.insert(entry.info.account_id, entry);
        gauge!("warpgate_queued_inbound").set(entries.len() as f64);
        true
    }

    pub fn take(&self, account: AccountId) -> Option<QueuedInbound> {
        let mut entries = self.entries.lock();
        let entry = entries.remove(&account);
        gauge!("warpgate_queued_inbound").set(entries.len() as f64);
        entry
    }

    pub fn contains_account(&self, account: AccountId) -> bool {
        self.entries.lock().contains_key(&account)
    }

    pub fn contains_file(&self, stem: &str) -> bool {
        self.entries.lock().values().any(|entry| entry.file.stem == stem)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Queued deliveries, oldest first.
    pub fn snapshot(&self) -> Vec<QueuedInbound> {
        let mut entries: Vec<QueuedInbound> = self.entries.lock().values().cloned().collect();
        entries.sort_by_key(|entry| entry.queued_at);
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(account: u64, stem: &str) -> QueuedInbound {
        QueuedInbound {
            portal: "Beta".to_string(),
            file: PendingFile {
                path: PathBuf::from(format!("/tmp/{}.wgt", stem)),
                stem: stem.to_string(),
            },
            info: TransferFileInfo::new("Beta", AccountId(account), "Jane", "Courier", Utc::now()),
            queued_at: Utc::now(),
        }
    }

    #[test]
    fn test_one_entry_per_account() {
        let queue = InboundQueue::new();
        assert!(queue.push(entry(555, "Beta_555_Jane_Courier_1")));
        assert!(!queue.push(entry(555, "Beta_555_Jane_Courier_2")));
        assert!(queue.contains_file("Beta_555_Jane_Courier_1"));
        assert!(!queue.contains_file("Beta_555_Jane_Courier_2"));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_take_removes_entry() {
        let queue = InboundQueue::new();
        queue.push(entry(555, "Beta_555_Jane_Courier_1"));
        assert!(queue.take(AccountId(555)).is_some());
        assert!(queue.take(AccountId(555)).is_none());
        assert!(queue.is_empty());
    }
}
