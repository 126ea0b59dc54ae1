// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Filesystem Mailbox
//!
//! Send/receive protocol over a folder shared (or mirrored) between host
//! processes. File presence is the only synchronization primitive, so every
//! operation here is an idempotent step that tolerates another process or a
//! previous crash having already performed it.
//!
//! **Layout** under the configured root:
//! - `admingates/` - intake; `<stem>.wgt` payloads addressed by gate name
//! - `admingates_backup/` - payloads retained after materialization
//! - `admingates_sent/` - `<stem>.sent` markers (two-phase protocol only)
//! - `admingates_received/` - `<stem>.received` markers (two-phase protocol only)
//! - `admingates_outgoing/<accountId>/` - optional copies of published payloads
//!
//! **Payload lifecycle:**
//! - publish writes `<stem>.wgt.part`, syncs it and renames it to `<stem>.wgt`,
//!   so readers never see a partially written payload
//! - intake claims a payload by renaming it to `<stem>.wgt.claimed`; exactly
//!   one claimer wins the rename
//! - after materialization the claimed file is backed up and deleted

use chrono::TimeDelta;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::domain::jump::TransferError;
use crate::domain::transfer::{FileNameError, TransferFileInfo};

pub const INTAKE_DIR: &str = "admingates";
pub const BACKUP_DIR: &str = "admingates_backup";
pub const SENT_DIR: &str = "admingates_sent";
pub const RECEIVED_DIR: &str = "admingates_received";
pub const OUTGOING_DIR: &str = "admingates_outgoing";

pub const PAYLOAD_EXTENSION: &str = "wgt";
const PARTIAL_SUFFIX: &str = ".part";
const CLAIMED_SUFFIX: &str = ".claimed";
const SENT_EXTENSION: &str = "sent";
const RECEIVED_EXTENSION: &str = "received";

#[derive(Debug, Error)]
pub enum MailboxError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    FileName(#[from] FileNameError),
}

impl MailboxError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        MailboxError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<MailboxError> for TransferError {
    fn from(e: MailboxError) -> Self {
        match e {
            MailboxError::Io { source, .. } => TransferError::Io(source),
            MailboxError::FileName(e) => TransferError::Serialization(e.to_string()),
        }
    }
}

/// A completed payload waiting in the intake folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    pub path: PathBuf,
    /// File stem shared by the payload, its markers and its backup.
    pub stem: String,
}

impl PendingFile {
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem, PAYLOAD_EXTENSION)
    }

    pub fn info(&self) -> Result<TransferFileInfo, FileNameError> {
        TransferFileInfo::parse_file_name(&self.stem)
    }
}

/// A payload this process has claimed for materialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedFile {
    pub path: PathBuf,
    pub stem: String,
}

/// State of an intake entry, for operator tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Pending,
    Partial,
    Claimed,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxEntry {
    pub path: PathBuf,
    pub stem: String,
    pub state: EntryState,
    pub size_bytes: u64,
    pub sent_marker: bool,
    pub received_marker: bool,
}

#[derive(Debug, Clone)]
pub struct FilesystemMailbox {
    root: PathBuf,
    confirm_markers: bool,
}

impl FilesystemMailbox {
    pub fn new(root: impl Into<PathBuf>, confirm_markers: bool) -> Self {
        Self {
            root: root.into(),
            confirm_markers,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn intake_dir(&self) -> PathBuf {
        self.root.join(INTAKE_DIR)
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.root.join(BACKUP_DIR)
    }

    fn sent_marker(&self, stem: &str) -> PathBuf {
        self.root.join(SENT_DIR).join(format!("{}.{}", stem, SENT_EXTENSION))
    }

    fn received_marker(&self, stem: &str) -> PathBuf {
        self.root
            .join(RECEIVED_DIR)
            .join(format!("{}.{}", stem, RECEIVED_EXTENSION))
    }

    fn payload_path(&self, stem: &str) -> PathBuf {
        self.intake_dir().join(format!("{}.{}", stem, PAYLOAD_EXTENSION))
    }

    /// Creates every mailbox folder. Safe to call repeatedly.
    pub async fn ensure_directories(&self) -> Result<(), MailboxError> {
        for dir in [INTAKE_DIR, BACKUP_DIR, SENT_DIR, RECEIVED_DIR, OUTGOING_DIR] {
            let path = self.root.join(dir);
            tokio::fs::create_dir_all(&path)
                .await
                .map_err(|e| MailboxError::io(&path, e))?;
        }
        Ok(())
    }

    /// Publishes a payload under the name derived from `info`.
    ///
    /// Re-publishing the same info replaces the payload atomically.
    pub async fn publish(&self, info: &TransferFileInfo, payload: &[u8]) -> Result<PathBuf, MailboxError> {
        self.ensure_directories().await?;

        let stem = info.create_file_name();
        let final_path = self.payload_path(&stem);
        let partial_path = self
            .intake_dir()
            .join(format!("{}.{}{}", stem, PAYLOAD_EXTENSION, PARTIAL_SUFFIX));

        write_synced(&partial_path, payload).await?;
        tokio::fs::rename(&partial_path, &final_path)
            .await
            .map_err(|e| MailboxError::io(&final_path, e))?;

        if self.confirm_markers {
            let marker = self.sent_marker(&stem);
            write_synced(&marker, &[]).await?;
        }

        info!(file = %final_path.display(), bytes = payload.len(), "Published transfer payload");
        Ok(final_path)
    }

    /// Moves `info` forward one millisecond at a time until no payload or
    /// marker in the mailbox uses its name.
    pub async fn unused_file_info(&self, mut info: TransferFileInfo) -> TransferFileInfo {
        loop {
            let stem = info.create_file_name();
            let payload = self.payload_path(&stem);
            let mut partial = payload.as_os_str().to_os_string();
            partial.push(PARTIAL_SUFFIX);

            let taken = exists(&payload).await
                || exists(&claimed_path(&payload)).await
                || exists(Path::new(&partial)).await
                || exists(&self.sent_marker(&stem)).await
                || exists(&self.received_marker(&stem)).await;
            if !taken {
                return info;
            }
            debug!(file = %stem, "Payload name already in use, shifting timestamp");
            info.created_at += TimeDelta::milliseconds(1);
        }
    }

    /// Keeps a copy of a published payload under `admingates_outgoing/<accountId>/`.
    pub async fn backup_outgoing(&self, info: &TransferFileInfo, payload: &[u8]) -> Result<PathBuf, MailboxError> {
        let dir = self.root.join(OUTGOING_DIR).join(info.account_id.to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| MailboxError::io(&dir, e))?;
        let path = dir.join(format!("{}.{}", info.create_file_name(), PAYLOAD_EXTENSION));
        write_synced(&path, payload).await?;
        Ok(path)
    }

    /// Payloads addressed to `gate`, oldest name first.
    ///
    /// With the two-phase protocol a payload is only listed once its `sent`
    /// marker exists and no `received` marker does.
    pub async fn list_for_gate(&self, gate: &str) -> Result<Vec<PendingFile>, MailboxError> {
        let mut pending = Vec::new();
        for (path, stem) in self.payloads().await? {
            if TransferFileInfo::destination_of(&stem) != Some(gate) {
                continue;
            }
            if self.confirm_markers {
                if !exists(&self.sent_marker(&stem)).await {
                    debug!(file = %stem, "Payload has no sent marker yet, skipping");
                    continue;
                }
                if exists(&self.received_marker(&stem)).await {
                    debug!(file = %stem, "Payload already marked received, skipping");
                    continue;
                }
            }
            pending.push(PendingFile { path, stem });
        }
        pending.sort_by(|a, b| a.stem.cmp(&b.stem));
        Ok(pending)
    }

    /// Completed payloads in the intake folder.
    async fn payloads(&self) -> Result<Vec<(PathBuf, String)>, MailboxError> {
        let dir = self.intake_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MailboxError::io(&dir, e)),
        };

        let mut payloads = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| MailboxError::io(&dir, e))? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if let Some(stem) = name.strip_suffix(&format!(".{}", PAYLOAD_EXTENSION)) {
                payloads.push((path.clone(), stem.to_string()));
            }
        }
        Ok(payloads)
    }

    /// Reads a payload; `None` if it vanished in the meantime.
    pub async fn read(&self, path: &Path) -> Result<Option<Vec<u8>>, MailboxError> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MailboxError::io(path, e)),
        }
    }

    /// Claims a pending payload; `None` if it is gone (already claimed or removed).
    pub async fn claim(&self, file: &PendingFile) -> Result<Option<ClaimedFile>, MailboxError> {
        let claimed_path = claimed_path(&file.path);
        match tokio::fs::rename(&file.path, &claimed_path).await {
            Ok(()) => Ok(Some(ClaimedFile {
                path: claimed_path,
                stem: file.stem.clone(),
            })),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(MailboxError::io(&file.path, e)),
        }
    }

    /// Returns a claimed payload to the intake folder so a later scan retries it.
    pub async fn release(&self, claimed: ClaimedFile) -> Result<PendingFile, MailboxError> {
        let path = self.payload_path(&claimed.stem);
        tokio::fs::rename(&claimed.path, &path)
            .await
            .map_err(|e| MailboxError::io(&claimed.path, e))?;
        Ok(PendingFile {
            path,
            stem: claimed.stem,
        })
    }

    /// Finishes a materialized delivery: backup (optional), delete, markers.
    ///
    /// Every step is attempted; the first error is returned after the rest ran.
    pub async fn complete(&self, claimed: &ClaimedFile, backup: bool) -> Result<Option<PathBuf>, MailboxError> {
        let mut first_error = None;
        let mut backup_path = None;

        if backup {
            match self.copy_to_backup(&claimed.path, &claimed.stem).await {
                Ok(path) => backup_path = Some(path),
                Err(e) => first_error = Some(e),
            }
        }

        if let Err(e) = remove_if_exists(&claimed.path).await {
            first_error.get_or_insert(e);
        }

        if self.confirm_markers {
            if let Err(e) = remove_if_exists(&self.sent_marker(&claimed.stem)).await {
                first_error.get_or_insert(e);
            }
            let marker = self.received_marker(&claimed.stem);
            if let Err(e) = write_synced(&marker, &[]).await {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(backup_path),
        }
    }

    /// Deletes a duplicate of an already materialized payload without backup.
    pub async fn discard(&self, file: &PendingFile) -> Result<(), MailboxError> {
        remove_if_exists(&file.path).await?;
        if self.confirm_markers {
            remove_if_exists(&self.sent_marker(&file.stem)).await?;
        }
        Ok(())
    }

    /// Whether a durable `received` marker exists for `stem`.
    pub async fn is_marked_received(&self, stem: &str) -> bool {
        self.confirm_markers && exists(&self.received_marker(stem)).await
    }

    async fn copy_to_backup(&self, source: &Path, stem: &str) -> Result<PathBuf, MailboxError> {
        let dir = self.backup_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| MailboxError::io(&dir, e))?;

        let mut target = dir.join(format!("{}.{}", stem, PAYLOAD_EXTENSION));
        let mut suffix = 1u32;
        while exists(&target).await {
            target = dir.join(format!("{}_{}.{}", stem, suffix, PAYLOAD_EXTENSION));
            suffix += 1;
        }

        tokio::fs::copy(source, &target)
            .await
            .map_err(|e| MailboxError::io(&target, e))?;
        Ok(target)
    }

    /// Removes `received` markers whose payload and `sent` marker are both gone.
    pub async fn gc_received(&self) -> Result<usize, MailboxError> {
        let dir = self.root.join(RECEIVED_DIR);
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(MailboxError::io(&dir, e)),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await.map_err(|e| MailboxError::io(&dir, e))? {
            let path = entry.path();
            let Some(stem) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(&format!(".{}", RECEIVED_EXTENSION)))
                .map(str::to_string)
            else {
                continue;
            };

            let payload_present = exists(&self.payload_path(&stem)).await
                || exists(&claimed_path(&self.payload_path(&stem))).await;
            if payload_present || exists(&self.sent_marker(&stem)).await {
                continue;
            }

            match tokio::fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(file = %path.display(), error = %e, "Failed to remove received marker"),
            }
        }
        Ok(removed)
    }

    /// Every intake entry, including partial and claimed files.
    pub async fn entries(&self) -> Result<Vec<MailboxEntry>, MailboxError> {
        let dir = self.intake_dir();
        let mut read_dir = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(MailboxError::io(&dir, e)),
        };

        let payload_suffix = format!(".{}", PAYLOAD_EXTENSION);
        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(|e| MailboxError::io(&dir, e))? {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };

            let (stem, state) = if let Some(base) = name.strip_suffix(PARTIAL_SUFFIX) {
                (base.strip_suffix(&payload_suffix).unwrap_or(base), EntryState::Partial)
            } else if let Some(base) = name.strip_suffix(CLAIMED_SUFFIX) {
                (base.strip_suffix(&payload_suffix).unwrap_or(base), EntryState::Claimed)
            } else if let Some(stem) = name.strip_suffix(&payload_suffix) {
                (stem, EntryState::Pending)
            } else {
                (name.as_str(), EntryState::Unknown)
            };

            let size_bytes = entry.metadata().await.map(|m| m.len()).unwrap_or(0);
            entries.push(MailboxEntry {
                stem: stem.to_string(),
                state,
                size_bytes,
                sent_marker: exists(&self.sent_marker(stem)).await,
                received_marker: exists(&self.received_marker(stem)).await,
                path,
            });
        }
        entries.sort_by(|a, b| a.stem.cmp(&b.stem));
        Ok(entries)
    }
}

fn claimed_path(payload: &Path) -> PathBuf {
    let mut name = payload.as_os_str().to_os_string();
    name.push(CLAIMED_SUFFIX);
    PathBuf::from(name)
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn remove_if_exists(path: &Path) -> Result<(), MailboxError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(MailboxError::io(path, e)),
    }
}

async fn write_synced(path: &Path, bytes: &[u8]) -> Result<(), MailboxError> {
    let mut file = tokio::fs::File::create(path)
        .await
        .map_err(|e| MailboxError::io(path, e))?;
    file.write_all(bytes).await.map_err(|e| MailboxError::io(path, e))?;
    file.sync_all().await.map_err(|e| MailboxError::io(path, e))?;
    Ok(())
}
