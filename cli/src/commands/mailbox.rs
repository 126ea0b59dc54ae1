// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mailbox inspection commands
//!
//! Commands: list, inspect, gc

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use warpgate_core::domain::config::WarpgateConfig;
use warpgate_core::domain::transfer::{TransferEnvelope, TransferFileInfo};
use warpgate_core::infrastructure::mailbox::{EntryState, MailboxEntry};
use warpgate_core::infrastructure::{FilesystemMailbox, WireFormat};

#[derive(Subcommand)]
pub enum MailboxCommand {
    /// List payloads in the intake folder
    List {
        /// Mailbox folder (default: from configuration)
        #[arg(long, value_name = "DIR")]
        folder: Option<PathBuf>,

        /// Only payloads addressed to this gate
        #[arg(long)]
        gate: Option<String>,
    },

    /// Decode a payload and summarize its contents
    Inspect {
        /// Payload path, or a file name inside the intake folder
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Mailbox folder (default: from configuration)
        #[arg(long, value_name = "DIR")]
        folder: Option<PathBuf>,
    },

    /// Delete received markers whose payload is gone
    Gc {
        /// Mailbox folder (default: from configuration)
        #[arg(long, value_name = "DIR")]
        folder: Option<PathBuf>,
    },
}

pub async fn handle_command(
    command: MailboxCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        MailboxCommand::List { folder, gate } => {
            let mailbox = open_mailbox(config_override, folder)?;
            list(&mailbox, gate.as_deref()).await
        }
        MailboxCommand::Inspect { file, folder } => {
            let mailbox = open_mailbox(config_override, folder)?;
            inspect(&mailbox, &file).await
        }
        MailboxCommand::Gc { folder } => {
            let mailbox = open_mailbox(config_override, folder)?;
            let removed = mailbox
                .gc_received()
                .await
                .context("Failed to collect received markers")?;
            println!(
                "{}",
                format!("✓ Removed {} stale received marker(s)", removed).green()
            );
            Ok(())
        }
    }
}

fn open_mailbox(config_override: Option<PathBuf>, folder: Option<PathBuf>) -> Result<FilesystemMailbox> {
    let config = WarpgateConfig::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let folder = folder
        .or(config.folder)
        .context("No mailbox folder configured; pass --folder or set `folder`")?;
    Ok(FilesystemMailbox::new(folder, config.confirm_markers))
}

async fn list(mailbox: &FilesystemMailbox, gate: Option<&str>) -> Result<()> {
    let entries = mailbox
        .entries()
        .await
        .with_context(|| format!("Failed to read {}", mailbox.intake_dir().display()))?;
    let entries = filter_by_gate(entries, gate);

    if entries.is_empty() {
        println!("{}", "Intake folder is empty.".dimmed());
        return Ok(());
    }

    println!("{}", format!("{} payload(s):", entries.len()).bold());
    for entry in &entries {
        let state = match entry.state {
            EntryState::Pending => "pending".green(),
            EntryState::Partial => "partial".yellow(),
            EntryState::Claimed => "claimed".cyan(),
            EntryState::Unknown => "unknown".red(),
        };
        let markers = match (entry.sent_marker, entry.received_marker) {
            (_, true) => " [received]",
            (true, false) => " [sent]",
            (false, false) => "",
        };
        println!("  {:<8} {:>9} B  {}{}", state, entry.size_bytes, entry.stem, markers);
        if let Ok(info) = TransferFileInfo::parse_file_name(&entry.stem) {
            println!("           {}", info.create_log_string().dimmed());
        }
    }

    Ok(())
}

fn filter_by_gate(entries: Vec<MailboxEntry>, gate: Option<&str>) -> Vec<MailboxEntry> {
    match gate {
        Some(gate) => entries
            .into_iter()
            .filter(|entry| TransferFileInfo::destination_of(&entry.stem) == Some(gate))
            .collect(),
        None => entries,
    }
}

async fn inspect(mailbox: &FilesystemMailbox, file: &Path) -> Result<()> {
    let path = if file.exists() {
        file.to_path_buf()
    } else {
        mailbox.intake_dir().join(file)
    };

    let bytes = mailbox
        .read(&path)
        .await?
        .with_context(|| format!("No payload at {}", path.display()))?;
    let envelope = WireFormat::default()
        .deserialize(&bytes)
        .with_context(|| format!("Failed to decode {}", path.display()))?;

    print_summary(&path, bytes.len(), &envelope);
    Ok(())
}

fn print_summary(path: &Path, size: usize, envelope: &TransferEnvelope) {
    println!("{}", path.display().to_string().bold());
    println!("  Size: {} B", size);
    println!(
        "  Source: gate {} (destination '{}')",
        envelope.source_gate, envelope.source_destination_id
    );
    println!(
        "  Structures: {} ({} blocks)",
        envelope.structures.len(),
        envelope.block_count()
    );
    for structure in &envelope.structures {
        let p = structure.pose.position;
        println!(
            "    - {} [{}] {} blocks, radius {:.1} m, at ({:.0}, {:.0}, {:.0})",
            structure.display_name,
            structure.id.0,
            structure.blocks.len(),
            structure.bounding_radius,
            p.x,
            p.y,
            p.z
        );
    }

    println!("  Identities: {}", envelope.identities.len());
    for (id, record) in &envelope.identities {
        let account = envelope
            .player_accounts
            .get(id)
            .map(|account| account.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("    - {} {} (account {})", id, record.display_name, account);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(stem: &str) -> MailboxEntry {
        MailboxEntry {
            path: PathBuf::from(format!("/tmp/{}.wgt", stem)),
            stem: stem.to_string(),
            state: EntryState::Pending,
            size_bytes: 10,
            sent_marker: false,
            received_marker: false,
        }
    }

    #[test]
    fn test_filter_by_gate() {
        let entries = vec![
            entry("Alpha_555_Jane_Courier_1700000000000"),
            entry("Beta_777_Max_Hauler_1700000000001"),
        ];

        let beta = filter_by_gate(entries.clone(), Some("Beta"));
        assert_eq!(beta.len(), 1);
        assert_eq!(beta[0].stem, "Beta_777_Max_Hauler_1700000000001");
        assert_eq!(filter_by_gate(entries, None).len(), 2);
    }

    #[tokio::test]
    async fn test_list_empty_folder() {
        let dir = tempfile::TempDir::new().unwrap();
        let mailbox = FilesystemMailbox::new(dir.path(), false);
        mailbox.ensure_directories().await.unwrap();
        list(&mailbox, None).await.unwrap();
    }
}
