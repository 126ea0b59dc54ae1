// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Warpgate Operator CLI
//!
//! The `warpgate` binary is the operator's companion to a host process
//! running the jump orchestrator.
//!
//! ## Commands
//!
//! - `warpgate config show|validate|generate` - Configuration management
//! - `warpgate status [TARGET]` - Probe remote gates the way a jump would
//! - `warpgate mailbox list|inspect|gc` - Inspect the shared transfer folder
//! - `warpgate serve` - Run the status API that remote probes talk to

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;

use commands::{ConfigCommand, MailboxCommand, ServeArgs, StatusArgs};

/// Warpgate - cross-server structure transfer
#[derive(Parser)]
#[command(name = "warpgate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "WARPGATE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "WARPGATE_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Probe remote gates
    #[command(name = "status")]
    Status {
        #[command(flatten)]
        args: StatusArgs,
    },

    /// Shared mailbox folder
    #[command(name = "mailbox")]
    Mailbox {
        #[command(subcommand)]
        command: MailboxCommand,
    },

    /// Serve the status API
    #[command(name = "serve")]
    Serve {
        #[command(flatten)]
        args: ServeArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Status { args }) => commands::status::execute(args, cli.config).await,
        Some(Commands::Mailbox { command }) => {
            commands::mailbox::handle_command(command, cli.config).await
        }
        Some(Commands::Serve { args }) => commands::serve::execute(args, cli.config).await,
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
