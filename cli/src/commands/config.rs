// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use warpgate_core::domain::config::{GateConfig, RemoteGate, WarpgateConfig};
use warpgate_core::domain::geometry::Position;
use warpgate_core::domain::portal::AllowedDestination;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./warpgate.yaml)
        #[arg(short, long, default_value = "./warpgate.yaml")]
        output: PathBuf,

        /// Include example gates and destinations
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = WarpgateConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. WARPGATE_CONFIG_PATH: {}",
            std::env::var("WARPGATE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./warpgate.yaml");
        println!("  4. ~/.warpgate/config.yaml");
        println!("  5. /etc/warpgate/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Mailbox:".bold());
    match &config.folder {
        Some(folder) => println!("  Folder: {}", folder.display()),
        None => println!("  Folder: {}", "(not set, transfers disabled)".yellow()),
    }
    println!("  Confirm markers: {}", config.confirm_markers);
    println!("  Grid backup: {}", config.grid_backup);
    println!("  Outgoing backup: {}", config.outgoing_backup);
    println!();

    println!("{}", "Local Gates:".bold());
    for gate in &config.gates {
        println!(
            "  {} at ({:.0}, {:.0}, {:.0}), radius {}",
            gate.name.bold(),
            gate.position.x,
            gate.position.y,
            gate.position.z,
            config.gate_radius
        );
        for destination in &gate.destinations {
            match destination {
                AllowedDestination::Gate { gate: target, .. } => {
                    let host = match config.remote_address(target) {
                        Some(address) => format!("remote {}", address),
                        None if config.gates.iter().any(|g| &g.name == target) => "local".to_string(),
                        None => "unknown".red().to_string(),
                    };
                    println!("    - {} → gate {} ({})", destination.id(), target, host);
                }
                AllowedDestination::Coordinate { gps, .. } => {
                    println!("    - {} → {}", destination.id(), gps);
                }
            }
        }
    }
    println!();

    println!("{}", "Remote Gates:".bold());
    for remote in &config.remote_gates {
        println!("  {} @ {}", remote.name.bold(), remote.address);
    }
    println!();

    println!("{}", "Behaviour:".bold());
    println!("  Tick: every {} frames", config.tick);
    println!("  Auto send: {}", config.auto_send);
    println!("  Keep ownership: {}", config.keep_ownership);
    println!("  Player respawn: {}", config.player_respawn);
    println!("  Check target capacity: {}", config.check_if_target_server_full);
    println!("  Probe timeout: {:?}", config.status_probe_timeout);
    println!("  Jump drives: {}", config.jump_drive_subtypes.join(", "));
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = WarpgateConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    let unresolved = unresolved_gates(&config);
    for (gate, target) in &unresolved {
        println!(
            "{}",
            format!("! Gate {} points at {}, which is neither local nor remote", gate, target).yellow()
        );
    }

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    sample_config(with_examples)
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

/// Gate destinations whose target gate no process is known to host.
fn unresolved_gates(config: &WarpgateConfig) -> Vec<(String, String)> {
    config
        .gates
        .iter()
        .flat_map(|gate| {
            gate.destinations.iter().filter_map(move |destination| match destination {
                AllowedDestination::Gate { gate: target, .. }
                    if config.remote_address(target).is_none()
                        && !config.gates.iter().any(|g| &g.name == target) =>
                {
                    Some((gate.name.clone(), target.clone()))
                }
                _ => None,
            })
        })
        .collect()
}

fn sample_config(with_examples: bool) -> WarpgateConfig {
    let mut config = WarpgateConfig {
        folder: Some(PathBuf::from("/srv/warpgate/mailbox")),
        ..WarpgateConfig::default()
    };
    if !with_examples {
        return config;
    }

    config.gates = vec![
        GateConfig {
            name: "Alpha".to_string(),
            position: Position::new(0.0, 0.0, 0.0),
            destinations: vec![
                AllowedDestination::Gate {
                    id: "beta".to_string(),
                    display_name: "Beta sector".to_string(),
                    gate: "Beta".to_string(),
                },
                AllowedDestination::Gate {
                    id: "outpost".to_string(),
                    display_name: "Outpost".to_string(),
                    gate: "Outpost".to_string(),
                },
                AllowedDestination::Coordinate {
                    id: "belt".to_string(),
                    display_name: "Asteroid belt".to_string(),
                    gps: "GPS:Belt:120000:-4000:56000:".to_string(),
                },
            ],
        },
        GateConfig {
            name: "Outpost".to_string(),
            position: Position::new(250_000.0, 0.0, 0.0),
            destinations: vec![AllowedDestination::Gate {
                id: "alpha".to_string(),
                display_name: "Back to Alpha".to_string(),
                gate: "Alpha".to_string(),
            }],
        },
    ];
    config.remote_gates = vec![RemoteGate {
        name: "Beta".to_string(),
        address: "10.0.0.2:27080".to_string(),
    }];
    config.this_address = Some("10.0.0.1:27080".to_string());
    config.jump_out_notification = "{PlayerName} jumped to {JumpTo}".to_string();
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_generated_samples_validate() {
        let dir = TempDir::new().unwrap();
        for examples in [false, true] {
            let path = dir.path().join(format!("warpgate-{}.yaml", examples));
            generate(path.clone(), examples).await.unwrap();

            let loaded = WarpgateConfig::from_yaml_file(&path).unwrap();
            loaded.validate().unwrap();
            assert_eq!(loaded, sample_config(examples));
        }
    }

    #[test]
    fn test_unresolved_gates_reported() {
        let mut config = sample_config(true);
        assert!(unresolved_gates(&config).is_empty());

        config.remote_gates.clear();
        assert_eq!(
            unresolved_gates(&config),
            vec![("Alpha".to_string(), "Beta".to_string())]
        );
    }
}
