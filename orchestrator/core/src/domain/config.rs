// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Warpgate Configuration
//
// Defines the configuration schema for a warpgate host process, including:
// - Local gates (portals) and the destinations each allows
// - Directory of gates hosted by other processes
// - Shared mailbox folder and transfer behaviour flags
// - Remote capacity probing and free-space search budgets

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::geometry::Position;
use crate::domain::portal::{parse_gps, AllowedDestination, Portal};

/// A locally hosted gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    pub name: String,

    /// World position as `[x, y, z]`
    pub position: Position,

    #[serde(default)]
    pub destinations: Vec<AllowedDestination>,
}

/// A gate hosted by another process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteGate {
    pub name: String,

    /// `host:port` of the process hosting the gate
    pub address: String,
}

/// Budget for the outward ring search on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FreeSpaceSettings {
    #[serde(default = "default_rings")]
    pub rings: u32,

    #[serde(default = "default_attempts_per_ring")]
    pub attempts_per_ring: u32,

    /// Ring spacing as a multiple of the excluded radius
    #[serde(default = "default_step")]
    pub step: f64,
}

impl Default for FreeSpaceSettings {
    fn default() -> Self {
        Self {
            rings: default_rings(),
            attempts_per_ring: default_attempts_per_ring(),
            step: default_step(),
        }
    }
}

/// Top-level warpgate configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarpgateConfig {
    /// Shared root holding the mailbox folders
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<PathBuf>,

    /// Host ticks between scans
    #[serde(default = "default_tick")]
    pub tick: u32,

    /// Capture radius applied to every local gate
    #[serde(default = "default_gate_radius")]
    pub gate_radius: f64,

    #[serde(default)]
    pub gates: Vec<GateConfig>,

    #[serde(default)]
    pub remote_gates: Vec<RemoteGate>,

    /// Address remote processes use to reach this one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub this_address: Option<String>,

    /// Jump without an explicit selection when a gate has exactly one destination
    #[serde(default)]
    pub auto_send: bool,

    /// Keep ownership with the original owners instead of the jumping player
    #[serde(default)]
    pub keep_ownership: bool,

    #[serde(default = "default_true")]
    pub player_respawn: bool,

    /// Allow faction members to operate a jump device they do not own
    #[serde(default = "default_true")]
    pub allow_in_faction: bool,

    #[serde(default = "default_true")]
    pub include_connected_grids: bool,

    #[serde(default = "default_true")]
    pub export_projector_blueprints: bool,

    /// Keep received payloads in the backup folder after materialization
    #[serde(default = "default_true")]
    pub grid_backup: bool,

    /// Keep a copy of each published payload per account
    #[serde(default)]
    pub outgoing_backup: bool,

    #[serde(default)]
    pub save_on_exit: bool,

    #[serde(default)]
    pub save_on_enter: bool,

    #[serde(default = "default_true")]
    pub check_if_target_server_full: bool,

    #[serde(default = "default_probe_timeout", with = "humantime_serde")]
    pub status_probe_timeout: Duration,

    #[serde(default = "default_unreachable_backoff", with = "humantime_serde")]
    pub unreachable_backoff: Duration,

    #[serde(default = "default_jump_drive_subtypes")]
    pub jump_drive_subtypes: Vec<String>,

    #[serde(default)]
    pub work_with_all_drives: bool,

    /// Two-phase sent/received marker protocol for non-shared folders
    #[serde(default)]
    pub confirm_markers: bool,

    #[serde(default)]
    pub free_space: FreeSpaceSettings,

    /// Broadcast on jump-out; `{PlayerName}` and `{JumpTo}` are substituted
    #[serde(default)]
    pub jump_out_notification: String,

    /// Player capacity reported by the status API
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_players: Option<u32>,
}

impl Default for WarpgateConfig {
    fn default() -> Self {
        Self {
            folder: None,
            tick: default_tick(),
            gate_radius: default_gate_radius(),
            gates: Vec::new(),
            remote_gates: Vec::new(),
            this_address: None,
            auto_send: false,
            keep_ownership: false,
            player_respawn: true,
            allow_in_faction: true,
            include_connected_grids: true,
            export_projector_blueprints: true,
            grid_backup: true,
            outgoing_backup: false,
            save_on_exit: false,
            save_on_enter: false,
            check_if_target_server_full: true,
            status_probe_timeout: default_probe_timeout(),
            unreachable_backoff: default_unreachable_backoff(),
            jump_drive_subtypes: default_jump_drive_subtypes(),
            work_with_all_drives: false,
            confirm_markers: false,
            free_space: FreeSpaceSettings::default(),
            jump_out_notification: String::new(),
            max_players: None,
        }
    }
}

impl WarpgateConfig {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. WARPGATE_CONFIG_PATH environment variable
    /// 2. ./warpgate.yaml (working directory)
    /// 3. ~/.warpgate/config.yaml (user home)
    /// 4. /etc/warpgate/config.yaml (system, Unix) or C:\ProgramData\Warpgate\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("WARPGATE_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./warpgate.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".warpgate").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/warpgate/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Warpgate\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing or invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("WARPGATE_FOLDER") {
            tracing::info!("Environment override: WARPGATE_FOLDER={}", val);
            self.folder = Some(PathBuf::from(val));
        }

        if let Ok(val) = std::env::var("WARPGATE_TICK") {
            match val.parse::<u32>() {
                Ok(tick) => {
                    tracing::info!("Environment override: WARPGATE_TICK={}", tick);
                    self.tick = tick;
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for WARPGATE_TICK: '{}'. Expected an integer. Ignoring.",
                        val
                    );
                }
            }
        }

        if let Ok(val) = std::env::var("WARPGATE_THIS_ADDRESS") {
            tracing::info!("Environment override: WARPGATE_THIS_ADDRESS={}", val);
            self.this_address = Some(val);
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tick == 0 {
            anyhow::bail!("tick must be greater than zero");
        }

        if !(self.gate_radius.is_finite() && self.gate_radius > 0.0) {
            anyhow::bail!("gate_radius must be a positive number, got {}", self.gate_radius);
        }

        let mut names = HashSet::new();
        for gate in &self.gates {
            validate_gate_name(&gate.name)?;
            if !names.insert(gate.name.as_str()) {
                anyhow::bail!("Duplicate gate name: '{}'", gate.name);
            }

            let mut ids = HashSet::new();
            for destination in &gate.destinations {
                if destination.id().is_empty() {
                    anyhow::bail!("Destination id cannot be empty in gate: {}", gate.name);
                }
                if !ids.insert(destination.id()) {
                    anyhow::bail!(
                        "Duplicate destination id '{}' in gate: {}",
                        destination.id(),
                        gate.name
                    );
                }
                match destination {
                    AllowedDestination::Gate { gate: target, .. } => {
                        validate_gate_name(target)?;
                    }
                    AllowedDestination::Coordinate { gps, .. } => {
                        if parse_gps(gps).is_none() {
                            anyhow::bail!(
                                "Destination '{}' in gate {} has an unparseable coordinate: '{}'",
                                destination.id(),
                                gate.name,
                                gps
                            );
                        }
                    }
                }
            }
        }

        for remote in &self.remote_gates {
            validate_gate_name(&remote.name)?;
            if remote.address.trim().is_empty() {
                anyhow::bail!("Remote gate address cannot be empty for: {}", remote.name);
            }
        }

        if self.free_space.rings == 0 || self.free_space.attempts_per_ring == 0 {
            anyhow::bail!("free_space budget must allow at least one ring and one attempt");
        }
        if !(self.free_space.step.is_finite() && self.free_space.step > 0.0) {
            anyhow::bail!("free_space.step must be a positive number");
        }

        Ok(())
    }

    /// Runtime view of the local gates.
    pub fn portals(&self) -> Vec<Portal> {
        self.gates
            .iter()
            .map(|gate| Portal {
                name: gate.name.clone(),
                position: gate.position,
                radius: self.gate_radius,
                destinations: gate.destinations.clone(),
            })
            .collect()
    }

    pub fn remote_address(&self, gate_name: &str) -> Option<&str> {
        self.remote_gates
            .iter()
            .find(|remote| remote.name == gate_name)
            .map(|remote| remote.address.as_str())
    }

    pub fn is_jump_drive_subtype(&self, subtype_id: &str) -> bool {
        self.work_with_all_drives || self.jump_drive_subtypes.iter().any(|s| s == subtype_id)
    }
}

/// Gate names become the first segment of mailbox file names.
fn validate_gate_name(name: &str) -> anyhow::Result<()> {
    if name.is_empty() {
        anyhow::bail!("Gate name cannot be empty");
    }
    if !name.chars().all(|c| c.is_alphanumeric()) {
        anyhow::bail!(
            "Gate name '{}' may only contain letters and digits",
            name
        );
    }
    Ok(())
}

fn default_true() -> bool {
    true
}

fn default_tick() -> u32 {
    240
}

fn default_gate_radius() -> f64 {
    180.0
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_unreachable_backoff() -> Duration {
    Duration::from_secs(10)
}

fn default_jump_drive_subtypes() -> Vec<String> {
    vec!["WormholeDrive".to_string(), "WormholeDrive_Small".to_string()]
}

fn default_rings() -> u32 {
    20
}

fn default_attempts_per_ring() -> u32 {
    5
}

fn default_step() -> f64 {
    1.0
}
