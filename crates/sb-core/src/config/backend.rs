//! Supervised backend description
//!
//! One controller agent supervises exactly one game server. Everything that
//! differs between game servers (how to launch them, how to stop them, how
//! to tell that they finished starting, whether they have a whitelist) is
//! captured here.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_secs;

/// Banner the vanilla Minecraft server prints once the world is loaded
pub const MINECRAFT_READY_PATTERN: &str =
    r#"\[[0-9:]+\] \[Server thread/INFO\]: Done \([0-9.]+s\)! For help, type "help""#;

/// Description of one supervised game server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendProfile {
    /// Display name used in replies ("Minecraft")
    pub name: String,

    /// Chat prefix used in help and usage text ("mc" for `!mc`)
    pub prefix: String,

    /// Program and arguments used to launch the server
    pub command: Vec<String>,

    /// Working directory of the server binary
    pub working_dir: PathBuf,

    /// Console directive that makes the server save and exit
    pub stop_command: String,

    /// Regex matched against trimmed output lines to confirm startup
    pub ready_pattern: Option<String>,

    /// How long to wait for the ready pattern
    #[serde(with = "duration_secs")]
    pub startup_timeout: Duration,

    /// Whether the server understands `whitelist add|remove|list|reload`
    pub whitelist: bool,
}

impl Default for BackendProfile {
    fn default() -> Self {
        Self {
            name: "Game".to_string(),
            prefix: "game".to_string(),
            command: Vec::new(),
            working_dir: PathBuf::from("."),
            stop_command: "stop".to_string(),
            ready_pattern: None,
            startup_timeout: Duration::from_secs(300),
            whitelist: false,
        }
    }
}

impl BackendProfile {
    /// Vanilla Minecraft server jar
    pub fn minecraft(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: "Minecraft".to_string(),
            prefix: "mc".to_string(),
            command: ["java", "-Xmx1024M", "-Xms1024M", "-jar", "server.jar", "nogui"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            working_dir: working_dir.into(),
            stop_command: "stop".to_string(),
            ready_pattern: Some(MINECRAFT_READY_PATTERN.to_string()),
            startup_timeout: Duration::from_secs(300),
            whitelist: true,
        }
    }

    /// Terraria dedicated server
    pub fn terraria(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: "Terraria".to_string(),
            prefix: "te".to_string(),
            command: ["bash", "TerrariaServer", "-config", "serverconfig.txt"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            working_dir: working_dir.into(),
            stop_command: "exit".to_string(),
            ready_pattern: None,
            startup_timeout: Duration::from_secs(300),
            whitelist: false,
        }
    }

    /// Look up a preset by name
    pub fn preset(name: &str, working_dir: impl Into<PathBuf>) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "minecraft" | "mc" => Some(Self::minecraft(working_dir)),
            "terraria" | "te" => Some(Self::terraria(working_dir)),
            _ => None,
        }
    }
}
