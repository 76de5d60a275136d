//! Configuration system.
//!
//! Loads server configuration from JSON strings/files. Every field has a
//! default, so a partial file (or `{}`) is valid.

use std::{path::Path, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{
    math::Vec2,
    protocol::{GameMode, Weapon},
};

/// Root server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Simulation ticks per second.
    pub updates_per_second: u32,
    /// How long a dead player stays dead, in milliseconds.
    pub death_delay_ms: u64,
    /// Silence after which a human player is timed out, in milliseconds.
    pub max_inactive_time_ms: u64,
    /// Enables the debug drawing overlay.
    pub debug: bool,
    pub game_mode: GameMode,
    /// Weapons a respawning bot may be handed.
    pub bot_weapons: Vec<Weapon>,
    /// Free spawn coordinates, handed out in rotation.
    pub spawn_points: Vec<Vec2>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            updates_per_second: 60,
            death_delay_ms: 3000,
            max_inactive_time_ms: 15000,
            debug: false,
            game_mode: GameMode::Deathmatch,
            bot_weapons: vec![
                Weapon::Pistol,
                Weapon::Machinegun,
                Weapon::Shotgun,
                Weapon::Chainsaw,
            ],
            spawn_points: vec![
                Vec2::new(-300.0, -300.0),
                Vec2::new(300.0, -300.0),
                Vec2::new(300.0, 300.0),
                Vec2::new(-300.0, 300.0),
            ],
        }
    }
}

impl ServerConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("parse config {}", path.display()))
    }

    pub fn death_delay(&self) -> Duration {
        Duration::from_millis(self.death_delay_ms)
    }

    pub fn max_inactive_time(&self) -> Duration {
        Duration::from_millis(self.max_inactive_time_ms)
    }

    /// Tick period, `1000 / updates_per_second` milliseconds.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_nanos(1_000_000_000 / u64::from(self.updates_per_second.max(1)))
    }
}
