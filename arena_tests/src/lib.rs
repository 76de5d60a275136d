//! Fixtures shared by the integration tests.

use std::time::Instant;

use anyhow::ensure;
use arena_server::{hooks::SpawnPoints, Player, World};
use arena_shared::{config::ServerConfig, protocol::PlayerId};
use bytes::{Buf, Bytes};

/// Installs a test-friendly subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// A world whose map hands out the configured spawn points.
pub fn world(config: ServerConfig) -> World {
    let map = SpawnPoints::new(config.spawn_points.clone());
    World::new(config, Box::new(map))
}

/// Adds logged-in humans `1..=count` on alternating teams.
pub fn add_humans(world: &mut World, count: u8, now: Instant) {
    for n in 1..=count {
        let team = if n % 2 == 0 { 2 } else { 1 };
        world.add_player(Player::human(PlayerId(n), format!("player{n}"), now).with_team(team));
    }
}

/// Reads drained wire bytes back, field by field.
#[derive(Debug, Clone)]
pub struct WireReader {
    buf: Bytes,
}

impl WireReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    pub fn byte(&mut self) -> anyhow::Result<u8> {
        ensure!(self.buf.remaining() >= 1, "truncated byte");
        Ok(self.buf.get_u8())
    }

    pub fn short(&mut self) -> anyhow::Result<i16> {
        ensure!(self.buf.remaining() >= 2, "truncated short");
        Ok(self.buf.get_i16_le())
    }

    pub fn string(&mut self) -> anyhow::Result<String> {
        ensure!(self.buf.remaining() >= 4, "truncated string length");
        let len = self.buf.get_u32_le() as usize;
        ensure!(self.buf.remaining() >= len, "truncated string body");
        let body = self.buf.split_to(len);
        Ok(body.iter().map(|&b| char::from(b)).collect())
    }

    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }
}
