//! Server run loop.
//!
//! `GameServer` owns the world and the tick pipeline and runs on a single
//! tokio task. The transport talks to it through a cloneable `ServerHandle`;
//! enqueue and drain requests are processed between ticks on the same task,
//! so world state needs no locking.
//!
//! Determinism notes:
//! - `step` and `run_for_ticks` take explicit timestamps; only the run loop
//!   reads the clock.
//! - Missed ticks are skipped, not replayed in a burst.

use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use arena_shared::{config::ServerConfig, protocol::PlayerId};
use bytes::{Bytes, BytesMut};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tracing::{debug, info};

use crate::{
    game::Game,
    hooks::SpawnPoints,
    messages::{Drained, Pending},
    world::World,
};

/// Who an enqueued message is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipients {
    One(PlayerId),
    /// Every active human, optionally minus one.
    All { except: Option<PlayerId> },
    Team(u8),
}

#[derive(Debug)]
enum Command {
    Enqueue {
        to: Recipients,
        msg: Pending,
    },
    Drain {
        player: PlayerId,
        reply: oneshot::Sender<Option<Bytes>>,
    },
    Stop,
}

/// Cloneable control handle for a running server.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl ServerHandle {
    /// Queues a message. It is visible to the next drain.
    pub fn enqueue(&self, to: Recipients, msg: impl Into<Pending>) -> anyhow::Result<()> {
        self.tx
            .send(Command::Enqueue {
                to,
                msg: msg.into(),
            })
            .map_err(|_| anyhow!("server stopped"))
    }

    /// Wire bytes pending for `player`, or `None` if there is nothing to send.
    pub async fn drain(&self, player: PlayerId) -> anyhow::Result<Option<Bytes>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Drain { player, reply })
            .map_err(|_| anyhow!("server stopped"))?;
        rx.await.context("server stopped before replying")
    }

    /// Stops the tick loop. Commands sent before this are still handled.
    pub fn stop(&self) {
        let _ = self.tx.send(Command::Stop);
    }
}

/// Game server: world state plus the tick pipeline.
pub struct GameServer {
    pub world: World,
    pub game: Game,
}

impl GameServer {
    /// Creates a server with the default collaborators, spawning players at
    /// the configured spawn points.
    pub fn new(config: ServerConfig) -> Self {
        let map = SpawnPoints::new(config.spawn_points.clone());
        let game = Game::new(&config);
        Self::with_parts(World::new(config, Box::new(map)), game)
    }

    pub fn with_parts(world: World, game: Game) -> Self {
        Self { world, game }
    }

    /// Runs one tick at `now`.
    pub fn step(&mut self, now: Instant) {
        self.game.update_at(&mut self.world, now);
    }

    /// Runs `ticks` ticks spaced one tick interval apart, starting at `start`.
    pub fn run_for_ticks(&mut self, ticks: u32, start: Instant) {
        let period = self.world.config.tick_interval();
        for i in 0..ticks {
            self.step(start + period * i);
        }
    }

    pub fn enqueue(&mut self, to: Recipients, msg: impl Into<Pending>) {
        match to {
            Recipients::One(id) => self.world.send(id, msg),
            Recipients::All { except } => self.world.broadcast(msg, except),
            Recipients::Team(team) => self.world.send_to_team(team, msg),
        }
    }

    /// Encodes and removes everything pending for `player`.
    pub fn drain_bytes(&mut self, player: PlayerId) -> Option<Bytes> {
        let mut out = BytesMut::new();
        match self.world.drain(player, &mut out) {
            Drained::Nothing => None,
            Drained::Sent(stats) => {
                debug!(
                    player = %player,
                    encoded = stats.encoded,
                    skipped = stats.skipped,
                    discarded = stats.discarded,
                    bytes = stats.bytes,
                    "drained"
                );
                Some(out.freeze())
            }
        }
    }

    /// Spawns the tick loop at `updates_per_second`.
    ///
    /// The join handle yields the server back once stopped, with any
    /// undelivered messages still queued.
    pub fn start(mut self, updates_per_second: u32) -> (ServerHandle, JoinHandle<GameServer>) {
        self.world.config.updates_per_second = updates_per_second;
        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(self.run(rx));
        (ServerHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) -> Self {
        let period: Duration = self.world.config.tick_interval();
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            updates_per_second = self.world.config.updates_per_second,
            "tick loop started"
        );

        // Ticks are polled first: a flooded command channel must not starve
        // the simulation.
        loop {
            tokio::select! {
                biased;
                at = interval.tick() => self.step(at.into_std()),
                cmd = rx.recv() => match cmd {
                    Some(Command::Enqueue { to, msg }) => self.enqueue(to, msg),
                    Some(Command::Drain { player, reply }) => {
                        let _ = reply.send(self.drain_bytes(player));
                    }
                    Some(Command::Stop) | None => break,
                },
            }
        }

        info!(ticks = self.game.tick(), "tick loop stopped");
        self
    }
}
