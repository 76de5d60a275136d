//! Collaborator traits consumed by the tick pipeline, with default
//! implementations.
//!
//! Map geometry, bot decision-making, server listing and round rules belong to
//! the concrete game. The scheduler only needs these narrow seams.

use arena_shared::{
    math::Vec2,
    protocol::{PlayerId, Weapon},
};
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use tracing::debug;

use crate::{
    game::FrameTimer,
    world::{GameState, World},
};

/// Map queries needed by the core.
pub trait GameMap: Send {
    /// Returns a free spawn coordinate.
    fn find_spot(&mut self) -> Vec2;

    /// Whether `pos` is inside a wall.
    fn is_blocked(&self, _pos: Vec2) -> bool {
        false
    }
}

/// Hands out a fixed list of spawn points in rotation. No walls.
#[derive(Debug, Clone, Default)]
pub struct SpawnPoints {
    points: Vec<Vec2>,
    next: usize,
}

impl SpawnPoints {
    pub fn new(points: Vec<Vec2>) -> Self {
        Self { points, next: 0 }
    }
}

impl GameMap for SpawnPoints {
    fn find_spot(&mut self) -> Vec2 {
        if self.points.is_empty() {
            return Vec2::ZERO;
        }
        let spot = self.points[self.next % self.points.len()];
        self.next = (self.next + 1) % self.points.len();
        spot
    }
}

/// Server listing service, told whenever the player count changes.
pub trait Registration: Send {
    fn update(&mut self, state: &GameState);
}

/// Registration for unlisted servers.
#[derive(Debug, Default)]
pub struct NullRegistration;

impl Registration for NullRegistration {
    fn update(&mut self, state: &GameState) {
        debug!(player_count = state.player_count, "listing not updated (unlisted)");
    }
}

/// Picks weapons for respawning bots.
pub trait WeaponPicker: Send {
    fn bot_weapon(&mut self) -> Weapon;
}

/// Uniform random choice from a configured list.
pub struct RandomWeapons {
    choices: Vec<Weapon>,
    rng: StdRng,
}

impl RandomWeapons {
    pub fn new(choices: Vec<Weapon>) -> Self {
        Self {
            choices,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(choices: Vec<Weapon>, seed: u64) -> Self {
        Self {
            choices,
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl WeaponPicker for RandomWeapons {
    fn bot_weapon(&mut self) -> Weapon {
        self.choices
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(Weapon::Pistol)
    }
}

/// Per-bot decision making. Called once per tick for every live bot.
pub trait BotAi: Send {
    fn update(
        &mut self,
        bot: PlayerId,
        world: &mut World,
        frame: &FrameTimer,
    ) -> anyhow::Result<()>;
}

/// Bots that stand still.
#[derive(Debug, Default)]
pub struct IdleBots;

impl BotAi for IdleBots {
    fn update(
        &mut self,
        _bot: PlayerId,
        _world: &mut World,
        _frame: &FrameTimer,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Advances one bullet by one tick. May remove it from `world.bullets`.
pub trait BulletStepper: Send {
    fn advance(
        &mut self,
        bullet: u16,
        world: &mut World,
        frame: &FrameTimer,
    ) -> anyhow::Result<()>;
}

/// Straight-line flight. Bullets vanish when their lifetime runs out or they
/// fly into a wall.
#[derive(Debug, Default)]
pub struct LinearBullets;

impl BulletStepper for LinearBullets {
    fn advance(
        &mut self,
        bullet: u16,
        world: &mut World,
        frame: &FrameTimer,
    ) -> anyhow::Result<()> {
        let Some(b) = world.bullets.get_mut(bullet) else {
            return Ok(());
        };
        let step = frame.move_per_sec(b.speed);
        b.pos = b.pos + Vec2::from_angle(b.angle).scaled(step);
        b.life -= frame.frame_time();
        let (pos, life) = (b.pos, b.life);

        if life <= 0.0 || world.map.is_blocked(pos) {
            world.bullets.remove(bullet);
        }
        Ok(())
    }
}

/// Outcome of a round check.
#[derive(Debug, Clone, PartialEq)]
pub enum RoundStatus {
    Continues,
    Ended(RoundResult),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoundResult {
    pub winner_team: Option<u8>,
    /// Broadcast to every player as a server message.
    pub announcement: String,
}

/// Round, statistics and bot-population policy.
pub trait GameRules: Send {
    fn check_round(&mut self, _world: &mut World) -> RoundStatus {
        RoundStatus::Continues
    }

    fn refresh_stats(&mut self, _world: &mut World) {}

    fn balance_bots(&mut self, _world: &mut World) {}
}

/// Endless round, no stats, bot population managed elsewhere.
#[derive(Debug, Default)]
pub struct OpenRules;

impl GameRules for OpenRules {}
