//! Authoritative world state.
//!
//! Players and bullets live in ordered maps so iteration is stable between
//! ticks. Steps that may change a store while walking it iterate over an id
//! snapshot (`ids()`) instead of borrowing the map.

use std::{collections::BTreeMap, time::Instant};

use arena_shared::{
    config::ServerConfig,
    math::Vec2,
    protocol::{GameMode, PlayerId, Weapon},
    wire::{BulletLookup, BulletPose},
};
use bytes::BufMut;

use crate::{
    hooks::GameMap,
    messages::{Drained, MessageQueue, Pending},
};

/// Health a player respawns with.
pub const FULL_HEALTH: i32 = 100;

bitflags::bitflags! {
    /// Player state bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PlayerFlags: u8 {
        /// Slot is in use by a connected session or a bot.
        const ACTIVE = 1 << 0;
        const LOGGED_IN = 1 << 1;
        const ADMIN = 1 << 2;
        /// Driven by AI, never a message recipient.
        const BOT = 1 << 3;
        /// Bot is dead; its AI is paused until respawn.
        const DEAD = 1 << 4;
        /// Client has already been told to wipe its debug overlay.
        const DEBUG_CLEARED = 1 << 5;
    }
}

/// A player slot.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub name: String,
    pub flags: PlayerFlags,
    pub health: i32,
    pub pos: Vec2,
    /// Last position that passed movement validation.
    pub last_valid: Vec2,
    /// Reference point for speed-hack detection.
    pub hack_test: Vec2,
    pub angle: f32,
    pub team: u8,
    pub weapon: Weapon,
    /// When the player last spawned. `None` means no spawn protection.
    pub spawn_time: Option<Instant>,
    pub time_to_death: Instant,
    pub last_activity: Instant,
}

impl Player {
    /// Creates an empty, inactive slot.
    pub fn new(id: PlayerId, name: impl Into<String>, now: Instant) -> Self {
        Self {
            id,
            name: name.into(),
            flags: PlayerFlags::empty(),
            health: FULL_HEALTH,
            pos: Vec2::ZERO,
            last_valid: Vec2::ZERO,
            hack_test: Vec2::ZERO,
            angle: 0.0,
            team: 0,
            weapon: Weapon::Pistol,
            spawn_time: Some(now),
            time_to_death: now,
            last_activity: now,
        }
    }

    /// A connected, logged-in human.
    pub fn human(id: PlayerId, name: impl Into<String>, now: Instant) -> Self {
        let mut p = Self::new(id, name, now);
        p.flags = PlayerFlags::ACTIVE | PlayerFlags::LOGGED_IN;
        p
    }

    pub fn bot(id: PlayerId, name: impl Into<String>, now: Instant) -> Self {
        let mut p = Self::new(id, name, now);
        p.flags = PlayerFlags::ACTIVE | PlayerFlags::BOT;
        p
    }

    pub fn with_team(mut self, team: u8) -> Self {
        self.team = team;
        self
    }

    pub fn is_active(&self) -> bool {
        self.flags.contains(PlayerFlags::ACTIVE)
    }

    pub fn is_logged_in(&self) -> bool {
        self.flags.contains(PlayerFlags::LOGGED_IN)
    }

    pub fn is_bot(&self) -> bool {
        self.flags.contains(PlayerFlags::BOT)
    }

    pub fn is_dead(&self) -> bool {
        self.flags.contains(PlayerFlags::DEAD)
    }

    /// Whether the slot counts towards `GameState::player_count`.
    pub fn is_counted(&self) -> bool {
        self.is_active() && self.is_logged_in() && !self.is_bot()
    }

    /// Active humans are the only message recipients.
    pub fn receives_messages(&self) -> bool {
        self.is_active() && !self.is_bot()
    }

    /// Records any sign of life from the client.
    pub fn touch(&mut self, now: Instant) {
        self.last_activity = now;
    }

    pub fn kill(&mut self, now: Instant) {
        self.health = 0;
        self.time_to_death = now;
        if self.is_bot() {
            self.flags.insert(PlayerFlags::DEAD);
        }
    }

    /// Puts the player back on the map at `spot` with full health.
    pub fn respawn(&mut self, spot: Vec2, now: Instant) {
        self.pos = spot;
        self.last_valid = spot;
        self.hack_test = spot;
        self.health = FULL_HEALTH;
        self.spawn_time = Some(now);
    }
}

/// Player store.
#[derive(Debug, Default)]
pub struct Players {
    by_id: BTreeMap<PlayerId, Player>,
}

impl Players {
    pub fn insert(&mut self, player: Player) -> Option<Player> {
        self.by_id.insert(player.id, player)
    }

    pub fn remove(&mut self, id: PlayerId) -> Option<Player> {
        self.by_id.remove(&id)
    }

    pub fn get(&self, id: PlayerId) -> Option<&Player> {
        self.by_id.get(&id)
    }

    pub fn get_mut(&mut self, id: PlayerId) -> Option<&mut Player> {
        self.by_id.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Player> {
        self.by_id.values()
    }

    /// Snapshot of the current ids.
    pub fn ids(&self) -> Vec<PlayerId> {
        self.by_id.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

/// A live projectile.
#[derive(Debug, Clone, PartialEq)]
pub struct Bullet {
    pub id: u16,
    pub shooter: PlayerId,
    pub weapon: Weapon,
    pub pos: Vec2,
    /// Heading in degrees.
    pub angle: f32,
    /// Pixels per second.
    pub speed: f32,
    /// Seconds left before the bullet fizzles out.
    pub life: f32,
}

/// Bullet store.
#[derive(Debug, Default)]
pub struct Bullets {
    by_id: BTreeMap<u16, Bullet>,
    next_id: u16,
}

impl Bullets {
    /// Adds a bullet under a fresh id and returns the id.
    ///
    /// Ids wrap around and skip ids still in flight. Id 0 is never handed out.
    pub fn spawn(
        &mut self,
        shooter: PlayerId,
        weapon: Weapon,
        pos: Vec2,
        angle: f32,
        speed: f32,
        life: f32,
    ) -> u16 {
        let mut id = self.next_id;
        loop {
            id = id.wrapping_add(1);
            if id != 0 && !self.by_id.contains_key(&id) {
                break;
            }
        }
        self.next_id = id;
        self.by_id.insert(
            id,
            Bullet {
                id,
                shooter,
                weapon,
                pos,
                angle,
                speed,
                life,
            },
        );
        id
    }

    pub fn insert(&mut self, bullet: Bullet) {
        self.by_id.insert(bullet.id, bullet);
    }

    pub fn remove(&mut self, id: u16) -> Option<Bullet> {
        self.by_id.remove(&id)
    }

    pub fn get(&self, id: u16) -> Option<&Bullet> {
        self.by_id.get(&id)
    }

    pub fn get_mut(&mut self, id: u16) -> Option<&mut Bullet> {
        self.by_id.get_mut(&id)
    }

    pub fn ids(&self) -> Vec<u16> {
        self.by_id.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl BulletLookup for Bullets {
    fn bullet_pose(&self, id: u16) -> Option<BulletPose> {
        self.by_id.get(&id).map(|b| BulletPose {
            pos: b.pos,
            angle: b.angle,
        })
    }
}

/// Round-wide game state.
#[derive(Debug, Clone, Default)]
pub struct GameState {
    /// Logged-in humans. Signed because the counter is also adjusted by
    /// external login/logout handling.
    pub player_count: i32,
    pub game_mode: GameMode,
}

/// Everything a tick reads and mutates.
pub struct World {
    pub players: Players,
    pub bullets: Bullets,
    pub state: GameState,
    pub config: ServerConfig,
    pub messages: MessageQueue,
    pub map: Box<dyn GameMap>,
    /// Debug drawing toggle.
    pub debug: bool,
}

impl World {
    pub fn new(config: ServerConfig, map: Box<dyn GameMap>) -> Self {
        Self {
            players: Players::default(),
            bullets: Bullets::default(),
            state: GameState {
                player_count: 0,
                game_mode: config.game_mode,
            },
            debug: config.debug,
            config,
            messages: MessageQueue::default(),
            map,
        }
    }

    /// Registers a player. Active logged-in humans count towards
    /// `player_count`.
    pub fn add_player(&mut self, player: Player) {
        if player.is_counted() {
            self.state.player_count += 1;
        }
        if let Some(old) = self.players.insert(player) {
            if old.is_counted() {
                self.state.player_count -= 1;
            }
        }
    }

    /// Queues `msg` for every active human except `except`.
    pub fn broadcast(&mut self, msg: impl Into<Pending>, except: Option<PlayerId>) {
        self.messages.add_to_all(&self.players, msg, except);
    }

    pub fn send_to_team(&mut self, team: u8, msg: impl Into<Pending>) {
        self.messages.add_to_team(&self.players, team, msg);
    }

    /// Encodes everything pending for `to` into `out`.
    pub fn drain<B: BufMut + ?Sized>(&mut self, to: PlayerId, out: &mut B) -> Drained {
        self.messages.drain(to, &self.bullets, out)
    }

    /// Queues `msg` for a single recipient.
    pub fn send(&mut self, to: PlayerId, msg: impl Into<Pending>) {
        self.messages.add(to, msg);
    }
}
