//! Tick pipeline.
//!
//! `Game::update_at` runs one simulation tick. Step order is fixed:
//!
//! 1. frame timer
//! 2. bot AI (plus the one-time debug overlay clear)
//! 3. round check
//! 4. stats refresh
//! 5. respawns
//! 6. inactivity timeouts
//! 7. bot population
//! 8. bullets
//! 9. commit the frame timestamp
//!
//! Steps that may add or remove entities walk an id snapshot, so a hook
//! removing a bullet or a player mid-step is fine.

use std::time::Instant;

use arena_shared::{
    config::ServerConfig,
    protocol::{GameMode, OutboundEvent},
};
use tracing::{debug, info, warn};

use crate::{
    hooks::{
        BotAi, BulletStepper, GameRules, IdleBots, LinearBullets, NullRegistration, OpenRules,
        RandomWeapons, Registration, RoundStatus, WeaponPicker,
    },
    world::{PlayerFlags, World},
};

/// Health zombie-mode bots respawn with.
pub const ZOMBIE_BOT_HEALTH: i32 = 10;

/// Frame delta bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct FrameTimer {
    last_update: Option<Instant>,
    frame_time: f32,
}

impl FrameTimer {
    /// Recomputes the delta since the last committed tick.
    ///
    /// The first call seeds the timestamp, so the first delta is 0. A clock
    /// that appears to go backwards yields 0 as well.
    pub fn update(&mut self, now: Instant) {
        let last = *self.last_update.get_or_insert(now);
        self.frame_time = now.saturating_duration_since(last).as_secs_f32();
    }

    pub fn commit(&mut self, now: Instant) {
        self.last_update = Some(now);
    }

    /// Seconds elapsed during the current tick.
    pub fn frame_time(&self) -> f32 {
        self.frame_time
    }

    pub fn last_update(&self) -> Option<Instant> {
        self.last_update
    }

    /// Scales a per-second rate to the current frame.
    pub fn move_per_sec(&self, amount: f32) -> f32 {
        amount * self.frame_time
    }
}

/// The tick scheduler and its collaborators.
pub struct Game {
    frame: FrameTimer,
    tick: u64,
    bot_ai: Box<dyn BotAi>,
    bullet_stepper: Box<dyn BulletStepper>,
    rules: Box<dyn GameRules>,
    registration: Box<dyn Registration>,
    weapons: Box<dyn WeaponPicker>,
}

impl Game {
    /// Creates a game with the default collaborators.
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            frame: FrameTimer::default(),
            tick: 0,
            bot_ai: Box::new(IdleBots),
            bullet_stepper: Box::new(LinearBullets),
            rules: Box::new(OpenRules),
            registration: Box::new(NullRegistration),
            weapons: Box::new(RandomWeapons::new(config.bot_weapons.clone())),
        }
    }

    pub fn with_bot_ai(mut self, bot_ai: impl BotAi + 'static) -> Self {
        self.bot_ai = Box::new(bot_ai);
        self
    }

    pub fn with_bullet_stepper(mut self, stepper: impl BulletStepper + 'static) -> Self {
        self.bullet_stepper = Box::new(stepper);
        self
    }

    pub fn with_rules(mut self, rules: impl GameRules + 'static) -> Self {
        self.rules = Box::new(rules);
        self
    }

    pub fn with_registration(mut self, registration: impl Registration + 'static) -> Self {
        self.registration = Box::new(registration);
        self
    }

    pub fn with_weapons(mut self, weapons: impl WeaponPicker + 'static) -> Self {
        self.weapons = Box::new(weapons);
        self
    }

    pub fn frame(&self) -> &FrameTimer {
        &self.frame
    }

    /// Number of completed ticks.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn move_per_sec(&self, amount: f32) -> f32 {
        self.frame.move_per_sec(amount)
    }

    /// Runs one tick as if the current time were `now`.
    pub fn update_at(&mut self, world: &mut World, now: Instant) {
        self.frame.update(now);
        self.update_bots_ai(world);
        self.update_round(world);
        self.rules.refresh_stats(world);
        self.update_players(world, now);
        self.update_timeouts(world, now);
        self.rules.balance_bots(world);
        self.update_bullets(world);
        self.frame.commit(now);
        self.tick += 1;
    }

    fn update_bots_ai(&mut self, world: &mut World) {
        if world.state.player_count <= 0 {
            return;
        }

        if world.debug {
            for id in world.players.ids() {
                let Some(p) = world.players.get_mut(id) else {
                    continue;
                };
                if p.is_active()
                    && p.is_logged_in()
                    && !p.is_bot()
                    && !p.flags.contains(PlayerFlags::DEBUG_CLEARED)
                {
                    p.flags.insert(PlayerFlags::DEBUG_CLEARED);
                    world.messages.add(id, OutboundEvent::ClearDebugDrawing);
                }
            }
        }

        for id in world.players.ids() {
            let live_bot = world
                .players
                .get(id)
                .is_some_and(|p| p.is_active() && p.is_bot() && !p.is_dead());
            if !live_bot {
                continue;
            }
            if let Err(e) = self.bot_ai.update(id, world, &self.frame) {
                warn!(bot = %id, error = %e, "bot AI failed");
            }
        }
    }

    fn update_round(&mut self, world: &mut World) {
        if let RoundStatus::Ended(result) = self.rules.check_round(world) {
            info!(winner = ?result.winner_team, "round over");
            world.broadcast(OutboundEvent::server_message(result.announcement), None);
        }
    }

    fn update_players(&mut self, world: &mut World, now: Instant) {
        let death_delay = world.config.death_delay();
        let zombies = world.state.game_mode == GameMode::Zombie;

        for id in world.players.ids() {
            let Some(p) = world.players.get_mut(id) else {
                continue;
            };
            if p.health > 0 || p.time_to_death + death_delay >= now {
                continue;
            }

            p.respawn(world.map.find_spot(), now);
            if p.is_bot() {
                p.flags.remove(PlayerFlags::DEAD);
                p.weapon = self.weapons.bot_weapon();
                if zombies {
                    p.health = ZOMBIE_BOT_HEALTH;
                    p.spawn_time = None;
                }
            }
            debug!(player = %p.name, id = %id, x = p.pos.x, y = p.pos.y, "respawned");
        }
    }

    fn update_timeouts(&mut self, world: &mut World, now: Instant) {
        let max_inactive = world.config.max_inactive_time();

        for id in world.players.ids() {
            let Some(p) = world.players.get_mut(id) else {
                continue;
            };
            if (!p.is_active() && !p.is_logged_in()) || p.is_bot() {
                continue;
            }
            if p.last_activity + max_inactive >= now {
                continue;
            }

            let counted = p.is_counted();
            p.flags
                .remove(PlayerFlags::ACTIVE | PlayerFlags::LOGGED_IN | PlayerFlags::ADMIN);
            info!(player = %p.name, id = %id, "timed out");

            if counted {
                world.state.player_count -= 1;
                self.registration.update(&world.state);
            }
            world.broadcast(OutboundEvent::Logout { player: id }, Some(id));
        }
    }

    fn update_bullets(&mut self, world: &mut World) {
        for id in world.bullets.ids() {
            if world.bullets.get(id).is_none() {
                continue;
            }
            if let Err(e) = self.bullet_stepper.advance(id, world, &self.frame) {
                warn!(bullet = id, error = %e, "bullet step failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hooks::{GameMap, RoundResult},
        world::{GameState, Player},
    };
    use arena_shared::{
        math::Vec2,
        protocol::{PlayerId, Weapon},
        wire::NoBullets,
    };
    use bytes::BytesMut;
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    const SPOT: Vec2 = Vec2::new(64.0, -32.0);

    /// Always hands out `SPOT` and counts the calls.
    #[derive(Clone, Default)]
    struct CountingMap(Arc<Mutex<usize>>);

    impl GameMap for CountingMap {
        fn find_spot(&mut self) -> Vec2 {
            *self.0.lock().unwrap() += 1;
            SPOT
        }
    }

    #[derive(Clone, Default)]
    struct Log(Arc<Mutex<Vec<String>>>);

    impl Log {
        fn push(&self, entry: impl Into<String>) {
            self.0.lock().unwrap().push(entry.into());
        }

        fn entries(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    /// Records which bots were driven; fails for bot #2.
    struct RecordingBots(Log);

    impl BotAi for RecordingBots {
        fn update(
            &mut self,
            bot: PlayerId,
            _world: &mut World,
            _frame: &FrameTimer,
        ) -> anyhow::Result<()> {
            self.0.push(format!("bot {bot}"));
            anyhow::ensure!(bot != PlayerId(2), "stuck");
            Ok(())
        }
    }

    /// Records the pipeline order.
    struct OrderRules(Log);

    impl GameRules for OrderRules {
        fn check_round(&mut self, _world: &mut World) -> RoundStatus {
            self.0.push("round");
            RoundStatus::Continues
        }

        fn refresh_stats(&mut self, _world: &mut World) {
            self.0.push("stats");
        }

        fn balance_bots(&mut self, _world: &mut World) {
            self.0.push("bots");
        }
    }

    struct EndRound;

    impl GameRules for EndRound {
        fn check_round(&mut self, _world: &mut World) -> RoundStatus {
            RoundStatus::Ended(RoundResult {
                winner_team: Some(1),
                announcement: "red wins".into(),
            })
        }
    }

    struct RecordingRegistration(Log);

    impl Registration for RecordingRegistration {
        fn update(&mut self, state: &GameState) {
            self.0.push(format!("count {}", state.player_count));
        }
    }

    /// Fails for every bullet but still removes odd ones.
    struct FlakyBullets(Log);

    impl BulletStepper for FlakyBullets {
        fn advance(
            &mut self,
            bullet: u16,
            world: &mut World,
            _frame: &FrameTimer,
        ) -> anyhow::Result<()> {
            self.0.push(format!("bullet {bullet}"));
            if bullet % 2 == 1 {
                world.bullets.remove(bullet);
            }
            anyhow::bail!("no map loaded")
        }
    }

    struct Always(Weapon);

    impl WeaponPicker for Always {
        fn bot_weapon(&mut self) -> Weapon {
            self.0
        }
    }

    fn world_with(config: ServerConfig, map: impl GameMap + 'static) -> World {
        World::new(config, Box::new(map))
    }

    fn world() -> World {
        world_with(ServerConfig::default(), CountingMap::default())
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn drained(world: &mut World, id: u8) -> Vec<u8> {
        let mut out = BytesMut::new();
        world.messages.drain(PlayerId(id), &NoBullets, &mut out);
        out.to_vec()
    }

    #[test]
    fn first_tick_has_zero_delta() {
        let t0 = Instant::now();
        let mut w = world();
        let mut game = Game::new(&w.config);

        game.update_at(&mut w, t0);
        assert_eq!(game.frame().frame_time(), 0.0);
        assert_eq!(game.frame().last_update(), Some(t0));

        game.update_at(&mut w, t0 + ms(250));
        assert!((game.frame().frame_time() - 0.25).abs() < 1e-6);
        assert!((game.move_per_sec(200.0) - 50.0).abs() < 1e-3);
        assert_eq!(game.tick(), 2);
    }

    #[test]
    fn frame_delta_never_goes_negative() {
        let t0 = Instant::now() + ms(1000);
        let mut frame = FrameTimer::default();
        frame.update(t0);
        frame.commit(t0);
        frame.update(t0 - ms(10));
        assert_eq!(frame.frame_time(), 0.0);
    }

    /// Logs every spawn point handed out.
    struct LoggingMap(Log);

    impl GameMap for LoggingMap {
        fn find_spot(&mut self) -> Vec2 {
            self.0.push("spot");
            SPOT
        }
    }

    struct LoggingWeapons(Log);

    impl WeaponPicker for LoggingWeapons {
        fn bot_weapon(&mut self) -> Weapon {
            self.0.push("weapon");
            Weapon::Pistol
        }
    }

    /// Logs each bullet with the frame delta it sees and whether the frame
    /// timestamp is already at `tick_at`.
    struct LoggingBullets {
        log: Log,
        tick_at: Instant,
    }

    impl BulletStepper for LoggingBullets {
        fn advance(
            &mut self,
            bullet: u16,
            _world: &mut World,
            frame: &FrameTimer,
        ) -> anyhow::Result<()> {
            let committed = frame.last_update() == Some(self.tick_at);
            self.log.push(format!(
                "bullet {bullet} dt {} committed {committed}",
                frame.frame_time() as u32
            ));
            Ok(())
        }
    }

    #[test]
    fn steps_run_in_order() {
        let log = Log::default();
        let t0 = Instant::now();
        let t1 = t0 + ms(16_000);
        let mut w = world_with(ServerConfig::default(), LoggingMap(log.clone()));
        // Times out at t1.
        w.add_player(Player::human(PlayerId(1), "alice", t0));
        w.add_player(Player::human(PlayerId(2), "bob", t0 + ms(10_000)));
        w.add_player(Player::bot(PlayerId(3), "bot", t0));
        // Respawns at t1.
        let mut dead = Player::bot(PlayerId(4), "dead", t0);
        dead.kill(t0);
        w.add_player(dead);
        w.bullets
            .spawn(PlayerId(3), Weapon::Pistol, Vec2::ZERO, 0.0, 100.0, 60.0);
        let mut game = Game::new(&w.config)
            .with_bot_ai(RecordingBots(log.clone()))
            .with_rules(OrderRules(log.clone()))
            .with_registration(RecordingRegistration(log.clone()))
            .with_weapons(LoggingWeapons(log.clone()))
            .with_bullet_stepper(LoggingBullets {
                log: log.clone(),
                tick_at: t1,
            });

        game.update_at(&mut w, t0);
        let seeded = log.entries().len();
        game.update_at(&mut w, t1);

        assert_eq!(
            log.entries()[seeded..],
            [
                "bot #3",
                "round",
                "stats",
                "spot",
                "weapon",
                "count 1",
                "bots",
                "bullet 1 dt 16 committed false",
            ]
        );
        assert_eq!(game.frame().last_update(), Some(t1));
    }

    #[test]
    fn bot_ai_skipped_without_players() {
        let log = Log::default();
        let mut w = world();
        let t0 = Instant::now();
        w.add_player(Player::bot(PlayerId(3), "bot", t0));
        let mut game = Game::new(&w.config).with_bot_ai(RecordingBots(log.clone()));

        game.update_at(&mut w, t0);
        assert!(log.entries().is_empty());

        w.state.player_count = -1;
        game.update_at(&mut w, t0);
        assert!(log.entries().is_empty());
    }

    #[test]
    fn bot_ai_failure_does_not_stop_the_tick() {
        let log = Log::default();
        let mut w = world();
        let t0 = Instant::now();
        w.add_player(Player::human(PlayerId(1), "alice", t0));
        w.add_player(Player::bot(PlayerId(2), "stuck", t0));
        w.add_player(Player::bot(PlayerId(3), "fine", t0));
        let mut dead = Player::bot(PlayerId(4), "dead", t0);
        dead.kill(t0);
        w.add_player(dead);
        let mut game = Game::new(&w.config).with_bot_ai(RecordingBots(log.clone()));

        game.update_at(&mut w, t0);

        assert_eq!(log.entries(), vec!["bot #2", "bot #3"]);
        assert_eq!(game.tick(), 1);
    }

    #[test]
    fn debug_clear_is_sent_once_per_player() {
        let config = ServerConfig {
            debug: true,
            ..Default::default()
        };
        let mut w = world_with(config, CountingMap::default());
        let t0 = Instant::now();
        w.add_player(Player::human(PlayerId(1), "alice", t0));
        w.add_player(Player::bot(PlayerId(3), "bot", t0));
        let mut game = Game::new(&w.config);

        game.update_at(&mut w, t0);
        game.update_at(&mut w, t0 + ms(16));

        assert_eq!(drained(&mut w, 1), vec![12, 1]);
        assert_eq!(w.messages.pending(PlayerId(3)), 0);
        let alice = w.players.get(PlayerId(1)).unwrap();
        assert!(alice.flags.contains(PlayerFlags::DEBUG_CLEARED));
    }

    #[test]
    fn ended_round_is_announced_to_everyone() {
        let mut w = world();
        let t0 = Instant::now();
        w.add_player(Player::human(PlayerId(1), "alice", t0));
        w.add_player(Player::human(PlayerId(2), "bob", t0));
        let mut game = Game::new(&w.config).with_rules(EndRound);

        game.update_at(&mut w, t0);

        let expected = vec![5, 8, 0, 0, 0, b'r', b'e', b'd', b' ', b'w', b'i', b'n', b's'];
        assert_eq!(drained(&mut w, 1), expected);
        assert_eq!(drained(&mut w, 2), expected);
    }

    #[test]
    fn respawn_waits_for_death_delay_and_happens_once() {
        let map = CountingMap::default();
        let mut w = world_with(ServerConfig::default(), map.clone());
        let t0 = Instant::now();
        let mut alice = Player::human(PlayerId(1), "alice", t0);
        alice.kill(t0);
        w.add_player(alice);
        let mut game = Game::new(&w.config);

        // Exactly at the delay is still too early.
        game.update_at(&mut w, t0 + ms(3000));
        assert_eq!(w.players.get(PlayerId(1)).unwrap().health, 0);

        let t1 = t0 + ms(3001);
        game.update_at(&mut w, t1);
        let alice = w.players.get(PlayerId(1)).unwrap();
        assert_eq!(alice.health, 100);
        assert_eq!(alice.pos, SPOT);
        assert_eq!(alice.last_valid, SPOT);
        assert_eq!(alice.hack_test, SPOT);
        assert_eq!(alice.spawn_time, Some(t1));

        game.update_at(&mut w, t0 + ms(3100));
        assert_eq!(*map.0.lock().unwrap(), 1);
    }

    #[test]
    fn bots_respawn_with_new_weapon_and_alive() {
        let mut w = world();
        let t0 = Instant::now();
        w.add_player(Player::human(PlayerId(1), "alice", t0));
        let mut bot = Player::bot(PlayerId(2), "bot", t0);
        bot.kill(t0);
        w.add_player(bot);
        let mut game = Game::new(&w.config).with_weapons(Always(Weapon::Shotgun));

        game.update_at(&mut w, t0 + ms(3001));

        let bot = w.players.get(PlayerId(2)).unwrap();
        assert!(!bot.is_dead());
        assert_eq!(bot.weapon, Weapon::Shotgun);
        assert_eq!(bot.health, 100);
    }

    #[test]
    fn zombie_bots_respawn_weak_and_unprotected() {
        let config = ServerConfig {
            game_mode: GameMode::Zombie,
            ..Default::default()
        };
        let mut w = world_with(config, CountingMap::default());
        let t0 = Instant::now();
        let mut bot = Player::bot(PlayerId(2), "zombie", t0);
        bot.kill(t0);
        w.add_player(bot);
        let mut human = Player::human(PlayerId(1), "alice", t0);
        human.kill(t0);
        w.add_player(human);
        let mut game = Game::new(&w.config);

        let t1 = t0 + ms(3001);
        game.update_at(&mut w, t1);

        let bot = w.players.get(PlayerId(2)).unwrap();
        assert_eq!(bot.health, ZOMBIE_BOT_HEALTH);
        assert_eq!(bot.spawn_time, None);
        let human = w.players.get(PlayerId(1)).unwrap();
        assert_eq!(human.health, 100);
        assert_eq!(human.spawn_time, Some(t1));
    }

    #[test]
    fn inactive_player_times_out_exactly_once() {
        let log = Log::default();
        let mut w = world();
        let t0 = Instant::now();
        let mut alice = Player::human(PlayerId(1), "alice", t0);
        alice.flags.insert(PlayerFlags::ADMIN);
        w.add_player(alice);
        w.add_player(Player::human(PlayerId(2), "bob", t0 + ms(10_000)));
        w.add_player(Player::bot(PlayerId(3), "bot", t0));
        let mut game = Game::new(&w.config).with_registration(RecordingRegistration(log.clone()));

        game.update_at(&mut w, t0 + ms(15_000));
        assert_eq!(w.state.player_count, 2);

        game.update_at(&mut w, t0 + ms(15_001));
        game.update_at(&mut w, t0 + ms(15_100));

        assert_eq!(w.state.player_count, 1);
        assert_eq!(log.entries(), vec!["count 1"]);
        let alice = w.players.get(PlayerId(1)).unwrap();
        assert!(!alice.flags.intersects(
            PlayerFlags::ACTIVE | PlayerFlags::LOGGED_IN | PlayerFlags::ADMIN
        ));
        assert!(w.players.get(PlayerId(3)).unwrap().is_active());

        assert_eq!(drained(&mut w, 2), vec![2, 1]);
        assert_eq!(w.messages.pending(PlayerId(1)), 0);
    }

    #[test]
    fn uncounted_slot_times_out_without_touching_player_count() {
        let log = Log::default();
        let mut w = world();
        let t0 = Instant::now();
        w.add_player(Player::human(PlayerId(1), "alice", t0 + ms(10_000)));
        let mut lingering = Player::new(PlayerId(2), "lingering", t0);
        lingering.flags = PlayerFlags::LOGGED_IN;
        w.add_player(lingering);
        assert_eq!(w.state.player_count, 1);
        let mut game = Game::new(&w.config).with_registration(RecordingRegistration(log.clone()));

        game.update_at(&mut w, t0 + ms(15_001));

        assert_eq!(w.state.player_count, 1);
        assert!(log.entries().is_empty());
        assert!(!w.players.get(PlayerId(2)).unwrap().is_logged_in());
        assert_eq!(drained(&mut w, 1), vec![2, 2]);
    }

    #[test]
    fn bullet_step_failures_are_isolated() {
        let log = Log::default();
        let mut w = world();
        for _ in 0..3 {
            w.bullets
                .spawn(PlayerId(1), Weapon::Pistol, Vec2::ZERO, 0.0, 100.0, 1.0);
        }
        let mut game = Game::new(&w.config).with_bullet_stepper(FlakyBullets(log.clone()));

        game.update_at(&mut w, Instant::now());

        assert_eq!(log.entries(), vec!["bullet 1", "bullet 2", "bullet 3"]);
        assert_eq!(w.bullets.ids(), vec![2]);
    }

    #[test]
    fn default_bullets_fly_with_frame_time() {
        let mut w = world();
        let id = w
            .bullets
            .spawn(PlayerId(1), Weapon::Pistol, Vec2::ZERO, 90.0, 100.0, 10.0);
        let mut game = Game::new(&w.config);
        let t0 = Instant::now();

        game.update_at(&mut w, t0);
        assert_eq!(w.bullets.get(id).unwrap().pos, Vec2::ZERO);

        game.update_at(&mut w, t0 + ms(500));
        let b = w.bullets.get(id).unwrap();
        assert!(b.pos.x.abs() < 1e-3);
        assert!((b.pos.y - 50.0).abs() < 1e-3);
    }
}
