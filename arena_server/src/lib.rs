//! `arena_server`
//!
//! Server-side systems:
//! - Fixed-rate tick pipeline (`game`)
//! - Player and bullet state (`world`)
//! - Per-recipient outbound queues (`messages`)
//! - Single-task run loop with a control handle (`server`)
//!
//! Map geometry, bot AI, round rules and server listing plug in through the
//! traits in `hooks`.

pub mod game;
pub mod hooks;
pub mod messages;
pub mod server;
pub mod world;

pub use game::{FrameTimer, Game};
pub use messages::{DrainStats, Drained, MessageQueue, Pending};
pub use server::{GameServer, Recipients, ServerHandle};
pub use world::{Bullet, Bullets, GameState, Player, PlayerFlags, Players, World};
