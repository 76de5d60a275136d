//! Outbound wire encoding.
//!
//! Every message is built from three primitives:
//! - byte: one unsigned byte
//! - short: two bytes, little-endian (ids unsigned, coordinates signed)
//! - string: `u32` little-endian length, then one byte per character
//!
//! Layouts are fixed by the client and must stay bit-exact.

use std::collections::BTreeMap;

use bytes::BufMut;

use crate::{
    math::Vec2,
    protocol::{Hand, NewBullet, OutboundEvent, Weapon, DRAW_CLEAR},
};

/// Low nibble of the bullet flags byte holds the weapon code.
pub const WEAPON_MASK: u8 = 0x0F;

bitflags::bitflags! {
    /// Flag bits sharing a byte with the weapon code in bullet messages.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BulletFlags: u8 {
        const PLAY_SOUND = 1 << 4;
        const RIGHT_HAND = 1 << 5;
    }
}

/// Packs weapon code, sound flag and (non-melee only) hand into one byte.
pub fn pack_bullet_flags(weapon: u8, play_sound: bool, hand: Option<Hand>) -> u8 {
    let mut flags = BulletFlags::empty();
    flags.set(BulletFlags::PLAY_SOUND, play_sound);
    flags.set(BulletFlags::RIGHT_HAND, hand == Some(Hand::Right));
    (weapon & WEAPON_MASK) | flags.bits()
}

/// Converts a world coordinate to its wire form: truncated toward zero and
/// saturated to the `i16` range.
pub fn to_short(v: f32) -> i16 {
    v as i16
}

/// Protocol primitives on top of any `BufMut`.
pub trait NetBufMut: BufMut {
    fn put_net_byte(&mut self, v: u8) {
        self.put_u8(v);
    }

    fn put_net_short(&mut self, v: i16) {
        self.put_i16_le(v);
    }

    fn put_net_id(&mut self, v: u16) {
        self.put_u16_le(v);
    }

    /// Characters outside the single-byte range are sent as `?`.
    fn put_net_string(&mut self, s: &str) {
        let count = s.chars().count();
        self.put_u32_le(count as u32);
        for c in s.chars() {
            let b = u8::try_from(u32::from(c)).unwrap_or(b'?');
            self.put_u8(b);
        }
    }
}

impl<B: BufMut + ?Sized> NetBufMut for B {}

/// Live position and heading of a bullet.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BulletPose {
    pub pos: Vec2,
    pub angle: f32,
}

/// Read access to live bullets, needed to encode non-melee shots.
pub trait BulletLookup {
    fn bullet_pose(&self, id: u16) -> Option<BulletPose>;
}

/// Lookup with no bullets in it.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoBullets;

impl BulletLookup for NoBullets {
    fn bullet_pose(&self, _id: u16) -> Option<BulletPose> {
        None
    }
}

impl BulletLookup for BTreeMap<u16, BulletPose> {
    fn bullet_pose(&self, id: u16) -> Option<BulletPose> {
        self.get(&id).copied()
    }
}

/// Result of encoding one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoded {
    /// This many bytes were appended.
    Written(usize),
    /// The event referenced state that no longer exists; nothing was written.
    Skipped,
}

/// Appends the wire form of `event` to `out`.
pub fn encode<B, L>(event: &OutboundEvent, bullets: &L, out: &mut B) -> Encoded
where
    B: BufMut + ?Sized,
    L: BulletLookup + ?Sized,
{
    let start = out.remaining_mut();
    let ty = event.msg_type().code();

    match event {
        OutboundEvent::Login {
            player,
            text,
            replaced,
        } => {
            out.put_net_byte(ty);
            out.put_net_byte(player.0);
            out.put_net_string(text);
            out.put_net_byte(replaced.0);
        }
        OutboundEvent::Logout { player } => {
            out.put_net_byte(ty);
            out.put_net_byte(player.0);
        }
        OutboundEvent::NewBullet(nb) => {
            if !encode_new_bullet(ty, nb, bullets, out) {
                return Encoded::Skipped;
            }
        }
        OutboundEvent::TextMessage { player, text } => {
            out.put_net_byte(ty);
            out.put_net_byte(player.0);
            out.put_net_string(text);
        }
        OutboundEvent::ServerMessage { text } => {
            out.put_net_byte(ty);
            out.put_net_string(text);
        }
        OutboundEvent::BulletHit {
            bullet,
            target,
            pos,
            weapon,
        } => {
            out.put_net_byte(ty);
            out.put_net_id(*bullet);
            out.put_net_byte(target.0);
            out.put_net_short(to_short(pos.x));
            out.put_net_short(to_short(pos.y));
            out.put_net_byte(*weapon);
        }
        OutboundEvent::Item { item, kind, pos } => {
            out.put_net_byte(ty);
            out.put_net_byte(*item);
            out.put_net_byte(*kind);
            out.put_net_short(to_short(pos.x));
            out.put_net_short(to_short(pos.y));
        }
        OutboundEvent::KillMessage {
            killer,
            victim,
            weapon,
        } => {
            out.put_net_byte(ty);
            out.put_net_byte(killer.0);
            out.put_net_byte(victim.0);
            out.put_net_byte(*weapon);
            // Kill/death tallies for killer and victim; not tracked yet.
            for _ in 0..4 {
                out.put_net_short(0);
            }
        }
        OutboundEvent::Kicked {
            kicker,
            kicked,
            reason,
        } => {
            out.put_net_byte(ty);
            out.put_net_byte(kicker.0);
            out.put_net_byte(kicked.0);
            out.put_net_string(reason);
        }
        OutboundEvent::TeamInfo { player } => {
            out.put_net_byte(ty);
            out.put_net_byte(player.0);
            // TODO: add the player's team to the event and send it here.
            out.put_net_byte(1);
        }
        OutboundEvent::SpeedHack => {
            out.put_net_byte(ty);
        }
        OutboundEvent::ClearDebugDrawing => {
            out.put_net_byte(ty);
            out.put_net_byte(DRAW_CLEAR);
        }
    }

    Encoded::Written(start - out.remaining_mut())
}

fn encode_new_bullet<B, L>(ty: u8, nb: &NewBullet, bullets: &L, out: &mut B) -> bool
where
    B: BufMut + ?Sized,
    L: BulletLookup + ?Sized,
{
    if nb.weapon == Weapon::Chainsaw.code() {
        out.put_net_byte(ty);
        out.put_net_id(nb.bullet);
        out.put_net_byte(nb.shooter.0);
        out.put_net_byte(pack_bullet_flags(nb.weapon, nb.play_sound, None));
        out.put_net_short(to_short(nb.pos.x));
        out.put_net_short(to_short(nb.pos.y));
        out.put_net_short(0);
        return true;
    }

    let Some(pose) = bullets.bullet_pose(nb.bullet) else {
        return false;
    };
    out.put_net_byte(ty);
    out.put_net_id(nb.bullet);
    out.put_net_byte(nb.shooter.0);
    out.put_net_byte(pack_bullet_flags(nb.weapon, nb.play_sound, Some(nb.hand)));
    out.put_net_short(to_short(pose.pos.x));
    out.put_net_short(to_short(pose.pos.y));
    out.put_net_short(to_short(pose.angle));
    true
}
