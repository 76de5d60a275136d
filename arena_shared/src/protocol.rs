//! Protocol vocabulary shared by the server and the wire encoder.
//!
//! Message-kind codes, weapon codes and game modes are part of the wire
//! contract with existing clients and must not be renumbered.
//!
//! Two shapes of outbound message exist:
//! - [`OutboundEvent`]: typed, produced by game logic.
//! - [`RawMessage`]: loosely typed, produced by untyped sources (admin tools,
//!   scripted announcements). Validated into an [`OutboundEvent`] at drain
//!   time.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::math::Vec2;

/// Identifies a player slot. Also the recipient id of a connected session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct PlayerId(pub u8);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outbound message kinds and their wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    Login = 1,
    Logout = 2,
    NewBullet = 3,
    TextMessage = 4,
    ServerMessage = 5,
    BulletHit = 6,
    Item = 7,
    KillMessage = 8,
    Kicked = 9,
    TeamInfo = 10,
    SpeedHack = 11,
    DebugDrawing = 12,
}

impl MsgType {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MsgType {
    type Error = ProtocolError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => MsgType::Login,
            2 => MsgType::Logout,
            3 => MsgType::NewBullet,
            4 => MsgType::TextMessage,
            5 => MsgType::ServerMessage,
            6 => MsgType::BulletHit,
            7 => MsgType::Item,
            8 => MsgType::KillMessage,
            9 => MsgType::Kicked,
            10 => MsgType::TeamInfo,
            11 => MsgType::SpeedHack,
            12 => MsgType::DebugDrawing,
            other => return Err(ProtocolError::UnknownMessageType(other)),
        })
    }
}

/// Draw command code telling a client to wipe its debug overlay.
pub const DRAW_CLEAR: u8 = 1;

/// Weapon codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Weapon {
    Pistol = 1,
    Machinegun = 2,
    Bazooka = 3,
    Shotgun = 4,
    Launcher = 5,
    Chainsaw = 6,
}

impl Weapon {
    pub const ALL: [Weapon; 6] = [
        Weapon::Pistol,
        Weapon::Machinegun,
        Weapon::Bazooka,
        Weapon::Shotgun,
        Weapon::Launcher,
        Weapon::Chainsaw,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Melee weapons have no projectile, so their bullets carry no angle.
    pub const fn is_melee(self) -> bool {
        matches!(self, Weapon::Chainsaw)
    }
}

impl TryFrom<u8> for Weapon {
    type Error = u8;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Weapon::ALL.into_iter().find(|w| w.code() == code).ok_or(code)
    }
}

/// Game modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum GameMode {
    #[default]
    Deathmatch = 1,
    TeamDeathmatch = 2,
    /// Humans against weak, endlessly respawning bots.
    Zombie = 3,
}

impl GameMode {
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// Which hand fired a dual-wielded shot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Hand {
    #[default]
    Left,
    Right,
}

/// A newly fired bullet.
///
/// `pos` is only sent for melee weapons; for everything else the encoder reads
/// the live bullet's position and angle at drain time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBullet {
    pub bullet: u16,
    pub shooter: PlayerId,
    pub weapon: u8,
    pub play_sound: bool,
    pub hand: Hand,
    pub pos: Vec2,
}

/// Typed outbound event, one variant per wire message kind.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    Login {
        player: PlayerId,
        text: String,
        /// Slot the new player took over, `PlayerId(0)` for none.
        replaced: PlayerId,
    },
    Logout {
        player: PlayerId,
    },
    NewBullet(NewBullet),
    TextMessage {
        player: PlayerId,
        text: String,
    },
    ServerMessage {
        text: String,
    },
    BulletHit {
        bullet: u16,
        target: PlayerId,
        pos: Vec2,
        weapon: u8,
    },
    Item {
        item: u8,
        kind: u8,
        pos: Vec2,
    },
    KillMessage {
        killer: PlayerId,
        victim: PlayerId,
        weapon: u8,
    },
    Kicked {
        kicker: PlayerId,
        kicked: PlayerId,
        reason: String,
    },
    TeamInfo {
        player: PlayerId,
    },
    SpeedHack,
    ClearDebugDrawing,
}

impl OutboundEvent {
    pub fn msg_type(&self) -> MsgType {
        match self {
            OutboundEvent::Login { .. } => MsgType::Login,
            OutboundEvent::Logout { .. } => MsgType::Logout,
            OutboundEvent::NewBullet(_) => MsgType::NewBullet,
            OutboundEvent::TextMessage { .. } => MsgType::TextMessage,
            OutboundEvent::ServerMessage { .. } => MsgType::ServerMessage,
            OutboundEvent::BulletHit { .. } => MsgType::BulletHit,
            OutboundEvent::Item { .. } => MsgType::Item,
            OutboundEvent::KillMessage { .. } => MsgType::KillMessage,
            OutboundEvent::Kicked { .. } => MsgType::Kicked,
            OutboundEvent::TeamInfo { .. } => MsgType::TeamInfo,
            OutboundEvent::SpeedHack => MsgType::SpeedHack,
            OutboundEvent::ClearDebugDrawing => MsgType::DebugDrawing,
        }
    }

    pub fn server_message(text: impl Into<String>) -> Self {
        OutboundEvent::ServerMessage { text: text.into() }
    }
}

/// Loosely typed outbound message.
///
/// Every field is optional. Only the message type is required; absent payload
/// fields are sent as zero or the empty string.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawMessage {
    pub msg_type: Option<u8>,
    pub player_id: Option<u8>,
    pub player_id2: Option<u8>,
    pub msg_text: Option<String>,
    pub bullet_id: Option<u16>,
    pub item_id: Option<u8>,
    pub item_type: Option<u8>,
    pub weapon: Option<u8>,
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub snd_play: Option<bool>,
    pub hand_shooted: Option<bool>,
}

impl RawMessage {
    /// Parses a raw message from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    fn player(&self) -> PlayerId {
        PlayerId(self.player_id.unwrap_or(0))
    }

    fn player2(&self) -> PlayerId {
        PlayerId(self.player_id2.unwrap_or(0))
    }

    fn text(&self) -> String {
        self.msg_text.clone().unwrap_or_default()
    }

    fn pos(&self) -> Vec2 {
        Vec2::new(self.x.unwrap_or(0.0), self.y.unwrap_or(0.0))
    }
}

impl TryFrom<&RawMessage> for OutboundEvent {
    type Error = ProtocolError;

    fn try_from(raw: &RawMessage) -> Result<Self, Self::Error> {
        let code = raw.msg_type.ok_or(ProtocolError::MissingMessageType)?;
        let weapon = raw.weapon.unwrap_or(0);
        Ok(match MsgType::try_from(code)? {
            MsgType::Login => OutboundEvent::Login {
                player: raw.player(),
                text: raw.text(),
                replaced: raw.player2(),
            },
            MsgType::Logout => OutboundEvent::Logout {
                player: raw.player(),
            },
            MsgType::NewBullet => OutboundEvent::NewBullet(NewBullet {
                bullet: raw.bullet_id.unwrap_or(0),
                shooter: raw.player(),
                weapon,
                play_sound: raw.snd_play.unwrap_or(false),
                hand: if raw.hand_shooted.unwrap_or(false) {
                    Hand::Right
                } else {
                    Hand::Left
                },
                pos: raw.pos(),
            }),
            MsgType::TextMessage => OutboundEvent::TextMessage {
                player: raw.player(),
                text: raw.text(),
            },
            MsgType::ServerMessage => OutboundEvent::ServerMessage { text: raw.text() },
            MsgType::BulletHit => OutboundEvent::BulletHit {
                bullet: raw.bullet_id.unwrap_or(0),
                target: raw.player(),
                pos: raw.pos(),
                weapon,
            },
            MsgType::Item => OutboundEvent::Item {
                item: raw.item_id.unwrap_or(0),
                kind: raw.item_type.unwrap_or(0),
                pos: raw.pos(),
            },
            MsgType::KillMessage => OutboundEvent::KillMessage {
                killer: raw.player(),
                victim: raw.player2(),
                weapon,
            },
            MsgType::Kicked => OutboundEvent::Kicked {
                kicker: raw.player(),
                kicked: raw.player2(),
                reason: raw.text(),
            },
            MsgType::TeamInfo => OutboundEvent::TeamInfo {
                player: raw.player(),
            },
            MsgType::SpeedHack => OutboundEvent::SpeedHack,
            MsgType::DebugDrawing => OutboundEvent::ClearDebugDrawing,
        })
    }
}

/// Error type for outbound message validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The message carries no message type at all.
    MissingMessageType,
    /// The message type code is not one the client understands.
    UnknownMessageType(u8),
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::MissingMessageType => write!(f, "message has no message type"),
            ProtocolError::UnknownMessageType(code) => write!(f, "unknown message type {}", code),
        }
    }
}

impl std::error::Error for ProtocolError {}
