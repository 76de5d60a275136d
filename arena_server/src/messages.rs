//! Per-recipient outbound message queues.
//!
//! Each connected session has a FIFO of pending messages. Game logic appends
//! to it during a tick; the transport drains it into a byte buffer between
//! ticks. Insertion order is delivery order. There is no ordering between
//! different recipients.

use std::collections::{HashMap, VecDeque};

use arena_shared::{
    protocol::{OutboundEvent, PlayerId, RawMessage},
    wire::{self, BulletLookup, Encoded},
};
use bytes::BufMut;
use tracing::{debug, error};

use crate::world::Players;

/// One queued message.
#[derive(Debug, Clone, PartialEq)]
pub enum Pending {
    Event(OutboundEvent),
    /// Not yet validated; checked when drained.
    Raw(RawMessage),
}

impl From<OutboundEvent> for Pending {
    fn from(e: OutboundEvent) -> Self {
        Pending::Event(e)
    }
}

impl From<RawMessage> for Pending {
    fn from(m: RawMessage) -> Self {
        Pending::Raw(m)
    }
}

/// Counters for one drain pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrainStats {
    /// Messages written to the buffer.
    pub encoded: usize,
    /// Messages dropped because what they refer to is gone.
    pub skipped: usize,
    /// Malformed messages dropped.
    pub discarded: usize,
    pub bytes: usize,
}

/// Result of [`MessageQueue::drain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drained {
    /// The recipient had nothing queued; the buffer was not touched.
    Nothing,
    Sent(DrainStats),
}

/// Outbound queues keyed by recipient.
#[derive(Debug, Default)]
pub struct MessageQueue {
    pending: HashMap<PlayerId, VecDeque<Pending>>,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `msg` to the queue of `to`.
    pub fn add(&mut self, to: PlayerId, msg: impl Into<Pending>) {
        self.pending.entry(to).or_default().push_back(msg.into());
    }

    /// Appends `msg` for every active human except `except`.
    pub fn add_to_all(
        &mut self,
        players: &Players,
        msg: impl Into<Pending>,
        except: Option<PlayerId>,
    ) {
        let msg = msg.into();
        for p in players.iter() {
            if p.receives_messages() && Some(p.id) != except {
                self.add(p.id, msg.clone());
            }
        }
    }

    /// Appends `msg` for every active human on `team`.
    pub fn add_to_team(&mut self, players: &Players, team: u8, msg: impl Into<Pending>) {
        let msg = msg.into();
        for p in players.iter() {
            if p.receives_messages() && p.team == team {
                self.add(p.id, msg.clone());
            }
        }
    }

    /// Encodes and removes everything queued for `to`, oldest first.
    ///
    /// Malformed messages are logged and dropped; they never stall the queue.
    pub fn drain<B, L>(&mut self, to: PlayerId, bullets: &L, out: &mut B) -> Drained
    where
        B: BufMut + ?Sized,
        L: BulletLookup + ?Sized,
    {
        let Some(queue) = self.pending.get_mut(&to).filter(|q| !q.is_empty()) else {
            return Drained::Nothing;
        };

        let mut stats = DrainStats::default();
        while let Some(entry) = queue.pop_front() {
            let event = match entry {
                Pending::Event(event) => event,
                Pending::Raw(raw) => match OutboundEvent::try_from(&raw) {
                    Ok(event) => event,
                    Err(e) => {
                        error!(recipient = %to, error = %e, ?raw, "discarding malformed message");
                        stats.discarded += 1;
                        continue;
                    }
                },
            };

            match wire::encode(&event, bullets, out) {
                Encoded::Written(n) => {
                    stats.encoded += 1;
                    stats.bytes += n;
                }
                Encoded::Skipped => {
                    debug!(
                        recipient = %to,
                        kind = ?event.msg_type(),
                        "referenced entity gone, skipped"
                    );
                    stats.skipped += 1;
                }
            }
        }
        Drained::Sent(stats)
    }

    /// Number of messages waiting for `to`.
    pub fn pending(&self, to: PlayerId) -> usize {
        self.pending.get(&to).map_or(0, VecDeque::len)
    }

    /// Drops the backlog of a departed session. Returns how many were dropped.
    pub fn clear(&mut self, to: PlayerId) -> usize {
        self.pending.remove(&to).map_or(0, |q| q.len())
    }

    /// Recipients with at least one pending message.
    pub fn recipients(&self) -> impl Iterator<Item = PlayerId> + '_ {
        self.pending
            .iter()
            .filter(|(_, q)| !q.is_empty())
            .map(|(id, _)| *id)
    }
}
