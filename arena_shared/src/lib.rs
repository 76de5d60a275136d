//! `arena_shared`
//!
//! Shared libraries used by the arena server and its tests.
//!
//! Design goals:
//! - Wire layouts live in one place (`wire`) and are bit-exact.
//! - Protocol vocabulary (`protocol`) is typed; untyped input is validated late.
//! - No `unsafe`.

pub mod config;
pub mod math;
pub mod protocol;
pub mod wire;

pub mod prelude {
    //! Commonly used exports.

    pub use crate::config::*;
    pub use crate::math::*;
    pub use crate::protocol::*;
    pub use crate::wire::{encode, BulletLookup, BulletPose, Encoded, NetBufMut};
}
