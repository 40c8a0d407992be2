//! Shared types used across domains.

pub mod ids;

pub use ids::{BotId, RoomId, RunId};
