// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - the collaborators the engine talks to.
// Scheduling decisions live in domains/*, never behind these traits.
//
// Naming convention: Base* for trait names (e.g., BaseMessageSink, BasePresenceStore)

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::common::RoomId;
use crate::domains::conversations::BotProfile;

// =============================================================================
// Bot Profile Directory (Infrastructure)
// =============================================================================

pub trait BaseBotDirectory: Send + Sync {
    /// Resolve a bot by username. `None` means the bot doesn't exist.
    fn lookup(&self, username: &str) -> Option<BotProfile>;
}

// =============================================================================
// Outbound Message Sink (Infrastructure)
// =============================================================================

/// Kind of message written to the chat store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
}

/// A message as handed to the chat store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub user_id: String,
    pub username: String,
    pub avatar: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
}

#[async_trait]
pub trait BaseMessageSink: Send + Sync {
    /// Deliver one message into a room.
    ///
    /// Implementations must not call back into the engine: delivery happens
    /// while the room's state is locked.
    async fn send(&self, room: &RoomId, message: OutboundMessage) -> Result<()>;
}

// =============================================================================
// Presence Store (Infrastructure)
// =============================================================================

/// Fields written for one occupant's presence record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceFields {
    pub username: String,
    pub avatar: String,
    /// Synthetic occupants are excluded from real-user counts.
    pub is_bot: bool,
}

/// One entry of a live occupancy snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occupant {
    pub id: String,
    pub is_bot: bool,
}

#[async_trait]
pub trait BasePresenceStore: Send + Sync {
    /// Insert or replace an occupant's presence record.
    async fn upsert(&self, room: &RoomId, user_id: &str, fields: PresenceFields) -> Result<()>;

    /// Delete an occupant's presence record. Removing an absent record is not an error.
    async fn remove(&self, room: &RoomId, user_id: &str) -> Result<()>;

    /// Live feed of the room's full occupant list, one item per change.
    async fn subscribe(&self, room: &RoomId) -> Result<BoxStream<'static, Vec<Occupant>>>;
}

// =============================================================================
// Randomness (Infrastructure)
// =============================================================================

/// Source of every random decision the engine makes, injectable so tests
/// can pin gaps, intervals and picks.
pub trait BaseRandomizer: Send + Sync {
    /// Uniform index in `0..len`. Callers never pass `len == 0`.
    fn pick_index(&self, len: usize) -> usize;

    /// Uniform duration in `min..=max`.
    fn duration_between(&self, min: Duration, max: Duration) -> Duration;
}
