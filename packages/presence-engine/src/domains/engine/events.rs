//! Engine events.
//!
//! Immutable facts about what an engine did, broadcast to anyone who
//! subscribes. Delivery is fire-and-forget: slow receivers lag, and nobody
//! listening is fine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::common::RoomId;

/// Why an engine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// `stop()` was called.
    Requested,
    /// Enough real users are present.
    AutoDeactivated,
    /// A conversation could not be launched.
    LaunchFailed,
    /// The coordinator is shutting down.
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Started {
        room: RoomId,
        at: DateTime<Utc>,
    },
    Paused {
        room: RoomId,
        at: DateTime<Utc>,
    },
    Resumed {
        room: RoomId,
        at: DateTime<Utc>,
    },
    Stopped {
        room: RoomId,
        reason: StopReason,
        at: DateTime<Utc>,
    },
    ConversationStarted {
        room: RoomId,
        conversation_id: String,
        participants: Vec<String>,
        at: DateTime<Utc>,
    },
    MessageDelivered {
        room: RoomId,
        conversation_id: String,
        index: usize,
        username: String,
        at: DateTime<Utc>,
    },
    /// The sink rejected a message. The run carries on with the next line.
    MessageFailed {
        room: RoomId,
        conversation_id: String,
        index: usize,
        error: String,
        at: DateTime<Utc>,
    },
    ConversationFinished {
        room: RoomId,
        conversation_id: String,
        conversations_played: u64,
        at: DateTime<Utc>,
    },
    /// A launch was due but the room is at its concurrency cap.
    LaunchSkipped {
        room: RoomId,
        active_runs: usize,
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn room(&self) -> &RoomId {
        match self {
            EngineEvent::Started { room, .. }
            | EngineEvent::Paused { room, .. }
            | EngineEvent::Resumed { room, .. }
            | EngineEvent::Stopped { room, .. }
            | EngineEvent::ConversationStarted { room, .. }
            | EngineEvent::MessageDelivered { room, .. }
            | EngineEvent::MessageFailed { room, .. }
            | EngineEvent::ConversationFinished { room, .. }
            | EngineEvent::LaunchSkipped { room, .. } => room,
        }
    }
}
