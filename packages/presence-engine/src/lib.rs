// Presence Engine - keeps quiet chat rooms looking lived-in
//
// Plays scripted multi-bot conversations into rooms that have few real
// occupants, keeps the bots' presence records in step with what is playing,
// and stands down once enough real people show up. A separate join simulator
// emits "X just joined" notifications on its own schedule.
//
// Infrastructure (collaborator traits, deps, randomness) lives in kernel/;
// behaviour lives in domains/*.

pub mod common;
pub mod config;
pub mod domains;
pub mod error;
pub mod kernel;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};

pub use domains::conversations::{BotProfile, Conversation, ConversationCatalog, ScriptedMessage};
pub use domains::engine::{
    EngineEvent, EngineStatus, RoomEngineCoordinator, RoomEngineSnapshot, StopReason,
};
pub use domains::join_events::{JoinEventSimulator, JoinIdentity, JoinNotification};
pub use kernel::EngineDeps;
