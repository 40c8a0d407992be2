//! Kernel module - engine infrastructure and dependencies.

pub mod deps;
pub mod memory;
pub mod random;
pub mod test_dependencies;
pub mod traits;

pub use deps::EngineDeps;
pub use memory::{InMemoryPresenceStore, LoggingMessageSink, StaticBotDirectory};
pub use random::FastRandomizer;
pub use test_dependencies::{RecordingMessageSink, ScriptedRandomizer, SentMessage, TestDependencies};
pub use traits::*;
