//! Engine dependencies (using traits for testability)
//!
//! This module provides the dependency container shared by the coordinator
//! and the join simulator. All external services use trait abstractions.

use std::sync::Arc;

use crate::domains::conversations::ConversationCatalog;
use crate::kernel::{BaseBotDirectory, BaseMessageSink, BasePresenceStore, BaseRandomizer};

/// Engine dependencies accessible to every domain (using traits for testability)
#[derive(Clone)]
pub struct EngineDeps {
    /// Scripted conversations. Read-only.
    pub catalog: Arc<ConversationCatalog>,
    pub bot_directory: Arc<dyn BaseBotDirectory>,
    /// Where bot messages are delivered.
    pub message_sink: Arc<dyn BaseMessageSink>,
    /// Shared with real occupants; bots are tagged `is_bot`.
    pub presence_store: Arc<dyn BasePresenceStore>,
    pub randomizer: Arc<dyn BaseRandomizer>,
}

impl EngineDeps {
    pub fn new(
        catalog: Arc<ConversationCatalog>,
        bot_directory: Arc<dyn BaseBotDirectory>,
        message_sink: Arc<dyn BaseMessageSink>,
        presence_store: Arc<dyn BasePresenceStore>,
        randomizer: Arc<dyn BaseRandomizer>,
    ) -> Self {
        Self {
            catalog,
            bot_directory,
            message_sink,
            presence_store,
            randomizer,
        }
    }
}
