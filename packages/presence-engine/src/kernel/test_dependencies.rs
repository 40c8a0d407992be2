// TestDependencies - mock implementations for testing
//
// Provides mock services that can be injected into EngineDeps for tests.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use super::{
    BaseMessageSink, BaseRandomizer, EngineDeps, InMemoryPresenceStore, OutboundMessage,
    StaticBotDirectory,
};
use crate::common::RoomId;
use crate::domains::conversations::ConversationCatalog;

// =============================================================================
// Recording Message Sink
// =============================================================================

/// A message captured by [`RecordingMessageSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub room: RoomId,
    pub message: OutboundMessage,
}

/// Sink that records every send attempt and can be told to fail some of them.
#[derive(Default)]
pub struct RecordingMessageSink {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    failing_contents: Mutex<HashSet<String>>,
    latency: Option<Duration>,
}

impl RecordingMessageSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make sends with this exact content return an error (still recorded).
    pub fn failing_on(self, content: &str) -> Self {
        self.failing_contents
            .lock()
            .unwrap()
            .insert(content.to_string());
        self
    }

    /// Make every send take this long. An attempt is only recorded once the
    /// delay has elapsed, so a send abandoned mid-way leaves no record.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Get all send attempts in call order
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Get the content of every send attempt in call order
    pub fn contents(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.message.content.clone())
            .collect()
    }

    pub fn send_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl BaseMessageSink for RecordingMessageSink {
    async fn send(&self, room: &RoomId, message: OutboundMessage) -> Result<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        let fail = self
            .failing_contents
            .lock()
            .unwrap()
            .contains(&message.content);
        self.sent.lock().unwrap().push(SentMessage {
            room: room.clone(),
            message,
        });
        if fail {
            anyhow::bail!("sink rejected message");
        }
        Ok(())
    }
}

// =============================================================================
// Scripted Randomizer
// =============================================================================

/// Deterministic randomizer.
///
/// Picks and durations are served from queues; once a queue runs dry, picks
/// return 0 and durations return the low end of the requested range.
#[derive(Default)]
pub struct ScriptedRandomizer {
    indices: Mutex<VecDeque<usize>>,
    durations: Mutex<VecDeque<Duration>>,
}

impl ScriptedRandomizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_indices(self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.indices.lock().unwrap().extend(indices);
        self
    }

    pub fn with_durations(self, durations: impl IntoIterator<Item = Duration>) -> Self {
        self.durations.lock().unwrap().extend(durations);
        self
    }
}

impl BaseRandomizer for ScriptedRandomizer {
    fn pick_index(&self, len: usize) -> usize {
        let next = self.indices.lock().unwrap().pop_front().unwrap_or(0);
        next % len
    }

    fn duration_between(&self, min: Duration, max: Duration) -> Duration {
        self.durations
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(min)
            .clamp(min, max.max(min))
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// Bundle of test doubles with handles kept for assertions.
pub struct TestDependencies {
    pub catalog: Arc<ConversationCatalog>,
    pub bot_directory: Arc<StaticBotDirectory>,
    pub message_sink: Arc<RecordingMessageSink>,
    pub presence_store: Arc<InMemoryPresenceStore>,
    pub randomizer: Arc<ScriptedRandomizer>,
}

impl TestDependencies {
    /// Doubles for `catalog`, with a directory entry for every participant.
    pub fn new(catalog: ConversationCatalog) -> Self {
        let bot_directory = StaticBotDirectory::from_usernames(catalog.participants());
        Self {
            catalog: Arc::new(catalog),
            bot_directory: Arc::new(bot_directory),
            message_sink: Arc::new(RecordingMessageSink::new()),
            presence_store: Arc::new(InMemoryPresenceStore::new()),
            randomizer: Arc::new(ScriptedRandomizer::new()),
        }
    }

    pub fn with_message_sink(mut self, sink: RecordingMessageSink) -> Self {
        self.message_sink = Arc::new(sink);
        self
    }

    pub fn with_randomizer(mut self, randomizer: ScriptedRandomizer) -> Self {
        self.randomizer = Arc::new(randomizer);
        self
    }

    pub fn with_bot_directory(mut self, directory: StaticBotDirectory) -> Self {
        self.bot_directory = Arc::new(directory);
        self
    }

    pub fn deps(&self) -> EngineDeps {
        EngineDeps::new(
            self.catalog.clone(),
            self.bot_directory.clone(),
            self.message_sink.clone(),
            self.presence_store.clone(),
            self.randomizer.clone(),
        )
    }
}
