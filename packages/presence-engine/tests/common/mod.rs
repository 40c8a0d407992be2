//! Shared helpers for engine integration tests.
//!
//! Tests run on tokio's paused clock (`#[tokio::test(start_paused = true)]`):
//! `advance()` sleeps in virtual time, firing every timer due on the way.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::time::Duration;

use presence_engine::common::RoomId;
use presence_engine::domains::engine::EngineEvent;
use presence_engine::kernel::TestDependencies;
use presence_engine::{
    Conversation, ConversationCatalog, EngineConfig, RoomEngineCoordinator, ScriptedMessage,
};
use tokio::sync::broadcast::{self, error::TryRecvError};

/// Initialize tracing once. Run with: RUST_LOG=debug cargo test -- --nocapture
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a conversation from `(speaker, text, delay_ms)` lines.
pub fn conversation(id: &str, participants: &[&str], lines: &[(&str, &str, u64)]) -> Conversation {
    Conversation {
        id: id.to_string(),
        participants: participants.iter().map(|p| p.to_string()).collect(),
        messages: lines
            .iter()
            .map(|(from, text, delay_ms)| ScriptedMessage {
                from: from.to_string(),
                text: text.to_string(),
                delay_ms: *delay_ms,
            })
            .collect(),
    }
}

pub fn catalog(conversations: Vec<Conversation>) -> ConversationCatalog {
    ConversationCatalog::new(conversations).expect("test catalog should be valid")
}

pub async fn advance(duration: Duration) {
    tokio::time::sleep(duration).await;
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// A coordinator wired to test doubles, watching one room.
pub struct Harness {
    pub deps: TestDependencies,
    pub coordinator: RoomEngineCoordinator,
    pub events: broadcast::Receiver<EngineEvent>,
    pub room: RoomId,
}

impl Harness {
    pub fn new(catalog: ConversationCatalog) -> Self {
        Self::with(TestDependencies::new(catalog), EngineConfig::default())
    }

    pub fn with(deps: TestDependencies, config: EngineConfig) -> Self {
        init_tracing();
        let coordinator = RoomEngineCoordinator::new(deps.deps(), config);
        let events = coordinator.subscribe_events();
        Self {
            deps,
            coordinator,
            events,
            room: RoomId::new("lobby"),
        }
    }

    /// Every event emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        events
    }

    /// Usernames of bot presence records currently in the store.
    pub fn bots_in_store(&self) -> BTreeSet<String> {
        self.deps
            .presence_store
            .records(&self.room)
            .into_iter()
            .filter(|(_, fields)| fields.is_bot)
            .map(|(_, fields)| fields.username)
            .collect()
    }

    /// Union of participants over the runs the engine reports as active.
    pub async fn participants_of_active_runs(&self) -> BTreeSet<String> {
        let snapshot = self
            .coordinator
            .snapshot(&self.room)
            .await
            .expect("room should exist");
        snapshot
            .active_runs
            .iter()
            .flat_map(|run| {
                self.deps
                    .catalog
                    .get(&run.conversation_id)
                    .expect("run conversation should be in catalog")
                    .participants
                    .clone()
            })
            .collect()
    }

    pub async fn active_bots(&self) -> BTreeSet<String> {
        self.coordinator
            .snapshot(&self.room)
            .await
            .map(|s| s.active_bots.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn join_real_users(&self, count: usize) {
        for i in 0..count {
            self.deps
                .presence_store
                .join_real_user(&self.room, &format!("user-{i}"), &format!("person{i}"));
        }
    }
}

pub fn count_started(events: &[EngineEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, EngineEvent::ConversationStarted { .. }))
        .count()
}
