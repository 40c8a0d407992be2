//! Bot presence records.
//!
//! The only writer of bot-tagged entries in the presence store. Writes are
//! best-effort: a failure is logged and the bot may look stuck, but the
//! scheduler carries on. Each write is bounded so a stalled store can't hold
//! the room lock indefinitely.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tracing::{debug, warn};

use crate::common::{BotId, RoomId};
use crate::domains::conversations::BotProfile;
use crate::kernel::{BasePresenceStore, PresenceFields};

#[derive(Clone)]
pub struct PresenceSimulator {
    store: Arc<dyn BasePresenceStore>,
    timeout: Duration,
}

impl PresenceSimulator {
    pub fn new(store: Arc<dyn BasePresenceStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Mark a bot as present. Upsert, so repeating it is harmless.
    pub async fn register_bot_presence(&self, room: &RoomId, bot: &BotProfile) {
        let fields = PresenceFields {
            username: bot.username.clone(),
            avatar: bot.avatar.clone(),
            is_bot: true,
        };
        match self
            .bounded(self.store.upsert(room, bot.id.as_str(), fields))
            .await
        {
            Ok(()) => debug!(room_id = %room, bot_id = %bot.id, "bot presence registered"),
            Err(e) => warn!(
                room_id = %room,
                bot_id = %bot.id,
                error = %e,
                "failed to register bot presence"
            ),
        }
    }

    /// Remove a bot's presence record. No-op if it's already gone.
    pub async fn remove_bot_presence(&self, room: &RoomId, bot_id: &BotId) {
        match self.bounded(self.store.remove(room, bot_id.as_str())).await {
            Ok(()) => debug!(room_id = %room, bot_id = %bot_id, "bot presence removed"),
            Err(e) => warn!(
                room_id = %room,
                bot_id = %bot_id,
                error = %e,
                "failed to remove bot presence"
            ),
        }
    }

    async fn bounded(&self, write: impl Future<Output = Result<()>>) -> Result<()> {
        tokio::time::timeout(self.timeout, write)
            .await
            .unwrap_or_else(|_| {
                Err(anyhow!(
                    "presence store timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use futures::stream::BoxStream;

    use crate::kernel::{InMemoryPresenceStore, Occupant};

    struct BrokenStore;

    #[async_trait]
    impl BasePresenceStore for BrokenStore {
        async fn upsert(&self, _: &RoomId, _: &str, _: PresenceFields) -> Result<()> {
            anyhow::bail!("presence backend down")
        }

        async fn remove(&self, _: &RoomId, _: &str) -> Result<()> {
            anyhow::bail!("presence backend down")
        }

        async fn subscribe(&self, _: &RoomId) -> Result<BoxStream<'static, Vec<Occupant>>> {
            anyhow::bail!("presence backend down")
        }
    }

    #[tokio::test]
    async fn test_register_is_idempotent_and_tagged() {
        let store = Arc::new(InMemoryPresenceStore::new());
        let simulator = PresenceSimulator::new(store.clone(), Duration::from_secs(1));
        let room = RoomId::new("lobby");
        let bot = BotProfile::generated("maya");

        simulator.register_bot_presence(&room, &bot).await;
        simulator.register_bot_presence(&room, &bot).await;

        let records = store.records(&room);
        assert_eq!(records.len(), 1);
        assert!(records[0].1.is_bot);
        assert_eq!(store.real_user_count(&room), 0);
    }

    #[tokio::test]
    async fn test_remove_missing_bot_is_noop() {
        let store = Arc::new(InMemoryPresenceStore::new());
        let simulator = PresenceSimulator::new(store.clone(), Duration::from_secs(1));
        let room = RoomId::new("lobby");

        simulator
            .remove_bot_presence(&room, &BotId::new("bot-ghost"))
            .await;
        assert!(store.records(&room).is_empty());
    }

    struct StalledStore;

    #[async_trait]
    impl BasePresenceStore for StalledStore {
        async fn upsert(&self, _: &RoomId, _: &str, _: PresenceFields) -> Result<()> {
            std::future::pending().await
        }

        async fn remove(&self, _: &RoomId, _: &str) -> Result<()> {
            std::future::pending().await
        }

        async fn subscribe(&self, _: &RoomId) -> Result<BoxStream<'static, Vec<Occupant>>> {
            std::future::pending().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_store_is_abandoned_after_timeout() {
        let simulator = PresenceSimulator::new(Arc::new(StalledStore), Duration::from_secs(2));
        let room = RoomId::new("lobby");
        let bot = BotProfile::generated("maya");

        let started = tokio::time::Instant::now();
        simulator.register_bot_presence(&room, &bot).await;
        simulator.remove_bot_presence(&room, &bot.id).await;
        assert_eq!(started.elapsed(), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_store_failures_do_not_propagate() {
        let simulator = PresenceSimulator::new(Arc::new(BrokenStore), Duration::from_secs(1));
        let room = RoomId::new("lobby");
        let bot = BotProfile::generated("maya");

        // Both calls log and return
        simulator.register_bot_presence(&room, &bot).await;
        simulator.remove_bot_presence(&room, &bot.id).await;
    }
}
