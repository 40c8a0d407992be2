//! In-process collaborators.
//!
//! Used by the demo runner and by tests. Production hosts plug their own chat
//! store, presence backend and bot directory in through the `Base*` traits.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::info;

use crate::common::RoomId;
use crate::domains::conversations::BotProfile;
use crate::kernel::{
    BaseBotDirectory, BaseMessageSink, BasePresenceStore, Occupant, OutboundMessage,
    PresenceFields,
};

// =============================================================================
// Presence Store
// =============================================================================

struct RoomPresence {
    records: BTreeMap<String, PresenceFields>,
    feed: watch::Sender<Vec<Occupant>>,
}

impl RoomPresence {
    fn new() -> Self {
        let (feed, _) = watch::channel(Vec::new());
        Self {
            records: BTreeMap::new(),
            feed,
        }
    }

    fn publish(&self) {
        let occupants = self
            .records
            .iter()
            .map(|(id, fields)| Occupant {
                id: id.clone(),
                is_bot: fields.is_bot,
            })
            .collect();
        // send_replace updates the value even when nobody is subscribed yet
        self.feed.send_replace(occupants);
    }
}

/// Presence store holding every room's occupants in memory.
///
/// Each room keeps a `watch` channel of its full occupant list, so a fresh
/// subscriber immediately sees the current snapshot.
#[derive(Default)]
pub struct InMemoryPresenceStore {
    rooms: RwLock<HashMap<RoomId, RoomPresence>>,
}

impl InMemoryPresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a genuine user as present.
    pub fn join_real_user(&self, room: &RoomId, user_id: &str, username: &str) {
        self.write(room, |presence| {
            presence.records.insert(
                user_id.to_string(),
                PresenceFields {
                    username: username.to_string(),
                    avatar: String::new(),
                    is_bot: false,
                },
            );
        });
    }

    pub fn leave_real_user(&self, room: &RoomId, user_id: &str) {
        self.write(room, |presence| {
            presence.records.remove(user_id);
        });
    }

    /// Get all presence records in a room, ordered by user id.
    pub fn records(&self, room: &RoomId) -> Vec<(String, PresenceFields)> {
        self.rooms
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(room)
            .map(|p| {
                p.records
                    .iter()
                    .map(|(id, fields)| (id.clone(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ids of synthetic occupants in a room.
    pub fn bot_ids(&self, room: &RoomId) -> Vec<String> {
        self.records(room)
            .into_iter()
            .filter(|(_, fields)| fields.is_bot)
            .map(|(id, _)| id)
            .collect()
    }

    pub fn real_user_count(&self, room: &RoomId) -> usize {
        self.records(room)
            .into_iter()
            .filter(|(_, fields)| !fields.is_bot)
            .count()
    }

    fn write(&self, room: &RoomId, apply: impl FnOnce(&mut RoomPresence)) {
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        let presence = rooms.entry(room.clone()).or_insert_with(RoomPresence::new);
        apply(presence);
        presence.publish();
    }
}

#[async_trait]
impl BasePresenceStore for InMemoryPresenceStore {
    async fn upsert(&self, room: &RoomId, user_id: &str, fields: PresenceFields) -> Result<()> {
        self.write(room, |presence| {
            presence.records.insert(user_id.to_string(), fields);
        });
        Ok(())
    }

    async fn remove(&self, room: &RoomId, user_id: &str) -> Result<()> {
        self.write(room, |presence| {
            presence.records.remove(user_id);
        });
        Ok(())
    }

    async fn subscribe(&self, room: &RoomId) -> Result<BoxStream<'static, Vec<Occupant>>> {
        let mut rooms = self.rooms.write().unwrap_or_else(|e| e.into_inner());
        let presence = rooms.entry(room.clone()).or_insert_with(RoomPresence::new);
        Ok(WatchStream::new(presence.feed.subscribe()).boxed())
    }
}

// =============================================================================
// Bot Directory
// =============================================================================

/// Bot directory backed by a fixed set of profiles.
#[derive(Debug, Default, Clone)]
pub struct StaticBotDirectory {
    profiles: HashMap<String, BotProfile>,
}

impl StaticBotDirectory {
    pub fn new(profiles: impl IntoIterator<Item = BotProfile>) -> Self {
        Self {
            profiles: profiles
                .into_iter()
                .map(|p| (p.username.clone(), p))
                .collect(),
        }
    }

    /// Directory with a generated profile for each username.
    pub fn from_usernames<I, S>(usernames: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(
            usernames
                .into_iter()
                .map(|u| BotProfile::generated(u.as_ref())),
        )
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl BaseBotDirectory for StaticBotDirectory {
    fn lookup(&self, username: &str) -> Option<BotProfile> {
        self.profiles.get(username).cloned()
    }
}

// =============================================================================
// Message Sink
// =============================================================================

/// Sink that writes each bot message to the log instead of a chat store.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingMessageSink;

#[async_trait]
impl BaseMessageSink for LoggingMessageSink {
    async fn send(&self, room: &RoomId, message: OutboundMessage) -> Result<()> {
        info!(
            room_id = %room,
            username = %message.username,
            content = %message.content,
            "bot message"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_sees_current_snapshot_first() {
        let store = InMemoryPresenceStore::new();
        let room = RoomId::new("lobby");
        store.join_real_user(&room, "u1", "alice");

        let mut feed = store.subscribe(&room).await.unwrap();
        let first = feed.next().await.unwrap();
        assert_eq!(
            first,
            vec![Occupant {
                id: "u1".into(),
                is_bot: false
            }]
        );
    }

    #[tokio::test]
    async fn test_updates_are_streamed() {
        let store = InMemoryPresenceStore::new();
        let room = RoomId::new("lobby");
        let mut feed = store.subscribe(&room).await.unwrap();
        assert!(feed.next().await.unwrap().is_empty());

        store
            .upsert(
                &room,
                "bot-1",
                PresenceFields {
                    username: "bot".into(),
                    avatar: String::new(),
                    is_bot: true,
                },
            )
            .await
            .unwrap();

        let update = feed.next().await.unwrap();
        assert_eq!(update.len(), 1);
        assert!(update[0].is_bot);
    }

    #[tokio::test]
    async fn test_remove_absent_record_is_ok() {
        let store = InMemoryPresenceStore::new();
        let room = RoomId::new("lobby");
        assert!(store.remove(&room, "nobody").await.is_ok());
        assert!(store.records(&room).is_empty());
    }

    #[test]
    fn test_directory_lookup() {
        let directory = StaticBotDirectory::from_usernames(["maya", "theo"]);
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.lookup("maya").unwrap().username, "maya");
        assert!(directory.lookup("ghost").is_none());
    }
}
