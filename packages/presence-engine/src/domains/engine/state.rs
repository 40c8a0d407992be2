//! In-memory engine state, one per room.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;

use crate::common::{RoomId, RunId};
use crate::domains::conversations::{BotProfile, Conversation, RecentConversations};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineStatus {
    Stopped,
    Running,
    Paused,
}

/// One in-progress playback of a conversation.
pub(crate) struct ActiveConversationRun {
    pub run_id: RunId,
    pub conversation: Arc<Conversation>,
    /// Resolved profiles of every participant, in script order.
    pub bots: Vec<BotProfile>,
    /// Index of the next message to send.
    pub cursor_index: usize,
    pub paused: bool,
    pub paused_at_index: usize,
    /// Cancels the run task. Child of the room token.
    pub cancel: CancellationToken,
    /// Wakes a frozen run task on resume.
    pub resume: Arc<Notify>,
}

impl ActiveConversationRun {
    pub fn new(
        conversation: Arc<Conversation>,
        bots: Vec<BotProfile>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            run_id: RunId::new(),
            conversation,
            bots,
            cursor_index: 0,
            paused: false,
            paused_at_index: 0,
            cancel,
            resume: Arc::new(Notify::new()),
        }
    }

    pub fn bot(&self, username: &str) -> Option<&BotProfile> {
        self.bots.iter().find(|b| b.username == username)
    }
}

/// A pending inter-conversation gap.
pub(crate) struct GapTask {
    pub seq: u64,
    pub cancel: CancellationToken,
}

/// One engine session for a room, from `start` until `stop`.
///
/// Dropped from the registry on stop; a later `start` builds a fresh one.
pub(crate) struct RoomEngineState {
    /// Distinguishes this session from earlier ones for the same room.
    pub generation: u64,
    pub status: EngineStatus,
    /// Usernames of bots in at least one active run. Always recomputed.
    pub active_bots: BTreeSet<String>,
    pub conversations_played: u64,
    pub active_runs: Vec<ActiveConversationRun>,
    pub recent: RecentConversations,
    pub real_user_count: usize,
    pub auto_deactivate_threshold: usize,
    /// Parent of every task token in this session.
    pub room_cancel: CancellationToken,
    /// Sends hold a read guard; stop takes the write side once every token
    /// is cancelled, so no send is in flight after stop returns.
    pub send_gate: Arc<RwLock<()>>,
    pub monitor_cancel: Option<CancellationToken>,
    pub gap: Option<GapTask>,
    pub gap_seq: u64,
}

impl RoomEngineState {
    pub fn new(generation: u64, recent_capacity: usize, auto_deactivate_threshold: usize) -> Self {
        Self {
            generation,
            status: EngineStatus::Stopped,
            active_bots: BTreeSet::new(),
            conversations_played: 0,
            active_runs: Vec::new(),
            recent: RecentConversations::new(recent_capacity),
            real_user_count: 0,
            auto_deactivate_threshold,
            room_cancel: CancellationToken::new(),
            send_gate: Arc::new(RwLock::new(())),
            monitor_cancel: None,
            gap: None,
            gap_seq: 0,
        }
    }

    /// Rebuild `active_bots` as the union of participants across active runs.
    pub fn recompute_active_bots(&mut self) {
        self.active_bots = self
            .active_runs
            .iter()
            .flat_map(|run| run.conversation.participants.iter().cloned())
            .collect();
    }

    pub fn run_mut(&mut self, run_id: RunId) -> Option<&mut ActiveConversationRun> {
        self.active_runs.iter_mut().find(|r| r.run_id == run_id)
    }

    pub fn snapshot(&self, room: &RoomId) -> RoomEngineSnapshot {
        RoomEngineSnapshot {
            room: room.clone(),
            status: self.status,
            active_bots: self.active_bots.iter().cloned().collect(),
            conversations_played: self.conversations_played,
            active_runs: self
                .active_runs
                .iter()
                .map(|run| RunSnapshot {
                    conversation_id: run.conversation.id.clone(),
                    cursor_index: run.cursor_index,
                    message_count: run.conversation.messages.len(),
                    paused: run.paused,
                    paused_at_index: run.paused_at_index,
                })
                .collect(),
            recent_conversation_ids: self.recent.ids(),
            real_user_count: self.real_user_count,
            auto_deactivate_threshold: self.auto_deactivate_threshold,
            gap_pending: self.gap.is_some(),
        }
    }
}

/// Point-in-time view of a room's engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomEngineSnapshot {
    pub room: RoomId,
    pub status: EngineStatus,
    /// Sorted usernames.
    pub active_bots: Vec<String>,
    pub conversations_played: u64,
    pub active_runs: Vec<RunSnapshot>,
    /// Oldest first.
    pub recent_conversation_ids: Vec<String>,
    pub real_user_count: usize,
    pub auto_deactivate_threshold: usize,
    pub gap_pending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSnapshot {
    pub conversation_id: String,
    pub cursor_index: usize,
    pub message_count: usize,
    pub paused: bool,
    pub paused_at_index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::conversations::ScriptedMessage;

    fn conversation(id: &str, participants: &[&str]) -> Arc<Conversation> {
        Arc::new(Conversation {
            id: id.into(),
            participants: participants.iter().map(|p| p.to_string()).collect(),
            messages: vec![ScriptedMessage {
                from: participants[0].into(),
                text: "hi".into(),
                delay_ms: 0,
            }],
        })
    }

    fn run(conversation: Arc<Conversation>) -> ActiveConversationRun {
        let bots = conversation
            .participants
            .iter()
            .map(|p| BotProfile::generated(p))
            .collect();
        ActiveConversationRun::new(conversation, bots, CancellationToken::new())
    }

    #[test]
    fn test_active_bots_is_union_of_runs() {
        let mut state = RoomEngineState::new(1, 3, 10);
        state.active_runs.push(run(conversation("a", &["maya", "theo"])));
        state.active_runs.push(run(conversation("b", &["theo", "iris"])));
        state.recompute_active_bots();
        assert_eq!(
            state.active_bots.iter().cloned().collect::<Vec<_>>(),
            vec!["iris", "maya", "theo"]
        );

        state.active_runs.remove(0);
        state.recompute_active_bots();
        assert_eq!(
            state.active_bots.iter().cloned().collect::<Vec<_>>(),
            vec!["iris", "theo"]
        );
    }

    #[test]
    fn test_new_state_is_stopped() {
        let state = RoomEngineState::new(1, 3, 10);
        let snapshot = state.snapshot(&RoomId::new("lobby"));
        assert_eq!(snapshot.status, EngineStatus::Stopped);
        assert!(snapshot.active_runs.is_empty());
        assert!(!snapshot.gap_pending);
    }
}
