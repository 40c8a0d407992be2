//! Conversation player.
//!
//! Each run is its own task walking the script:
//!
//! ```text
//! Scheduled ──delay──► Delivering ──► next line ... ──► Finished
//!     │                    │
//!     ├─ Paused: freeze at the current line until resumed
//!     └─ Stopped / cancelled: exit without sending
//! ```
//!
//! Status is checked when a line is scheduled and again when its timer fires,
//! both under the room lock. A frozen line waits its full delay again after
//! resume, so pausing never compresses the script.
//!
//! The send itself runs outside the room lock, so a slow sink never holds up
//! `stop`, `pause` or the real-user monitor. It holds the room's send gate
//! instead and races the run's token, and `stop` waits on the gate after
//! cancelling.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::anyhow;
use chrono::Utc;
use tokio::sync::{Notify, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::common::{RoomId, RunId};
use crate::domains::conversations::{BotProfile, Conversation};
use crate::domains::engine::coordinator::{RoomEngineCoordinator, RoomSlot};
use crate::domains::engine::events::EngineEvent;
use crate::domains::engine::state::{ActiveConversationRun, EngineStatus, RoomEngineState};
use crate::error::{EngineError, EngineResult};
use crate::kernel::{MessageType, OutboundMessage};

/// What a run task should do at a checkpoint.
enum Checkpoint {
    Proceed,
    Frozen,
    Exit,
}

impl RoomEngineCoordinator {
    /// Start playing `conversation`: register every participant's presence
    /// and spawn the run task.
    ///
    /// Every participant is resolved before anything is written, so an
    /// unknown bot leaves no trace.
    pub(crate) async fn play_locked(
        &self,
        room: &RoomId,
        state: &mut RoomEngineState,
        conversation: Arc<Conversation>,
    ) -> EngineResult<()> {
        let bots = conversation
            .participants
            .iter()
            .map(|username| {
                self.deps()
                    .bot_directory
                    .lookup(username)
                    .ok_or_else(|| EngineError::UnknownBot {
                        username: username.clone(),
                    })
            })
            .collect::<EngineResult<Vec<BotProfile>>>()?;

        for bot in &bots {
            self.presence().register_bot_presence(room, bot).await;
        }

        let run = ActiveConversationRun::new(
            conversation.clone(),
            bots,
            state.room_cancel.child_token(),
        );
        let run_id = run.run_id;
        let cancel = run.cancel.clone();
        let resume = run.resume.clone();
        let send_gate = state.send_gate.clone();
        state.active_runs.push(run);
        state.recompute_active_bots();

        info!(
            room_id = %room,
            conversation_id = %conversation.id,
            run_id = %run_id,
            active_runs = state.active_runs.len(),
            "conversation started"
        );
        self.emit(EngineEvent::ConversationStarted {
            room: room.clone(),
            conversation_id: conversation.id.clone(),
            participants: conversation.participants.clone(),
            at: Utc::now(),
        });

        let Some(slot) = self.existing_slot(room) else {
            return Ok(());
        };
        tokio::spawn(self.clone().run_conversation(
            room.clone(),
            slot,
            run_id,
            conversation,
            cancel,
            resume,
            send_gate,
        ));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_conversation(
        self,
        room: RoomId,
        slot: RoomSlot,
        run_id: RunId,
        conversation: Arc<Conversation>,
        cancel: CancellationToken,
        resume: Arc<Notify>,
        send_gate: Arc<RwLock<()>>,
    ) {
        let mut index = 0;
        loop {
            // Schedule-time checkpoint
            {
                let mut state = slot.lock().await;
                match checkpoint(&mut state, &cancel, run_id, index) {
                    Checkpoint::Exit => return,
                    Checkpoint::Frozen => {
                        drop(state);
                        if !wait_for_resume(&cancel, &resume).await {
                            return;
                        }
                        continue;
                    }
                    Checkpoint::Proceed => {}
                }
                if index >= conversation.messages.len() {
                    self.finish_conversation_locked(&room, &mut state, run_id)
                        .await;
                    return;
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(conversation.delay_before(index)) => {}
            }

            // Fire-time checkpoint: stop/pause may have landed while waiting
            let message = {
                let mut state = slot.lock().await;
                match checkpoint(&mut state, &cancel, run_id, index) {
                    Checkpoint::Exit => return,
                    Checkpoint::Frozen => {
                        drop(state);
                        if !wait_for_resume(&cancel, &resume).await {
                            return;
                        }
                        continue;
                    }
                    Checkpoint::Proceed => {}
                }
                match outbound_message(&room, &mut state, run_id, &conversation, index) {
                    Some(message) => message,
                    None => {
                        index += 1;
                        continue;
                    }
                }
            };

            let outcome = {
                let _gate = send_gate.read().await;
                if cancel.is_cancelled() {
                    return;
                }
                let limit = self.config().collaborator_timeout;
                let send = self.deps().message_sink.send(&room, message.clone());
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    sent = tokio::time::timeout(limit, send) => sent.unwrap_or_else(|_| {
                        Err(anyhow!("send timed out after {}ms", limit.as_millis()))
                    }),
                }
            };

            let mut state = slot.lock().await;
            if cancel.is_cancelled() || state.status == EngineStatus::Stopped {
                return;
            }
            self.record_delivery_locked(
                &room,
                &mut state,
                run_id,
                &conversation,
                index,
                &message,
                outcome,
            );
            index += 1;
        }
    }

    /// Log and publish the outcome of one send, then advance the cursor. A
    /// failed send never stops the run.
    #[allow(clippy::too_many_arguments)]
    fn record_delivery_locked(
        &self,
        room: &RoomId,
        state: &mut RoomEngineState,
        run_id: RunId,
        conversation: &Conversation,
        index: usize,
        message: &OutboundMessage,
        outcome: anyhow::Result<()>,
    ) {
        match outcome {
            Ok(()) => {
                debug!(
                    room_id = %room,
                    conversation_id = %conversation.id,
                    index,
                    username = %message.username,
                    "bot message delivered"
                );
                self.emit(EngineEvent::MessageDelivered {
                    room: room.clone(),
                    conversation_id: conversation.id.clone(),
                    index,
                    username: message.username.clone(),
                    at: Utc::now(),
                });
            }
            Err(e) => {
                error!(
                    room_id = %room,
                    conversation_id = %conversation.id,
                    index,
                    error = %e,
                    "failed to deliver bot message"
                );
                self.emit(EngineEvent::MessageFailed {
                    room: room.clone(),
                    conversation_id: conversation.id.clone(),
                    index,
                    error: e.to_string(),
                    at: Utc::now(),
                });
            }
        }

        if let Some(run) = state.run_mut(run_id) {
            run.cursor_index = index + 1;
        }
    }

    /// Retire a finished run, release bots nothing else is using, and queue
    /// the next conversation if the engine is still running.
    async fn finish_conversation_locked(
        &self,
        room: &RoomId,
        state: &mut RoomEngineState,
        run_id: RunId,
    ) {
        let Some(position) = state.active_runs.iter().position(|r| r.run_id == run_id) else {
            return;
        };
        let run = state.active_runs.remove(position);
        state.conversations_played += 1;

        // Recount across the runs still playing rather than trusting a counter
        let still_referenced: HashSet<String> = state
            .active_runs
            .iter()
            .flat_map(|r| r.conversation.participants.iter().cloned())
            .collect();
        let released: Vec<BotProfile> = run
            .bots
            .into_iter()
            .filter(|bot| !still_referenced.contains(&bot.username))
            .collect();
        state.recompute_active_bots();

        for bot in &released {
            self.presence().remove_bot_presence(room, &bot.id).await;
        }

        info!(
            room_id = %room,
            conversation_id = %run.conversation.id,
            bots_released = released.len(),
            conversations_played = state.conversations_played,
            "conversation finished"
        );
        self.emit(EngineEvent::ConversationFinished {
            room: room.clone(),
            conversation_id: run.conversation.id.clone(),
            conversations_played: state.conversations_played,
            at: Utc::now(),
        });

        if state.status == EngineStatus::Running {
            self.schedule_gap_locked(room, state);
        }
    }
}

/// Build the outbound message for line `index`. A speaker missing from the
/// run is logged and the line skipped.
fn outbound_message(
    room: &RoomId,
    state: &mut RoomEngineState,
    run_id: RunId,
    conversation: &Conversation,
    index: usize,
) -> Option<OutboundMessage> {
    let line = conversation.messages.get(index)?;
    let run = state.run_mut(run_id)?;
    let Some(bot) = run.bot(&line.from) else {
        // Catalog validation guarantees speakers are participants
        error!(room_id = %room, username = %line.from, "speaker missing from run");
        run.cursor_index = index + 1;
        return None;
    };

    Some(OutboundMessage {
        user_id: bot.id.to_string(),
        username: bot.username.clone(),
        avatar: bot.avatar.clone(),
        content: line.text.clone(),
        message_type: MessageType::Text,
    })
}

fn checkpoint(
    state: &mut RoomEngineState,
    cancel: &CancellationToken,
    run_id: RunId,
    index: usize,
) -> Checkpoint {
    if cancel.is_cancelled() {
        return Checkpoint::Exit;
    }
    match state.status {
        EngineStatus::Stopped => Checkpoint::Exit,
        EngineStatus::Running => Checkpoint::Proceed,
        EngineStatus::Paused => match state.run_mut(run_id) {
            Some(run) => {
                run.paused = true;
                run.paused_at_index = index;
                Checkpoint::Frozen
            }
            None => Checkpoint::Exit,
        },
    }
}

/// Park until resumed. Returns `false` if the run was cancelled instead.
async fn wait_for_resume(cancel: &CancellationToken, resume: &Notify) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = resume.notified() => true,
    }
}
