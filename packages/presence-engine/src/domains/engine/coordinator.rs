//! Room engine coordinator.
//!
//! Owns the registry of per-room engine sessions and every control operation
//! (`start`, `pause`, `resume`, `stop`, `launch_new_conversation`). All
//! control operations are idempotent and safe to call in any order.
//!
//! A room is in the registry only while its engine is running or paused.
//! `stop` cancels the session and drops it; the next `start` builds a new one.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Utc;
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::{broadcast, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::common::RoomId;
use crate::config::EngineConfig;
use crate::domains::conversations::{pick_conversation, BotProfile};
use crate::domains::engine::events::{EngineEvent, StopReason};
use crate::domains::engine::state::{
    EngineStatus, GapTask, RoomEngineSnapshot, RoomEngineState,
};
use crate::domains::presence::{real_user_count, PresenceSimulator, RealUserMonitor};
use crate::error::EngineResult;
use crate::kernel::{EngineDeps, Occupant};

/// Default channel capacity for engine events.
const EVENT_CAPACITY: usize = 1024;

pub(crate) type RoomSlot = Arc<Mutex<RoomEngineState>>;

struct RoomEntry {
    generation: u64,
    slot: RoomSlot,
    /// Session token, reachable without waiting for the state lock.
    cancel: CancellationToken,
}

/// Registry of room engines and the single scheduling authority per room.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct RoomEngineCoordinator {
    inner: Arc<CoordinatorInner>,
}

struct CoordinatorInner {
    deps: EngineDeps,
    config: EngineConfig,
    presence: PresenceSimulator,
    rooms: StdMutex<HashMap<RoomId, RoomEntry>>,
    next_generation: AtomicU64,
    events: broadcast::Sender<EngineEvent>,
}

impl RoomEngineCoordinator {
    pub fn new(deps: EngineDeps, config: EngineConfig) -> Self {
        let presence =
            PresenceSimulator::new(deps.presence_store.clone(), config.collaborator_timeout);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(CoordinatorInner {
                deps,
                config,
                presence,
                rooms: StdMutex::new(HashMap::new()),
                next_generation: AtomicU64::new(1),
                events,
            }),
        }
    }

    pub fn deps(&self) -> &EngineDeps {
        &self.inner.deps
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub(crate) fn presence(&self) -> &PresenceSimulator {
        &self.inner.presence
    }

    /// Subscribe to engine events for every room.
    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }

    /// Get the room's session, creating a fresh stopped one if there is none.
    fn room_slot(&self, room: &RoomId) -> RoomSlot {
        let mut rooms = self.inner.rooms.lock().unwrap_or_else(|e| e.into_inner());
        rooms
            .entry(room.clone())
            .or_insert_with(|| {
                let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                let state = RoomEngineState::new(
                    generation,
                    self.inner
                        .config
                        .repeat_window(self.inner.deps.catalog.len()),
                    self.inner.config.auto_deactivate_threshold,
                );
                RoomEntry {
                    generation,
                    cancel: state.room_cancel.clone(),
                    slot: Arc::new(Mutex::new(state)),
                }
            })
            .slot
            .clone()
    }

    pub(crate) fn existing_slot(&self, room: &RoomId) -> Option<RoomSlot> {
        self.inner
            .rooms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(room)
            .map(|entry| entry.slot.clone())
    }

    fn is_registered(&self, room: &RoomId, generation: u64) -> bool {
        self.inner
            .rooms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(room)
            .is_some_and(|entry| entry.generation == generation)
    }

    /// Drop the room's session, unless a newer one has replaced it.
    fn unregister(&self, room: &RoomId, generation: u64) {
        let mut rooms = self.inner.rooms.lock().unwrap_or_else(|e| e.into_inner());
        if rooms.get(room).is_some_and(|entry| entry.generation == generation) {
            rooms.remove(room);
        }
    }

    /// Rooms with a running or paused engine, sorted.
    pub fn rooms(&self) -> Vec<RoomId> {
        let mut rooms: Vec<RoomId> = self
            .inner
            .rooms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        rooms.sort();
        rooms
    }

    /// Current view of the room's engine; `None` when it isn't running or paused.
    pub async fn snapshot(&self, room: &RoomId) -> Option<RoomEngineSnapshot> {
        let slot = self.existing_slot(room)?;
        let state = slot.lock().await;
        Some(state.snapshot(room))
    }

    pub async fn status(&self, room: &RoomId) -> EngineStatus {
        match self.existing_slot(room) {
            Some(slot) => slot.lock().await.status,
            None => EngineStatus::Stopped,
        }
    }

    // =========================================================================
    // Control operations
    // =========================================================================

    /// Start the engine and launch the first conversation right away.
    ///
    /// No-op when already running; resumes a paused engine. Configuration
    /// errors (empty catalog, unknown bot) leave the room stopped.
    ///
    /// The first line of a conversation has no delay, so on a multi-threaded
    /// runtime it can go out before a `stop` issued right after `start`
    /// returns. Nothing is sent once that `stop` has returned.
    pub async fn start(&self, room: &RoomId) -> EngineResult<()> {
        loop {
            let slot = self.room_slot(room);
            let mut state = slot.lock().await;
            if !self.is_registered(room, state.generation) {
                // Stopped and dropped while we waited for the lock
                continue;
            }

            match state.status {
                EngineStatus::Running => {
                    debug!(room_id = %room, "engine already running");
                    return Ok(());
                }
                EngineStatus::Paused => {
                    self.resume_locked(room, &mut state);
                    return Ok(());
                }
                EngineStatus::Stopped => {}
            }

            state.status = EngineStatus::Running;
            state.real_user_count = 0;
            info!(room_id = %room, generation = state.generation, "engine started");
            self.emit(EngineEvent::Started {
                room: room.clone(),
                at: Utc::now(),
            });

            let monitor_cancel = state.room_cancel.child_token();
            state.monitor_cancel = Some(monitor_cancel.clone());
            if let Some(count) = RealUserMonitor::subscribe(self, room, monitor_cancel).await {
                state.real_user_count = count;
            }

            if let Err(e) = self.launch_locked(room, &mut state).await {
                error!(room_id = %room, error = %e, "failed to launch first conversation");
                self.stop_locked(room, &mut state, StopReason::LaunchFailed)
                    .await;
                return Err(e);
            }
            return Ok(());
        }
    }

    /// Pause the engine.
    ///
    /// Timers already counting down keep running; each run freezes itself the
    /// next time it would schedule or send.
    pub async fn pause(&self, room: &RoomId) {
        let Some(slot) = self.existing_slot(room) else {
            return;
        };
        let mut state = slot.lock().await;
        if state.status != EngineStatus::Running {
            return;
        }
        state.status = EngineStatus::Paused;
        info!(room_id = %room, "engine paused");
        self.emit(EngineEvent::Paused {
            room: room.clone(),
            at: Utc::now(),
        });
    }

    /// Resume a paused engine; frozen runs pick up where they stopped.
    pub async fn resume(&self, room: &RoomId) {
        let Some(slot) = self.existing_slot(room) else {
            return;
        };
        let mut state = slot.lock().await;
        if state.status != EngineStatus::Paused {
            return;
        }
        self.resume_locked(room, &mut state);
    }

    fn resume_locked(&self, room: &RoomId, state: &mut RoomEngineState) {
        state.status = EngineStatus::Running;
        for run in state.active_runs.iter_mut().filter(|r| r.paused) {
            run.paused = false;
            run.resume.notify_one();
        }
        info!(room_id = %room, "engine resumed");
        self.emit(EngineEvent::Resumed {
            room: room.clone(),
            at: Utc::now(),
        });

        // A conversation that ended while paused scheduled no follow-up
        if state.active_runs.is_empty() && state.gap.is_none() {
            self.schedule_gap_locked(room, state);
        }
    }

    /// Stop the engine: cancel every task, remove every bot, unsubscribe the
    /// monitor and drop the room's session. No-op when already stopped.
    pub async fn stop(&self, room: &RoomId) {
        self.stop_with_reason(room, StopReason::Requested).await;
    }

    pub(crate) async fn stop_with_reason(&self, room: &RoomId, reason: StopReason) {
        let entry = {
            let rooms = self.inner.rooms.lock().unwrap_or_else(|e| e.into_inner());
            rooms
                .get(room)
                .map(|entry| (entry.slot.clone(), entry.cancel.clone()))
        };
        let Some((slot, cancel)) = entry else {
            return;
        };

        // Pre-empt in-flight sends before queueing for the lock
        cancel.cancel();
        let mut state = slot.lock().await;
        self.stop_locked(room, &mut state, reason).await;
    }

    pub(crate) async fn stop_locked(
        &self,
        room: &RoomId,
        state: &mut RoomEngineState,
        reason: StopReason,
    ) {
        if state.status == EngineStatus::Stopped {
            // A session that never started; drop it so a waiting start
            // builds a fresh one
            state.room_cancel.cancel();
            self.unregister(room, state.generation);
            return;
        }
        state.status = EngineStatus::Stopped;
        self.unregister(room, state.generation);

        state.room_cancel.cancel();
        if let Some(gap) = state.gap.take() {
            gap.cancel.cancel();
        }
        if let Some(monitor) = state.monitor_cancel.take() {
            monitor.cancel();
        }

        let mut seen = BTreeSet::new();
        let mut bots: Vec<BotProfile> = Vec::new();
        for run in state.active_runs.drain(..) {
            run.cancel.cancel();
            for bot in run.bots {
                if seen.insert(bot.username.clone()) {
                    bots.push(bot);
                }
            }
        }
        state.recompute_active_bots();

        // Wait out any send that was already under way
        drop(state.send_gate.write().await);

        for bot in &bots {
            self.presence().remove_bot_presence(room, &bot.id).await;
        }

        info!(
            room_id = %room,
            reason = ?reason,
            bots_removed = bots.len(),
            conversations_played = state.conversations_played,
            "engine stopped"
        );
        self.emit(EngineEvent::Stopped {
            room: room.clone(),
            reason,
            at: Utc::now(),
        });
    }

    /// Stop every room.
    pub async fn shutdown(&self) {
        for room in self.rooms() {
            self.stop_with_reason(&room, StopReason::Shutdown).await;
        }
    }

    // =========================================================================
    // Launching
    // =========================================================================

    /// Launch another conversation if the room is running and below its cap.
    ///
    /// Deactivates the engine instead when the room already has enough real
    /// users.
    pub fn launch_new_conversation(&self, room: &RoomId) -> BoxFuture<'static, EngineResult<()>> {
        let this = self.clone();
        let room = room.clone();
        async move {
            let Some(slot) = this.existing_slot(&room) else {
                return Ok(());
            };
            let mut state = slot.lock().await;
            this.launch_locked(&room, &mut state).await
        }
        .boxed()
    }

    async fn launch_locked(&self, room: &RoomId, state: &mut RoomEngineState) -> EngineResult<()> {
        if state.status != EngineStatus::Running {
            debug!(room_id = %room, status = ?state.status, "launch ignored, engine not running");
            return Ok(());
        }

        if state.real_user_count >= state.auto_deactivate_threshold {
            info!(
                room_id = %room,
                real_users = state.real_user_count,
                threshold = state.auto_deactivate_threshold,
                "enough real users, deactivating instead of launching"
            );
            self.stop_locked(room, state, StopReason::AutoDeactivated)
                .await;
            return Ok(());
        }

        if state.active_runs.len() >= self.inner.config.max_concurrent_conversations {
            debug!(
                room_id = %room,
                active_runs = state.active_runs.len(),
                "concurrency cap reached, skipping launch"
            );
            self.emit(EngineEvent::LaunchSkipped {
                room: room.clone(),
                active_runs: state.active_runs.len(),
                at: Utc::now(),
            });
            return Ok(());
        }

        let conversation = pick_conversation(
            &self.inner.deps.catalog,
            &mut state.recent,
            self.inner.deps.randomizer.as_ref(),
        )?;
        self.play_locked(room, state, conversation).await
    }

    /// Schedule the next launch after a randomized gap.
    ///
    /// A room has at most one pending gap; a newer one replaces it.
    pub(crate) fn schedule_gap_locked(&self, room: &RoomId, state: &mut RoomEngineState) {
        if let Some(previous) = state.gap.take() {
            previous.cancel.cancel();
        }

        let gap = self
            .inner
            .deps
            .randomizer
            .duration_between(self.inner.config.gap_min, self.inner.config.gap_max);
        state.gap_seq += 1;
        let seq = state.gap_seq;
        let cancel = state.room_cancel.child_token();
        state.gap = Some(GapTask {
            seq,
            cancel: cancel.clone(),
        });
        debug!(room_id = %room, gap_ms = gap.as_millis() as u64, "next conversation scheduled");

        let this = self.clone();
        let room = room.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(gap) => {}
            }
            this.launch_after_gap(room, seq, cancel).await;
        });
    }

    fn launch_after_gap(
        &self,
        room: RoomId,
        seq: u64,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, ()> {
        let this = self.clone();
        async move {
            let Some(slot) = this.existing_slot(&room) else {
                return;
            };
            let mut state = slot.lock().await;
            if cancel.is_cancelled() {
                return;
            }
            if state.gap.as_ref().map(|g| g.seq) == Some(seq) {
                state.gap = None;
            }

            if let Err(e) = this.launch_locked(&room, &mut state).await {
                error!(room_id = %room, error = %e, "failed to launch conversation after gap");
                this.stop_locked(&room, &mut state, StopReason::LaunchFailed)
                    .await;
            }
        }
        .boxed()
    }

    // =========================================================================
    // Real users
    // =========================================================================

    /// Recompute the real-user count from an occupancy snapshot and
    /// deactivate a running engine that has reached its threshold.
    pub async fn apply_occupancy(&self, room: &RoomId, occupants: &[Occupant]) {
        let Some(slot) = self.existing_slot(room) else {
            return;
        };
        let mut state = slot.lock().await;
        state.real_user_count = real_user_count(occupants);
        debug!(room_id = %room, real_users = state.real_user_count, "occupancy updated");
        self.deactivate_if_busy(room, &mut state).await;
    }

    /// Override the auto-deactivation threshold for the room's current
    /// session. No-op when the engine isn't running or paused.
    pub async fn set_auto_deactivate_threshold(&self, room: &RoomId, threshold: usize) {
        let Some(slot) = self.existing_slot(room) else {
            debug!(room_id = %room, "no engine session, threshold override ignored");
            return;
        };
        let mut state = slot.lock().await;
        state.auto_deactivate_threshold = threshold;
        self.deactivate_if_busy(room, &mut state).await;
    }

    // TODO: add a hysteresis band so a room hovering at the threshold doesn't flap
    async fn deactivate_if_busy(&self, room: &RoomId, state: &mut RoomEngineState) {
        if state.status == EngineStatus::Running
            && state.real_user_count >= state.auto_deactivate_threshold
        {
            info!(
                room_id = %room,
                real_users = state.real_user_count,
                threshold = state.auto_deactivate_threshold,
                "real users reached threshold, deactivating"
            );
            self.stop_locked(room, state, StopReason::AutoDeactivated)
                .await;
        }
    }
}
