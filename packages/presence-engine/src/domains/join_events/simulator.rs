//! Join event simulator.
//!
//! Per room, fires a notification every `join_interval_min..=join_interval_max`
//! using an identity not yet used in that room, plus one early notification
//! shortly after start. When every identity has been used the room's
//! used-set resets.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::common::RoomId;
use crate::config::EngineConfig;
use crate::domains::join_events::{default_identity_pool, JoinIdentity, JoinNotification};
use crate::kernel::BaseRandomizer;

/// Callback invoked synchronously with each notification.
pub type JoinNotifier = Arc<dyn Fn(JoinNotification) + Send + Sync>;

struct JoinRoomState {
    used: HashSet<usize>,
    cancel: CancellationToken,
}

#[derive(Clone)]
pub struct JoinEventSimulator {
    pool: Arc<Vec<JoinIdentity>>,
    randomizer: Arc<dyn BaseRandomizer>,
    interval_min: Duration,
    interval_max: Duration,
    initial_delay: Option<Duration>,
    rooms: Arc<Mutex<HashMap<RoomId, JoinRoomState>>>,
}

impl JoinEventSimulator {
    pub fn new(randomizer: Arc<dyn BaseRandomizer>, config: &EngineConfig) -> Self {
        Self {
            pool: Arc::new(default_identity_pool()),
            randomizer,
            interval_min: config.join_interval_min,
            interval_max: config.join_interval_max,
            initial_delay: config.join_initial_delay,
            rooms: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Replace the identity pool.
    pub fn with_pool(mut self, pool: Vec<JoinIdentity>) -> Self {
        self.pool = Arc::new(pool);
        self
    }

    pub fn pool(&self) -> &[JoinIdentity] {
        &self.pool
    }

    /// Begin firing notifications for `room`. No-op if already running there.
    pub fn start(&self, room: &RoomId, notify: JoinNotifier) {
        if self.pool.is_empty() {
            warn!(room_id = %room, "join simulator has no identities, not starting");
            return;
        }

        let cancel = {
            let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
            if rooms.contains_key(room) {
                debug!(room_id = %room, "join simulator already running");
                return;
            }
            let cancel = CancellationToken::new();
            rooms.insert(
                room.clone(),
                JoinRoomState {
                    used: HashSet::new(),
                    cancel: cancel.clone(),
                },
            );
            cancel
        };
        info!(room_id = %room, "join simulator started");

        if let Some(delay) = self.initial_delay {
            let this = self.clone();
            let room = room.clone();
            let notify = notify.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => this.fire(&room, &notify, &cancel),
                }
            });
        }

        let this = self.clone();
        let room = room.clone();
        tokio::spawn(async move {
            loop {
                let interval = this
                    .randomizer
                    .duration_between(this.interval_min, this.interval_max);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => this.fire(&room, &notify, &cancel),
                }
            }
        });
    }

    /// Cancel the room's pending timers and forget which identities it used.
    pub fn stop(&self, room: &RoomId) {
        let removed = self
            .rooms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(room);
        if let Some(state) = removed {
            state.cancel.cancel();
            info!(room_id = %room, "join simulator stopped");
        }
    }

    pub fn is_running(&self, room: &RoomId) -> bool {
        self.rooms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(room)
    }

    /// Stop every room.
    pub fn shutdown(&self) {
        let drained: Vec<(RoomId, JoinRoomState)> = self
            .rooms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect();
        for (room, state) in drained {
            state.cancel.cancel();
            debug!(room_id = %room, "join simulator stopped on shutdown");
        }
    }

    /// Fire one notification for the session that owns `cancel`.
    ///
    /// A timer from a stopped session must not fire into a newer one, so the
    /// caller's own token is checked rather than the room's current one.
    fn fire(&self, room: &RoomId, notify: &JoinNotifier, cancel: &CancellationToken) {
        let identity = {
            let mut rooms = self.rooms.lock().unwrap_or_else(|e| e.into_inner());
            if cancel.is_cancelled() {
                return;
            }
            let Some(state) = rooms.get_mut(room) else {
                return;
            };
            self.pick_identity(&mut state.used)
        };

        let notification = JoinNotification::from(&identity);
        info!(
            room_id = %room,
            username = %notification.username,
            role = %notification.role,
            "simulated join"
        );
        // Outside the lock so the callback may call back into the simulator
        notify(notification);
    }

    fn pick_identity(&self, used: &mut HashSet<usize>) -> JoinIdentity {
        let mut unused: Vec<usize> = (0..self.pool.len()).filter(|i| !used.contains(i)).collect();
        if unused.is_empty() {
            used.clear();
            unused = (0..self.pool.len()).collect();
        }
        let index = unused[self.randomizer.pick_index(unused.len())];
        used.insert(index);
        self.pool[index].clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::ScriptedRandomizer;

    fn simulator(pool_size: usize) -> JoinEventSimulator {
        let config = EngineConfig {
            join_initial_delay: None,
            ..Default::default()
        };
        let pool = (0..pool_size)
            .map(|i| JoinIdentity::new(format!("user{i}x"), 20, "member"))
            .collect();
        JoinEventSimulator::new(Arc::new(ScriptedRandomizer::new()), &config).with_pool(pool)
    }

    #[test]
    fn test_pick_resets_after_pool_exhausted() {
        let simulator = simulator(2);
        let mut used = HashSet::new();
        let first = simulator.pick_identity(&mut used);
        let second = simulator.pick_identity(&mut used);
        assert_ne!(first, second);
        assert_eq!(used.len(), 2);

        let third = simulator.pick_identity(&mut used);
        assert_eq!(used.len(), 1);
        assert!(third == first || third == second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_notifications() {
        let simulator = simulator(3);
        let room = RoomId::new("lobby");
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = fired.clone();

        simulator.start(
            &room,
            Arc::new(move |n: JoinNotification| sink.lock().unwrap().push(n)),
        );
        assert!(simulator.is_running(&room));
        simulator.stop(&room);
        assert!(!simulator.is_running(&room));

        tokio::time::sleep(Duration::from_secs(1_000)).await;
        assert!(fired.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_timer_does_not_fire_into_new_session() {
        let simulator = simulator(3);
        let room = RoomId::new("lobby");
        let fired = Arc::new(Mutex::new(0usize));
        let counter = fired.clone();
        let notify: JoinNotifier =
            Arc::new(move |_: JoinNotification| *counter.lock().unwrap() += 1);

        simulator.start(&room, notify.clone());
        let old_session = simulator.rooms.lock().unwrap()[&room].cancel.clone();
        simulator.stop(&room);
        simulator.start(&room, notify.clone());
        let new_session = simulator.rooms.lock().unwrap()[&room].cancel.clone();

        simulator.fire(&room, &notify, &old_session);
        assert_eq!(*fired.lock().unwrap(), 0);
        assert!(simulator.rooms.lock().unwrap()[&room].used.is_empty());

        simulator.fire(&room, &notify, &new_session);
        assert_eq!(*fired.lock().unwrap(), 1);
        simulator.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_keeps_single_schedule() {
        let simulator = simulator(10);
        let room = RoomId::new("lobby");
        let fired = Arc::new(Mutex::new(0usize));

        for _ in 0..2 {
            let counter = fired.clone();
            simulator.start(
                &room,
                Arc::new(move |_: JoinNotification| *counter.lock().unwrap() += 1),
            );
        }

        tokio::time::sleep(Duration::from_secs(130)).await;
        assert_eq!(*fired.lock().unwrap(), 1);
        simulator.stop(&room);
    }
}
