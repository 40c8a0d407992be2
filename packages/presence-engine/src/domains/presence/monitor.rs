//! Real-user monitor.
//!
//! Follows a room's occupancy feed and hands every snapshot to the
//! coordinator, which recomputes the real-user count and deactivates the
//! engine once the room is busy enough.

use futures::stream::{BoxStream, StreamExt};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::common::RoomId;
use crate::domains::engine::RoomEngineCoordinator;
use crate::kernel::Occupant;

/// Number of occupants not tagged as bots.
pub fn real_user_count(occupants: &[Occupant]) -> usize {
    occupants.iter().filter(|o| !o.is_bot).count()
}

pub struct RealUserMonitor;

impl RealUserMonitor {
    /// Open the room's occupancy feed and follow it until `cancel` fires.
    ///
    /// Returns the real-user count if the feed had a snapshot ready
    /// immediately. A feed that can't be opened is logged and the engine runs
    /// unmonitored.
    pub(crate) async fn subscribe(
        coordinator: &RoomEngineCoordinator,
        room: &RoomId,
        cancel: CancellationToken,
    ) -> Option<usize> {
        let mut feed = match coordinator.deps().presence_store.subscribe(room).await {
            Ok(feed) => feed,
            Err(e) => {
                warn!(room_id = %room, error = %e, "failed to subscribe to room occupancy");
                return None;
            }
        };

        let initial = feed
            .next()
            .now_or_never()
            .flatten()
            .map(|occupants| real_user_count(&occupants));

        tokio::spawn(watch_occupancy(
            coordinator.clone(),
            room.clone(),
            feed,
            cancel,
        ));
        initial
    }
}

async fn watch_occupancy(
    coordinator: RoomEngineCoordinator,
    room: RoomId,
    mut feed: BoxStream<'static, Vec<Occupant>>,
    cancel: CancellationToken,
) {
    debug!(room_id = %room, "real-user monitor subscribed");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = feed.next() => match next {
                Some(occupants) => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    coordinator.apply_occupancy(&room, &occupants).await;
                }
                None => {
                    debug!(room_id = %room, "occupancy feed closed");
                    break;
                }
            },
        }
    }
    debug!(room_id = %room, "real-user monitor unsubscribed");
}
