//! Per-room conversation engine.
//!
//! # Architecture
//!
//! ```text
//! RoomEngineCoordinator (registry: RoomId → Mutex<RoomEngineState>)
//!     │
//!     ├─► start() ──► RealUserMonitor (occupancy feed task)
//!     │                   └─► apply_occupancy() ──► stop() when busy
//!     │
//!     └─► launch_new_conversation()
//!             ├─► pick_conversation()          (conversations::picker)
//!             └─► play()                       (player)
//!                     ├─► PresenceSimulator.register_bot_presence()
//!                     └─► spawn run task ──► deliver each line on its delay
//!                                 └─► finish_conversation()
//!                                         ├─► PresenceSimulator.remove_bot_presence()
//!                                         └─► spawn gap task ──► launch_new_conversation()
//! ```
//!
//! Every task takes the room lock before acting and re-checks the engine
//! status there. Sends run outside the lock behind the room's send gate;
//! `stop()` cancels first and then waits on the gate, so nothing is sent
//! after it returns.

mod coordinator;
pub mod events;
mod player;
pub mod state;

pub use coordinator::RoomEngineCoordinator;
pub use events::{EngineEvent, StopReason};
pub use state::{EngineStatus, RoomEngineSnapshot, RunSnapshot};
