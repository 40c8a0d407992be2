//! Simulated "someone just joined" notifications.
//!
//! Entirely separate from the conversation engine: no presence writes, no
//! shared state, so its failure never affects playback.

pub mod models;
pub mod simulator;

pub use models::{default_identity_pool, JoinIdentity, JoinNotification};
pub use simulator::{JoinEventSimulator, JoinNotifier};
