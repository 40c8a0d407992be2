//! Synthetic presence: writing bot occupants and watching real ones.

pub mod monitor;
pub mod simulator;

pub use monitor::{real_user_count, RealUserMonitor};
pub use simulator::PresenceSimulator;
