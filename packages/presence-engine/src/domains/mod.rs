pub mod conversations;
pub mod engine;
pub mod join_events;
pub mod presence;
