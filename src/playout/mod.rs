//! Broadcast engine and timeline synchronization

pub mod engine;
pub mod events;
mod ingest;
pub mod state;
mod sync;

pub use engine::{reset_broadcast, Engine};
pub use events::EngineEvent;
pub use state::BroadcastState;
