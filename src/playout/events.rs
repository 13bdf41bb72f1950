//! Engine event channel
//!
//! The broadcast has several independent event sources (the playout
//! process's stderr, the queue-directory watcher, deferred slot-reset timers,
//! the playout exit notifier) but exactly one owner of the ring and
//! timeline state. All sources are producers into a single mpsc channel; the
//! engine is the only consumer and each handler runs to completion before the
//! next event is taken. Mutual exclusion over the timeline is this channel
//! contract, not a shared flag.

use std::path::PathBuf;

/// Events consumed by the broadcast engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// One raw stderr line from the playout process
    Progress(String),

    /// A file in the queue directory finished arriving (size stable for the
    /// configured debounce interval)
    Arrival(PathBuf),

    /// A retiring slot's guard interval expired; restore filler if the slot
    /// still carries the scheduled generation
    ResetDue { index: usize, generation: u64 },

    /// The playout process exited (expected at end of a restream or on
    /// shutdown; logged, never an error)
    PlayoutExited {
        code: Option<i32>,
        signal: Option<i32>,
    },
}
