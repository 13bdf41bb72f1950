//! Broadcast timeline state
//!
//! One instance per broadcast, owned by the engine and passed by reference
//! into the event handlers. There is deliberately no process-wide holder:
//! everything that reads or writes this state does so through the engine's
//! single-consumer event loop.

use crate::timeline::Slot;

/// Play-head tracking state for one broadcast
#[derive(Debug, Clone)]
pub struct BroadcastState {
    /// Snapshot copy (not a live reference) of the slot believed to be under
    /// the play head
    pub current_slot: Slot,

    /// Sum of all slot durations; the loop period in milliseconds
    pub total_loop_time: u64,

    /// Cumulative milliseconds reported by the playout process since the
    /// broadcast started; monotonically non-decreasing, never wraps
    pub transcoded_time: u64,

    /// Position within the current loop iteration, in
    /// `[0, total_loop_time)` except transiently after an oversized delta
    pub elapsed_time: u64,
}

impl BroadcastState {
    /// Initialize state over a freshly probed ring.
    ///
    /// The play head starts at the first slot with both clocks at zero.
    pub fn new(slots: &[Slot], total_loop_time: u64) -> Self {
        Self {
            current_slot: slots[0].clone(),
            total_loop_time,
            transcoded_time: 0,
            elapsed_time: 0,
        }
    }
}
