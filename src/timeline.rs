//! Ring timeline model
//!
//! The broadcast loops forever over a fixed ring of on-disk slots. Each slot
//! carries the probed metadata of whatever content currently occupies its
//! backing file, plus its start offset (`timestamp`) within one loop
//! iteration. Timestamps are a prefix sum over slot durations and must be
//! recomputed whenever any duration changes.
//!
//! Ring invariant: for slots sorted by `index`, `timestamp[0] == 0` and
//! `timestamp[i] == timestamp[i-1] + duration[i-1]`; the sum of all durations
//! equals the loop period.

use std::path::PathBuf;

/// One ring position and the content currently assigned to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    /// Stable on-disk path for this ordinal position; never changes for the
    /// lifetime of the ring
    pub filename: PathBuf,

    /// Byte size of the current content
    pub size: u64,

    /// Duration of the current content in milliseconds
    pub duration: u64,

    /// Slot currently holds filler content (byte-size equality with the
    /// canonical filler file)
    pub is_default: bool,

    /// Fixed 0-based ordinal, assigned once at ring construction
    pub index: usize,

    /// Original path of the probed content (diagnostic only)
    pub source: PathBuf,

    /// Milliseconds from loop start to this slot's first frame
    pub timestamp: u64,

    /// An asynchronous filler-restore write is in flight; the slot is not
    /// eligible for assignment until it clears
    pub pending_reset: bool,

    /// Bumped every time the slot's content changes; deferred resets carry
    /// the generation observed at schedule time and no-op when stale
    pub reset_generation: u64,
}

/// Recompute every slot's start offset and return the total loop duration.
///
/// Walks the ring in index order, assigning each slot's `timestamp` as the
/// running sum of preceding durations. Must be called immediately after any
/// slot's `duration` changes, and before comparing slot ordinals to decide
/// elapsed-time compensation. Touches nothing but `timestamp`.
pub fn recompute_timestamps(slots: &mut [Slot]) -> u64 {
    let mut total = 0u64;
    for slot in slots.iter_mut() {
        slot.timestamp = total;
        total += slot.duration;
    }
    total
}

/// Resolve the slot under the play head.
///
/// Scans in index order for the first slot whose `timestamp` exceeds
/// `elapsed`; the resolved slot is the one immediately preceding it, or the
/// last slot when none exceeds `elapsed` (play head in the final segment).
pub fn resolve_index(slots: &[Slot], elapsed: u64) -> usize {
    match slots.iter().position(|s| s.timestamp > elapsed) {
        // timestamp[0] is always 0, so the first match is never index 0
        Some(i) => i - 1,
        None => slots.len() - 1,
    }
}

/// Find a slot eligible for assignment, in two passes.
///
/// First scans slots after `current_index` in ascending order, then the whole
/// ring from 0, for a slot that is filler and not pending reset. Starting
/// after the play head maximizes the time before injected content is reached,
/// reducing the chance it is retired before fully playing.
pub fn find_free_slot(slots: &[Slot], current_index: usize) -> Option<usize> {
    slots
        .iter()
        .skip(current_index + 1)
        .find(|s| s.is_default && !s.pending_reset)
        .or_else(|| slots.iter().find(|s| s.is_default && !s.pending_reset))
        .map(|s| s.index)
}

#[cfg(test)]
pub(crate) fn test_slot(index: usize, duration: u64) -> Slot {
    Slot {
        filename: PathBuf::from(format!("slot{index}.flv")),
        size: 1000,
        duration,
        is_default: true,
        index,
        source: PathBuf::from("default.slot.flv"),
        timestamp: 0,
        pending_reset: false,
        reset_generation: 0,
    }
}
