//! Ring status rendering for the debug log

use crate::playout::state::BroadcastState;
use crate::timeline::Slot;
use std::fmt::Write;

/// Render the ring as a compact table, one line per slot, with a play marker
/// on the slot under the play head.
pub fn render(slots: &[Slot], state: &BroadcastState, playing_index: usize) -> String {
    let mut out = format!(
        "live loop ({:.1}/{:.1} s)\nslot  start    program                   duration\n",
        state.elapsed_time as f64 / 1e3,
        state.total_loop_time as f64 / 1e3,
    );

    for slot in slots {
        let program = if slot.pending_reset {
            "<pending reset ...>".to_string()
        } else if slot.is_default {
            "<available>".to_string()
        } else {
            slot.source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| slot.source.display().to_string())
        };

        let secs = (slot.duration + 500) / 1000;
        let _ = writeln!(
            out,
            "{:>4}  {:>6}s  {:<24}  {:>2} mn {:>2} s{}",
            slot.index + 1,
            slot.timestamp / 1000,
            program,
            secs / 60,
            secs % 60,
            if slot.index == playing_index { "  <--" } else { "" },
        );
    }

    out
}
