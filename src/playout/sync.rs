//! Play-head synchronization and slot retirement
//!
//! Reconciles the ring's timing model against the playout process's noisy
//! stderr timer. Each decoded report advances the loop-relative play head
//! and resolves the slot underneath it. When the head has moved off an
//! injected slot, that slot retires back to filler, with the physical file
//! restore deferred by a guard interval because the playout tool's segment
//! clock can lag the filesystem-level segment boundary by up to roughly one
//! second.

use crate::error::{Error, Result};
use crate::playout::engine::Engine;
use crate::playout::events::EngineEvent;
use crate::progress;
use crate::status;
use crate::timeline;
use std::io::ErrorKind;
use tracing::{debug, trace, warn};

impl Engine {
    /// Process one raw stderr line from the playout process.
    ///
    /// Lines without the timer marker, or with an undecodable token, are
    /// ignored. A timer that moves backwards is fatal: the playout clock
    /// regressing means the timeline can no longer be trusted to
    /// self-correct.
    pub fn handle_progress(&mut self, line: &str) -> Result<()> {
        let Some(token) = progress::extract_timer(line) else {
            return Ok(());
        };
        let Ok(decoded) = progress::decode_elapsed(token) else {
            trace!("undecodable timer token in progress line, ignoring");
            return Ok(());
        };

        let delta = decoded as i64 - self.state.transcoded_time as i64;
        if delta < 0 {
            return Err(Error::ClockRegression(delta));
        }
        let delta = delta as u64;

        self.state.transcoded_time = decoded;
        // Modulo handles normal loop wraparound; the outer max covers a delta
        // that alone exceeds one full loop period
        self.state.elapsed_time =
            ((self.state.elapsed_time + delta) % self.state.total_loop_time).max(delta);

        let resolved_index = timeline::resolve_index(&self.slots, self.state.elapsed_time);
        let resolved = self.slots[resolved_index].clone();

        if !self.state.current_slot.is_default && self.state.current_slot.index != resolved.index {
            self.retire_current(resolved.index);
        }

        debug!(
            "\n{}",
            status::render(&self.slots, &self.state, resolved.index)
        );

        self.state.current_slot = resolved;
        Ok(())
    }

    /// Retire the slot the play head just left, reverting its ring entry to
    /// filler metadata and scheduling the deferred file restore.
    ///
    /// The retiring slot keeps its own `filename` and `index`. When the
    /// retired ordinal precedes the newly resolved one, the duration delta is
    /// also applied to `elapsed_time` so the play head's absolute position
    /// stays consistent under the reshaped timeline.
    fn retire_current(&mut self, resolved_index: usize) {
        let retired = self.state.current_slot.clone();

        let slot = &mut self.slots[retired.index];
        slot.size = self.filler.size;
        slot.duration = self.filler.duration;
        slot.is_default = true;
        slot.source = self.filler.filename.clone();
        slot.pending_reset = true;
        slot.reset_generation += 1;
        let generation = slot.reset_generation;

        timeline::recompute_timestamps(&mut self.slots);

        let delta = self.filler.duration as i64 - retired.duration as i64;
        self.state.total_loop_time = self.state.total_loop_time.saturating_add_signed(delta);
        if resolved_index > retired.index {
            self.state.elapsed_time = self.state.elapsed_time.saturating_add_signed(delta);
        }

        debug!(
            slot = retired.index,
            generation, "slot retired, reset scheduled"
        );
        self.schedule_reset(retired.index, generation);
    }

    /// Schedule the deferred filler restore for a retiring slot.
    ///
    /// Delivered through the engine channel after the guard interval, so the
    /// restore runs inside the single-consumer loop like every other
    /// mutation. The carried generation makes the timer cancellable: a slot
    /// reassigned in the meantime no longer matches and the event no-ops, as
    /// does an event whose channel closed during shutdown.
    fn schedule_reset(&self, index: usize, generation: u64) {
        let tx = self.events_tx.clone();
        let grace = self.config.reset_grace();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = tx.send(EngineEvent::ResetDue { index, generation });
        });
    }

    /// Overwrite a retiring slot's backing file with filler content and clear
    /// its pending flag, unless the slot has moved on since the reset was
    /// scheduled.
    pub async fn handle_reset_due(&mut self, index: usize, generation: u64) -> Result<()> {
        let (stale, filename) = {
            let slot = &self.slots[index];
            (
                !slot.pending_reset || slot.reset_generation != generation,
                slot.filename.clone(),
            )
        };
        if stale {
            debug!(slot = index, "stale reset timer, ignoring");
            return Ok(());
        }

        match tokio::fs::copy(&self.filler.filename, &filename).await {
            Ok(_) => {
                self.slots[index].pending_reset = false;
                debug!(slot = index, "slot file restored from filler");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                // Teardown can outrun a timer; a vanished target is a no-op
                warn!(slot = index, "reset target unavailable: {e}");
                Ok(())
            }
            Err(e) => Err(Error::Reset { index, source: e }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::playout::engine::Engine;
    use crate::probe::{MediaProbe, Prober};
    use crate::timeline::{test_slot, Slot};
    use std::path::PathBuf;

    fn filler() -> MediaProbe {
        MediaProbe {
            filename: PathBuf::from("default.slot.flv"),
            size: 1000,
            duration: 1000,
        }
    }

    fn engine(slots: Vec<Slot>) -> Engine {
        Engine::from_parts(
            Config::default(),
            Prober::new("ffprobe"),
            filler(),
            slots,
        )
    }

    fn occupied(index: usize, duration: u64) -> Slot {
        let mut slot = test_slot(index, duration);
        slot.is_default = false;
        slot.size = 9999;
        slot.source = PathBuf::from(format!("injected{index}.flv"));
        slot
    }

    #[tokio::test]
    async fn test_progress_advances_play_head() {
        let mut engine = engine(vec![
            test_slot(0, 1000),
            test_slot(1, 2000),
            test_slot(2, 1500),
        ]);

        engine.handle_progress("time=00:00:00.50").unwrap();
        assert_eq!(engine.state().elapsed_time, 500);
        assert_eq!(engine.state().current_slot.index, 0);

        engine.handle_progress("time=00:00:03.20").unwrap();
        assert_eq!(engine.state().elapsed_time, 3200);
        assert_eq!(engine.state().current_slot.index, 2);
    }

    #[tokio::test]
    async fn test_lines_without_marker_are_ignored() {
        let mut engine = engine(vec![test_slot(0, 1000), test_slot(1, 1000)]);

        engine
            .handle_progress("Press [q] to stop, [?] for help")
            .unwrap();
        engine.handle_progress("size= 0kB time=N/A bitrate=N/A").unwrap();

        assert_eq!(engine.state().transcoded_time, 0);
        assert_eq!(engine.state().elapsed_time, 0);
    }

    #[tokio::test]
    async fn test_clock_regression_is_fatal() {
        let mut engine = engine(vec![test_slot(0, 1000), test_slot(1, 1000)]);

        engine.handle_progress("time=00:00:01.00").unwrap();
        let err = engine.handle_progress("time=00:00:00.50").unwrap_err();
        assert!(matches!(err, Error::ClockRegression(-500)));
    }

    #[tokio::test]
    async fn test_wraparound_with_oversized_delta() {
        let mut engine = engine(vec![
            test_slot(0, 1000),
            test_slot(1, 2000),
            test_slot(2, 1500),
        ]);

        engine.handle_progress("time=00:00:04.00").unwrap();
        assert_eq!(engine.state().elapsed_time, 4000);

        // delta 1000 wraps the 4500 ms loop: max((4000+1000) % 4500, 1000)
        engine.handle_progress("time=00:00:05.00").unwrap();
        assert_eq!(engine.state().elapsed_time, 1000);
    }

    #[tokio::test]
    async fn test_retirement_after_play_head_leaves_injected_slot() {
        let mut engine = engine(vec![
            test_slot(0, 1000),
            occupied(1, 2000),
            test_slot(2, 1000),
        ]);
        assert_eq!(engine.state().total_loop_time, 4000);

        // Into the injected slot
        engine.handle_progress("time=00:00:01.50").unwrap();
        assert_eq!(engine.state().current_slot.index, 1);
        assert!(!engine.state().current_slot.is_default);

        // Past it: slot 1 retires to filler metadata
        engine.handle_progress("time=00:00:03.50").unwrap();

        let slot = &engine.slots()[1];
        assert!(slot.is_default);
        assert!(slot.pending_reset);
        assert_eq!(slot.duration, 1000);
        assert_eq!(slot.filename, PathBuf::from("slot1.flv"));
        assert_eq!(engine.state().total_loop_time, 3000);
        // Retired ordinal precedes the resolved one, so the -1000 ms delta
        // also lands on elapsed_time: 3500 - 1000
        assert_eq!(engine.state().elapsed_time, 2500);
        assert_eq!(engine.state().current_slot.index, 2);
        assert_eq!(engine.slots()[1].timestamp, 1000);
        assert_eq!(engine.slots()[2].timestamp, 2000);
    }

    #[tokio::test]
    async fn test_retirement_of_slot_after_play_head_keeps_elapsed() {
        // Injected content in the last slot; play head wraps back to slot 0
        let mut engine = engine(vec![
            test_slot(0, 1000),
            test_slot(1, 1000),
            occupied(2, 2000),
        ]);
        assert_eq!(engine.state().total_loop_time, 4000);

        engine.handle_progress("time=00:00:03.00").unwrap();
        assert_eq!(engine.state().current_slot.index, 2);
        engine.handle_progress("time=00:00:03.90").unwrap();
        assert_eq!(engine.state().current_slot.index, 2);

        // Wrap to slot 0; retired ordinal 2 follows resolved ordinal 0
        engine.handle_progress("time=00:00:04.50").unwrap();
        assert_eq!(engine.state().current_slot.index, 0);
        assert!(engine.slots()[2].is_default);
        assert_eq!(engine.state().total_loop_time, 3000);
        assert_eq!(engine.state().elapsed_time, 600);
    }

    #[tokio::test]
    async fn test_filler_slot_change_does_not_retire() {
        let mut engine = engine(vec![test_slot(0, 1000), test_slot(1, 1000)]);

        engine.handle_progress("time=00:00:01.50").unwrap();

        assert_eq!(engine.state().current_slot.index, 1);
        assert!(!engine.slots()[0].pending_reset);
        assert_eq!(engine.state().total_loop_time, 2000);
    }

    #[tokio::test]
    async fn test_reset_due_restores_file_and_clears_flag() {
        let dir = tempfile::tempdir().unwrap();
        let filler_path = dir.path().join("default.slot.flv");
        let slot_path = dir.path().join("slot1.flv");
        tokio::fs::write(&filler_path, b"filler-bytes").await.unwrap();
        tokio::fs::write(&slot_path, b"injected-bytes").await.unwrap();

        let mut slots = vec![test_slot(0, 1000), occupied(1, 2000), test_slot(2, 1000)];
        slots[1].filename = slot_path.clone();
        let mut engine = Engine::from_parts(
            Config::default(),
            Prober::new("ffprobe"),
            MediaProbe {
                filename: filler_path.clone(),
                size: 1000,
                duration: 1000,
            },
            slots,
        );

        engine.handle_progress("time=00:00:01.50").unwrap();
        engine.handle_progress("time=00:00:03.50").unwrap();
        assert!(engine.slots()[1].pending_reset);

        let generation = engine.slots()[1].reset_generation;
        engine.handle_reset_due(1, generation).await.unwrap();

        assert!(!engine.slots()[1].pending_reset);
        let restored = tokio::fs::read(&slot_path).await.unwrap();
        assert_eq!(restored, b"filler-bytes");
    }

    #[tokio::test]
    async fn test_stale_reset_generation_is_a_noop() {
        let dir = tempfile::tempdir().unwrap();
        let slot_path = dir.path().join("slot1.flv");
        tokio::fs::write(&slot_path, b"new-content").await.unwrap();

        let mut slots = vec![test_slot(0, 1000), occupied(1, 2000)];
        slots[1].filename = slot_path.clone();
        slots[1].pending_reset = true;
        slots[1].reset_generation = 3;
        let mut engine = engine(slots);

        // A timer scheduled for generation 2 fires after the slot moved on
        engine.handle_reset_due(1, 2).await.unwrap();

        assert!(engine.slots()[1].pending_reset);
        let content = tokio::fs::read(&slot_path).await.unwrap();
        assert_eq!(content, b"new-content");
    }

    #[tokio::test]
    async fn test_reset_with_missing_target_is_a_noop() {
        let mut slots = vec![test_slot(0, 1000), test_slot(1, 1000)];
        slots[1].pending_reset = true;
        slots[1].reset_generation = 1;
        slots[1].filename = PathBuf::from("/nonexistent/slot1.flv");
        let mut engine = engine(slots);

        engine.handle_reset_due(1, 1).await.unwrap();
        assert!(engine.slots()[1].pending_reset);
    }
}
