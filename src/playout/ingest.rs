//! Queue ingestion - assigning arriving files to free slots
//!
//! An arrival is probed, matched to an eligible slot (filler, not mid-reset,
//! preferably after the play head), copied over that slot's backing file, and
//! spliced into the timeline. The whole handler runs inside the engine's
//! single-consumer loop, so progress reports queuing up behind it can never
//! resolve the play head against a half-updated ring.

use crate::error::Result;
use crate::playout::engine::Engine;
use crate::probe::MediaProbe;
use crate::timeline;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info};

impl Engine {
    /// Process one arrival from the queue directory.
    ///
    /// Files without the slot extension are ignored. A probe failure is
    /// fatal: the watcher only reports size-stable files, so an unreadable
    /// arrival is an environment problem, not transient noise.
    pub async fn handle_arrival(&mut self, path: &Path) -> Result<()> {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        let matches = name
            .as_deref()
            .map(|n| n.ends_with(&self.config.slot_extension))
            .unwrap_or(false);
        if !matches {
            debug!("ignoring queued file without slot extension: {}", path.display());
            return Ok(());
        }

        let incoming = self.prober.probe_incoming(path).await?;
        self.assign_incoming(incoming).await
    }

    /// Splice probed content into the first eligible slot.
    ///
    /// No eligible slot means the arrival is discarded: the ring has no spare
    /// capacity and applies no queuing or backpressure by design.
    pub(super) async fn assign_incoming(&mut self, incoming: MediaProbe) -> Result<()> {
        let Some(index) = timeline::find_free_slot(&self.slots, self.state.current_slot.index)
        else {
            debug!(
                "no slots available, discarding {}",
                incoming.filename.display()
            );
            return Ok(());
        };

        let destination = self.slots[index].filename.clone();
        tokio::fs::copy(&incoming.filename, &destination).await?;

        let slot = &mut self.slots[index];
        slot.size = incoming.size;
        slot.duration = incoming.duration;
        slot.is_default = false;
        slot.source = incoming.filename.clone();
        slot.reset_generation += 1;

        timeline::recompute_timestamps(&mut self.slots);

        let delta = incoming.duration as i64 - self.filler.duration as i64;
        self.state.total_loop_time = self.state.total_loop_time.saturating_add_signed(delta);
        // Content inserted before the play head shifts its absolute position
        if index < self.state.current_slot.index {
            self.state.elapsed_time = self.state.elapsed_time.saturating_add_signed(delta);
        }

        match tokio::fs::remove_file(&incoming.filename).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        info!(
            "queued {} into slot {} ({} ms)",
            incoming.filename.display(),
            index,
            incoming.duration
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::playout::engine::Engine;
    use crate::probe::Prober;
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
        Engine::from_parts(Config::default(), Prober::new("ffprobe"), filler(), slots)
    }

    async fn incoming_file(dir: &Path, duration: u64) -> MediaProbe {
        let path = dir.join("arrival.flv");
        tokio::fs::write(&path, b"arrival-bytes").await.unwrap();
        MediaProbe {
            filename: path,
            size: 13,
            duration,
        }
    }

    #[tokio::test]
    async fn test_assignment_to_first_slot_after_play_head() {
        let dir = tempfile::tempdir().unwrap();
        let slot_path = dir.path().join("slot1.flv");
        tokio::fs::write(&slot_path, b"filler-bytes").await.unwrap();

        let mut slots = vec![test_slot(0, 1000), test_slot(1, 1000)];
        slots[1].filename = slot_path.clone();
        let mut engine = engine(slots);
        assert_eq!(engine.state().total_loop_time, 2000);

        let incoming = incoming_file(dir.path(), 500).await;
        let source = incoming.filename.clone();
        engine.assign_incoming(incoming).await.unwrap();

        let slot = &engine.slots()[1];
        assert!(!slot.is_default);
        assert_eq!(slot.duration, 500);
        assert_eq!(slot.size, 13);
        assert_eq!(slot.filename, slot_path);
        assert_eq!(engine.state().total_loop_time, 1500);
        assert_eq!(engine.slots()[0].timestamp, 0);
        assert_eq!(engine.slots()[1].timestamp, 1000);
        // Play head at slot 0, insertion after it: elapsed untouched
        assert_eq!(engine.state().elapsed_time, 0);

        // Slot file now carries the arrival; the source is gone
        let content = tokio::fs::read(&slot_path).await.unwrap();
        assert_eq!(content, b"arrival-bytes");
        assert!(!source.exists());
    }

    #[tokio::test]
    async fn test_assignment_before_play_head_shifts_elapsed() {
        let dir = tempfile::tempdir().unwrap();
        let slot_path = dir.path().join("slot0.flv");
        tokio::fs::write(&slot_path, b"filler-bytes").await.unwrap();

        let mut slots = vec![test_slot(0, 1000), test_slot(1, 1000), test_slot(2, 1000)];
        slots[0].filename = slot_path;
        slots[1].is_default = false;
        slots[2].is_default = false;
        let mut engine = engine(slots);

        // Move the play head into slot 2
        engine.handle_progress("time=00:00:02.50").unwrap();
        assert_eq!(engine.state().current_slot.index, 2);

        let incoming = incoming_file(dir.path(), 3000).await;
        engine.assign_incoming(incoming).await.unwrap();

        // Only slot 0 was free; it precedes the play head
        assert!(!engine.slots()[0].is_default);
        assert_eq!(engine.state().total_loop_time, 5000);
        assert_eq!(engine.state().elapsed_time, 4500);
        assert_eq!(engine.slots()[2].timestamp, 4000);
    }

    #[tokio::test]
    async fn test_full_ring_discards_arrival() {
        let dir = tempfile::tempdir().unwrap();
        let mut slots = vec![test_slot(0, 1000), test_slot(1, 1000)];
        slots[0].is_default = false;
        slots[1].pending_reset = true;
        let mut engine = engine(slots);
        let before_slots = engine.slots().to_vec();

        let incoming = incoming_file(dir.path(), 500).await;
        let source = incoming.filename.clone();
        engine.assign_incoming(incoming).await.unwrap();

        assert_eq!(engine.slots(), &before_slots[..]);
        assert_eq!(engine.state().total_loop_time, 2000);
        assert_eq!(engine.state().elapsed_time, 0);
        // The discard path leaves the source file in place
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_arrival_with_wrong_extension_is_ignored() {
        let mut engine = engine(vec![test_slot(0, 1000), test_slot(1, 1000)]);
        engine
            .handle_arrival(Path::new("/queue/notes.txt"))
            .await
            .unwrap();
        assert_eq!(engine.state().total_loop_time, 2000);
        assert!(engine.slots().iter().all(|s| s.is_default));
    }
}
