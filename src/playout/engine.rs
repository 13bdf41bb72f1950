//! Broadcast engine - construction, ring initialization, and the event loop
//!
//! The engine owns the slot ring and the broadcast state. It is driven
//! entirely by `EngineEvent`s: progress lines move the play head and retire
//! slots (`sync`), arrivals inject new content (`ingest`), reset-due events
//! restore filler files after their guard interval. Handlers run one at a
//! time to completion, so no event can ever observe a half-mutated timeline.

use crate::config::Config;
use crate::error::Result;
use crate::playout::events::EngineEvent;
use crate::playout::state::BroadcastState;
use crate::probe::{MediaProbe, Prober};
use crate::timeline::{self, Slot};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Live broadcast engine
pub struct Engine {
    pub(super) config: Config,
    pub(super) prober: Prober,

    /// Probe of the canonical filler file; retired slots revert to this
    pub(super) filler: MediaProbe,

    /// The slot ring, mutated in place for the life of the process
    pub(super) slots: Vec<Slot>,

    pub(super) state: BroadcastState,

    /// Producer handle cloned out to event sources and reset timers
    pub(super) events_tx: mpsc::UnboundedSender<EngineEvent>,
    events_rx: mpsc::UnboundedReceiver<EngineEvent>,
}

impl Engine {
    /// Initialize the broadcast: restore every slot file from filler, write
    /// the index-list file, probe filler and ring, and compute the timeline.
    ///
    /// The slot count, the directory contents, and the list file all derive
    /// from `ring_size` here, so the playout tool can never see a list that
    /// disagrees with the files on disk.
    pub async fn init(config: Config) -> Result<Self> {
        info!("initializing streaming slots ...");
        for index in 0..config.ring_size {
            tokio::fs::copy(&config.filler_path, config.slot_path(index)).await?;
        }

        let list: String = (0..config.ring_size)
            .map(|index| format!("file '{}'\n", config.slot_file_name(index)))
            .collect();
        tokio::fs::write(config.list_path(), list).await?;
        info!("streaming slots initialization complete");

        let prober = Prober::new(&config.probe_command);
        let filler = prober.probe_filler(&config.filler_path).await?;
        let slots = prober
            .probe_ring(
                &config.slots_directory,
                &config.slot_prefix,
                &config.slot_extension,
                &filler,
            )
            .await?;

        if slots.len() != config.ring_size {
            return Err(crate::error::Error::Config(format!(
                "slots directory holds {} ring files, expected {}",
                slots.len(),
                config.ring_size
            )));
        }

        Ok(Self::from_parts(config, prober, filler, slots))
    }

    /// Assemble an engine over an already probed ring.
    ///
    /// `init` is the production path; this seam exists for embedding and for
    /// driving the engine in tests without the external probe tool.
    pub fn from_parts(
        config: Config,
        prober: Prober,
        filler: MediaProbe,
        mut slots: Vec<Slot>,
    ) -> Self {
        let total = timeline::recompute_timestamps(&mut slots);
        let state = BroadcastState::new(&slots, total);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            prober,
            filler,
            slots,
            state,
            events_tx,
            events_rx,
        }
    }

    /// Producer handle for event sources (stderr reader, watcher, launcher).
    pub fn event_sender(&self) -> mpsc::UnboundedSender<EngineEvent> {
        self.events_tx.clone()
    }

    /// Current ring contents.
    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Current broadcast state.
    pub fn state(&self) -> &BroadcastState {
        &self.state
    }

    /// Consume events until the playout process exits or every producer is
    /// gone. Returns an error only on unrecoverable desynchronization.
    pub async fn run(&mut self) -> Result<()> {
        while let Some(event) = self.events_rx.recv().await {
            match event {
                EngineEvent::Progress(line) => self.handle_progress(&line)?,
                EngineEvent::Arrival(path) => self.handle_arrival(&path).await?,
                EngineEvent::ResetDue { index, generation } => {
                    self.handle_reset_due(index, generation).await?
                }
                EngineEvent::PlayoutExited { code, signal } => {
                    debug!(?code, ?signal, "playout exit reached engine, stopping");
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Restore a broadcast directory layout to its idle state: purge any files
/// still queued and overwrite every slot file with filler.
///
/// Only safe with no playout process running over the slots directory.
pub async fn reset_broadcast(config: &Config) -> Result<()> {
    let mut entries = tokio::fs::read_dir(&config.queue_directory).await?;
    while let Some(entry) = entries.next_entry().await? {
        if let Err(e) = tokio::fs::remove_file(entry.path()).await {
            warn!("could not remove queued file {}: {e}", entry.path().display());
        }
    }

    for index in 0..config.ring_size {
        tokio::fs::copy(&config.filler_path, config.slot_path(index)).await?;
    }

    info!("queue purged, {} slots restored from filler", config.ring_size);
    Ok(())
}
