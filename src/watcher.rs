//! Queue directory watcher
//!
//! Polls the queue directory and reports a file only after its size has held
//! still for the configured stability interval, so a source still being
//! copied in is never observed half-written. Files already present when the
//! watcher starts are not reported.

use crate::playout::events::EngineEvent;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

struct Candidate {
    size: u64,
    stable_since: Instant,
    reported: bool,
}

/// Spawn the watcher task. It runs until the engine side of the channel is
/// dropped or it is aborted.
pub fn spawn(
    queue_directory: PathBuf,
    stability: std::time::Duration,
    poll: std::time::Duration,
    tx: UnboundedSender<EngineEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut seen: HashMap<PathBuf, Candidate> = HashMap::new();
        let mut initial_scan = true;
        let mut ticker = tokio::time::interval(poll);

        loop {
            ticker.tick().await;

            let mut entries = match tokio::fs::read_dir(&queue_directory).await {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("cannot read queue directory: {e}");
                    continue;
                }
            };

            let mut present = Vec::new();
            while let Ok(Some(entry)) = entries.next_entry().await {
                let path = entry.path();
                let size = match entry.metadata().await {
                    Ok(meta) if meta.is_file() => meta.len(),
                    _ => continue,
                };
                present.push(path.clone());

                match seen.get_mut(&path) {
                    None => {
                        seen.insert(
                            path,
                            Candidate {
                                size,
                                stable_since: Instant::now(),
                                // Files predating the watcher are never reported
                                reported: initial_scan,
                            },
                        );
                    }
                    Some(candidate) if candidate.size != size => {
                        candidate.size = size;
                        candidate.stable_since = Instant::now();
                    }
                    Some(candidate) => {
                        if !candidate.reported && candidate.stable_since.elapsed() >= stability {
                            candidate.reported = true;
                            debug!("queued file stabilized: {}", path.display());
                            if tx.send(EngineEvent::Arrival(path)).is_err() {
                                return;
                            }
                        }
                    }
                }
            }

            seen.retain(|path, _| present.contains(path));
            initial_scan = false;
        }
    })
}
