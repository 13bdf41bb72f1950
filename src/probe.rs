//! Media probing via the external ffprobe tool
//!
//! Extracts `(filename, size, duration)` from media files by invoking an
//! ffprobe-style command and parsing its JSON output. Three call patterns are
//! supported: the canonical filler file, one arbitrary incoming file, and
//! every slot file in the ring directory, the last sorted by the decimal
//! index embedded in each filename so probe results align positionally with
//! ring ordinals.

use crate::error::{Error, Result};
use crate::timeline::Slot;
use futures::future::join_all;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// ffprobe JSON envelope (`-show_entries format=...`)
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

/// `format` section of the ffprobe output; size and duration arrive as strings
#[derive(Debug, Deserialize)]
struct ProbeFormat {
    filename: String,
    size: String,
    duration: String,
}

/// Probed metadata of one media file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaProbe {
    /// Path the tool was invoked on, as echoed back in its output
    pub filename: PathBuf,

    /// Byte size
    pub size: u64,

    /// Duration in milliseconds, rounded to the nearest one
    pub duration: u64,
}

/// Handle to the external probe tool
#[derive(Debug, Clone)]
pub struct Prober {
    command: String,
}

impl Prober {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Run the probe tool on one file and parse its JSON output.
    async fn probe(&self, path: &Path) -> Result<MediaProbe> {
        let output = Command::new(&self.command)
            .args([
                "-v",
                "error",
                "-show_entries",
                "format=filename,size,duration",
                "-print_format",
                "json",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| Error::Probe {
                path: path.to_path_buf(),
                reason: format!("failed to run {}: {e}", self.command),
            })?;

        if !output.status.success() {
            return Err(Error::Probe {
                path: path.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let parsed: ProbeOutput =
            serde_json::from_slice(&output.stdout).map_err(|e| Error::Probe {
                path: path.to_path_buf(),
                reason: format!("unparseable probe output: {e}"),
            })?;

        let size = parsed.format.size.parse::<u64>().map_err(|_| Error::Probe {
            path: path.to_path_buf(),
            reason: format!("non-numeric size {:?}", parsed.format.size),
        })?;

        let seconds = parsed
            .format
            .duration
            .parse::<f64>()
            .map_err(|_| Error::Probe {
                path: path.to_path_buf(),
                reason: format!("non-numeric duration {:?}", parsed.format.duration),
            })?;

        Ok(MediaProbe {
            filename: PathBuf::from(parsed.format.filename),
            size,
            duration: (seconds * 1000.0).round() as u64,
        })
    }

    /// Probe the canonical filler file.
    ///
    /// The tool echoing back a different path than the one requested means
    /// the probe cannot be trusted; the timeline is built on this result, so
    /// that is a startup failure.
    pub async fn probe_filler(&self, path: &Path) -> Result<MediaProbe> {
        let probe = self.probe(path).await?;
        if probe.filename != path {
            return Err(Error::Probe {
                path: path.to_path_buf(),
                reason: format!("filler probe returned mismatched path {:?}", probe.filename),
            });
        }
        Ok(probe)
    }

    /// Probe one arbitrary incoming file.
    pub async fn probe_incoming(&self, path: &Path) -> Result<MediaProbe> {
        self.probe(path).await
    }

    /// Probe every slot file in the ring directory and build the ring.
    ///
    /// Slot filenames must follow the `prefix + decimal index + extension`
    /// convention; anything else with the slot extension is a startup error,
    /// since a misnamed file would silently misalign probe results and ring
    /// ordinals. Results are sorted by embedded index and checked for
    /// contiguity. A slot is filler when its byte size equals the filler's.
    pub async fn probe_ring(
        &self,
        directory: &Path,
        prefix: &str,
        extension: &str,
        filler: &MediaProbe,
    ) -> Result<Vec<Slot>> {
        let mut indexed: Vec<(usize, PathBuf)> = Vec::new();
        let mut entries = tokio::fs::read_dir(directory).await?;

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(extension) {
                continue;
            }
            let stem = &name[..name.len() - extension.len()];
            let index = stem
                .strip_prefix(prefix)
                .and_then(|s| s.parse::<usize>().ok())
                .ok_or_else(|| Error::SlotName(entry.path()))?;
            indexed.push((index, entry.path()));
        }

        indexed.sort_by_key(|(index, _)| *index);
        for (position, (index, path)) in indexed.iter().enumerate() {
            if *index != position {
                return Err(Error::SlotName(path.clone()));
            }
        }

        let probes = join_all(indexed.iter().map(|(_, path)| self.probe(path))).await;

        let mut slots = Vec::with_capacity(indexed.len());
        for ((index, path), probe) in indexed.into_iter().zip(probes) {
            let probe = probe?;
            slots.push(Slot {
                filename: path,
                size: probe.size,
                duration: probe.duration,
                is_default: probe.size == filler.size,
                index,
                source: probe.filename,
                timestamp: 0,
                pending_reset: false,
                reset_generation: 0,
            });
        }

        Ok(slots)
    }
}
