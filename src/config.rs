//! Configuration loading and root folder resolution
//!
//! Resolution follows the usual priority order: command-line argument,
//! then environment variable (both handled by clap), then the TOML config
//! file, then compiled defaults. All relative paths in the file are anchored
//! at the resolved root folder.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Broadcast configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base directory all relative paths are anchored at
    pub root: PathBuf,

    /// Directory watched for arriving source files
    pub queue_directory: PathBuf,

    /// A queued file's size must hold still this long before it is reported
    pub queue_stability_ms: u64,

    /// Queue directory polling interval
    pub queue_poll_ms: u64,

    /// ffprobe-style metadata extraction command
    pub probe_command: String,

    /// Directory holding the ring's backing files
    pub slots_directory: PathBuf,

    /// Slot filename prefix (`slot` in `slot17.flv`)
    pub slot_prefix: String,

    /// Slot filename extension, dot included
    pub slot_extension: String,

    /// Canonical filler file
    pub filler_path: PathBuf,

    /// Name of the index-list file consumed by the playout tool
    pub list_name: String,

    /// Number of slots in the ring
    pub ring_size: usize,

    /// Guard interval before a retiring slot's file is physically overwritten;
    /// the playout tool's segment clock can lag the filesystem boundary by up
    /// to roughly one second
    pub reset_grace_ms: u64,

    /// Command spawned for the looping broadcast
    pub playout_command: String,

    /// Command spawned for playlist passthrough re-streaming
    pub restream_command: String,

    /// Stream ingest endpoint handed to the playout command
    pub ingest_endpoint: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::new(),
            queue_directory: PathBuf::from("stream.queue"),
            queue_stability_ms: 2_500,
            queue_poll_ms: 100,
            probe_command: "ffprobe".to_string(),
            slots_directory: PathBuf::from("stream.slots"),
            slot_prefix: "slot".to_string(),
            slot_extension: ".flv".to_string(),
            filler_path: PathBuf::from("default.slot.flv"),
            list_name: ".slots.list".to_string(),
            ring_size: 40,
            reset_grace_ms: 5_000,
            playout_command: "scripts/stream.start.sh".to_string(),
            restream_command: "scripts/restream.playlist.sh".to_string(),
            ingest_endpoint: String::new(),
        }
    }
}

impl Config {
    /// Resolve the effective configuration.
    ///
    /// Loads the TOML config file when present (`$XDG_CONFIG_HOME/loopcast/
    /// config.toml` or the platform equivalent), then applies the root folder
    /// priority: CLI/env argument, config file, current directory. Relative
    /// paths and script-style commands are anchored at the resolved root.
    pub fn resolve(cli_root: Option<&Path>) -> Result<Config> {
        let mut config = match config_file_path() {
            Some(path) if path.exists() => {
                let raw = std::fs::read_to_string(&path)?;
                toml::from_str::<Config>(&raw)
                    .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
            }
            _ => Config::default(),
        };

        let root = match cli_root {
            Some(path) => path.to_path_buf(),
            None if !config.root.as_os_str().is_empty() => config.root.clone(),
            None => std::env::current_dir()?,
        };

        if config.ingest_endpoint.is_empty() {
            if let Ok(endpoint) = std::env::var("LOOPCAST_INGEST_ENDPOINT") {
                config.ingest_endpoint = endpoint;
            }
        }

        if config.ring_size == 0 {
            return Err(Error::Config("ring_size must be at least 1".to_string()));
        }

        config.queue_directory = anchor(&root, &config.queue_directory);
        config.slots_directory = anchor(&root, &config.slots_directory);
        config.filler_path = anchor(&root, &config.filler_path);
        config.playout_command = anchor_command(&root, &config.playout_command);
        config.restream_command = anchor_command(&root, &config.restream_command);
        config.probe_command = anchor_command(&root, &config.probe_command);
        config.root = root;

        Ok(config)
    }

    /// Filename of the slot at `index` (`slot17.flv`)
    pub fn slot_file_name(&self, index: usize) -> String {
        format!("{}{}{}", self.slot_prefix, index, self.slot_extension)
    }

    /// Full path of the slot at `index`
    pub fn slot_path(&self, index: usize) -> PathBuf {
        self.slots_directory.join(self.slot_file_name(index))
    }

    /// Full path of the index-list file
    pub fn list_path(&self) -> PathBuf {
        self.slots_directory.join(&self.list_name)
    }

    pub fn queue_stability(&self) -> Duration {
        Duration::from_millis(self.queue_stability_ms)
    }

    pub fn queue_poll(&self) -> Duration {
        Duration::from_millis(self.queue_poll_ms)
    }

    pub fn reset_grace(&self) -> Duration {
        Duration::from_millis(self.reset_grace_ms)
    }
}

fn anchor(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Bare command names stay bare so they resolve through PATH; anything with a
/// path separator is anchored like a file path.
fn anchor_command(root: &Path, command: &str) -> String {
    if command.contains(std::path::MAIN_SEPARATOR) && !Path::new(command).is_absolute() {
        root.join(command).to_string_lossy().into_owned()
    } else {
        command.to_string()
    }
}

/// Platform config file location (`~/.config/loopcast/config.toml` on Linux)
fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("loopcast").join("config.toml"))
}
