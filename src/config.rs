//! TOML configuration.
//!
//! Every field has a default, so an empty file (or no file at all) is a valid
//! configuration. Durations are written as plain integers with the unit in the key.
//!
//! ```toml
//! [stream]
//! transcript = "chat.log"
//! poll_interval_ms = 3000
//!
//! [device]
//! rom = "game.gbc"
//!
//! [dispatch]
//! repeat_policy = "suppress"
//!
//! [snapshot]
//! path = "./saves/state.sav"
//! interval_secs = 1800
//! ```

use crate::dedup::RepeatPolicy;
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::message::HousekeepingFilter;
use crate::poller::PollerSettings;
use crate::snapshot::{SnapshotStore, DEFAULT_MIN_SNAPSHOT_BYTES};
use crate::worker::WorkerSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub stream: StreamConfig,
    pub device: DeviceConfig,
    pub dispatch: DispatchConfig,
    pub snapshot: SnapshotConfig,
    pub log: LogConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Chat transcript read by the transcript stream.
    pub transcript: PathBuf,
    pub tail_len: usize,
    pub poll_interval_ms: u64,
    pub fetch_timeout_ms: u64,
    pub startup_timeout_ms: u64,
    /// Extra housekeeping substrings on top of the built-in ones.
    pub housekeeping: Vec<String>,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            transcript: PathBuf::from("chat.log"),
            tail_len: 5,
            poll_interval_ms: 4_000,
            fetch_timeout_ms: 10_000,
            startup_timeout_ms: 10_000,
            housekeeping: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Program image loaded into the console.
    pub rom: PathBuf,
    pub settle_ticks: u32,
    pub tick_interval_ms: u64,
    pub speed: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            rom: PathBuf::from("game.gbc"),
            settle_ticks: 60,
            tick_interval_ms: 10,
            speed: 1,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub hold_ms: u64,
    pub gap_ms: u64,
    pub repeat_policy: RepeatPolicy,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            hold_ms: 350,
            gap_ms: 75,
            repeat_policy: RepeatPolicy::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub path: PathBuf,
    pub interval_secs: u64,
    /// Stored snapshots smaller than this are treated as corrupt.
    pub min_bytes: usize,
    pub save_on_exit: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./saves/state.sav"),
            interval_secs: 30 * 60,
            min_bytes: DEFAULT_MIN_SNAPSHOT_BYTES,
            save_on_exit: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `tracing-subscriber` filter directive; `RUST_LOG` wins when set.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream.tail_len == 0 {
            return Err(Error::Config("stream.tail_len must be at least 1".into()));
        }
        if self.stream.poll_interval_ms == 0 {
            return Err(Error::Config("stream.poll_interval_ms must be positive".into()));
        }
        if self.stream.fetch_timeout_ms == 0 {
            return Err(Error::Config("stream.fetch_timeout_ms must be positive".into()));
        }
        if self.dispatch.hold_ms == 0 {
            return Err(Error::Config("dispatch.hold_ms must be positive".into()));
        }
        if self.snapshot.interval_secs == 0 {
            return Err(Error::Config("snapshot.interval_secs must be positive".into()));
        }
        Ok(())
    }

    pub fn poller_settings(&self) -> PollerSettings {
        PollerSettings {
            tail_len: self.stream.tail_len,
            poll_interval: Duration::from_millis(self.stream.poll_interval_ms),
            fetch_timeout: Duration::from_millis(self.stream.fetch_timeout_ms),
            startup_timeout: Duration::from_millis(self.stream.startup_timeout_ms),
            repeat_policy: self.dispatch.repeat_policy,
        }
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            settle_ticks: self.device.settle_ticks,
            tick_interval: Duration::from_millis(self.device.tick_interval_ms),
            snapshot_interval: Duration::from_secs(self.snapshot.interval_secs),
            save_on_exit: self.snapshot.save_on_exit,
            speed: self.device.speed,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            Duration::from_millis(self.dispatch.hold_ms),
            Duration::from_millis(self.dispatch.gap_ms),
        )
    }

    pub fn housekeeping(&self) -> HousekeepingFilter {
        HousekeepingFilter::new(self.stream.housekeeping.iter().cloned())
    }

    pub fn snapshot_store(&self) -> SnapshotStore {
        SnapshotStore::new(&self.snapshot.path).with_min_bytes(self.snapshot.min_bytes)
    }
}
