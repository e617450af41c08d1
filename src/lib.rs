//! chatpad: let a chat room play a handheld console.
//!
//! Lines posted in a chat are polled, normalized into pad commands, deduplicated and
//! dispatched as timed button presses to a virtual console that a dedicated worker
//! keeps ticking and periodically snapshots.

pub mod backends;
pub mod command;
pub mod config;
pub mod dedup;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod handle;
pub mod lifecycle;
pub mod listener;
pub mod logger;
pub mod message;
pub mod poller;
pub mod snapshot;
pub mod stream;
pub mod worker;

pub use command::{normalize, Normalized, NormalizedCommand, RejectReason, REPEAT_CAP};
pub use config::Config;
pub use dedup::{Deduplicator, RepeatPolicy};
pub use device::*;
pub use dispatch::Dispatcher;
pub use error::{Error, Result};
pub use event::*;
pub use handle::SharedDeviceHandle;
pub use lifecycle::{Coordinator, ShutdownCause, ShutdownFlag};
pub use message::{Fingerprint, HousekeepingFilter, ParsedMessage};
pub use poller::{ChatPoller, CycleOutcome, PollerSettings};
pub use snapshot::{DeviceSnapshot, SnapshotStore};
pub use stream::{ChatStream, TranscriptStream};
pub use worker::{DeviceWorker, WorkerHandle, WorkerSettings, WorkerState};
