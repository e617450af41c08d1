//! The device worker.
//!
//! [`DeviceWorker`] owns the device for its whole life and runs on a blocking thread:
//!
//! ```text
//! Starting ──► Running ──► Stopping ──► Stopped
//!     │                                   ▲
//!     └────────── (start failed) ─────────┘
//! ```
//!
//! - **Starting**: build the device, set its speed, let it settle for a few ticks,
//!   restore the stored snapshot if it is usable, then publish a
//!   [`SharedDeviceHandle`].
//! - **Running**: tick, sleep, and persist a snapshot on a fixed wall-clock interval
//!   until the [`ShutdownFlag`] is observed. Any device error ends the loop.
//! - **Stopping**: optional final snapshot (clean exits only), then `stop()`. The stop
//!   is carried by a drop guard and also runs if the loop panics.
//!
//! A fatal worker error, or a panic inside the loop, raises the shutdown flag so the
//! rest of the process follows.

use crate::device::DeviceFactory;
use crate::error::{Error, Result};
use crate::handle::SharedDeviceHandle;
use crate::lifecycle::ShutdownFlag;
use crate::snapshot::SnapshotStore;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Starting => "starting",
            WorkerState::Running => "running",
            WorkerState::Stopping => "stopping",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug)]
pub struct WorkerSettings {
    /// Ticks run right after construction, before any snapshot is loaded.
    pub settle_ticks: u32,
    pub tick_interval: Duration,
    pub snapshot_interval: Duration,
    /// Write one last snapshot when leaving Running because of shutdown.
    pub save_on_exit: bool,
    pub speed: u32,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            settle_ticks: 60,
            tick_interval: Duration::from_millis(10),
            snapshot_interval: Duration::from_secs(30 * 60),
            save_on_exit: true,
            speed: 1,
        }
    }
}

pub struct DeviceWorker<F: DeviceFactory> {
    factory: F,
    store: SnapshotStore,
    settings: WorkerSettings,
    shutdown: ShutdownFlag,
    state_tx: watch::Sender<WorkerState>,
    device_tx: watch::Sender<Option<SharedDeviceHandle>>,
}

/// Stops the device and marks the worker Stopped when dropped. Unwinding through it
/// also raises the shutdown flag.
struct Teardown<'a> {
    handle: &'a SharedDeviceHandle,
    state_tx: &'a watch::Sender<WorkerState>,
    shutdown: &'a ShutdownFlag,
}

impl Drop for Teardown<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!("device worker panicked");
            self.shutdown.cancel();
        }
        self.state_tx.send_replace(WorkerState::Stopping);
        if let Err(e) = self.handle.stop() {
            warn!(error = %e, "device stop reported an error");
        }
        self.state_tx.send_replace(WorkerState::Stopped);
        info!("device worker stopped");
    }
}

impl<F: DeviceFactory> DeviceWorker<F> {
    pub fn new(
        factory: F,
        store: SnapshotStore,
        settings: WorkerSettings,
        shutdown: ShutdownFlag,
    ) -> Self {
        let (state_tx, _) = watch::channel(WorkerState::Starting);
        let (device_tx, _) = watch::channel(None);
        Self {
            factory,
            store,
            settings,
            shutdown,
            state_tx,
            device_tx,
        }
    }

    /// Moves the worker onto a blocking thread.
    pub fn spawn(self) -> WorkerHandle {
        let state = self.state_tx.subscribe();
        let device = self.device_tx.subscribe();
        let join = tokio::task::spawn_blocking(move || self.run());
        WorkerHandle {
            state,
            device,
            join: Some(join),
        }
    }

    /// Runs the full lifecycle on the calling thread.
    pub fn run(mut self) -> Result<()> {
        self.state_tx.send_replace(WorkerState::Starting);
        let handle = match self.start() {
            Ok(handle) => handle,
            Err(e) => {
                error!(error = %e, "device worker failed to start");
                self.state_tx.send_replace(WorkerState::Stopped);
                self.shutdown.cancel();
                return Err(e);
            }
        };

        let teardown = Teardown {
            handle: &handle,
            state_tx: &self.state_tx,
            shutdown: &self.shutdown,
        };
        self.state_tx.send_replace(WorkerState::Running);
        self.device_tx.send_replace(Some(handle.clone()));
        info!(device = %handle.name(), "device worker running");

        let result = self.run_loop(&handle);
        match &result {
            Ok(()) => {
                if self.settings.save_on_exit {
                    if let Err(e) = self.persist(&handle) {
                        warn!(error = %e, "final snapshot failed");
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "device worker failed");
                self.shutdown.cancel();
            }
        }
        drop(teardown);
        result
    }

    fn start(&mut self) -> Result<SharedDeviceHandle> {
        let handle = self.boot()?;
        if let Some(snapshot) = self.store.load() {
            match handle.load_snapshot(&snapshot) {
                Ok(()) => {
                    info!(
                        path = %self.store.path().display(),
                        len = snapshot.len(),
                        "restored saved state"
                    );
                    return Ok(handle);
                }
                Err(e) => {
                    warn!(error = %e, "saved state rejected by device, starting fresh");
                    // The failed load may have left partial state behind.
                    if let Err(e) = handle.stop() {
                        warn!(error = %e, "device stop reported an error");
                    }
                    return self.boot();
                }
            }
        }
        Ok(handle)
    }

    /// Builds and settles a device. A device that fails to settle is stopped here.
    fn boot(&mut self) -> Result<SharedDeviceHandle> {
        let handle = SharedDeviceHandle::new(self.factory.create()?);
        if let Err(e) = self.settle(&handle) {
            if let Err(stop_err) = handle.stop() {
                warn!(error = %stop_err, "device stop reported an error");
            }
            return Err(e);
        }
        Ok(handle)
    }

    fn settle(&self, handle: &SharedDeviceHandle) -> Result<()> {
        handle.set_speed(self.settings.speed)?;
        for _ in 0..self.settings.settle_ticks {
            handle.tick()?;
        }
        debug!(ticks = self.settings.settle_ticks, "device settled");
        Ok(())
    }

    fn run_loop(&self, handle: &SharedDeviceHandle) -> Result<()> {
        let mut last_save = Instant::now();
        while !self.shutdown.is_cancelled() {
            handle.tick()?;
            std::thread::sleep(self.settings.tick_interval);

            if last_save.elapsed() >= self.settings.snapshot_interval {
                self.persist(handle)?;
                last_save = Instant::now();
            }
        }
        Ok(())
    }

    /// Device errors propagate; a failed write is only logged, the next interval retries.
    fn persist(&self, handle: &SharedDeviceHandle) -> Result<()> {
        let snapshot = handle.save_snapshot()?;
        match self.store.save(&snapshot) {
            Ok(()) => {
                info!(path = %self.store.path().display(), len = snapshot.len(), "state saved")
            }
            Err(e) => {
                error!(path = %self.store.path().display(), error = %e, "error saving state")
            }
        }
        Ok(())
    }
}

/// Observer side of a spawned [`DeviceWorker`].
pub struct WorkerHandle {
    state: watch::Receiver<WorkerState>,
    device: watch::Receiver<Option<SharedDeviceHandle>>,
    join: Option<JoinHandle<Result<()>>>,
}

impl WorkerHandle {
    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    /// Waits for the published device handle. Fails if the worker stops first.
    pub async fn device(&mut self) -> Result<SharedDeviceHandle> {
        loop {
            let published = self.device.borrow_and_update().clone();
            if let Some(handle) = published {
                return Ok(handle);
            }
            let state = *self.state.borrow_and_update();
            if state == WorkerState::Stopped {
                return Err(Error::HandleUnavailable);
            }
            let closed = tokio::select! {
                r = self.device.changed() => r.is_err(),
                r = self.state.changed() => r.is_err(),
            };
            if closed {
                let published = self.device.borrow().clone();
                return published.ok_or(Error::HandleUnavailable);
            }
        }
    }

    /// Resolves once the worker reports Stopped (or has gone away).
    pub async fn wait_stopped(&mut self) {
        loop {
            let state = *self.state.borrow_and_update();
            if state == WorkerState::Stopped || self.state.changed().await.is_err() {
                return;
            }
        }
    }

    /// Joins the worker thread and returns its result. Later calls return `Ok(())`.
    pub async fn join(&mut self) -> Result<()> {
        match self.join.take() {
            Some(join) => join.await.map_err(|_| Error::WorkerPanicked)?,
            None => Ok(()),
        }
    }
}
