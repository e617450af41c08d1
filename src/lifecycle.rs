//! Process lifecycle: one shutdown flag, two execution contexts.
//!
//! [`ShutdownFlag`] is set at most once and observed by the poller (between cycles)
//! and by the device worker (between ticks). [`Coordinator`] owns both contexts and
//! tears them down in a fixed order:
//!
//! 1. raise the flag;
//! 2. wait for the worker to reach Stopped, then join it;
//! 3. join the poller task;
//! 4. close the chat stream.
//!
//! Every step is idempotent, so `shutdown` may be called again after it returned.

use crate::config::Config;
use crate::device::DeviceFactory;
use crate::error::Result;
use crate::poller::ChatPoller;
use crate::stream::ChatStream;
use crate::worker::{DeviceWorker, WorkerHandle, WorkerState};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Cooperative, set-once cancellation shared by every context.
#[derive(Clone, Debug)]
pub struct ShutdownFlag {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownFlag {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raises the flag. Returns `true` only for the call that actually set it.
    pub fn cancel(&self) -> bool {
        self.tx.send_if_modified(|set| {
            if *set {
                false
            } else {
                *set = true;
                true
            }
        })
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once the flag is raised.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            let set = *rx.borrow_and_update();
            // The sender lives in `self`, so the channel never closes under us.
            if set || rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Why [`Coordinator::run_until_shutdown`] returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownCause {
    /// Ctrl-C or another operator interrupt.
    Interrupt,
    /// The flag was raised from inside (worker failure, explicit cancel).
    Signalled,
}

pub struct Coordinator {
    shutdown: ShutdownFlag,
    worker: WorkerHandle,
    poller: Option<JoinHandle<Box<dyn ChatStream>>>,
    stream: Option<Box<dyn ChatStream>>,
}

impl Coordinator {
    /// Starts the device worker, waits for its handle and for the stream's first
    /// message, then starts the poller.
    ///
    /// On failure everything already started is shut down before returning.
    pub async fn start<F: DeviceFactory>(
        config: &Config,
        factory: F,
        stream: Box<dyn ChatStream>,
    ) -> Result<Self> {
        let shutdown = ShutdownFlag::new();
        let worker = DeviceWorker::new(
            factory,
            config.snapshot_store(),
            config.worker_settings(),
            shutdown.clone(),
        )
        .spawn();

        let mut coordinator = Self {
            shutdown: shutdown.clone(),
            worker,
            poller: None,
            stream: None,
        };

        let device = match coordinator.worker.device().await {
            Ok(device) => device,
            Err(e) => {
                coordinator.stream = Some(stream);
                return Err(coordinator.shutdown().await.err().unwrap_or(e));
            }
        };

        let mut poller = ChatPoller::new(
            stream,
            device,
            config.dispatcher(),
            config.housekeeping(),
            config.poller_settings(),
            shutdown,
        );

        if let Err(e) = poller.wait_ready().await {
            error!(error = %e, "timed out while waiting for the first message");
            coordinator.stream = Some(poller.into_stream());
            let _ = coordinator.shutdown().await;
            return Err(e);
        }

        coordinator.poller = Some(tokio::spawn(poller.run()));
        Ok(coordinator)
    }

    pub fn shutdown_flag(&self) -> &ShutdownFlag {
        &self.shutdown
    }

    pub fn worker_state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Waits for Ctrl-C or an internal shutdown, then runs [`shutdown`](Self::shutdown).
    pub async fn run_until_shutdown(&mut self) -> Result<ShutdownCause> {
        let cause = tokio::select! {
            r = tokio::signal::ctrl_c() => {
                if let Err(e) = r {
                    warn!(error = %e, "could not listen for ctrl-c");
                }
                info!("interrupt received, shutting down");
                ShutdownCause::Interrupt
            }
            _ = self.shutdown.cancelled() => ShutdownCause::Signalled,
        };
        self.shutdown().await?;
        Ok(cause)
    }

    /// Ordered, idempotent teardown. The first call returns the worker's own error, if
    /// it failed; later calls return `Ok(())`.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.shutdown.cancel();

        self.worker.wait_stopped().await;
        let outcome = self.worker.join().await;
        if let Err(e) = &outcome {
            error!(error = %e, "device worker ended with an error");
        }

        if let Some(poller) = self.poller.take() {
            match poller.await {
                Ok(stream) => self.stream = Some(stream),
                Err(e) => error!(error = %e, "chat poller task failed"),
            }
        }

        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.close().await {
                warn!(error = %e, "closing chat stream failed");
            }
            info!("chat stream closed");
        }

        outcome
    }
}
