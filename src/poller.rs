//! The chat poller.
//!
//! One cooperative loop, one cycle per poll interval:
//!
//! 1. fetch the tail and the newest message (each bounded by the fetch timeout);
//! 2. unchanged tail: nothing new, sleep;
//! 3. housekeeping notice: skip without touching dedup state;
//! 4. split and normalize; rejected text is skipped;
//! 5. fingerprint, update dedup state, dispatch.
//!
//! Errors inside a cycle are logged, the stream is resynchronised, and the loop goes
//! on. The shutdown flag is checked between cycles; a cycle that has started,
//! including its dispatch, always runs to completion.

use crate::command::{normalize, Normalized, NormalizedCommand, RejectReason};
use crate::dedup::{Deduplicator, RepeatPolicy, RepeatVerdict};
use crate::dispatch::Dispatcher;
use crate::error::{Error, Result};
use crate::handle::SharedDeviceHandle;
use crate::lifecycle::ShutdownFlag;
use crate::message::{HousekeepingFilter, ParsedMessage};
use crate::stream::ChatStream;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, error, info, warn};

#[derive(Clone, Debug)]
pub struct PollerSettings {
    /// Number of newest messages compared for tail-unchanged suppression.
    pub tail_len: usize,
    pub poll_interval: Duration,
    pub fetch_timeout: Duration,
    /// How long [`ChatPoller::wait_ready`] waits for a first message.
    pub startup_timeout: Duration,
    pub repeat_policy: RepeatPolicy,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self {
            tail_len: 5,
            poll_interval: Duration::from_secs(4),
            fetch_timeout: Duration::from_secs(10),
            startup_timeout: Duration::from_secs(10),
            repeat_policy: RepeatPolicy::default(),
        }
    }
}

/// What a single cycle did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    TailUnchanged,
    Housekeeping,
    Rejected(RejectReason),
    /// Exact repeat skipped under [`RepeatPolicy::Suppress`].
    Suppressed(NormalizedCommand),
    Dispatched(NormalizedCommand),
    DispatchFailed(NormalizedCommand),
    /// The stream failed; a resync was attempted.
    StreamError,
}

async fn bounded<T>(limit: Duration, fut: impl Future<Output = Result<T>>) -> Result<T> {
    timeout(limit, fut)
        .await
        .map_err(|_| Error::StreamTimeout(limit))?
}

pub struct ChatPoller {
    stream: Box<dyn ChatStream>,
    device: SharedDeviceHandle,
    dispatcher: Dispatcher,
    dedup: Deduplicator,
    housekeeping: HousekeepingFilter,
    settings: PollerSettings,
    shutdown: ShutdownFlag,
}

impl ChatPoller {
    pub fn new(
        stream: Box<dyn ChatStream>,
        device: SharedDeviceHandle,
        dispatcher: Dispatcher,
        housekeeping: HousekeepingFilter,
        settings: PollerSettings,
        shutdown: ShutdownFlag,
    ) -> Self {
        Self {
            stream,
            device,
            dispatcher,
            dedup: Deduplicator::new(settings.repeat_policy),
            housekeeping,
            settings,
            shutdown,
        }
    }

    pub fn dedup(&self) -> &Deduplicator {
        &self.dedup
    }

    /// Gives the stream back without running the loop.
    pub fn into_stream(self) -> Box<dyn ChatStream> {
        self.stream
    }

    /// Waits until the stream shows a first message, up to the startup timeout.
    pub async fn wait_ready(&mut self) -> Result<()> {
        let deadline = Instant::now() + self.settings.startup_timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let attempt = timeout(remaining, self.stream.fetch_latest_message()).await;
            match attempt {
                Ok(Ok(_)) => {
                    info!("first message detected, chat polling can start");
                    return Ok(());
                }
                Ok(Err(e)) if !e.is_transient() => return Err(e),
                Ok(Err(e)) => debug!(error = %e, "stream not ready yet"),
                Err(_) => {}
            }
            if Instant::now() >= deadline {
                return Err(Error::StreamTimeout(self.settings.startup_timeout));
            }
            sleep(Duration::from_millis(250).min(remaining)).await;
        }
    }

    /// Runs one cycle. Never fails: errors are logged and reported as
    /// [`CycleOutcome::StreamError`].
    pub async fn poll_once(&mut self) -> CycleOutcome {
        match self.cycle().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "error processing message");
                let resync = self.stream.resync();
                match timeout(self.settings.fetch_timeout, resync).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "stream resync failed"),
                    Err(_) => warn!("stream resync timed out"),
                }
                CycleOutcome::StreamError
            }
        }
    }

    async fn cycle(&mut self) -> Result<CycleOutcome> {
        let limit = self.settings.fetch_timeout;
        let tail = bounded(limit, self.stream.fetch_latest_n(self.settings.tail_len)).await?;
        if self.dedup.tail_unchanged(&tail) {
            return Ok(CycleOutcome::TailUnchanged);
        }

        let latest = bounded(limit, self.stream.fetch_latest_message()).await?;
        if self.housekeeping.matches(&latest) {
            debug!(raw = %latest, "housekeeping notice, skipped");
            return Ok(CycleOutcome::Housekeeping);
        }
        self.dedup.commit_tail(tail);

        let parsed = ParsedMessage::parse(&latest);
        let command = match normalize(&parsed.command_text) {
            Normalized::Accepted(command) => command,
            Normalized::Rejected(reason) => {
                debug!(raw = %latest, user = %parsed.username, reason = %reason, "not a command");
                return Ok(CycleOutcome::Rejected(reason));
            }
        };

        let fingerprint = parsed.fingerprint(&command);
        let verdict = self.dedup.check_repeat(fingerprint.clone());
        if let RepeatVerdict::Repeat { dispatch } = verdict {
            info!(
                user = %parsed.username,
                command = %command,
                fingerprint = %fingerprint,
                dispatch,
                "repeat of the last message"
            );
            if !dispatch {
                return Ok(CycleOutcome::Suppressed(command));
            }
        }

        info!(
            user = %parsed.username,
            timestamp = parsed.timestamp.as_deref().unwrap_or("-"),
            command = %command,
            "command triggered"
        );
        if self.dispatcher.dispatch(&self.device, command).await {
            Ok(CycleOutcome::Dispatched(command))
        } else {
            Ok(CycleOutcome::DispatchFailed(command))
        }
    }

    /// Polls until shutdown, then hands the stream back for closing.
    pub async fn run(mut self) -> Box<dyn ChatStream> {
        self.dedup.reset();
        info!(
            interval = ?self.settings.poll_interval,
            tail = self.settings.tail_len,
            "chat poller running"
        );
        while !self.shutdown.is_cancelled() {
            let outcome = self.poll_once().await;
            debug!(?outcome, "cycle finished");
            tokio::select! {
                _ = sleep(self.settings.poll_interval) => {}
                _ = self.shutdown.cancelled() => {}
            }
        }
        info!("chat poller stopped");
        self.stream
    }
}
