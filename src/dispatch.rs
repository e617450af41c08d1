//! Turns a [`NormalizedCommand`] into timed press/release calls.
//!
//! Protocol for one command:
//! 1. release every button (clears anything an interrupted dispatch left held);
//! 2. `repeat_count` times: press, hold, release, short gap (after the last press too);
//! 3. release every button again, on every exit path.
//!
//! Step 3 is carried by a drop guard, so an early `?` return or a cancelled future
//! still leaves the pad idle. `dispatch` takes `&mut self`: one dispatcher never runs
//! two commands at once.

use crate::command::NormalizedCommand;
use crate::error::{Error, Result};
use crate::handle::SharedDeviceHandle;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, warn};

pub const DEFAULT_HOLD: Duration = Duration::from_millis(350);
pub const DEFAULT_GAP: Duration = Duration::from_millis(75);

/// Releases every button when dropped.
struct ReleaseGuard<'a> {
    device: &'a SharedDeviceHandle,
}

impl Drop for ReleaseGuard<'_> {
    fn drop(&mut self) {
        match self.device.release_all() {
            Ok(()) | Err(Error::HandleUnavailable) => {}
            Err(e) => warn!(error = %e, "release-all after dispatch failed"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Dispatcher {
    hold: Duration,
    gap: Duration,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_HOLD, DEFAULT_GAP)
    }
}

impl Dispatcher {
    pub fn new(hold: Duration, gap: Duration) -> Self {
        Self { hold, gap }
    }

    pub fn hold(&self) -> Duration {
        self.hold
    }

    pub fn gap(&self) -> Duration {
        self.gap
    }

    /// Runs `command` against `device`, logging instead of propagating failures.
    ///
    /// Returns `true` when every press completed.
    pub async fn dispatch(
        &mut self,
        device: &SharedDeviceHandle,
        command: NormalizedCommand,
    ) -> bool {
        match self.try_dispatch(device, command).await {
            Ok(_) => true,
            Err(e) => {
                error!(command = %command, error = %e, "dispatch failed");
                false
            }
        }
    }

    /// Like [`dispatch`](Self::dispatch) but reports the error. Returns the number of
    /// completed press/release cycles.
    pub async fn try_dispatch(
        &mut self,
        device: &SharedDeviceHandle,
        command: NormalizedCommand,
    ) -> Result<u32> {
        if let Err(e) = device.release_all() {
            if matches!(e, Error::HandleUnavailable) {
                return Err(e);
            }
            warn!(error = %e, "safety release before dispatch failed");
        }
        let _guard = ReleaseGuard { device };

        let mut completed = 0;
        for _ in 0..command.repeat_count {
            device.press(command.button)?;
            sleep(self.hold).await;
            device.release(command.button)?;
            completed += 1;
            sleep(self.gap).await;
        }

        debug!(command = %command, presses = completed, "dispatched");
        Ok(completed)
    }
}
