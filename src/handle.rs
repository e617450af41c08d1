//! Shared access to the worker-owned device.
//!
//! The device worker constructs and tears down the device; everyone else only gets a
//! cloneable [`SharedDeviceHandle`]. Every accessor takes the same mutex, so a
//! dispatcher press never interleaves with a worker tick mid-call.
//!
//! After the worker stops the device, all accessors return
//! [`Error::HandleUnavailable`].

use crate::device::Device;
use crate::error::{Error, Result};
use crate::event::Button;
use crate::snapshot::DeviceSnapshot;
use std::sync::{Arc, Mutex, MutexGuard};

struct Slot {
    device: Box<dyn Device>,
    stopped: bool,
}

#[derive(Clone)]
pub struct SharedDeviceHandle {
    inner: Arc<Mutex<Slot>>,
}

impl std::fmt::Debug for SharedDeviceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let slot = self.lock();
        f.debug_struct("SharedDeviceHandle")
            .field("device", &slot.device.name())
            .field("stopped", &slot.stopped)
            .finish()
    }
}

impl SharedDeviceHandle {
    pub fn new(device: Box<dyn Device>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Slot {
                device,
                stopped: false,
            })),
        }
    }

    // A panic while holding the lock only ever leaves button state behind, and
    // release-all re-establishes that, so poisoning is not fatal.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn with<T>(&self, f: impl FnOnce(&mut dyn Device) -> Result<T>) -> Result<T> {
        let mut slot = self.lock();
        if slot.stopped {
            return Err(Error::HandleUnavailable);
        }
        f(slot.device.as_mut())
    }

    pub fn name(&self) -> String {
        self.lock().device.name().to_string()
    }

    pub fn is_stopped(&self) -> bool {
        self.lock().stopped
    }

    pub fn press(&self, button: Button) -> Result<()> {
        self.with(|d| d.press_button(button))
    }

    pub fn release(&self, button: Button) -> Result<()> {
        self.with(|d| d.release_button(button))
    }

    pub fn release_all(&self) -> Result<()> {
        self.with(|d| d.release_all())
    }

    pub fn tick(&self) -> Result<()> {
        self.with(|d| d.tick())
    }

    pub fn save_snapshot(&self) -> Result<DeviceSnapshot> {
        self.with(|d| d.save_snapshot())
    }

    pub fn load_snapshot(&self, snapshot: &DeviceSnapshot) -> Result<()> {
        self.with(|d| d.load_snapshot(snapshot))
    }

    pub(crate) fn set_speed(&self, factor: u32) -> Result<()> {
        self.with(|d| {
            d.set_speed(factor);
            Ok(())
        })
    }

    /// Stops the device. Second and later calls are no-ops.
    pub(crate) fn stop(&self) -> Result<()> {
        let mut slot = self.lock();
        if slot.stopped {
            return Ok(());
        }
        slot.stopped = true;
        slot.device.stop()
    }
}
