//! Virtual console interface.
//!
//! A [`Device`] is one emulated handheld: it advances in discrete ticks, accepts
//! button edges, and can serialise its complete state. All calls are synchronous and
//! expected to be fast; none of them block on I/O.
//!
//! Backends live in [`crate::backends`]. A device is owned by the
//! [`DeviceWorker`](crate::worker::DeviceWorker) and reached by everyone else through a
//! [`SharedDeviceHandle`](crate::handle::SharedDeviceHandle).

use crate::error::Result;
use crate::event::Button;
use crate::snapshot::DeviceSnapshot;

pub trait Device: Send {
    fn name(&self) -> &str;

    fn press_button(&mut self, button: Button) -> Result<()>;
    fn release_button(&mut self, button: Button) -> Result<()>;

    /// Advance the emulated hardware by one step.
    fn tick(&mut self) -> Result<()>;

    fn save_snapshot(&mut self) -> Result<DeviceSnapshot>;
    fn load_snapshot(&mut self, snapshot: &DeviceSnapshot) -> Result<()>;

    /// Emulation speed factor; `1` is real time, `0` means unbounded.
    fn set_speed(&mut self, _factor: u32) {}

    /// Flush and close. Called exactly once, by the worker, on every exit path.
    fn stop(&mut self) -> Result<()>;

    /// Releases every button. Keeps going past individual failures and reports
    /// the first one.
    fn release_all(&mut self) -> Result<()> {
        let mut first_err = None;
        for button in Button::ALL {
            if let Err(e) = self.release_button(button) {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Builds a device from its program image. Invoked once, on the worker's thread.
pub trait DeviceFactory: Send + 'static {
    fn create(&mut self) -> Result<Box<dyn Device>>;
}

impl<F> DeviceFactory for F
where
    F: FnMut() -> Result<Box<dyn Device>> + Send + 'static,
{
    fn create(&mut self) -> Result<Box<dyn Device>> {
        self()
    }
}
