//! Observers for button edges applied to a device.

use crate::event::InputEvent;
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Trait for reacting to button edges as a device applies them.
pub trait InputListener: Send {
    fn on_input(&mut self, event: &InputEvent);
}

/// Emits every edge as a `trace!` line.
#[derive(Debug, Default)]
pub struct TraceListener;

impl InputListener for TraceListener {
    fn on_input(&mut self, event: &InputEvent) {
        trace!(frame = event.frame, kind = ?event.kind, "input");
    }
}

/// Shared, cloneable record of every edge. Clones see the same buffer.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<InputEvent>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn events(&self) -> Vec<InputEvent> {
        match self.events.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<InputEvent> {
        match self.events.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl InputListener for EventLog {
    fn on_input(&mut self, event: &InputEvent) {
        match self.events.lock() {
            Ok(mut guard) => guard.push(*event),
            Err(poisoned) => poisoned.into_inner().push(*event),
        }
    }
}
