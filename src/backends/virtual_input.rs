//! Deterministic software console.
//!
//! [`VirtualConsole`] has no CPU core; it keeps the observable pad state a game loop
//! would see (frame counter, held buttons, per-button press counts) and identifies the
//! loaded program by digest. Snapshots are JSON and refuse to load onto a different
//! program image.

use crate::device::Device;
use crate::error::{Error, Result};
use crate::event::{Button, InputEvent, InputKind};
use crate::listener::InputListener;
use crate::snapshot::DeviceSnapshot;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

const SNAPSHOT_FORMAT: &str = "chatpad-virtual/1";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
struct ConsoleState {
    frame: u64,
    held: u8,
    presses: [u64; 8],
}

#[derive(Serialize, Deserialize)]
struct SnapshotBody {
    format: String,
    image: String,
    state: ConsoleState,
}

pub struct VirtualConsole {
    name: String,
    image_digest: String,
    speed: u32,
    state: ConsoleState,
    stopped: bool,
    listeners: Vec<Box<dyn InputListener>>,
}

impl VirtualConsole {
    /// Boots a console from an in-memory program image.
    pub fn new(name: &str, image: &[u8]) -> Result<Self> {
        if image.is_empty() {
            return Err(Error::device("program image is empty"));
        }
        Ok(Self {
            name: name.to_string(),
            image_digest: hex::encode(Sha256::digest(image)),
            speed: 1,
            state: ConsoleState::default(),
            stopped: false,
            listeners: Vec::new(),
        })
    }

    /// Boots a console from a program image on disk.
    pub fn open(path: &Path) -> Result<Self> {
        let image = std::fs::read(path)
            .map_err(|e| Error::device(format!("cannot read {}: {e}", path.display())))?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("virtual");
        Self::new(name, &image)
    }

    /// Registers an observer for every press/release edge.
    pub fn with_listener(mut self, listener: impl InputListener + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    pub fn frame(&self) -> u64 {
        self.state.frame
    }

    pub fn speed(&self) -> u32 {
        self.speed
    }

    pub fn is_held(&self, button: Button) -> bool {
        self.state.held & button.bit() != 0
    }

    pub fn held_buttons(&self) -> Vec<Button> {
        Button::ALL.into_iter().filter(|b| self.is_held(*b)).collect()
    }

    /// Number of press edges seen for `button` since boot (or since the loaded snapshot).
    pub fn presses(&self, button: Button) -> u64 {
        self.state.presses[button as usize]
    }

    fn ensure_running(&self) -> Result<()> {
        if self.stopped {
            Err(Error::device(format!("{} is stopped", self.name)))
        } else {
            Ok(())
        }
    }

    fn emit(&mut self, kind: InputKind) {
        let event = InputEvent {
            frame: self.state.frame,
            kind,
        };
        for listener in self.listeners.iter_mut() {
            listener.on_input(&event);
        }
    }
}

impl Device for VirtualConsole {
    fn name(&self) -> &str {
        &self.name
    }

    fn press_button(&mut self, button: Button) -> Result<()> {
        self.ensure_running()?;
        if !self.is_held(button) {
            self.state.held |= button.bit();
            self.state.presses[button as usize] += 1;
            self.emit(InputKind::ButtonPressed { button });
        }
        Ok(())
    }

    fn release_button(&mut self, button: Button) -> Result<()> {
        self.ensure_running()?;
        if self.is_held(button) {
            self.state.held &= !button.bit();
            self.emit(InputKind::ButtonReleased { button });
        }
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        self.ensure_running()?;
        self.state.frame = self.state.frame.wrapping_add(1);
        Ok(())
    }

    fn save_snapshot(&mut self) -> Result<DeviceSnapshot> {
        self.ensure_running()?;
        let body = SnapshotBody {
            format: SNAPSHOT_FORMAT.to_string(),
            image: self.image_digest.clone(),
            state: self.state.clone(),
        };
        Ok(DeviceSnapshot(serde_json::to_vec(&body)?))
    }

    fn load_snapshot(&mut self, snapshot: &DeviceSnapshot) -> Result<()> {
        self.ensure_running()?;
        let body: SnapshotBody = serde_json::from_slice(snapshot.as_bytes())
            .map_err(|e| Error::Snapshot(format!("unreadable snapshot: {e}")))?;
        if body.format != SNAPSHOT_FORMAT {
            return Err(Error::Snapshot(format!("unsupported format {:?}", body.format)));
        }
        if body.image != self.image_digest {
            return Err(Error::Snapshot("snapshot belongs to a different program image".into()));
        }
        self.state = body.state;
        Ok(())
    }

    fn set_speed(&mut self, factor: u32) {
        self.speed = factor;
    }

    fn stop(&mut self) -> Result<()> {
        self.stopped = true;
        Ok(())
    }
}
