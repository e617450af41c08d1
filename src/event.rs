//! Buttons and button edges.
//!
//! The console exposes a fixed 8-button pad. Every press and release that reaches a
//! device is a small delta ([`InputKind`]) that backends may record with a timestamp
//! ([`InputEvent`]).
//!
//! ## Naming conventions
//! - Button names are lower-case ASCII (`"up"`, `"a"`, `"start"`, ...).
//! - Parsing is case-insensitive; display always uses the canonical name.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the eight buttons on the emulated handheld.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    Up,
    Down,
    Left,
    Right,
    A,
    B,
    Start,
    Select,
}

impl Button {
    /// Every button, in pad order. Used for release-all sweeps.
    pub const ALL: [Button; 8] = [
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::A,
        Button::B,
        Button::Start,
        Button::Select,
    ];

    /// Canonical lower-case name, as the device backends expect it.
    pub fn name(self) -> &'static str {
        match self {
            Button::Up => "up",
            Button::Down => "down",
            Button::Left => "left",
            Button::Right => "right",
            Button::A => "a",
            Button::B => "b",
            Button::Start => "start",
            Button::Select => "select",
        }
    }

    /// Case-insensitive lookup by name.
    pub fn from_name(name: &str) -> Option<Button> {
        Button::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(name))
    }

    /// Bit used by backends that keep the held set as a mask.
    #[inline]
    pub fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl fmt::Display for Button {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned by [`Button::from_str`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnknownButton(pub String);

impl fmt::Display for UnknownButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown button {:?}", self.0)
    }
}

impl std::error::Error for UnknownButton {}

impl FromStr for Button {
    type Err = UnknownButton;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Button::from_name(s).ok_or_else(|| UnknownButton(s.to_string()))
    }
}

/// Button edge applied to a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKind {
    /// A button transitioned to pressed.
    ButtonPressed { button: Button },

    /// A button transitioned to released.
    ButtonReleased { button: Button },
}

impl InputKind {
    pub fn button(&self) -> Button {
        match *self {
            InputKind::ButtonPressed { button } | InputKind::ButtonReleased { button } => button,
        }
    }
}

/// Timestamped input edge.
///
/// `frame` is the device tick on which the edge was applied, which is what an
/// emulated game loop actually observes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputEvent {
    /// Device frame counter at the time of the edge.
    pub frame: u64,
    /// The actual input change.
    pub kind: InputKind,
}
