//! Chat text to pad command.
//!
//! [`normalize`] is a pure function: it takes the free-text part of a chat line and
//! either produces a [`NormalizedCommand`] or explains why it was rejected. The
//! accepted grammar, after whitespace clean-up, is:
//!
//! ```text
//! command := button                 e.g. "start"
//!          | button ' ' digits ...  e.g. "up 3", "left 2 please"
//!          | button '*' digits      e.g. "a*4"
//!          | button digits          e.g. "b12"   (rewritten to "b*12")
//! ```
//!
//! Button names are matched case-insensitively. Repeat counts are clamped to
//! `[1, REPEAT_CAP]`.

use crate::event::Button;
use serde::{Deserialize, Serialize};
use std::fmt;
use unicode_normalization::UnicodeNormalization;

/// Upper bound on presses produced by a single chat line.
pub const REPEAT_CAP: u32 = 10;

/// A validated pad command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedCommand {
    pub button: Button,
    /// Always within `[1, REPEAT_CAP]`.
    pub repeat_count: u32,
}

impl NormalizedCommand {
    /// Builds a command, clamping the count into range.
    pub fn new(button: Button, repeat_count: u32) -> Self {
        Self {
            button,
            repeat_count: repeat_count.clamp(1, REPEAT_CAP),
        }
    }
}

/// Canonical textual form (`"up"` or `"up*3"`), used for fingerprints and logs.
impl fmt::Display for NormalizedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.repeat_count == 1 {
            write!(f, "{}", self.button)
        } else {
            write!(f, "{}*{}", self.button, self.repeat_count)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// Nothing left after whitespace clean-up.
    Empty,
    /// First token is not one of the eight buttons.
    UnknownButton(String),
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::Empty => f.write_str("empty command"),
            RejectReason::UnknownButton(name) => write!(f, "unknown button {name:?}"),
        }
    }
}

/// Result of [`normalize`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Normalized {
    Accepted(NormalizedCommand),
    Rejected(RejectReason),
}

impl Normalized {
    pub fn accepted(self) -> Option<NormalizedCommand> {
        match self {
            Normalized::Accepted(cmd) => Some(cmd),
            Normalized::Rejected(_) => None,
        }
    }
}

/// Applies NFKC, maps every Unicode whitespace (incl. NBSP) to a single ASCII
/// space and trims.
pub fn clean_whitespace(text: &str) -> String {
    let composed: String = text.nfkc().collect();
    composed.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Rewrites `<letters><digits>` (no separator) into `<letters>*<digits>`.
fn split_glued_count(text: &str) -> Option<String> {
    let letters = text.find(|c: char| !c.is_ascii_alphabetic())?;
    if letters == 0 {
        return None;
    }
    let (head, tail) = text.split_at(letters);
    if tail.bytes().all(|b| b.is_ascii_digit()) {
        Some(format!("{head}*{tail}"))
    } else {
        None
    }
}

/// Parses a decimal repeat count; anything beyond `u32` saturates and is then clamped.
fn parse_count(digits: &str) -> Option<u32> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(digits.parse::<u32>().unwrap_or(u32::MAX))
}

/// Turns chat command text into a pad command.
pub fn normalize(command_text: &str) -> Normalized {
    let mut text = clean_whitespace(command_text);
    if text.is_empty() {
        return Normalized::Rejected(RejectReason::Empty);
    }
    if let Some(rewritten) = split_glued_count(&text) {
        text = rewritten;
    }

    // `*` takes precedence over whitespace splitting.
    let (name, count) = match text.split_once('*') {
        Some((name, rest)) => {
            let digits = rest.trim_start().split(' ').next().unwrap_or_default();
            (name.trim().to_string(), parse_count(digits))
        }
        None => {
            let mut tokens = text.split(' ');
            let name = tokens.next().unwrap_or_default().to_string();
            (name, tokens.next().and_then(parse_count))
        }
    };

    match Button::from_name(&name) {
        Some(button) => Normalized::Accepted(NormalizedCommand::new(button, count.unwrap_or(1))),
        None => Normalized::Rejected(RejectReason::UnknownButton(name.to_lowercase())),
    }
}
