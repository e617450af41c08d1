//! Structural split of rendered chat lines.
//!
//! A rendered message looks like `"<user> <h:mm> <text...>"`. The split is best-effort:
//! lines that don't match keep their whole text as the command and are attributed to
//! `"unknown"`.

use crate::command::NormalizedCommand;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

/// Username used when the structural split fails.
pub const UNKNOWN_USER: &str = "unknown";

/// Stream notices that never carry content.
pub const DEFAULT_HOUSEKEEPING: &[&str] = &[
    "This groupchat is not anonymous",
    "is now known as",
    "has changed their nickname",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedMessage {
    pub username: String,
    pub timestamp: Option<String>,
    pub command_text: String,
}

fn line_pattern() -> &'static regex::Regex {
    static RE: OnceLock<regex::Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // Rendered chat rows can carry the reply text on following lines.
        regex::Regex::new(r"(?s)^(\S+)\s+(\d{1,2}:\d{2})\s+(.+)$").expect("static pattern compiles")
    })
}

impl ParsedMessage {
    /// Splits a raw line into `(username, time-of-day, text)`.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        match line_pattern().captures(trimmed) {
            Some(caps) => Self {
                username: caps[1].to_string(),
                timestamp: Some(caps[2].to_string()),
                command_text: caps[3].trim().to_string(),
            },
            None => Self {
                username: UNKNOWN_USER.to_string(),
                timestamp: None,
                command_text: trimmed.to_string(),
            },
        }
    }

    /// Fingerprint of this message once its command has been normalized.
    pub fn fingerprint(&self, command: &NormalizedCommand) -> Fingerprint {
        Fingerprint::of(
            &self.username,
            self.timestamp.as_deref(),
            &command.to_string(),
        )
    }
}

/// Content hash over `(username, timestamp, normalized command)`.
///
/// Only used to recognise repeated content; not a security primitive.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of(username: &str, timestamp: Option<&str>, command: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(username.as_bytes());
        hasher.update([0u8]);
        hasher.update(timestamp.unwrap_or_default().as_bytes());
        hasher.update([0u8]);
        hasher.update(command.as_bytes());
        Fingerprint(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is plenty for log lines.
        f.write_str(self.0.get(..12).unwrap_or(&self.0))
    }
}

/// Recognises stream housekeeping notices by substring.
#[derive(Clone, Debug)]
pub struct HousekeepingFilter {
    patterns: Vec<String>,
}

impl Default for HousekeepingFilter {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>())
    }
}

impl HousekeepingFilter {
    /// Built-in notices plus `extra`.
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut patterns: Vec<String> =
            DEFAULT_HOUSEKEEPING.iter().map(|p| p.to_string()).collect();
        patterns.extend(extra.into_iter().map(Into::into).filter(|p| !p.is_empty()));
        Self { patterns }
    }

    pub fn matches(&self, raw: &str) -> bool {
        self.patterns.iter().any(|p| raw.contains(p.as_str()))
    }
}
