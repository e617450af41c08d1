//! Duplicate suppression for the chat poller.
//!
//! Two independent layers:
//! - **tail**: when the last *k* rendered lines are identical to the previous cycle's,
//!   nothing new happened and the cycle is a no-op.
//! - **repeat**: the fingerprint of the newest message is compared with the last
//!   dispatched one. What happens on a match is governed by [`RepeatPolicy`].
//!
//! Comparison and commit are separate calls so that a cycle which bails out early
//! (housekeeping notice, stream error) leaves the state untouched.

use crate::message::Fingerprint;
use serde::{Deserialize, Serialize};

/// What to do when the newest message repeats the last dispatched one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatPolicy {
    /// Log the repeat and dispatch anyway.
    #[default]
    Dispatch,
    /// Log the repeat and skip it.
    Suppress,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RepeatVerdict {
    Fresh,
    /// Same fingerprint as the last dispatched command.
    Repeat { dispatch: bool },
}

impl RepeatVerdict {
    pub fn should_dispatch(self) -> bool {
        match self {
            RepeatVerdict::Fresh => true,
            RepeatVerdict::Repeat { dispatch } => dispatch,
        }
    }
}

#[derive(Debug, Default)]
pub struct Deduplicator {
    policy: RepeatPolicy,
    previous_tail: Vec<String>,
    last_fingerprint: Fingerprint,
}

impl Deduplicator {
    pub fn new(policy: RepeatPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// True when `tail` is identical, in order, to the last committed tail.
    ///
    /// An empty tail before anything was committed counts as unchanged.
    pub fn tail_unchanged(&self, tail: &[String]) -> bool {
        self.previous_tail.as_slice() == tail
    }

    /// Overwrites the remembered tail.
    pub fn commit_tail(&mut self, tail: Vec<String>) {
        self.previous_tail = tail;
    }

    /// Compares `fingerprint` with the last seen one and records it as last seen.
    pub fn check_repeat(&mut self, fingerprint: Fingerprint) -> RepeatVerdict {
        let verdict = if fingerprint == self.last_fingerprint {
            RepeatVerdict::Repeat {
                dispatch: self.policy == RepeatPolicy::Dispatch,
            }
        } else {
            RepeatVerdict::Fresh
        };
        self.last_fingerprint = fingerprint;
        verdict
    }

    pub fn previous_tail(&self) -> &[String] {
        &self.previous_tail
    }

    pub fn last_fingerprint(&self) -> &Fingerprint {
        &self.last_fingerprint
    }

    pub fn policy(&self) -> RepeatPolicy {
        self.policy
    }

    /// Back to the start-of-run state.
    pub fn reset(&mut self) {
        self.previous_tail.clear();
        self.last_fingerprint = Fingerprint::default();
    }
}
