//! The external chat stream.
//!
//! [`ChatStream`] is the narrow interface the poller needs from whatever renders the
//! chat room. Implementations may be eventually consistent: two fetches in a row can
//! disagree, and identical content may be re-rendered.

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

#[async_trait]
pub trait ChatStream: Send {
    /// Newest rendered message.
    async fn fetch_latest_message(&mut self) -> Result<String>;

    /// Up to `k` newest messages, oldest first.
    async fn fetch_latest_n(&mut self, k: usize) -> Result<Vec<String>>;

    /// Re-establishes the view after an error (page reload, reopen, ...).
    async fn resync(&mut self) -> Result<()> {
        Ok(())
    }

    /// Releases the stream's resources. Called once, after the poller exits.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Reads a chat transcript file: one rendered message per non-empty line.
///
/// Whatever tails the actual room (a browser bridge, an XMPP client, ...) appends to
/// the file; every fetch re-reads it.
#[derive(Debug, Clone)]
pub struct TranscriptStream {
    path: PathBuf,
}

impl TranscriptStream {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn lines(&self) -> Result<Vec<String>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| Error::stream(format!("{}: {e}", self.path.display())))?;
        Ok(text
            .lines()
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .map(str::to_string)
            .collect())
    }
}

#[async_trait]
impl ChatStream for TranscriptStream {
    async fn fetch_latest_message(&mut self) -> Result<String> {
        self.lines()
            .await?
            .pop()
            .ok_or_else(|| Error::stream("no messages yet"))
    }

    async fn fetch_latest_n(&mut self, k: usize) -> Result<Vec<String>> {
        let mut lines = self.lines().await?;
        let start = lines.len().saturating_sub(k);
        Ok(lines.split_off(start))
    }

    async fn resync(&mut self) -> Result<()> {
        tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| Error::stream(format!("{}: {e}", self.path.display())))?;
        debug!(path = %self.path.display(), "transcript reopened");
        Ok(())
    }
}
