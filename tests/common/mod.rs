#![allow(dead_code)]

use async_trait::async_trait;
use chatpad::{Button, ChatStream, Device, DeviceSnapshot, Dispatcher, Error, Result};
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn fast_dispatcher() -> Dispatcher {
    Dispatcher::new(Duration::from_millis(1), Duration::from_millis(1))
}

/// Chat stream driven by the test. Clones share the same transcript.
#[derive(Clone, Default)]
pub struct ScriptedStream {
    inner: Arc<Mutex<StreamState>>,
}

#[derive(Default)]
struct StreamState {
    lines: Vec<String>,
    /// Errors returned by upcoming fetches, in order.
    failures: VecDeque<Error>,
    resyncs: usize,
    closed: bool,
}

impl ScriptedStream {
    pub fn new(lines: &[&str]) -> Self {
        let s = Self::default();
        for l in lines {
            s.push(l);
        }
        s
    }

    pub fn push(&self, line: &str) {
        self.inner.lock().unwrap().lines.push(line.to_string());
    }

    pub fn fail_next(&self, err: Error) {
        self.inner.lock().unwrap().failures.push_back(err);
    }

    pub fn resyncs(&self) -> usize {
        self.inner.lock().unwrap().resyncs
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    pub fn boxed(&self) -> Box<dyn ChatStream> {
        Box::new(self.clone())
    }
}

#[async_trait]
impl ChatStream for ScriptedStream {
    async fn fetch_latest_message(&mut self) -> Result<String> {
        let mut st = self.inner.lock().unwrap();
        if let Some(e) = st.failures.pop_front() {
            return Err(e);
        }
        st.lines.last().cloned().ok_or_else(|| Error::stream("empty"))
    }

    async fn fetch_latest_n(&mut self, k: usize) -> Result<Vec<String>> {
        let mut st = self.inner.lock().unwrap();
        if let Some(e) = st.failures.pop_front() {
            return Err(e);
        }
        let start = st.lines.len().saturating_sub(k);
        Ok(st.lines[start..].to_vec())
    }

    async fn resync(&mut self) -> Result<()> {
        self.inner.lock().unwrap().resyncs += 1;
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.inner.lock().unwrap().closed = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct PadState {
    pub held: BTreeSet<Button>,
    pub presses: Vec<Button>,
    pub releases: usize,
    pub release_all_sweeps: usize,
    pub ticks: u64,
    pub stopped: bool,
    /// Fail the press with this (0-based) index.
    pub fail_on_press: Option<usize>,
    /// Fail every tick once this many have run.
    pub fail_after_ticks: Option<u64>,
    /// Panic on the tick after this many have run.
    pub panic_after_ticks: Option<u64>,
}

/// In-memory pad whose state the test can inspect and sabotage.
#[derive(Clone, Default)]
pub struct TestPad {
    pub state: Arc<Mutex<PadState>>,
}

impl TestPad {
    pub fn boxed(&self) -> Box<dyn Device> {
        Box::new(self.clone())
    }

    pub fn with<T>(&self, f: impl FnOnce(&mut PadState) -> T) -> T {
        let mut st = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut st)
    }
}

impl Device for TestPad {
    fn name(&self) -> &str {
        "test-pad"
    }

    fn press_button(&mut self, button: Button) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if st.fail_on_press == Some(st.presses.len()) {
            st.fail_on_press = None;
            st.held.insert(button);
            return Err(Error::device("simulated press failure"));
        }
        st.presses.push(button);
        st.held.insert(button);
        Ok(())
    }

    fn release_button(&mut self, button: Button) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.held.remove(&button);
        st.releases += 1;
        Ok(())
    }

    fn release_all(&mut self) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.held.clear();
        st.release_all_sweeps += 1;
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        let panic_now = self.with(|st| {
            if st.fail_after_ticks.is_some_and(|n| st.ticks >= n) {
                return Err(Error::device("simulated tick failure"));
            }
            st.ticks += 1;
            Ok(st.panic_after_ticks.is_some_and(|n| st.ticks > n))
        })?;
        if panic_now {
            panic!("simulated tick panic");
        }
        Ok(())
    }

    fn save_snapshot(&mut self) -> Result<DeviceSnapshot> {
        let ticks = self.state.lock().unwrap().ticks;
        let mut bytes = vec![0u8; 128];
        bytes[..8].copy_from_slice(&ticks.to_le_bytes());
        Ok(DeviceSnapshot(bytes))
    }

    fn load_snapshot(&mut self, snapshot: &DeviceSnapshot) -> Result<()> {
        let raw: [u8; 8] = snapshot
            .as_bytes()
            .get(..8)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| Error::Snapshot("short".into()))?;
        self.state.lock().unwrap().ticks = u64::from_le_bytes(raw);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.state.lock().unwrap().stopped = true;
        Ok(())
    }
}

/// Pad that keeps the trait's own `release_all` sweep and can fail one release.
#[derive(Clone, Default)]
pub struct FlakyReleasePad {
    state: Arc<Mutex<FlakyState>>,
}

#[derive(Default)]
struct FlakyState {
    held: BTreeSet<Button>,
    presses: usize,
    fail_release: Option<Button>,
}

impl FlakyReleasePad {
    pub fn boxed(&self) -> Box<dyn Device> {
        Box::new(self.clone())
    }

    /// The next release of `button` fails and leaves it held.
    pub fn fail_release_once(&self, button: Button) {
        self.state.lock().unwrap().fail_release = Some(button);
    }

    pub fn held(&self) -> Vec<Button> {
        self.state.lock().unwrap().held.iter().copied().collect()
    }

    pub fn presses(&self) -> usize {
        self.state.lock().unwrap().presses
    }
}

impl Device for FlakyReleasePad {
    fn name(&self) -> &str {
        "flaky-release-pad"
    }

    fn press_button(&mut self, button: Button) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        st.held.insert(button);
        st.presses += 1;
        Ok(())
    }

    fn release_button(&mut self, button: Button) -> Result<()> {
        let mut st = self.state.lock().unwrap();
        if st.fail_release == Some(button) {
            st.fail_release = None;
            return Err(Error::device("simulated release failure"));
        }
        st.held.remove(&button);
        Ok(())
    }

    fn tick(&mut self) -> Result<()> {
        Ok(())
    }

    fn save_snapshot(&mut self) -> Result<DeviceSnapshot> {
        Ok(DeviceSnapshot(vec![0u8; 128]))
    }

    fn load_snapshot(&mut self, _snapshot: &DeviceSnapshot) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }
}
