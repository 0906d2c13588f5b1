//! Test and helper mocks for shutter_core

use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::Duration;

use shutter_traits::{Gateway, RunStore, ShutterAddress};

use crate::scheduler::{StopCallback, StopTimer, StopToken, TimerFactory};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Frame kind recorded by `RecordingGateway`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sent {
    MoveUp,
    MoveDown,
    Stop,
    StatusRequest,
}

#[derive(Debug, Default)]
struct GatewayLog {
    sent: Vec<(Sent, String)>,
    fail_with: Option<String>,
}

/// Gateway that records every frame; clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingGateway {
    log: Arc<Mutex<GatewayLog>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames sent so far, oldest first.
    pub fn sent(&self) -> Vec<Sent> {
        self.lock().sent.iter().map(|(s, _)| *s).collect()
    }

    /// Wire addresses the frames were sent to.
    pub fn addresses(&self) -> Vec<String> {
        self.lock().sent.iter().map(|(_, a)| a.clone()).collect()
    }

    pub fn clear(&self) {
        self.lock().sent.clear();
    }

    /// Make every following send fail with `msg` (`None` heals it).
    pub fn set_failure(&self, msg: Option<&str>) {
        self.lock().fail_with = msg.map(str::to_owned);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GatewayLog> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, what: Sent, target: &ShutterAddress) -> Result<(), BoxError> {
        let mut log = self.lock();
        if let Some(msg) = &log.fail_with {
            return Err(std::io::Error::other(msg.clone()).into());
        }
        log.sent.push((what, target.to_string()));
        Ok(())
    }
}

impl Gateway for RecordingGateway {
    fn send_move_up(&mut self, target: &ShutterAddress) -> Result<(), BoxError> {
        self.record(Sent::MoveUp, target)
    }
    fn send_move_down(&mut self, target: &ShutterAddress) -> Result<(), BoxError> {
        self.record(Sent::MoveDown, target)
    }
    fn send_stop(&mut self, target: &ShutterAddress) -> Result<(), BoxError> {
        self.record(Sent::Stop, target)
    }
    fn send_status_request(&mut self, target: &ShutterAddress) -> Result<(), BoxError> {
        self.record(Sent::StatusRequest, target)
    }
}

/// In-memory `RunStore`; clones share the stored values.
#[derive(Debug, Clone, Default)]
pub struct MemoryRunStore {
    runs: Arc<Mutex<Vec<u64>>>,
    fail: bool,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose writes always fail.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn persisted(&self) -> Vec<u64> {
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl RunStore for MemoryRunStore {
    fn persist_run(&mut self, run_ms: u64) -> Result<(), BoxError> {
        if self.fail {
            return Err("read-only configuration".into());
        }
        self.runs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(run_ms);
        Ok(())
    }
}

#[derive(Default)]
struct ManualState {
    armed: Vec<(StopToken, Duration)>,
    cancelled: Vec<StopToken>,
}

#[derive(Default)]
struct ManualShared {
    state: Mutex<ManualState>,
    callback: OnceLock<StopCallback>,
}

/// Stop timer that only fires when told to.
#[derive(Clone, Default)]
pub struct ManualTimer {
    shared: Arc<ManualShared>,
}

impl ManualTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Factory for `ShutterBuilder::with_timer_factory`; this handle keeps control.
    pub fn factory(&self) -> TimerFactory {
        let shared = Arc::clone(&self.shared);
        Box::new(move |cb| {
            // A second shutter on the same timer keeps the first callback.
            let _ = shared.callback.set(cb);
            Box::new(ManualTimer { shared }) as Box<dyn StopTimer>
        })
    }

    /// Stops armed and neither fired nor cancelled.
    pub fn armed(&self) -> Vec<(StopToken, Duration)> {
        self.lock().armed.clone()
    }

    pub fn cancelled(&self) -> Vec<StopToken> {
        self.lock().cancelled.clone()
    }

    /// Fire the oldest armed stop. Returns its token.
    pub fn fire_next(&self) -> Option<StopToken> {
        let token = {
            let mut st = self.lock();
            if st.armed.is_empty() {
                return None;
            }
            st.armed.remove(0).0
        };
        self.deliver(token);
        Some(token)
    }

    /// Deliver `token` whether or not it is still armed (models a firing that
    /// raced its cancellation).
    pub fn fire(&self, token: StopToken) {
        self.lock().armed.retain(|(t, _)| *t != token);
        self.deliver(token);
    }

    fn deliver(&self, token: StopToken) {
        if let Some(cb) = self.shared.callback.get() {
            cb(token);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl StopTimer for ManualTimer {
    fn arm(&mut self, token: StopToken, after: Duration) {
        self.lock().armed.push((token, after));
    }

    fn cancel(&mut self, token: StopToken) {
        let mut st = self.lock();
        st.armed.retain(|(t, _)| *t != token);
        st.cancelled.push(token);
    }
}
