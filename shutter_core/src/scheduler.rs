//! Delayed stop delivery.
//!
//! A timed move arms one stop. The machine keeps the token of the armed stop
//! and only honours a firing whose token matches, so a cancel that races a
//! firing can never stop a newer move.
//!
//! `ThreadStopTimer` owns exactly one worker thread, shut down and joined
//! when the timer is dropped.

use crossbeam_channel as xch;
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

/// Identity of one armed stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StopToken(u64);

impl StopToken {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Invoked from the timer with the token that came due.
pub type StopCallback = Box<dyn Fn(StopToken) + Send + Sync + 'static>;

/// Builds the timer for a shutter once its callback exists.
pub type TimerFactory = Box<dyn FnOnce(StopCallback) -> Box<dyn StopTimer> + Send>;

/// One-shot delayed stops. Arm and cancel must not block on the callback.
pub trait StopTimer: Send {
    fn arm(&mut self, token: StopToken, after: Duration);
    fn cancel(&mut self, token: StopToken);
}

enum Msg {
    Arm(StopToken, Instant),
    Cancel(StopToken),
    Shutdown,
}

/// Real-time timer backed by a crossbeam channel and `recv_timeout`.
pub struct ThreadStopTimer {
    tx: xch::Sender<Msg>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl ThreadStopTimer {
    pub fn spawn(callback: StopCallback) -> Self {
        let (tx, rx) = xch::unbounded::<Msg>();
        let worker = thread::Builder::new()
            .name("shutter-stop-timer".into())
            .spawn(move || run_timer(&rx, &callback))
            .map_err(|e| tracing::error!(error = %e, "failed to spawn stop timer thread"))
            .ok();
        let worker_id = worker
            .as_ref()
            .map_or_else(|| thread::current().id(), |h| h.thread().id());
        Self {
            tx,
            worker,
            worker_id,
        }
    }

    /// Boxed factory for `ShutterBuilder::with_timer_factory`.
    pub fn factory() -> TimerFactory {
        Box::new(|cb| Box::new(Self::spawn(cb)) as Box<dyn StopTimer>)
    }
}

fn run_timer(rx: &xch::Receiver<Msg>, callback: &StopCallback) {
    let mut pending: Vec<(StopToken, Instant)> = Vec::new();
    loop {
        let next = pending.iter().map(|(_, at)| *at).min();
        let msg = match next {
            Some(at) => rx.recv_timeout(at.saturating_duration_since(Instant::now())),
            None => rx.recv().map_err(|_| xch::RecvTimeoutError::Disconnected),
        };
        match msg {
            Ok(Msg::Arm(token, at)) => pending.push((token, at)),
            Ok(Msg::Cancel(token)) => pending.retain(|(t, _)| *t != token),
            Ok(Msg::Shutdown) | Err(xch::RecvTimeoutError::Disconnected) => {
                tracing::debug!("stop timer thread received shutdown signal");
                break;
            }
            Err(xch::RecvTimeoutError::Timeout) => {}
        }
        let now = Instant::now();
        let (due, rest): (Vec<_>, Vec<_>) = pending.into_iter().partition(|(_, at)| *at <= now);
        pending = rest;
        for (token, _) in due {
            tracing::trace!(?token, "stop timer fired");
            callback(token);
        }
    }
    tracing::trace!("stop timer thread exiting cleanly");
}

impl StopTimer for ThreadStopTimer {
    fn arm(&mut self, token: StopToken, after: Duration) {
        let at = Instant::now() + after;
        if self.tx.send(Msg::Arm(token, at)).is_err() {
            tracing::warn!(?token, "stop timer thread gone, stop not armed");
        }
    }

    fn cancel(&mut self, token: StopToken) {
        // A gone worker has nothing left to cancel.
        let _ = self.tx.send(Msg::Cancel(token));
    }
}

impl Drop for ThreadStopTimer {
    fn drop(&mut self) {
        let _ = self.tx.send(Msg::Shutdown);
        // The last owner may be released from inside the callback.
        if thread::current().id() == self.worker_id {
            tracing::trace!("stop timer dropped on its own thread, detaching");
            return;
        }
        if let Some(handle) = self.worker.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("stop timer thread joined successfully"),
                Err(e) => tracing::warn!(?e, "stop timer thread panicked during shutdown"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recording() -> (StopCallback, Arc<Mutex<Vec<StopToken>>>) {
        let fired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&fired);
        let cb: StopCallback = Box::new(move |t| sink.lock().unwrap().push(t));
        (cb, fired)
    }

    #[test]
    fn fires_once_after_delay() {
        let (cb, fired) = recording();
        let mut timer = ThreadStopTimer::spawn(cb);
        timer.arm(StopToken::new(1), Duration::from_millis(20));
        thread::sleep(Duration::from_millis(200));
        assert_eq!(*fired.lock().unwrap(), vec![StopToken::new(1)]);
    }

    #[test]
    fn cancelled_stop_never_fires() {
        let (cb, fired) = recording();
        let mut timer = ThreadStopTimer::spawn(cb);
        timer.arm(StopToken::new(7), Duration::from_millis(100));
        timer.cancel(StopToken::new(7));
        timer.arm(StopToken::new(8), Duration::from_millis(10));
        thread::sleep(Duration::from_millis(250));
        assert_eq!(*fired.lock().unwrap(), vec![StopToken::new(8)]);
    }

    #[test]
    fn drop_joins_idle_worker() {
        let (cb, fired) = recording();
        let mut timer = ThreadStopTimer::spawn(cb);
        timer.arm(StopToken::new(3), Duration::from_secs(60));
        drop(timer);
        assert!(fired.lock().unwrap().is_empty());
    }
}
