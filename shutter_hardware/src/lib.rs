//! Bus-side pieces: the automation frame codec and a simulated shutter
//! gateway that behaves like a linear actuator with end-stop switches.

pub mod error;
pub mod frame;
pub mod util;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use shutter_traits::{Gateway, InboundFrame, ShutterAddress};

use crate::error::HwError;
use crate::frame::{Frame, What};

/// How long a send waits for the simulated device to acknowledge.
const ACK_TIMEOUT: Duration = Duration::from_secs(1);
const ACK_POLL: Duration = Duration::from_millis(1);
const IDLE_POLL: Duration = Duration::from_millis(50);

/// Simulated actuator parameters.
#[derive(Debug, Clone)]
pub struct SimulatorCfg {
    /// Full travel time, open to closed.
    pub travel: Duration,
    /// Position at power-up, 0 = open, 100 = closed.
    pub start_position: u8,
    /// Delay before a command is acknowledged and acted on.
    pub ack_delay: Duration,
}

impl Default for SimulatorCfg {
    fn default() -> Self {
        Self {
            travel: Duration::from_secs(20),
            start_position: 30,
            ack_delay: Duration::ZERO,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dir {
    Up,
    Down,
}

/// Actuator model. Position is kept in milliseconds of travel from the top.
#[derive(Debug)]
struct Model {
    travel_ms: u64,
    pos_ms: u64,
    moving: Option<(Dir, Instant, u64)>,
}

impl Model {
    fn position_at(&self, now: Instant) -> u64 {
        match self.moving {
            None => self.pos_ms,
            Some((dir, since, start)) => {
                let run = u64::try_from(now.saturating_duration_since(since).as_millis())
                    .unwrap_or(u64::MAX);
                match dir {
                    Dir::Up => start.saturating_sub(run),
                    Dir::Down => start.saturating_add(run).min(self.travel_ms),
                }
            }
        }
    }

    /// Time left until the end stop of the current motion.
    fn until_end(&self, now: Instant) -> Option<Duration> {
        let (dir, ..) = self.moving?;
        let pos = self.position_at(now);
        let left = match dir {
            Dir::Up => pos,
            Dir::Down => self.travel_ms - pos,
        };
        Some(Duration::from_millis(left))
    }

    fn halt(&mut self, now: Instant) {
        self.pos_ms = self.position_at(now);
        self.moving = None;
    }

    fn start(&mut self, dir: Dir, now: Instant) {
        self.halt(now);
        self.moving = Some((dir, now, self.pos_ms));
    }

    fn percent(&self, now: Instant) -> u8 {
        if self.travel_ms == 0 {
            return 0;
        }
        let p = (u128::from(self.position_at(now)) * 100 + u128::from(self.travel_ms) / 2)
            / u128::from(self.travel_ms);
        u8::try_from(p.min(100)).unwrap_or(100)
    }

    fn report(&self) -> What {
        match self.moving {
            None => What::Stop,
            Some((Dir::Up, ..)) => What::Up,
            Some((Dir::Down, ..)) => What::Down,
        }
    }
}

/// Gateway backed by a simulated actuator running on its own thread.
///
/// Frames are encoded, sent to the worker, decoded there and answered with
/// status frames on the receiver returned by `spawn`. Each send blocks until
/// the worker has acknowledged it.
pub struct SimulatedShutter {
    tx: xch::Sender<(u64, String)>,
    next_seq: u64,
    acked: Arc<AtomicU64>,
    model: Arc<Mutex<Model>>,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

impl SimulatedShutter {
    pub fn spawn(cfg: &SimulatorCfg) -> (Self, xch::Receiver<InboundFrame>) {
        let travel_ms = u64::try_from(cfg.travel.as_millis()).unwrap_or(u64::MAX);
        let model = Arc::new(Mutex::new(Model {
            travel_ms,
            pos_ms: travel_ms * u64::from(cfg.start_position.min(100)) / 100,
            moving: None,
        }));
        let (req_tx, req_rx) = xch::unbounded::<(u64, String)>();
        let (ev_tx, ev_rx) = xch::unbounded::<InboundFrame>();
        let acked = Arc::new(AtomicU64::new(0));
        let shutdown = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            model: Arc::clone(&model),
            requests: req_rx,
            events: ev_tx,
            acked: Arc::clone(&acked),
            shutdown: Arc::clone(&shutdown),
            ack_delay: cfg.ack_delay,
            where_: None,
        };
        let join_handle = std::thread::spawn(move || worker.run());
        tracing::debug!(travel_ms, start = cfg.start_position, "simulated shutter started");

        (
            Self {
                tx: req_tx,
                next_seq: 0,
                acked,
                model,
                shutdown,
                join_handle: Some(join_handle),
            },
            ev_rx,
        )
    }

    /// Read-only view of the actuator that outlives moving the gateway away.
    pub fn probe(&self) -> SimProbe {
        SimProbe {
            model: Arc::clone(&self.model),
        }
    }

    /// True position of the simulated actuator in percent.
    pub fn position(&self) -> u8 {
        self.probe().position()
    }

    pub fn is_moving(&self) -> bool {
        self.probe().is_moving()
    }

    fn send_frame(&mut self, frame: String) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.next_seq += 1;
        let seq = self.next_seq;
        tracing::trace!(%frame, seq, "frame to simulator");
        self.tx
            .send((seq, frame))
            .map_err(|_| HwError::Disconnected)?;
        let acked = Arc::clone(&self.acked);
        util::wait_for_ack_with_timeout(
            move || acked.load(Ordering::Acquire) >= seq,
            ACK_TIMEOUT,
            ACK_POLL,
        )?;
        Ok(())
    }
}

impl Gateway for SimulatedShutter {
    fn send_move_up(
        &mut self,
        target: &ShutterAddress,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.send_frame(frame::command_frame(What::Up, target))
    }
    fn send_move_down(
        &mut self,
        target: &ShutterAddress,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.send_frame(frame::command_frame(What::Down, target))
    }
    fn send_stop(
        &mut self,
        target: &ShutterAddress,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.send_frame(frame::command_frame(What::Stop, target))
    }
    fn send_status_request(
        &mut self,
        target: &ShutterAddress,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.send_frame(frame::status_request_frame(target))
    }
}

impl Drop for SimulatedShutter {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("simulator thread joined successfully"),
                Err(e) => tracing::warn!(?e, "simulator thread panicked during shutdown"),
            }
        }
    }
}

/// Shared view of a simulated actuator.
#[derive(Debug, Clone)]
pub struct SimProbe {
    model: Arc<Mutex<Model>>,
}

impl SimProbe {
    pub fn position(&self) -> u8 {
        self.model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .percent(Instant::now())
    }

    pub fn is_moving(&self) -> bool {
        self.model
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .moving
            .is_some()
    }
}

struct Worker {
    model: Arc<Mutex<Model>>,
    requests: xch::Receiver<(u64, String)>,
    events: xch::Sender<InboundFrame>,
    acked: Arc<AtomicU64>,
    shutdown: Arc<AtomicBool>,
    ack_delay: Duration,
    /// Address learned from the first request; reports are sent for it.
    where_: Option<String>,
}

impl Worker {
    fn run(mut self) {
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                tracing::debug!("simulator thread received shutdown signal");
                break;
            }
            let wait = self
                .lock()
                .until_end(Instant::now())
                .map_or(IDLE_POLL, |d| d.min(IDLE_POLL));
            match self.requests.recv_timeout(wait) {
                Ok((seq, raw)) => {
                    if !self.ack_delay.is_zero() {
                        std::thread::sleep(self.ack_delay);
                    }
                    self.handle(&raw);
                    self.acked.store(seq, Ordering::Release);
                }
                Err(xch::RecvTimeoutError::Timeout) => {}
                Err(xch::RecvTimeoutError::Disconnected) => break,
            }
            self.check_end_stop();
        }
        tracing::trace!("simulator thread exiting cleanly");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Model> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle(&mut self, raw: &str) {
        let frame = match frame::parse(raw) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "simulator dropped frame");
                return;
            }
        };
        if let Some(addr) = frame.address() {
            self.where_.get_or_insert_with(|| addr.to_string());
        }
        let now = Instant::now();
        let report = {
            let mut m = self.lock();
            match frame {
                Frame::Command { what: What::Up, .. } => {
                    m.start(Dir::Up, now);
                    What::Up
                }
                Frame::Command { what: What::Down, .. } => {
                    m.start(Dir::Down, now);
                    What::Down
                }
                Frame::Command { what: What::Stop, .. } => {
                    m.halt(now);
                    What::Stop
                }
                Frame::StatusRequest { .. } => m.report(),
                Frame::Other(raw) => {
                    tracing::debug!(%raw, "simulator ignored frame");
                    return;
                }
            }
        };
        self.emit(report);
    }

    fn check_end_stop(&mut self) {
        let now = Instant::now();
        let reached = {
            let mut m = self.lock();
            if m.until_end(now).is_some_and(|d| d.is_zero()) {
                m.halt(now);
                true
            } else {
                false
            }
        };
        if reached {
            tracing::debug!("simulated shutter reached end stop");
            self.emit(What::Stop);
        }
    }

    /// Encode a status report and decode it again, as a real gateway would.
    fn emit(&self, what: What) {
        let where_ = self.where_.clone().unwrap_or_default();
        let raw = format!("*{}*{}*{where_}##", frame::WHO_AUTOMATION, what.code());
        let inbound = match frame::parse(&raw) {
            Ok(f) => f.into_inbound(),
            Err(e) => {
                tracing::warn!(error = %e, "simulator produced bad frame");
                return;
            }
        };
        // Receiver gone: nobody is listening any more.
        let _ = self.events.send(inbound);
    }
}
