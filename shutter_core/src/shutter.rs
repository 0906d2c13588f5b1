//! `Shutter`: the shared, thread-safe handle around one `ShutterMachine`.
//!
//! Commands, status events and timer firings are serialized by one mutex.
//! Bus sends and timer arm/cancel run while it is held so that the armed
//! stop and the machine's token never disagree. Write-back and position
//! publication run after it is released.

use std::marker::PhantomData;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use shutter_traits::clock::{Clock, MonotonicClock};
use shutter_traits::{Gateway, InboundFrame, RunStore, ShutterAddress, StatusEvent};

use crate::command::{Command, CommandOutcome};
use crate::config::{ShutterCfg, ShutterRun};
use crate::error::{BuildError, Result, ShutterError};
use crate::hw_error::map_gateway_error;
use crate::machine::{Action, BusCommand, ShutterMachine};
use crate::scheduler::{StopCallback, StopTimer, StopToken, ThreadStopTimer, TimerFactory};
use crate::status::{CalibrationState, DeviceStatus, MotionState};

/// Receives every change of the position estimate.
pub type PositionObserver = Box<dyn Fn(Option<u8>) + Send + Sync>;

/// Point-in-time view of one shutter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutterSnapshot {
    pub motion: MotionState,
    pub calibration: CalibrationState,
    pub run: ShutterRun,
    pub estimate: Option<u8>,
    pub pending_target: Option<u8>,
    pub stop_armed: bool,
    pub device_status: DeviceStatus,
    /// Status events applied so far; lets waiters detect motion they missed.
    pub events_seen: u64,
}

// ── Shared state ─────────────────────────────────────────────────────────────

struct Core {
    machine: ShutterMachine,
    gateway: Box<dyn Gateway + Send>,
    timer: Box<dyn StopTimer>,
    device_status: DeviceStatus,
}

impl Core {
    fn snapshot(&self) -> ShutterSnapshot {
        ShutterSnapshot {
            motion: self.machine.motion(),
            calibration: self.machine.calibration(),
            run: self.machine.run(),
            estimate: self.machine.estimate(),
            pending_target: self.machine.pending_target(),
            stop_armed: self.machine.scheduled_stop().is_some(),
            device_status: self.device_status.clone(),
            events_seen: self.machine.events_seen(),
        }
    }

    /// Carry out bus and timer actions; return the ones to run unlocked and
    /// the first send failure.
    fn execute(
        &mut self,
        address: &ShutterAddress,
        actions: Vec<Action>,
    ) -> (Vec<Action>, Option<ShutterError>) {
        let mut deferred = Vec::new();
        let mut failure = None;
        for action in actions {
            match action {
                Action::Send(cmd) => {
                    let res = match cmd {
                        BusCommand::MoveUp => self.gateway.send_move_up(address),
                        BusCommand::MoveDown => self.gateway.send_move_down(address),
                        BusCommand::Stop => self.gateway.send_stop(address),
                    };
                    match res {
                        Ok(()) => tracing::debug!(?cmd, %address, "frame sent"),
                        Err(e) => {
                            let err = map_gateway_error(&*e);
                            tracing::error!(?cmd, %address, error = %err, "gateway send failed");
                            failure.get_or_insert(err);
                        }
                    }
                }
                Action::ArmStop { token, after } => self.timer.arm(token, after),
                Action::CancelStop(token) => self.timer.cancel(token),
                Action::PersistRun(_) | Action::Publish(_) => deferred.push(action),
            }
        }
        (deferred, failure)
    }
}

struct Shared {
    core: Mutex<Core>,
    changed: Condvar,
    address: ShutterAddress,
    clock: Box<dyn Clock + Send + Sync>,
    run_store: Mutex<Option<Box<dyn RunStore + Send>>>,
    observer: Option<PositionObserver>,
}

impl Shared {
    fn lock_core(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the locked core, execute its bus actions, wake waiters,
    /// then run the deferred actions unlocked.
    fn apply<T>(
        &self,
        f: impl FnOnce(&mut ShutterMachine) -> (T, Vec<Action>),
    ) -> (T, Option<ShutterError>) {
        let (value, deferred, failure) = {
            let mut core = self.lock_core();
            let (value, actions) = f(&mut core.machine);
            let (deferred, failure) = core.execute(&self.address, actions);
            self.changed.notify_all();
            (value, deferred, failure)
        };
        self.finish(deferred);
        (value, failure)
    }

    fn finish(&self, deferred: Vec<Action>) {
        for action in deferred {
            match action {
                Action::PersistRun(run_ms) => self.persist(run_ms),
                Action::Publish(position) => {
                    tracing::info!(address = %self.address, ?position, "position changed");
                    if let Some(observer) = &self.observer {
                        observer(position);
                    }
                }
                _ => {}
            }
        }
    }

    fn persist(&self, run_ms: u64) {
        let mut store = self
            .run_store
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(store) = store.as_mut() else {
            tracing::debug!(run_ms, "no run store configured, learned run kept in memory");
            return;
        };
        match store.persist_run(run_ms) {
            Ok(()) => tracing::info!(run_ms, "shutter run written back to configuration"),
            Err(e) => {
                let err = ShutterError::Persist(e.to_string());
                tracing::warn!(run_ms, error = %err, "failed to write back shutter run");
            }
        }
    }

    fn stop_due(&self, token: StopToken) {
        let ((), _) = self.apply(|m| ((), m.on_stop_due(token)));
    }
}

// ── Public handle ────────────────────────────────────────────────────────────

/// Cheaply cloneable handle; all clones drive the same shutter.
#[derive(Clone)]
pub struct Shutter {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Shutter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shutter")
            .field("address", &self.shared.address)
            .field("state", &self.snapshot())
            .finish()
    }
}

impl Shutter {
    pub fn builder() -> ShutterBuilder<Missing, Missing> {
        ShutterBuilder::default()
    }

    pub fn address(&self) -> &ShutterAddress {
        &self.shared.address
    }

    /// Handle a command. Rejections come back as `CommandOutcome::Rejected`;
    /// a failed bus send turns the outcome into a gateway rejection.
    pub fn handle_command(&self, cmd: Command) -> CommandOutcome {
        let (outcome, failure) = self.shared.apply(|m| m.handle_command(cmd));
        match failure {
            Some(err) => CommandOutcome::Rejected(err),
            None => outcome,
        }
    }

    /// Apply a status report from the device.
    pub fn on_status_event(&self, ev: StatusEvent) {
        let clock = &self.shared.clock;
        // Timestamp taken under the lock so epochs follow event order.
        let ((), _) = self.shared.apply(|m| ((), m.on_status(ev, clock.now())));
    }

    /// Apply a frame from the gateway. Unsupported frames are logged and
    /// reported, state is left untouched.
    pub fn on_frame(&self, frame: InboundFrame) -> std::result::Result<(), ShutterError> {
        match frame {
            InboundFrame::Status(ev) => {
                self.on_status_event(ev);
                Ok(())
            }
            InboundFrame::Unsupported(raw) => {
                tracing::debug!(address = %self.shared.address, %raw, "unsupported frame ignored");
                Err(ShutterError::UnsupportedEvent(raw))
            }
        }
    }

    /// Deliver a scheduled stop. Normally called by the stop timer.
    pub fn on_stop_due(&self, token: StopToken) {
        self.shared.stop_due(token);
    }

    /// Ask the device to report its motion state.
    pub fn request_status(&self) -> std::result::Result<(), ShutterError> {
        let mut core = self.shared.lock_core();
        core.gateway
            .send_status_request(&self.shared.address)
            .map_err(|e| map_gateway_error(&*e))
            .inspect(|_| tracing::debug!(address = %self.shared.address, "status requested"))
    }

    pub fn current_estimate(&self) -> Option<u8> {
        self.shared.lock_core().machine.estimate()
    }

    pub fn current_motion_state(&self) -> MotionState {
        self.shared.lock_core().machine.motion()
    }

    pub fn device_status(&self) -> DeviceStatus {
        self.shared.lock_core().device_status.clone()
    }

    pub fn snapshot(&self) -> ShutterSnapshot {
        self.shared.lock_core().snapshot()
    }

    /// Block until `pred` holds for the current state or `timeout` elapses.
    pub fn wait_for(
        &self,
        mut pred: impl FnMut(&ShutterSnapshot) -> bool,
        timeout: Duration,
    ) -> std::result::Result<ShutterSnapshot, ShutterError> {
        let deadline = Instant::now() + timeout;
        let mut core = self.shared.lock_core();
        loop {
            let snap = core.snapshot();
            if pred(&snap) {
                return Ok(snap);
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Err(ShutterError::Timeout);
            }
            core = self
                .shared
                .changed
                .wait_timeout(core, left)
                .map_or_else(|p| p.into_inner().0, |(g, _)| g);
        }
    }

    /// Current run in configuration form: `AUTO` or decimal milliseconds.
    pub fn shutter_run_setting(&self) -> String {
        self.shared.lock_core().machine.run().to_string()
    }

    /// Reconfigure the run from its text form. An invalid value puts the
    /// device in configuration error and falls back to `AUTO`.
    pub fn set_shutter_run(&self, text: &str) -> std::result::Result<(), ShutterError> {
        let mut core = self.shared.lock_core();
        let res = match shutter_config::RunSetting::parse(text) {
            Ok(setting) => {
                core.machine.set_run(setting.into());
                core.device_status = DeviceStatus::Online;
                Ok(())
            }
            Err(e) => {
                let msg = e.to_string();
                tracing::warn!(address = %self.shared.address, error = %msg, "invalid shutter run, using AUTO");
                core.machine.set_run(ShutterRun::Undefined);
                core.device_status = DeviceStatus::ConfigurationError(msg.clone());
                Err(ShutterError::Config(msg))
            }
        };
        self.shared.changed.notify_all();
        res
    }
}

// ── Type-state markers ───────────────────────────────────────────────────────

pub struct Missing;
pub struct Set;

/// Builder for `Shutter`. Gateway and address are required.
pub struct ShutterBuilder<G, A> {
    gateway: Option<Box<dyn Gateway + Send>>,
    address: Option<ShutterAddress>,
    cfg: ShutterCfg,
    run_text: Option<String>,
    clock: Option<Box<dyn Clock + Send + Sync>>,
    run_store: Option<Box<dyn RunStore + Send>>,
    observer: Option<PositionObserver>,
    timer_factory: Option<TimerFactory>,
    _g: PhantomData<G>,
    _a: PhantomData<A>,
}

impl Default for ShutterBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            gateway: None,
            address: None,
            cfg: ShutterCfg::default(),
            run_text: None,
            clock: None,
            run_store: None,
            observer: None,
            timer_factory: None,
            _g: PhantomData,
            _a: PhantomData,
        }
    }
}

impl<G, A> ShutterBuilder<G, A> {
    fn retype<G2, A2>(self) -> ShutterBuilder<G2, A2> {
        ShutterBuilder {
            gateway: self.gateway,
            address: self.address,
            cfg: self.cfg,
            run_text: self.run_text,
            clock: self.clock,
            run_store: self.run_store,
            observer: self.observer,
            timer_factory: self.timer_factory,
            _g: PhantomData,
            _a: PhantomData,
        }
    }

    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<Shutter> {
        let gateway = self
            .gateway
            .ok_or_else(|| eyre::Report::new(BuildError::MissingGateway))?;
        let address = self
            .address
            .ok_or_else(|| eyre::Report::new(BuildError::MissingAddress))?;
        if address.id.trim().is_empty() {
            return Err(eyre::Report::new(BuildError::InvalidConfig(
                "shutter address must not be empty",
            )));
        }

        let mut cfg = self.cfg;
        let mut device_status = DeviceStatus::Online;
        if let Some(text) = self.run_text {
            match shutter_config::RunSetting::parse(&text) {
                Ok(setting) => cfg.run = setting.into(),
                Err(e) => {
                    tracing::warn!(%address, error = %e, "invalid shutter run, using AUTO");
                    cfg.run = ShutterRun::Undefined;
                    device_status = DeviceStatus::ConfigurationError(e.to_string());
                }
            }
        }

        let clock = self.clock.unwrap_or_else(|| Box::new(MonotonicClock::new()));
        let timer_factory = self.timer_factory.unwrap_or_else(ThreadStopTimer::factory);
        tracing::info!(%address, run = %cfg.run, min_step_ms = cfg.min_step.as_millis(), "shutter ready");

        let shared = Arc::new_cyclic(|weak: &Weak<Shared>| {
            let weak = weak.clone();
            let callback: StopCallback = Box::new(move |token| {
                if let Some(shared) = weak.upgrade() {
                    shared.stop_due(token);
                }
            });
            Shared {
                core: Mutex::new(Core {
                    machine: ShutterMachine::new(&cfg),
                    gateway,
                    timer: timer_factory(callback),
                    device_status,
                }),
                changed: Condvar::new(),
                address,
                clock,
                run_store: Mutex::new(self.run_store),
                observer: self.observer,
            }
        });

        // Nothing is known until the device reports.
        if let Some(observer) = &shared.observer {
            observer(None);
        }
        Ok(Shutter { shared })
    }
}

/// Chainable setters that do not affect type-state.
impl<G, A> ShutterBuilder<G, A> {
    pub fn with_config(mut self, cfg: ShutterCfg) -> Self {
        self.cfg = cfg;
        self
    }
    /// Run in configuration text form; validated on build.
    pub fn with_run_setting(mut self, text: impl Into<String>) -> Self {
        self.run_text = Some(text.into());
        self
    }
    pub fn with_min_step(mut self, min_step: Duration) -> Self {
        self.cfg.min_step = min_step;
        self
    }
    /// Provide a custom clock implementation; defaults to `MonotonicClock` when not provided.
    pub fn with_clock(mut self, clock: Box<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
    pub fn with_run_store(mut self, store: impl RunStore + Send + 'static) -> Self {
        self.run_store = Some(Box::new(store));
        self
    }
    pub fn with_observer(mut self, f: impl Fn(Option<u8>) + Send + Sync + 'static) -> Self {
        self.observer = Some(Box::new(f));
        self
    }
    /// Replace the real-time stop timer (tests drive stops by hand).
    pub fn with_timer_factory(mut self, factory: TimerFactory) -> Self {
        self.timer_factory = Some(factory);
        self
    }
    /// Address, run and minimum step from the `[shutter]` TOML section.
    pub fn with_section(self, section: &shutter_config::ShutterSection) -> ShutterBuilder<G, Set> {
        self.with_address(crate::conversions::address(section))
            .with_run_setting(section.run_text())
            .with_min_step(crate::conversions::min_step(section))
    }
}

// Setters that advance type-state
impl<A> ShutterBuilder<Missing, A> {
    pub fn with_gateway(mut self, gateway: impl Gateway + Send + 'static) -> ShutterBuilder<Set, A> {
        self.gateway = Some(Box::new(gateway));
        self.retype()
    }
}

impl<G, A> ShutterBuilder<G, A> {
    pub fn with_address(mut self, address: ShutterAddress) -> ShutterBuilder<G, Set> {
        self.address = Some(address);
        self.retype()
    }
}

impl ShutterBuilder<Set, Set> {
    /// Build once gateway and address are set.
    pub fn build(self) -> Result<Shutter> {
        self.try_build()
    }
}
