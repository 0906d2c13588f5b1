//! Session wiring: config mapping, simulated gateway, event pump, and
//! command execution with settle-waiting.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use eyre::WrapErr;
use serde_json::json;
use shutter_config::Config;
use shutter_core::{
    CalibrationState, Command, CommandOutcome, DeviceStatus, EventPump, MotionState, Shutter,
    ShutterError, ShutterRun, ShutterSnapshot, TomlRunStore,
};
use shutter_hardware::{SimProbe, SimulatedShutter, SimulatorCfg};

/// How long to wait for the device to answer the startup status request.
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);
/// Ctrl-C is checked at least this often while waiting.
const WAIT_SLICE: Duration = Duration::from_millis(100);

pub struct Session {
    shutter: Shutter,
    probe: SimProbe,
    shutdown: Arc<AtomicBool>,
    _pump: EventPump,
}

/// What one command did.
#[derive(Debug, Clone)]
pub struct MoveReport {
    pub command: Command,
    pub outcome: CommandOutcome,
    pub estimate: Option<u8>,
    pub actual: u8,
    pub run: ShutterRun,
    pub interrupted: bool,
}

fn outcome_name(o: &CommandOutcome) -> &'static str {
    match o {
        CommandOutcome::Sent => "Sent",
        CommandOutcome::Scheduled { .. } => "Scheduled",
        CommandOutcome::CalibrationStarted { .. } => "CalibrationStarted",
        CommandOutcome::AlreadyAtTarget => "AlreadyAtTarget",
        CommandOutcome::BelowMinimumStep { .. } => "BelowMinimumStep",
        CommandOutcome::Rejected(_) => "Rejected",
    }
}

fn fmt_estimate(p: Option<u8>) -> String {
    p.map_or_else(|| "unknown".to_string(), |p| format!("{p}%"))
}

impl MoveReport {
    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "command": self.command.to_string(),
            "outcome": outcome_name(&self.outcome),
            "estimate": self.estimate,
            "actual": self.actual,
            "shutter_run": self.run.to_string(),
            "interrupted": self.interrupted,
        })
    }

    pub fn render(&self) -> String {
        let mut s = format!(
            "{}: {} | estimate {} | actual {}% | run {}",
            self.command,
            outcome_name(&self.outcome),
            fmt_estimate(self.estimate),
            self.actual,
            self.run
        );
        if self.interrupted {
            s.push_str(" | interrupted");
        }
        s
    }
}

/// Controller state plus the simulated actuator's true position.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub snapshot: ShutterSnapshot,
    pub actual: u8,
}

impl StatusReport {
    pub fn to_json(&self) -> serde_json::Value {
        let s = &self.snapshot;
        json!({
            "motion": s.motion.to_string(),
            "estimate": s.estimate,
            "actual": self.actual,
            "shutter_run": s.run.to_string(),
            "calibration": s.calibration.to_string(),
            "device_status": s.device_status.to_string(),
        })
    }

    pub fn render(&self) -> String {
        let s = &self.snapshot;
        format!(
            "motion {} | estimate {} | actual {}% | run {} | device {}",
            s.motion,
            fmt_estimate(s.estimate),
            self.actual,
            s.run,
            s.device_status
        )
    }
}

impl Session {
    /// Start the simulated gateway, build the shutter, and learn the motion
    /// state from the device.
    pub fn open(cfg: &Config, config_path: &Path, shutdown: Arc<AtomicBool>) -> eyre::Result<Self> {
        let sim_cfg = SimulatorCfg {
            travel: Duration::from_millis(cfg.simulator.travel_ms),
            start_position: cfg.simulator.start_position,
            ack_delay: Duration::from_millis(cfg.simulator.ack_delay_ms),
        };
        let (gateway, frames) = SimulatedShutter::spawn(&sim_cfg);
        let probe = gateway.probe();

        let shutter = Shutter::builder()
            .with_gateway(gateway)
            .with_section(&cfg.shutter)
            .with_run_store(TomlRunStore::new(config_path))
            .with_observer(|p| tracing::debug!(position = ?p, "estimate published"))
            .build()
            .wrap_err("build shutter")?;
        if let DeviceStatus::ConfigurationError(msg) = shutter.device_status() {
            tracing::warn!(%msg, "shutter_run invalid, calibrating on demand");
        }
        let pump = EventPump::spawn(shutter.clone(), frames);

        shutter.request_status()?;
        shutter
            .wait_for(|s| s.motion != MotionState::Unknown, STARTUP_TIMEOUT)
            .wrap_err("device did not report its state")?;

        Ok(Self {
            shutter,
            probe,
            shutdown,
            _pump: pump,
        })
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            snapshot: self.shutter.snapshot(),
            actual: self.probe.position(),
        }
    }

    /// Run one command and wait until the shutter has settled.
    pub fn execute(&self, cmd: Command, timeout: Duration) -> eyre::Result<MoveReport> {
        let before = self.shutter.snapshot().events_seen;
        let outcome = self.shutter.handle_command(cmd);
        tracing::info!(%cmd, outcome = outcome_name(&outcome), "command handled");

        let interrupted = match &outcome {
            CommandOutcome::Rejected(e) => return Err(eyre::Report::new(e.clone())),
            CommandOutcome::AlreadyAtTarget | CommandOutcome::BelowMinimumStep { .. } => false,
            CommandOutcome::Sent
            | CommandOutcome::Scheduled { .. }
            | CommandOutcome::CalibrationStarted { .. } => self.wait_settled(before, timeout)?,
        };

        let snap = self.shutter.snapshot();
        Ok(MoveReport {
            command: cmd,
            outcome,
            estimate: snap.estimate,
            actual: self.probe.position(),
            run: snap.run,
            interrupted,
        })
    }

    /// Forget the run, then move to `target`, which learns it again.
    pub fn calibrate(&self, target: u8, timeout: Duration) -> eyre::Result<MoveReport> {
        if target == 0 || target == 100 {
            eyre::bail!("calibration target must be strictly between 0 and 100, got {target}");
        }
        self.shutter.set_shutter_run(shutter_config::AUTO_LITERAL)?;
        self.execute(Command::GoToPercent(target), timeout)
    }

    /// Wait until a new status event arrived and the shutter is stopped with
    /// nothing pending. Returns true if interrupted by Ctrl-C.
    fn wait_settled(&self, events_before: u64, timeout: Duration) -> eyre::Result<bool> {
        let deadline = Instant::now() + timeout;
        let settled = |s: &ShutterSnapshot| {
            s.events_seen > events_before
                && s.motion == MotionState::Stopped
                && s.calibration == CalibrationState::Inactive
                && !s.stop_armed
        };
        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                tracing::warn!("interrupted, stopping shutter");
                self.shutter.handle_command(Command::Stop);
                return Ok(true);
            }
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                tracing::error!(?timeout, "shutter did not settle, stopping");
                self.shutter.handle_command(Command::Stop);
                return Err(eyre::Report::new(ShutterError::Timeout));
            }
            match self.shutter.wait_for(&settled, left.min(WAIT_SLICE)) {
                Ok(_) => return Ok(false),
                Err(ShutterError::Timeout) => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
}
