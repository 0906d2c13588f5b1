//! The shutter state machine (`ShutterMachine`).
//!
//! Pure: it never talks to the bus, a timer or a file. Every input returns the
//! ordered list of [`Action`]s the owner must carry out. Order matters: a
//! timed move always yields `ArmStop` before the move frame so that bus
//! acknowledgement latency cannot shorten the stop deadline.

use std::time::{Duration, Instant};

use shutter_config::MIN_SHUTTER_RUN_MS;
use shutter_traits::StatusEvent;

use crate::command::{Command, CommandOutcome};
use crate::config::{ShutterCfg, ShutterRun};
use crate::error::ShutterError;
use crate::estimate::{POSITION_DOWN, POSITION_UP, move_time_ms, position_after_move};
use crate::scheduler::StopToken;
use crate::status::{CalibrationState, MotionState};

/// Frame to put on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusCommand {
    MoveUp,
    MoveDown,
    Stop,
}

/// Side effect requested by the machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Send(BusCommand),
    /// Send a stop once `after` has elapsed, unless cancelled first.
    ArmStop { token: StopToken, after: Duration },
    CancelStop(StopToken),
    /// Write the learned run back to configuration (best effort).
    PersistRun(u64),
    /// The position estimate changed to this value.
    Publish(Option<u8>),
}

#[derive(Debug, Clone)]
pub struct ShutterMachine {
    motion: MotionState,
    calibration: CalibrationState,
    run: ShutterRun,
    estimate: Option<u8>,
    epoch: Option<Instant>,
    pending_target: Option<u8>,
    scheduled: Option<StopToken>,
    next_token: u64,
    min_step: Duration,
    events: u64,
}

impl ShutterMachine {
    pub fn new(cfg: &ShutterCfg) -> Self {
        Self {
            motion: MotionState::Unknown,
            calibration: CalibrationState::Inactive,
            run: cfg.run,
            estimate: None,
            epoch: None,
            pending_target: None,
            scheduled: None,
            next_token: 0,
            min_step: cfg.min_step,
            events: 0,
        }
    }

    pub fn motion(&self) -> MotionState {
        self.motion
    }
    pub fn calibration(&self) -> CalibrationState {
        self.calibration
    }
    pub fn run(&self) -> ShutterRun {
        self.run
    }
    pub fn estimate(&self) -> Option<u8> {
        self.estimate
    }
    pub fn pending_target(&self) -> Option<u8> {
        self.pending_target
    }
    /// Token of the armed, unfired stop, if any.
    pub fn scheduled_stop(&self) -> Option<StopToken> {
        self.scheduled
    }
    pub fn min_step(&self) -> Duration {
        self.min_step
    }
    /// Status events applied so far.
    pub fn events_seen(&self) -> u64 {
        self.events
    }

    /// Replace the shutter run (reconfiguration). The estimate is kept.
    pub fn set_run(&mut self, run: ShutterRun) {
        tracing::debug!(old = %self.run, new = %run, "shutter run reconfigured");
        self.run = run;
    }

    /// Translate a command into bus actions.
    ///
    /// Any command aborts a calibration in progress; a `GoToPercent` that
    /// needs the run may start a new one.
    pub fn handle_command(&mut self, cmd: Command) -> (CommandOutcome, Vec<Action>) {
        let mut out = Vec::new();
        tracing::debug!(%cmd, motion = %self.motion, estimate = ?self.estimate, "command");
        if self.calibration != CalibrationState::Inactive {
            tracing::debug!(calibration = %self.calibration, "calibration aborted by command");
        }
        self.calibration = CalibrationState::Inactive;
        self.pending_target = None;

        let outcome = match cmd {
            Command::Up => {
                out.push(Action::Send(BusCommand::MoveUp));
                CommandOutcome::Sent
            }
            Command::Down => {
                out.push(Action::Send(BusCommand::MoveDown));
                CommandOutcome::Sent
            }
            Command::Stop => {
                out.push(Action::Send(BusCommand::Stop));
                CommandOutcome::Sent
            }
            Command::GoToPercent(p) => self.go_to_percent(p, &mut out),
        };
        if let CommandOutcome::Rejected(e) = &outcome {
            tracing::warn!(%cmd, error = %e, "command rejected");
        }
        (outcome, out)
    }

    fn go_to_percent(&mut self, target: u8, out: &mut Vec<Action>) -> CommandOutcome {
        if target > POSITION_DOWN {
            return CommandOutcome::Rejected(ShutterError::UnsupportedCommand(format!(
                "{target}% is outside 0..=100"
            )));
        }
        match self.motion {
            MotionState::Stopped => {}
            MotionState::Unknown => {
                return CommandOutcome::Rejected(ShutterError::InsufficientInformation(
                    "motion state unknown",
                ));
            }
            moving => return CommandOutcome::Rejected(ShutterError::Busy(moving)),
        }
        if self.estimate == Some(target) {
            tracing::debug!(target, "already at target");
            return CommandOutcome::AlreadyAtTarget;
        }
        // End stops: the actuator stops itself at end of travel.
        if target == POSITION_DOWN {
            out.push(Action::Send(BusCommand::MoveDown));
            return CommandOutcome::Sent;
        }
        if target == POSITION_UP {
            out.push(Action::Send(BusCommand::MoveUp));
            return CommandOutcome::Sent;
        }

        match (self.run, self.estimate) {
            (ShutterRun::Undefined, _) => {
                tracing::info!(target, "shutter run unknown, starting calibration");
                self.calibration = CalibrationState::Activated;
                self.pending_target = Some(target);
                out.push(Action::Send(BusCommand::MoveUp));
                CommandOutcome::CalibrationStarted { target }
            }
            (ShutterRun::Known(run_ms), Some(pos)) => {
                let move_ms = move_time_ms(pos, target, run_ms);
                let move_time = Duration::from_millis(move_ms);
                if move_time <= self.min_step {
                    // TODO: snap to the minimum step instead of dropping once actuator
                    // overrun on short pulses has been measured.
                    tracing::warn!(target, move_ms, "move shorter than minimum step, ignored");
                    return CommandOutcome::BelowMinimumStep { move_time };
                }
                self.arm_stop(move_time, out);
                let dir = if target > pos {
                    BusCommand::MoveDown
                } else {
                    BusCommand::MoveUp
                };
                tracing::debug!(from = pos, target, move_ms, ?dir, "timed move");
                out.push(Action::Send(dir));
                CommandOutcome::Scheduled { after: move_time }
            }
            (ShutterRun::Known(_), None) => CommandOutcome::Rejected(
                ShutterError::InsufficientInformation("position unknown"),
            ),
        }
    }

    /// Apply a status report from the actuator.
    pub fn on_status(&mut self, ev: StatusEvent, now: Instant) -> Vec<Action> {
        let mut out = Vec::new();
        self.events = self.events.wrapping_add(1);
        match ev {
            StatusEvent::MovingUp => self.on_moving(MotionState::MovingUp, now, &mut out),
            StatusEvent::MovingDown => self.on_moving(MotionState::MovingDown, now, &mut out),
            StatusEvent::Stopped => self.on_stopped(now, &mut out),
        }
        tracing::debug!(
            motion = %self.motion,
            estimate = ?self.estimate,
            calibration = %self.calibration,
            run = %self.run,
            "state after {ev:?}"
        );
        out
    }

    fn on_moving(&mut self, next: MotionState, now: Instant, out: &mut Vec<Action>) {
        if self.motion.is_moving() {
            // Moving again without a stop in between, same direction or not:
            // account for the finished leg and drop the timed stop.
            tracing::debug!(previous = %self.motion, motion = %next, "motion report while moving");
            self.update_position(now, out);
            self.cancel_stop(out);
        }
        self.motion = next;
        self.epoch = Some(now);
        if self.calibration == CalibrationState::Activated {
            self.calibration = if next == MotionState::MovingUp {
                CalibrationState::GoingUp
            } else {
                CalibrationState::GoingDown
            };
            tracing::debug!(calibration = %self.calibration, "calibration leg started");
        }
    }

    fn on_stopped(&mut self, now: Instant, out: &mut Vec<Action>) {
        let was_moving = self.motion.is_moving();
        let mut learned = false;

        if self.calibration == CalibrationState::GoingDown && !self.run.is_known() {
            match (self.motion, self.epoch) {
                (MotionState::MovingDown, Some(epoch)) => {
                    let ms = u64::try_from(now.saturating_duration_since(epoch).as_millis())
                        .unwrap_or(u64::MAX);
                    if ms > 0 {
                        self.run = ShutterRun::Known(ms);
                        learned = true;
                        tracing::info!(run_ms = ms, "calibration completed, shutter run learned");
                        if ms >= MIN_SHUTTER_RUN_MS {
                            out.push(Action::PersistRun(ms));
                        } else {
                            // Would fail the run literal check on the next load.
                            tracing::warn!(
                                run_ms = ms,
                                min_ms = MIN_SHUTTER_RUN_MS,
                                "learned shutter run too short to store, kept in memory"
                            );
                        }
                    }
                }
                _ => tracing::warn!(motion = %self.motion, "calibration stop without a measured down leg"),
            }
        }

        // Learning happens first so the full down leg lands the estimate on 100.
        self.update_position(now, out);
        self.motion = MotionState::Stopped;
        self.epoch = None;
        if was_moving {
            self.cancel_stop(out);
        }

        match self.calibration {
            CalibrationState::GoingDown if learned => {
                self.calibration = CalibrationState::Inactive;
                if let Some(target) = self.pending_target.take() {
                    let (outcome, follow) = self.handle_command(Command::GoToPercent(target));
                    tracing::info!(target, ?outcome, "going to requested position after calibration");
                    out.extend(follow);
                }
            }
            CalibrationState::GoingUp => {
                tracing::debug!("reached top, starting measured down leg");
                self.calibration = CalibrationState::Activated;
                out.push(Action::Send(BusCommand::MoveDown));
            }
            CalibrationState::GoingDown => {
                tracing::warn!("calibration abandoned");
                self.calibration = CalibrationState::Inactive;
                self.pending_target = None;
            }
            CalibrationState::Inactive | CalibrationState::Activated => {}
        }
    }

    /// A scheduled stop came due. Only the currently armed token may fire.
    pub fn on_stop_due(&mut self, token: StopToken) -> Vec<Action> {
        if self.scheduled == Some(token) {
            self.scheduled = None;
            tracing::debug!(?token, "scheduled stop expired, sending stop");
            vec![Action::Send(BusCommand::Stop)]
        } else {
            tracing::debug!(?token, armed = ?self.scheduled, "stale scheduled stop ignored");
            Vec::new()
        }
    }

    fn arm_stop(&mut self, after: Duration, out: &mut Vec<Action>) {
        if self.scheduled.is_some() {
            tracing::warn!("new timed move requested, previous scheduled stop cancelled");
            self.cancel_stop(out);
        }
        self.next_token = self.next_token.wrapping_add(1);
        let token = StopToken::new(self.next_token);
        self.scheduled = Some(token);
        out.push(Action::ArmStop { token, after });
    }

    fn cancel_stop(&mut self, out: &mut Vec<Action>) {
        if let Some(token) = self.scheduled.take() {
            out.push(Action::CancelStop(token));
        }
    }

    fn update_position(&mut self, now: Instant, out: &mut Vec<Action>) {
        let elapsed_ms = self.epoch.map_or(0, |epoch| {
            u64::try_from(now.saturating_duration_since(epoch).as_millis()).unwrap_or(u64::MAX)
        });
        let next = position_after_move(self.motion, elapsed_ms, self.run, self.estimate);
        if next != self.estimate {
            out.push(Action::Publish(next));
        }
        self.estimate = next;
    }
}
