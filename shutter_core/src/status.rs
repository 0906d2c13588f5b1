//! Motion, calibration and device status of one shutter.
//!
//! Two composed state machines drive the controller:
//!
//! Motion (driven by device status events):
//!
//! | from \ event | MovingUp   | MovingDown | Stopped |
//! |--------------|------------|------------|---------|
//! | Unknown      | MovingUp   | MovingDown | Stopped |
//! | Stopped      | MovingUp * | MovingDown * | Stopped (no-op) |
//! | MovingUp     | MovingUp   | MovingDown + | Stopped + |
//! | MovingDown   | MovingUp + | MovingDown | Stopped + |
//!
//! `*` starts a motion epoch, `+` applies the position update with the old
//! motion and epoch first.
//!
//! Calibration (learning the shutter run):
//!
//! | from      | trigger                         | to        | side effect |
//! |-----------|---------------------------------|-----------|-------------|
//! | Inactive  | GoToPercent with run undefined  | Activated | send up     |
//! | Activated | MovingUp                        | GoingUp   |             |
//! | Activated | MovingDown                      | GoingDown |             |
//! | GoingUp   | Stopped                         | Activated | send down   |
//! | GoingDown | Stopped (run learned)           | Inactive  | persist, go to pending target |
//! | any       | any command                     | Inactive  | (unless it starts calibration) |

use std::fmt;

/// What the actuator last reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionState {
    Stopped,
    MovingUp,
    MovingDown,
    #[default]
    Unknown,
}

impl MotionState {
    pub fn is_moving(self) -> bool {
        matches!(self, MotionState::MovingUp | MotionState::MovingDown)
    }
}

impl fmt::Display for MotionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MotionState::Stopped => "stopped",
            MotionState::MovingUp => "moving-up",
            MotionState::MovingDown => "moving-down",
            MotionState::Unknown => "unknown",
        })
    }
}

/// One-shot "full up, then timed full down" learning sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalibrationState {
    #[default]
    Inactive,
    Activated,
    GoingUp,
    GoingDown,
}

impl fmt::Display for CalibrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CalibrationState::Inactive => "inactive",
            CalibrationState::Activated => "activated",
            CalibrationState::GoingUp => "going-up",
            CalibrationState::GoingDown => "going-down",
        })
    }
}

/// Device-level status reported to the rest of the binding.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeviceStatus {
    #[default]
    Online,
    /// Bad configuration; the shutter still operates with an undefined run.
    ConfigurationError(String),
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Online => f.write_str("online"),
            DeviceStatus::ConfigurationError(msg) => write!(f, "configuration-error: {msg}"),
        }
    }
}
