//! Shutter commands and what handling them resulted in.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ShutterError;

/// User or automation command for one shutter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Up,
    Down,
    Stop,
    /// Target position, 0 = open, 100 = closed.
    GoToPercent(u8),
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Up => f.write_str("UP"),
            Command::Down => f.write_str("DOWN"),
            Command::Stop => f.write_str("STOP"),
            Command::GoToPercent(p) => write!(f, "{p}%"),
        }
    }
}

/// Accepts `UP`, `DOWN`, `STOP` (any case) and `0..=100` with an optional `%`.
impl FromStr for Command {
    type Err = ShutterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        if t.eq_ignore_ascii_case("up") {
            return Ok(Command::Up);
        }
        if t.eq_ignore_ascii_case("down") {
            return Ok(Command::Down);
        }
        if t.eq_ignore_ascii_case("stop") {
            return Ok(Command::Stop);
        }
        let digits = t.strip_suffix('%').unwrap_or(t);
        match digits.parse::<u8>() {
            Ok(p) if p <= 100 => Ok(Command::GoToPercent(p)),
            _ => Err(ShutterError::UnsupportedCommand(t.to_string())),
        }
    }
}

/// Result of `handle_command`. Never an error crossing the instance boundary;
/// rejections are reported as a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// A move or stop frame was sent with no timed stop.
    Sent,
    /// A timed move was started; a stop will be sent after `after`.
    Scheduled { after: Duration },
    /// The run is unknown; calibration started toward the requested target.
    CalibrationStarted { target: u8 },
    /// The estimate already equals the target.
    AlreadyAtTarget,
    /// The move would be shorter than the minimum step; nothing sent.
    BelowMinimumStep { move_time: Duration },
    /// Nothing sent.
    Rejected(ShutterError),
}

impl CommandOutcome {
    /// True when at least one frame went to the gateway.
    pub fn started_motion(&self) -> bool {
        matches!(
            self,
            CommandOutcome::Sent
                | CommandOutcome::Scheduled { .. }
                | CommandOutcome::CalibrationStarted { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_keywords_and_percentages() {
        assert_eq!("up".parse::<Command>().unwrap(), Command::Up);
        assert_eq!("DOWN".parse::<Command>().unwrap(), Command::Down);
        assert_eq!(" Stop ".parse::<Command>().unwrap(), Command::Stop);
        assert_eq!("40".parse::<Command>().unwrap(), Command::GoToPercent(40));
        assert_eq!("100%".parse::<Command>().unwrap(), Command::GoToPercent(100));
    }

    #[test]
    fn rejects_unsupported_text() {
        for bad in ["MOVE", "101", "-3", "", "4O"] {
            match bad.parse::<Command>() {
                Err(ShutterError::UnsupportedCommand(_)) => {}
                other => panic!("{bad:?}: unexpected {other:?}"),
            }
        }
    }
}
