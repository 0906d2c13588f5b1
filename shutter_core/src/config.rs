//! Runtime configuration types for the shutter controller.
//!
//! These are separate from the TOML-deserialized config in `shutter_config`.

use std::fmt;
use std::time::Duration;

/// Time for a full 0 <-> 100 traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShutterRun {
    /// Not configured and not learned yet.
    #[default]
    Undefined,
    /// Milliseconds, always > 0.
    Known(u64),
}

impl ShutterRun {
    /// `Known(ms)` for a positive value, `Undefined` for zero.
    pub fn from_ms(ms: u64) -> Self {
        if ms == 0 {
            ShutterRun::Undefined
        } else {
            ShutterRun::Known(ms)
        }
    }

    pub fn as_ms(self) -> Option<u64> {
        match self {
            ShutterRun::Undefined => None,
            ShutterRun::Known(ms) => Some(ms),
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, ShutterRun::Known(_))
    }
}

/// Same text form as the configuration: `AUTO` or decimal milliseconds.
impl fmt::Display for ShutterRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutterRun::Undefined => f.write_str(shutter_config::AUTO_LITERAL),
            ShutterRun::Known(ms) => write!(f, "{ms}"),
        }
    }
}

/// Controller tuning.
#[derive(Debug, Clone)]
pub struct ShutterCfg {
    /// Initial shutter run.
    pub run: ShutterRun,
    /// Timed moves at or below this duration are dropped.
    pub min_step: Duration,
}

impl Default for ShutterCfg {
    fn default() -> Self {
        Self {
            run: ShutterRun::Undefined,
            min_step: Duration::from_millis(50),
        }
    }
}
