//! Pure time <-> percentage arithmetic.
//!
//! Travel is linear: a full run (0 -> 100 or back) takes `run_ms`. All math is
//! integer with round-half-up, using 128-bit intermediates so no input can
//! overflow.

use crate::config::ShutterRun;
use crate::status::MotionState;

/// Fully open.
pub const POSITION_UP: u8 = 0;
/// Fully closed.
pub const POSITION_DOWN: u8 = 100;

/// `round(num / den)` for non-negative operands, ties rounding up.
#[inline]
fn div_round_nearest_u128(num: u128, den: u128) -> u128 {
    debug_assert!(den > 0);
    (num + den / 2) / den
}

#[inline]
fn saturate_u64(v: u128) -> u64 {
    u64::try_from(v).unwrap_or(u64::MAX)
}

/// Percentage steps covered in `elapsed_ms`: `round(elapsed / run * 100)`.
pub fn travel_steps(elapsed_ms: u64, run_ms: u64) -> u64 {
    if run_ms == 0 {
        return 0;
    }
    saturate_u64(div_round_nearest_u128(
        u128::from(elapsed_ms) * u128::from(POSITION_DOWN),
        u128::from(run_ms),
    ))
}

/// Time needed to travel from `from` to `to`: `round(|to - from| / 100 * run)`.
pub fn move_time_ms(from: u8, to: u8, run_ms: u64) -> u64 {
    let delta = u128::from(from.abs_diff(to));
    saturate_u64(div_round_nearest_u128(
        delta * u128::from(run_ms),
        u128::from(POSITION_DOWN),
    ))
}

/// New position estimate after `motion` lasted `elapsed_ms`.
///
/// - Not moving: nothing travelled, the estimate is kept.
/// - Run unknown: the estimate becomes unknown.
/// - Unknown estimate but at least a full run elapsed: the shutter sits at the
///   end stop of the direction it travelled.
/// - Known estimate: moved by the travelled steps, clamped to [0, 100].
pub fn position_after_move(
    motion: MotionState,
    elapsed_ms: u64,
    run: ShutterRun,
    estimate: Option<u8>,
) -> Option<u8> {
    if !motion.is_moving() {
        return estimate;
    }
    let run_ms = run.as_ms()?;
    let steps = travel_steps(elapsed_ms, run_ms);
    let down = motion == MotionState::MovingDown;
    tracing::trace!(elapsed_ms, run_ms, steps, down, ?estimate, "position update");
    match estimate {
        None if steps >= u64::from(POSITION_DOWN) => {
            Some(if down { POSITION_DOWN } else { POSITION_UP })
        }
        None => None,
        Some(pos) => {
            let steps = steps.min(u64::from(POSITION_DOWN));
            let pos = u64::from(pos);
            let next = if down {
                (pos + steps).min(u64::from(POSITION_DOWN))
            } else {
                pos.saturating_sub(steps)
            };
            u8::try_from(next).ok()
        }
    }
}
