use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Wait until `acked` returns true or `timeout` expires. Sleeps in small
/// intervals to avoid CPU spinning.
pub fn wait_for_ack_with_timeout(
    mut acked: impl FnMut() -> bool,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<()> {
    let deadline = Instant::now() + timeout;
    while !acked() {
        if Instant::now() >= deadline {
            return Err(HwError::AckTimeout);
        }
        std::thread::sleep(poll_interval);
    }
    Ok(())
}
