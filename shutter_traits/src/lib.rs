pub mod clock;

pub use clock::{Clock, MonotonicClock};

use std::fmt;

/// Kind of bus the shutter is reached through. Affects only how the
/// device address is rendered on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BusKind {
    /// Radio dongle; addresses carry a network suffix.
    #[default]
    Zigbee,
    /// Wired bus gateway; plain point-to-point addresses.
    PointToPoint,
}

/// Physical shutter address ("where") plus the bus it lives on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShutterAddress {
    pub id: String,
    pub bus: BusKind,
}

impl ShutterAddress {
    pub fn new(id: impl Into<String>, bus: BusKind) -> Self {
        Self { id: id.into(), bus }
    }
}

impl fmt::Display for ShutterAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bus {
            BusKind::Zigbee => write!(f, "{}#9", self.id),
            BusKind::PointToPoint => f.write_str(&self.id),
        }
    }
}

/// Discrete movement report from the actuator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEvent {
    MovingUp,
    MovingDown,
    Stopped,
}

/// A frame delivered by the gateway for one shutter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Status(StatusEvent),
    /// Anything the gateway could not map to a shutter status (raw text kept for logs).
    Unsupported(String),
}

impl From<StatusEvent> for InboundFrame {
    fn from(ev: StatusEvent) -> Self {
        InboundFrame::Status(ev)
    }
}

/// Command side of the bus. Sends are fire-and-forget but may block for a
/// synchronous acknowledgement.
pub trait Gateway {
    fn send_move_up(
        &mut self,
        target: &ShutterAddress,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn send_move_down(
        &mut self,
        target: &ShutterAddress,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn send_stop(
        &mut self,
        target: &ShutterAddress,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn send_status_request(
        &mut self,
        target: &ShutterAddress,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<G: Gateway + ?Sized> Gateway for Box<G> {
    fn send_move_up(
        &mut self,
        target: &ShutterAddress,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).send_move_up(target)
    }
    fn send_move_down(
        &mut self,
        target: &ShutterAddress,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).send_move_down(target)
    }
    fn send_stop(
        &mut self,
        target: &ShutterAddress,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).send_stop(target)
    }
    fn send_status_request(
        &mut self,
        target: &ShutterAddress,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).send_status_request(target)
    }
}

/// Write-back of a learned shutter run (milliseconds for a full traversal).
pub trait RunStore {
    fn persist_run(&mut self, run_ms: u64) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zigbee_address_carries_suffix() {
        let a = ShutterAddress::new("765432101", BusKind::Zigbee);
        assert_eq!(a.to_string(), "765432101#9");
        let b = ShutterAddress::new("21", BusKind::PointToPoint);
        assert_eq!(b.to_string(), "21");
    }
}
