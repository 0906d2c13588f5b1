//! Automation frames in the `*WHO*WHAT*WHERE##` text format.
//!
//! Only WHO = 2 (automation) is understood:
//!
//! | frame              | meaning                        |
//! |--------------------|--------------------------------|
//! | `*2*0*<where>##`   | stop / stopped                 |
//! | `*2*1*<where>##`   | move up / moving up            |
//! | `*2*2*<where>##`   | move down / moving down        |
//! | `*#2*<where>##`    | status request                 |
//!
//! The same command frames travel in both directions: sent to the device
//! they are orders, received from it they are status reports.

use shutter_traits::{InboundFrame, ShutterAddress, StatusEvent};

use crate::error::{HwError, Result};

pub const WHO_AUTOMATION: &str = "2";
const TERMINATOR: &str = "##";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum What {
    Stop,
    Up,
    Down,
}

impl What {
    pub const fn code(self) -> u8 {
        match self {
            What::Stop => 0,
            What::Up => 1,
            What::Down => 2,
        }
    }

    fn from_code(s: &str) -> Option<Self> {
        match s {
            "0" => Some(What::Stop),
            "1" => Some(What::Up),
            "2" => Some(What::Down),
            _ => None,
        }
    }

    pub const fn as_status(self) -> StatusEvent {
        match self {
            What::Stop => StatusEvent::Stopped,
            What::Up => StatusEvent::MovingUp,
            What::Down => StatusEvent::MovingDown,
        }
    }
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Command { what: What, where_: String },
    StatusRequest { where_: String },
    /// Well formed, but not an automation frame we handle.
    Other(String),
}

impl Frame {
    /// Wire address the frame refers to, if any.
    pub fn address(&self) -> Option<&str> {
        match self {
            Frame::Command { where_, .. } | Frame::StatusRequest { where_ } => Some(where_),
            Frame::Other(_) => None,
        }
    }

    /// View of a received frame as a shutter input.
    pub fn into_inbound(self) -> InboundFrame {
        match self {
            Frame::Command { what, .. } => InboundFrame::Status(what.as_status()),
            Frame::StatusRequest { where_ } => {
                InboundFrame::Unsupported(status_request_for(&where_))
            }
            Frame::Other(raw) => InboundFrame::Unsupported(raw),
        }
    }
}

pub fn command_frame(what: What, target: &ShutterAddress) -> String {
    format!("*{WHO_AUTOMATION}*{}*{target}{TERMINATOR}", what.code())
}

pub fn status_request_frame(target: &ShutterAddress) -> String {
    status_request_for(&target.to_string())
}

fn status_request_for(where_: &str) -> String {
    format!("*#{WHO_AUTOMATION}*{where_}{TERMINATOR}")
}

/// Decode one frame. Structurally broken input is an error; frames for
/// other WHOs or unknown WHAT codes decode to `Frame::Other`.
pub fn parse(raw: &str) -> Result<Frame> {
    let raw = raw.trim();
    let body = raw
        .strip_prefix('*')
        .and_then(|s| s.strip_suffix(TERMINATOR))
        .ok_or_else(|| HwError::MalformedFrame(raw.to_string()))?;
    if body.is_empty() || body.contains(TERMINATOR) {
        return Err(HwError::MalformedFrame(raw.to_string()));
    }

    let fields: Vec<&str> = body.split('*').collect();
    if fields.iter().any(|f| f.is_empty()) {
        return Err(HwError::MalformedFrame(raw.to_string()));
    }
    match fields.as_slice() {
        [who, where_] if who.strip_prefix('#') == Some(WHO_AUTOMATION) => {
            Ok(Frame::StatusRequest {
                where_: (*where_).to_string(),
            })
        }
        [who, what, where_] if *who == WHO_AUTOMATION => Ok(What::from_code(what).map_or_else(
            || Frame::Other(raw.to_string()),
            |what| Frame::Command {
                what,
                where_: (*where_).to_string(),
            },
        )),
        _ => Ok(Frame::Other(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shutter_traits::BusKind;

    #[test]
    fn encodes_commands_with_bus_suffix() {
        let zb = ShutterAddress::new("765432101", BusKind::Zigbee);
        assert_eq!(command_frame(What::Down, &zb), "*2*2*765432101#9##");
        let p2p = ShutterAddress::new("21", BusKind::PointToPoint);
        assert_eq!(command_frame(What::Stop, &p2p), "*2*0*21##");
        assert_eq!(status_request_frame(&p2p), "*#2*21##");
    }

    #[test]
    fn decodes_status_reports() {
        assert_eq!(
            parse("*2*1*765432101#9##").unwrap(),
            Frame::Command {
                what: What::Up,
                where_: "765432101#9".into()
            }
        );
        assert_eq!(
            parse("*2*0*21##").unwrap().into_inbound(),
            InboundFrame::Status(StatusEvent::Stopped)
        );
        assert_eq!(
            parse("*#2*21##").unwrap(),
            Frame::StatusRequest {
                where_: "21".into()
            }
        );
    }

    #[test]
    fn foreign_frames_are_other() {
        for raw in ["*1*1*21##", "*2*1000#7*21##", "*#1*21##", "*2*5*21*9##"] {
            assert_eq!(parse(raw).unwrap(), Frame::Other(raw.into()), "{raw}");
        }
    }

    #[test]
    fn broken_frames_are_errors() {
        for raw in ["", "2*1*21##", "*2*1*21", "*##", "*2**21##", "*2*1*21##*2*0*21##"] {
            assert!(
                matches!(parse(raw), Err(HwError::MalformedFrame(_))),
                "{raw:?} should be malformed"
            );
        }
    }
}
