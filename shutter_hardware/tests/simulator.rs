use std::time::Duration;

use rstest::rstest;
use shutter_hardware::{SimulatedShutter, SimulatorCfg};
use shutter_traits::{BusKind, Gateway, InboundFrame, ShutterAddress, StatusEvent};

const WAIT: Duration = Duration::from_secs(2);

fn sim(travel_ms: u64, start: u8) -> (SimulatedShutter, crossbeam_channel::Receiver<InboundFrame>) {
    SimulatedShutter::spawn(&SimulatorCfg {
        travel: Duration::from_millis(travel_ms),
        start_position: start,
        ack_delay: Duration::ZERO,
    })
}

fn addr() -> ShutterAddress {
    ShutterAddress::new("12", BusKind::Zigbee)
}

#[rstest]
fn full_travel_reports_motion_then_stop() {
    let (mut s, rx) = sim(200, 0);
    s.send_move_down(&addr()).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), StatusEvent::MovingDown.into());
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), StatusEvent::Stopped.into());
    assert_eq!(s.position(), 100);
    assert!(!s.is_moving());
}

#[rstest]
fn stop_halts_midway() {
    let (mut s, rx) = sim(10_000, 100);
    s.send_move_up(&addr()).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), StatusEvent::MovingUp.into());
    std::thread::sleep(Duration::from_millis(100));
    s.send_stop(&addr()).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), StatusEvent::Stopped.into());
    let p = s.position();
    assert!((97..=99).contains(&p), "position {p}");
}

#[rstest]
#[case(false, StatusEvent::Stopped)]
#[case(true, StatusEvent::MovingDown)]
fn status_request_reports_current_motion(#[case] moving: bool, #[case] expected: StatusEvent) {
    let (mut s, rx) = sim(10_000, 30);
    if moving {
        s.send_move_down(&addr()).unwrap();
        rx.recv_timeout(WAIT).unwrap();
    }
    s.send_status_request(&addr()).unwrap();
    assert_eq!(rx.recv_timeout(WAIT).unwrap(), expected.into());
}

#[rstest]
fn send_blocks_for_ack_delay() {
    let (mut s, _rx) = SimulatedShutter::spawn(&SimulatorCfg {
        travel: Duration::from_secs(10),
        start_position: 50,
        ack_delay: Duration::from_millis(40),
    });
    let t0 = std::time::Instant::now();
    s.send_status_request(&addr()).unwrap();
    assert!(t0.elapsed() >= Duration::from_millis(40));
}
