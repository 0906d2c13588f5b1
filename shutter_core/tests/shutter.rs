use std::sync::{Arc, Mutex};
use std::time::Duration;

use rstest::rstest;
use shutter_core::error::BuildError;
use shutter_core::mocks::{ManualTimer, MemoryRunStore, RecordingGateway, Sent};
use shutter_core::{
    CalibrationState, Command, CommandOutcome, DeviceStatus, MotionState, Shutter, ShutterError,
    ShutterRun,
};
use shutter_traits::clock::test_clock::TestClock;
use shutter_traits::{BusKind, InboundFrame, ShutterAddress, StatusEvent};

struct Rig {
    shutter: Shutter,
    gateway: RecordingGateway,
    timer: ManualTimer,
    clock: TestClock,
    store: MemoryRunStore,
    published: Arc<Mutex<Vec<Option<u8>>>>,
}

fn rig(run: &str) -> Rig {
    rig_with_store(run, MemoryRunStore::new())
}

fn rig_with_store(run: &str, store: MemoryRunStore) -> Rig {
    let gateway = RecordingGateway::new();
    let timer = ManualTimer::new();
    let clock = TestClock::new();
    let published = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&published);
    let shutter = Shutter::builder()
        .with_gateway(gateway.clone())
        .with_address(ShutterAddress::new("12", BusKind::Zigbee))
        .with_run_setting(run)
        .with_clock(Box::new(clock.clone()))
        .with_run_store(store.clone())
        .with_timer_factory(timer.factory())
        .with_observer(move |p| sink.lock().unwrap().push(p))
        .build()
        .expect("build shutter");
    Rig {
        shutter,
        gateway,
        timer,
        clock,
        store,
        published,
    }
}

impl Rig {
    fn event(&self, ev: StatusEvent) {
        self.shutter.on_status_event(ev);
    }

    /// Full travel down from an unknown position.
    fn park_closed(&self, run_ms: u64) {
        self.event(StatusEvent::Stopped);
        self.event(StatusEvent::MovingDown);
        self.clock.advance_ms(run_ms);
        self.event(StatusEvent::Stopped);
        assert_eq!(self.shutter.current_estimate(), Some(100));
        self.gateway.clear();
    }

    fn published(&self) -> Vec<Option<u8>> {
        self.published.lock().unwrap().clone()
    }
}

#[rstest]
fn first_publication_is_unknown() {
    let r = rig("AUTO");
    assert_eq!(r.published(), vec![None]);
    assert_eq!(r.shutter.current_motion_state(), MotionState::Unknown);
    assert_eq!(r.shutter.device_status(), DeviceStatus::Online);
}

#[rstest]
fn calibration_learns_run_and_reaches_target() {
    let r = rig("AUTO");
    r.event(StatusEvent::Stopped);

    let outcome = r.shutter.handle_command(Command::GoToPercent(40));
    assert_eq!(outcome, CommandOutcome::CalibrationStarted { target: 40 });
    assert_eq!(r.gateway.sent(), vec![Sent::MoveUp]);

    r.event(StatusEvent::MovingUp);
    r.clock.advance_ms(7_000);
    r.event(StatusEvent::Stopped);
    assert_eq!(r.gateway.sent(), vec![Sent::MoveUp, Sent::MoveDown]);

    r.event(StatusEvent::MovingDown);
    r.clock.advance_ms(18_000);
    r.event(StatusEvent::Stopped);

    let snap = r.shutter.snapshot();
    assert_eq!(snap.run, ShutterRun::Known(18_000));
    assert_eq!(snap.calibration, CalibrationState::Inactive);
    assert_eq!(snap.estimate, Some(100));
    assert!(snap.stop_armed);
    assert_eq!(r.shutter.shutter_run_setting(), "18000");
    assert_eq!(r.store.persisted(), vec![18_000]);
    assert_eq!(
        r.gateway.sent(),
        vec![Sent::MoveUp, Sent::MoveDown, Sent::MoveUp]
    );

    // Follow-up move toward 40%: 60% of 18 s
    let armed = r.timer.armed();
    assert_eq!(armed.len(), 1);
    assert_eq!(armed[0].1, Duration::from_millis(10_800));

    r.event(StatusEvent::MovingUp);
    r.clock.advance_ms(10_800);
    assert!(r.timer.fire_next().is_some());
    assert_eq!(r.gateway.sent().last(), Some(&Sent::Stop));
    r.event(StatusEvent::Stopped);

    assert_eq!(r.shutter.current_estimate(), Some(40));
    assert_eq!(r.published(), vec![None, Some(100), Some(40)]);
}

#[rstest]
#[case(0, 50, Duration::from_millis(10_000), Sent::MoveDown)]
#[case(100, 25, Duration::from_millis(15_000), Sent::MoveUp)]
fn timed_move_schedules_stop(
    #[case] from: u8,
    #[case] to: u8,
    #[case] after: Duration,
    #[case] dir: Sent,
) {
    let r = rig("20000");
    r.park_closed(20_000);
    if from == 0 {
        r.shutter.handle_command(Command::GoToPercent(0));
        r.event(StatusEvent::MovingUp);
        r.clock.advance_ms(20_000);
        r.event(StatusEvent::Stopped);
        r.gateway.clear();
    }
    assert_eq!(r.shutter.current_estimate(), Some(from));

    let outcome = r.shutter.handle_command(Command::GoToPercent(to));
    assert_eq!(outcome, CommandOutcome::Scheduled { after });
    assert_eq!(r.gateway.sent(), vec![dir]);
    assert_eq!(r.timer.armed().len(), 1);

    r.event(if dir == Sent::MoveDown {
        StatusEvent::MovingDown
    } else {
        StatusEvent::MovingUp
    });
    r.clock.advance(after);
    r.timer.fire_next();
    r.event(StatusEvent::Stopped);
    assert_eq!(r.shutter.current_estimate(), Some(to));
    assert_eq!(r.gateway.sent(), vec![dir, Sent::Stop]);
}

#[rstest]
fn stale_firing_after_cancel_sends_nothing() {
    let r = rig("20000");
    r.park_closed(20_000);
    r.shutter.handle_command(Command::GoToPercent(50));
    let (token, _) = r.timer.armed()[0];
    r.event(StatusEvent::MovingUp);
    r.clock.advance_ms(3_000);
    // Stopped by hand before the deadline.
    r.event(StatusEvent::Stopped);
    assert_eq!(r.timer.cancelled(), vec![token]);
    assert_eq!(r.shutter.current_estimate(), Some(85));

    r.gateway.clear();
    r.timer.fire(token);
    assert!(r.gateway.sent().is_empty());
}

#[rstest]
fn repeated_motion_report_publishes_and_drops_stop() {
    let r = rig("20000");
    r.park_closed(20_000);
    r.shutter.handle_command(Command::GoToPercent(50));
    let (token, _) = r.timer.armed()[0];
    r.event(StatusEvent::MovingUp);
    r.clock.advance_ms(2_000);
    r.event(StatusEvent::MovingUp);

    assert_eq!(r.shutter.current_estimate(), Some(90));
    assert_eq!(r.published().last(), Some(&Some(90)));
    assert_eq!(r.timer.cancelled(), vec![token]);
    assert!(!r.shutter.snapshot().stop_armed);

    r.gateway.clear();
    r.timer.fire(token);
    assert!(r.gateway.sent().is_empty());
}

#[rstest]
fn rearm_replaces_earlier_stop() {
    let r = rig("20000");
    r.park_closed(20_000);
    r.shutter.handle_command(Command::GoToPercent(50));
    let (first, _) = r.timer.armed()[0];
    // Motion report never arrived; a new target is accepted and the old stop is dropped.
    r.shutter.handle_command(Command::GoToPercent(60));
    assert_eq!(r.timer.cancelled(), vec![first]);
    let armed = r.timer.armed();
    assert_eq!(armed.len(), 1);
    assert_eq!(armed[0].1, Duration::from_millis(8_000));

    r.gateway.clear();
    r.timer.fire(first);
    assert!(r.gateway.sent().is_empty());
    r.timer.fire_next();
    assert_eq!(r.gateway.sent(), vec![Sent::Stop]);
}

#[rstest]
fn busy_shutter_rejects_new_target() {
    let r = rig("20000");
    r.park_closed(20_000);
    r.event(StatusEvent::MovingUp);
    let outcome = r.shutter.handle_command(Command::GoToPercent(30));
    assert_eq!(
        outcome,
        CommandOutcome::Rejected(ShutterError::Busy(MotionState::MovingUp))
    );
    assert!(r.gateway.sent().is_empty());
}

#[rstest]
fn minimum_step_drops_tiny_moves() {
    let r = rig("4000");
    r.park_closed(4_000);
    let outcome = r.shutter.handle_command(Command::GoToPercent(99));
    assert_eq!(
        outcome,
        CommandOutcome::BelowMinimumStep {
            move_time: Duration::from_millis(40)
        }
    );
    assert!(r.gateway.sent().is_empty());
    assert!(r.timer.armed().is_empty());
}

#[rstest]
fn repeated_target_is_idempotent() {
    let r = rig("20000");
    r.park_closed(20_000);
    assert_eq!(
        r.shutter.handle_command(Command::GoToPercent(100)),
        CommandOutcome::AlreadyAtTarget
    );
    assert!(r.gateway.sent().is_empty());
}

#[rstest]
#[case("abc")]
#[case("999")]
#[case("-5")]
fn invalid_run_falls_back_to_auto(#[case] text: &str) {
    let r = rig(text);
    assert!(matches!(
        r.shutter.device_status(),
        DeviceStatus::ConfigurationError(_)
    ));
    assert_eq!(r.shutter.shutter_run_setting(), "AUTO");
    r.event(StatusEvent::Stopped);
    assert_eq!(
        r.shutter.handle_command(Command::GoToPercent(40)),
        CommandOutcome::CalibrationStarted { target: 40 }
    );
}

#[rstest]
fn reconfiguring_run_updates_status() {
    let r = rig("AUTO");
    r.shutter.set_shutter_run("15000").unwrap();
    assert_eq!(r.shutter.shutter_run_setting(), "15000");
    assert_eq!(r.shutter.device_status(), DeviceStatus::Online);

    let err = r.shutter.set_shutter_run("fast").unwrap_err();
    assert!(matches!(err, ShutterError::Config(_)));
    assert_eq!(r.shutter.shutter_run_setting(), "AUTO");
    assert!(matches!(
        r.shutter.device_status(),
        DeviceStatus::ConfigurationError(_)
    ));

    r.shutter.set_shutter_run("auto").unwrap();
    assert_eq!(r.shutter.device_status(), DeviceStatus::Online);
}

#[rstest]
fn failed_write_back_keeps_learned_run() {
    let r = rig_with_store("AUTO", MemoryRunStore::failing());
    r.event(StatusEvent::Stopped);
    r.shutter.handle_command(Command::GoToPercent(0));
    r.shutter.handle_command(Command::GoToPercent(30));
    r.event(StatusEvent::MovingUp);
    r.event(StatusEvent::Stopped);
    r.event(StatusEvent::MovingDown);
    r.clock.advance_ms(12_000);
    r.event(StatusEvent::Stopped);
    assert_eq!(r.shutter.shutter_run_setting(), "12000");
    assert!(r.store.persisted().is_empty());
}

#[rstest]
fn short_learned_run_is_not_written_back() {
    let r = rig("AUTO");
    r.event(StatusEvent::Stopped);
    r.shutter.handle_command(Command::GoToPercent(50));
    r.event(StatusEvent::MovingUp);
    r.event(StatusEvent::Stopped);
    r.event(StatusEvent::MovingDown);
    r.clock.advance_ms(800);
    r.event(StatusEvent::Stopped);

    // Used for this session, but the config would reject it on reload.
    assert_eq!(r.shutter.shutter_run_setting(), "800");
    assert!(r.store.persisted().is_empty());
    assert_eq!(r.shutter.device_status(), DeviceStatus::Online);
}

#[rstest]
fn gateway_failure_is_reported() {
    let r = rig("20000");
    r.gateway.set_failure(Some("link down"));
    let outcome = r.shutter.handle_command(Command::Up);
    assert_eq!(
        outcome,
        CommandOutcome::Rejected(ShutterError::Gateway("link down".into()))
    );
    r.gateway.set_failure(Some("ack timeout"));
    assert_eq!(
        r.shutter.request_status(),
        Err(ShutterError::Timeout)
    );
}

#[rstest]
fn status_request_uses_wire_address() {
    let r = rig("AUTO");
    r.shutter.request_status().unwrap();
    assert_eq!(r.gateway.sent(), vec![Sent::StatusRequest]);
    assert_eq!(r.gateway.addresses(), vec!["12#9".to_string()]);
}

#[rstest]
fn unsupported_frame_leaves_state_alone() {
    let r = rig("20000");
    r.park_closed(20_000);
    let err = r
        .shutter
        .on_frame(InboundFrame::Unsupported("*2*1000#7*12##".into()))
        .unwrap_err();
    assert!(matches!(err, ShutterError::UnsupportedEvent(_)));
    assert_eq!(r.shutter.current_estimate(), Some(100));
    r.shutter
        .on_frame(InboundFrame::Status(StatusEvent::MovingUp))
        .unwrap();
    assert_eq!(r.shutter.current_motion_state(), MotionState::MovingUp);
}

#[rstest]
fn wait_for_times_out() {
    let r = rig("AUTO");
    let err = r
        .shutter
        .wait_for(|s| s.motion == MotionState::Stopped, Duration::from_millis(30))
        .unwrap_err();
    assert_eq!(err, ShutterError::Timeout);
}

#[rstest]
fn wait_for_sees_update_from_other_thread() {
    let r = rig("AUTO");
    let other = r.shutter.clone();
    let h = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        other.on_status_event(StatusEvent::Stopped);
    });
    let snap = r
        .shutter
        .wait_for(|s| s.motion == MotionState::Stopped, Duration::from_secs(5))
        .unwrap();
    assert_eq!(snap.motion, MotionState::Stopped);
    h.join().unwrap();
}

#[rstest]
fn builder_missing_gateway_yields_typed_build_error() {
    let err = Shutter::builder()
        .with_address(ShutterAddress::new("12", BusKind::PointToPoint))
        .try_build()
        .expect_err("should fail with MissingGateway");
    match err.downcast_ref::<BuildError>() {
        Some(BuildError::MissingGateway) => {}
        other => panic!("expected MissingGateway, got: {other:?}"),
    }
}

#[rstest]
fn builder_rejects_blank_address() {
    let err = Shutter::builder()
        .with_gateway(RecordingGateway::new())
        .with_address(ShutterAddress::new("  ", BusKind::PointToPoint))
        .build()
        .expect_err("blank address");
    assert!(matches!(
        err.downcast_ref::<BuildError>(),
        Some(BuildError::InvalidConfig(_))
    ));
}
