//! End-to-end runs of the sorter against recording collaborators, driven by
//! a simulated 10 ms polling loop.

use std::collections::VecDeque;

use coin_sorter::{
    Actuator, Actuators, CaptureError, Camera, CoinSorter, Config, EdgeDetector, Error, Indicator,
    Instant, MachineState, StatusCode, StatusIndicator,
};
use embedded_hal::delay::DelayNs;

#[derive(Default)]
struct MockCamera {
    script: VecDeque<Result<(), CaptureError>>,
    captured: Vec<String>,
    lights: Vec<bool>,
}

impl Camera for MockCamera {
    fn capture(&mut self, filename: &str) -> Result<(), CaptureError> {
        let result = self.script.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            self.captured.push(filename.to_string());
        }
        result
    }

    fn set_lights(&mut self, on: bool) {
        self.lights.push(on);
    }
}

#[derive(Default)]
struct MockActuators {
    moves: Vec<(Actuator, u8)>,
}

impl MockActuators {
    fn last(&self, which: Actuator) -> Option<u8> {
        self.moves
            .iter()
            .rev()
            .find(|(w, _)| *w == which)
            .map(|(_, angle)| *angle)
    }
}

impl Actuators for MockActuators {
    fn set_actuator(&mut self, which: Actuator, angle: u8) {
        self.moves.push((which, angle));
    }
}

#[derive(Default)]
struct MockIndicator {
    shown: Vec<Indicator>,
}

impl StatusIndicator for MockIndicator {
    fn set_indicator(&mut self, state: Indicator) {
        self.shown.push(state);
    }
}

#[derive(Default)]
struct CountingDelay {
    total_ms: u64,
}

impl DelayNs for CountingDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.total_ms += u64::from(ns) / 1_000_000;
    }
}

struct Rig {
    det: &'static EdgeDetector,
    sorter: CoinSorter<MockCamera, MockActuators, MockIndicator>,
    now: u32,
    reports: Vec<StatusCode>,
}

impl Rig {
    fn new(config: Config) -> Self {
        Self::with_camera(config, MockCamera::default())
    }

    fn with_camera(config: Config, camera: MockCamera) -> Self {
        let det: &'static EdgeDetector = Box::leak(Box::new(EdgeDetector::new(config.debounce_ms)));
        let sorter = CoinSorter::new(
            config,
            det,
            camera,
            MockActuators::default(),
            MockIndicator::default(),
            Instant::from_millis(0),
        );
        Self { det, sorter, now: 0, reports: Vec::new() }
    }

    fn edge(&self, at_ms: u32) {
        self.det.on_edge(Instant::from_millis(at_ms));
    }

    /// Polls every 10 ms until `until_ms`.
    fn run_until(&mut self, until_ms: u32) {
        while self.now < until_ms {
            self.now += 10;
            if let Some(code) = self.sorter.poll(Instant::from_millis(self.now)) {
                self.reports.push(code);
            }
        }
    }

    fn run_until_state(&mut self, state: MachineState, limit_ms: u32) {
        while self.sorter.state() != state {
            assert!(self.now < limit_ms, "never reached {:?}", state);
            self.run_until(self.now + 10);
        }
    }
}

#[test]
fn accepted_coin_is_photographed_on_both_sides() {
    let mut rig = Rig::new(Config::DEFAULT);
    rig.run_until(100);
    rig.edge(100);
    rig.run_until_state(MachineState::Photographing, 5_000);
    rig.run_until_state(MachineState::WaitingForCoin, 10_000);

    let camera = rig.sorter.camera();
    assert_eq!(camera.captured.len(), 2);
    assert_ne!(camera.captured[0], camera.captured[1]);
    assert!(camera.captured.iter().all(|n| n.starts_with("/coin_") && n.ends_with(".jpg")));

    let flips: Vec<u8> = rig
        .sorter
        .actuators()
        .moves
        .iter()
        .filter(|(w, _)| *w == Actuator::Flipper)
        .map(|(_, a)| *a)
        .collect();
    // Home from the start-up reset, then side 1, side 2, home.
    assert_eq!(flips, vec![0, 90, 180, 0]);
    assert_eq!(rig.sorter.actuators().last(Actuator::Flipper), Some(0));

    let listed: Vec<&str> = rig.sorter.photos().collect();
    assert_eq!(listed, camera.captured.iter().map(String::as_str).collect::<Vec<_>>());
    assert_eq!(rig.sorter.controller().stats().coins_accepted, 1);
    assert_eq!(rig.sorter.indicator().shown.last(), Some(&Indicator::Ready));
}

#[test]
fn two_coins_in_one_window_open_the_trapdoor() {
    let config = Config { debounce_ms: 20, ..Config::DEFAULT };
    let mut rig = Rig::new(config);
    rig.edge(0);
    rig.edge(40);
    rig.run_until(990);
    assert_eq!(rig.sorter.state(), MachineState::CoinDetected);
    rig.run_until(1000);
    assert_eq!(rig.sorter.state(), MachineState::Rejecting);
    assert_eq!(rig.sorter.controller().status(), StatusCode::MultipleCoins);
    assert_eq!(rig.sorter.actuators().last(Actuator::Trapdoor), Some(90));

    rig.run_until_state(MachineState::WaitingForCoin, 5_000);
    assert_eq!(rig.sorter.actuators().last(Actuator::Trapdoor), Some(0));
    assert_eq!(rig.sorter.controller().status(), StatusCode::Ok);
    assert!(rig.sorter.camera().captured.is_empty());
    assert!(rig.reports.is_empty());
}

#[test]
fn window_outcome_follows_edge_count() {
    for edges in 1..=4u32 {
        let mut rig = Rig::new(Config::DEFAULT);
        rig.run_until(100);
        for i in 0..edges {
            rig.edge(100 + i * 60);
        }
        rig.run_until(110);
        assert_eq!(rig.det.current_count(), edges);
        rig.run_until(1100);
        let expected = if edges >= 2 {
            MachineState::Rejecting
        } else {
            MachineState::Processing
        };
        assert_eq!(rig.sorter.state(), expected, "{} edges", edges);
    }
}

#[test]
fn capture_failure_reports_then_recovers() {
    let camera = MockCamera {
        script: VecDeque::from([Ok(()), Err(CaptureError::Sensor)]),
        ..MockCamera::default()
    };
    let mut rig = Rig::with_camera(Config::DEFAULT, camera);
    rig.edge(0);
    rig.run_until_state(MachineState::Error, 5_000);
    assert_eq!(rig.sorter.controller().status(), StatusCode::CameraError);
    assert_eq!(rig.sorter.indicator().shown.last(), Some(&Indicator::Error));

    rig.run_until_state(MachineState::WaitingForCoin, 30_000);
    assert_eq!(rig.reports, vec![StatusCode::CameraError; 3]);
    assert_eq!(rig.sorter.actuators().last(Actuator::Trapdoor), Some(0));
    assert_eq!(rig.sorter.actuators().last(Actuator::Flipper), Some(0));
    let shown = &rig.sorter.indicator().shown;
    assert_eq!(&shown[shown.len() - 2..], &[Indicator::Off, Indicator::Ready]);
    assert_eq!(rig.sorter.camera().lights.last(), Some(&false));

    // The next coin starts the photo sequence from the first side.
    let start = rig.now;
    rig.edge(start + 10);
    rig.run_until_state(MachineState::Photographing, start + 5_000);
    rig.run_until_state(MachineState::WaitingForCoin, start + 10_000);
    assert_eq!(rig.sorter.camera().captured.len(), 3);
}

#[test]
fn console_commands_drive_the_sorter() {
    let mut rig = Rig::new(Config::DEFAULT);
    let mut delay = CountingDelay::default();
    let now = Instant::from_millis(50);

    let mut out = String::new();
    rig.sorter.handle_line("status", now, &mut out, &mut delay).unwrap();
    assert!(out.contains("State: WAITING_FOR_COIN"));

    out.clear();
    rig.sorter.handle_line("photos", now, &mut out, &mut delay).unwrap();
    assert_eq!(out, "No images captured\r\n");

    out.clear();
    rig.sorter.handle_line("TEST", now, &mut out, &mut delay).unwrap();
    assert_eq!(delay.total_ms, 8_500);
    assert_eq!(rig.sorter.camera().lights, vec![false, true, false]);

    out.clear();
    assert_eq!(
        rig.sorter.handle_line("launch", now, &mut out, &mut delay),
        Err(Error::UnknownCommand)
    );
    assert!(out.contains("help"));
}

#[test]
fn self_test_is_refused_while_busy_and_reset_recovers() {
    let config = Config { debounce_ms: 20, ..Config::DEFAULT };
    let mut rig = Rig::new(config);
    rig.edge(0);
    rig.edge(40);
    rig.run_until(1000);
    assert_eq!(rig.sorter.state(), MachineState::Rejecting);

    let mut delay = CountingDelay::default();
    let mut out = String::new();
    let now = Instant::from_millis(rig.now);
    assert_eq!(
        rig.sorter.handle_line("test", now, &mut out, &mut delay),
        Err(Error::Busy)
    );
    assert_eq!(delay.total_ms, 0);

    out.clear();
    rig.sorter.handle_line("reset", now, &mut out, &mut delay).unwrap();
    assert_eq!(out, "System reset complete\r\n");
    assert_eq!(rig.sorter.state(), MachineState::WaitingForCoin);
    assert_eq!(rig.sorter.actuators().last(Actuator::Trapdoor), Some(0));
}

#[test]
fn edge_right_after_operator_reset_is_a_single_coin() {
    let mut rig = Rig::new(Config::DEFAULT);
    rig.run_until(100);
    rig.sorter.reset(Instant::from_millis(rig.now));
    rig.edge(rig.now);
    rig.run_until(1200);
    assert_eq!(rig.sorter.state(), MachineState::Processing);
    assert_eq!(rig.sorter.controller().status(), StatusCode::Ok);

    rig.run_until_state(MachineState::WaitingForCoin, 10_000);
    assert_eq!(rig.sorter.camera().captured.len(), 2);
    assert_eq!(rig.sorter.controller().stats().coins_rejected, 0);
}

#[test]
fn status_reports_detector_debounce() {
    let config = Config { debounce_ms: 20, ..Config::DEFAULT };
    let mut rig = Rig::new(config);
    let mut delay = CountingDelay::default();
    let mut out = String::new();
    rig.sorter
        .handle_line("status", Instant::from_millis(10), &mut out, &mut delay)
        .unwrap();
    assert!(out.contains("Debounce: 20 ms"));
}
