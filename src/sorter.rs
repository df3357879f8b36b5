//! Polling-loop driver.
//!
//! `CoinSorter` owns the controller and the collaborators. Each
//! [`poll`](CoinSorter::poll) ticks the controller once and then executes its
//! queued commands in order. Capture results are fed straight back to the
//! controller, so a whole photo step completes within one poll.

use core::fmt::Write;

use embedded_hal::delay::DelayNs;
use heapless::Deque;

use crate::collaborators::{
    Actuator, Actuators, Camera, FilenameSource, Flipper, ImageName, ImageNamer, Indicator,
    StatusIndicator, Trapdoor,
};
use crate::config::{Config, PHOTO_HISTORY_LEN};
use crate::console::{self, ConsoleCommand};
use crate::controller::{Command, Controller, MachineState, Stats};
use crate::edge_detector::EdgeDetector;
use crate::error::{Error, Result, StatusCode};
use crate::photo::PhotoStep;
use crate::time::Instant;

/// Snapshot for the `status` console command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SorterStatus {
    pub state: MachineState,
    pub previous_state: MachineState,
    pub time_in_state_ms: u32,
    pub status: StatusCode,
    pub processing: bool,
    pub detector_count: u32,
    pub bounced_edges: u32,
    pub debounce_ms: u32,
    pub photo_step: PhotoStep,
    pub stats: Stats,
    pub images_captured: u32,
}

pub struct CoinSorter<C, A, I, F = ImageNamer> {
    controller: Controller,
    camera: C,
    actuators: A,
    indicator: I,
    namer: F,
    history: Deque<ImageName, PHOTO_HISTORY_LEN>,
    images_captured: u32,
}

impl<C, A, I> CoinSorter<C, A, I, ImageNamer>
where
    C: Camera,
    A: Actuators,
    I: StatusIndicator,
{
    pub fn new(
        config: Config,
        detector: &'static EdgeDetector,
        camera: C,
        actuators: A,
        indicator: I,
        now: Instant,
    ) -> Self {
        Self::with_namer(config, detector, camera, actuators, indicator, ImageNamer::new(), now)
    }
}

impl<C, A, I, F> CoinSorter<C, A, I, F>
where
    C: Camera,
    A: Actuators,
    I: StatusIndicator,
    F: FilenameSource,
{
    /// Puts the hardware in its safe state and starts the controller, which
    /// comes up in `WaitingForCoin`.
    pub fn with_namer(
        config: Config,
        detector: &'static EdgeDetector,
        camera: C,
        actuators: A,
        indicator: I,
        namer: F,
        now: Instant,
    ) -> Self {
        let mut sorter = Self {
            controller: Controller::new(config, detector, now),
            camera,
            actuators,
            indicator,
            namer,
            history: Deque::new(),
            images_captured: 0,
        };
        sorter.safe_reset();
        sorter.execute(now);
        sorter
    }

    /// One pass of the control loop. Returns the error report issued during
    /// this pass, if any, for the console.
    pub fn poll(&mut self, now: Instant) -> Option<StatusCode> {
        self.controller.tick(now);
        self.execute(now)
    }

    /// Operator reset: safe state and back to `WaitingForCoin`.
    pub fn reset(&mut self, now: Instant) {
        self.controller.reset(now);
        self.execute(now);
    }

    fn execute(&mut self, now: Instant) -> Option<StatusCode> {
        let mut report = None;
        while let Some(command) = self.controller.next_command() {
            trace!("Executing {}", command);
            match command {
                Command::Indicate(state) => self.indicator.set_indicator(state),
                Command::Trapdoor(position) => {
                    self.actuators.set_actuator(Actuator::Trapdoor, position.angle())
                }
                Command::Flipper(position) => {
                    self.actuators.set_actuator(Actuator::Flipper, position.angle())
                }
                Command::Capture(side) => {
                    let name = self.namer.next_filename(now);
                    let result = self.camera.capture(&name);
                    match result {
                        Ok(()) => {
                            info!("Image saved: {}", name.as_str());
                            self.remember(name);
                        }
                        Err(err) => error!("Capture of side {} failed: {}", side, err),
                    }
                    self.controller.capture_finished(now, result);
                }
                Command::ReportError(code) => report = Some(code),
                Command::SafeReset => self.safe_reset(),
            }
        }
        report
    }

    fn safe_reset(&mut self) {
        info!("Performing system reset...");
        self.actuators.set_actuator(Actuator::Trapdoor, Trapdoor::Closed.angle());
        self.actuators.set_actuator(Actuator::Flipper, Flipper::Home.angle());
        self.indicator.set_indicator(Indicator::Off);
        self.camera.set_lights(false);
        self.controller.detector().consume();
    }

    fn remember(&mut self, name: ImageName) {
        self.images_captured = self.images_captured.wrapping_add(1);
        if self.history.is_full() {
            self.history.pop_front();
        }
        let _ = self.history.push_back(name);
    }

    /// Exercises indicator, servos and lights. Only allowed while idle; the
    /// controller is not polled while it runs.
    pub fn self_test<D: DelayNs>(&mut self, delay: &mut D) -> Result<()> {
        if self.controller.state() != MachineState::WaitingForCoin {
            return Err(Error::Busy);
        }
        info!("Starting system test...");

        for state in [
            Indicator::Ready,
            Indicator::Processing,
            Indicator::Busy,
            Indicator::Error,
            Indicator::Off,
        ] {
            self.indicator.set_indicator(state);
            delay.delay_ms(500);
        }

        info!("Testing servos...");
        let sweep = [
            (Actuator::Trapdoor, 45),
            (Actuator::Trapdoor, Trapdoor::Closed.angle()),
            (Actuator::Flipper, 45),
            (Actuator::Flipper, 90),
            (Actuator::Flipper, Flipper::Home.angle()),
        ];
        for (which, angle) in sweep {
            self.actuators.set_actuator(which, angle);
            delay.delay_ms(1000);
        }

        info!("Testing camera lights...");
        self.camera.set_lights(true);
        delay.delay_ms(1000);
        self.camera.set_lights(false);

        self.indicator.set_indicator(Indicator::Ready);
        info!("System test complete");
        Ok(())
    }

    /// Runs one console command, writing its output to `out`.
    pub fn handle_command<W: Write, D: DelayNs>(
        &mut self,
        command: ConsoleCommand,
        now: Instant,
        out: &mut W,
        delay: &mut D,
    ) -> Result<()> {
        match command {
            ConsoleCommand::Status => console::write_status(out, &self.status(now)),
            ConsoleCommand::Test => {
                self.self_test(delay)?;
                console::write_line(out, "System test complete")
            }
            ConsoleCommand::Reset => {
                self.reset(now);
                console::write_line(out, "System reset complete")
            }
            ConsoleCommand::Photos => console::write_photos(out, self.photos()),
            ConsoleCommand::Help => console::write_help(out),
        }
    }

    /// Parses and runs one console line. Errors are reported on `out` as
    /// well as returned.
    pub fn handle_line<W: Write, D: DelayNs>(
        &mut self,
        line: &str,
        now: Instant,
        out: &mut W,
        delay: &mut D,
    ) -> Result<()> {
        let result =
            ConsoleCommand::parse(line).and_then(|cmd| self.handle_command(cmd, now, out, delay));
        if let Err(err) = result {
            console::write_error(out, err)?;
        }
        result
    }

    pub fn status(&self, now: Instant) -> SorterStatus {
        let detector = self.controller.detector();
        SorterStatus {
            state: self.controller.state(),
            previous_state: self.controller.previous_state(),
            time_in_state_ms: self.controller.time_in_state(now),
            status: self.controller.status(),
            processing: self.controller.is_processing(),
            detector_count: detector.current_count(),
            bounced_edges: detector.bounced(),
            debounce_ms: detector.debounce_ms(),
            photo_step: self.controller.photo_step(),
            stats: self.controller.stats(),
            images_captured: self.images_captured,
        }
    }

    /// Most recent image filenames, oldest first.
    pub fn photos(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(|name| name.as_str())
    }

    pub fn state(&self) -> MachineState {
        self.controller.state()
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn actuators(&self) -> &A {
        &self.actuators
    }

    pub fn indicator(&self) -> &I {
        &self.indicator
    }
}
