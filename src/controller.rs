//! Coin Controller
//!
//! Typed state machine that consumes edge detector windows and sequences
//! acceptance, photography and rejection. It holds only logical state: every
//! side effect leaves as a [`Command`] in the context's outbox, and the
//! results the machine depends on (captures) come back as events.
//!
//! | State          | Leaves when                                                   |
//! |----------------|---------------------------------------------------------------|
//! | Init           | immediately, to WaitingForCoin                                |
//! | WaitingForCoin | detector triggered, to CoinDetected                           |
//! | CoinDetected   | window closed: Rejecting (>= threshold) or Processing         |
//! | Processing     | new edge: Rejecting; settle elapsed: Photographing            |
//! | Photographing  | sequence complete: WaitingForCoin; capture failed: Error      |
//! | Rejecting      | trapdoor cycled and settled: WaitingForCoin                   |
//! | Error          | after the report limit: safe reset, WaitingForCoin            |
//!
//! Any state other than Init held for `reset_timeout_ms` raises
//! `TimeoutError`. Entering WaitingForCoin is the single recovery path: it
//! clears the error, the detector window and the processing flag.

use heapless::Deque;
use typed_fsm::{state_machine, Transition};

use crate::collaborators::{Flipper, Indicator, Trapdoor};
use crate::config::Config;
use crate::edge_detector::EdgeDetector;
use crate::error::{CaptureError, StatusCode};
use crate::photo::{PhotoAction, PhotoSequence, PhotoSide, PhotoStep};
use crate::time::Instant;

/// Commands buffered between two drains of the outbox.
const OUTBOX_LEN: usize = 8;

/// Logical machine state, mirrored from the FSM for reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MachineState {
    Init,
    WaitingForCoin,
    CoinDetected,
    Processing,
    Photographing,
    Rejecting,
    Error,
}

impl MachineState {
    pub const fn as_str(self) -> &'static str {
        match self {
            MachineState::Init => "INIT",
            MachineState::WaitingForCoin => "WAITING_FOR_COIN",
            MachineState::CoinDetected => "COIN_DETECTED",
            MachineState::Processing => "PROCESSING",
            MachineState::Photographing => "PHOTOGRAPHING",
            MachineState::Rejecting => "REJECTING",
            MachineState::Error => "ERROR",
        }
    }
}

/// Side effects requested by the controller, executed in order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    Indicate(Indicator),
    Trapdoor(Trapdoor),
    Flipper(Flipper),
    Capture(PhotoSide),
    ReportError(StatusCode),
    /// Trapdoor closed, flipper home, indicator and lights off.
    SafeReset,
}

#[derive(Clone, Copy, Debug)]
pub enum ControllerEvent {
    /// Periodic poll from the main loop.
    Tick,
    /// Result of the last `Command::Capture`.
    CaptureFinished(Result<(), CaptureError>),
    /// Operator requested reset.
    Reset,
}

/// Counters since start-up.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Stats {
    pub coins_accepted: u32,
    pub coins_rejected: u32,
    pub error_episodes: u32,
}

#[derive(Debug, Default)]
struct ErrorContext {
    status: StatusCode,
    reports: u8,
    last_report: Option<Instant>,
}

enum Escalation {
    Reset,
    Timeout,
}

enum PhotoProgress {
    Running,
    Done,
    Failed,
}

enum WindowOutcome {
    Open,
    Empty,
    Single,
    Multiple,
}

pub struct ControllerContext {
    config: Config,
    detector: &'static EdgeDetector,
    now: Instant,
    state: MachineState,
    previous: MachineState,
    entered_at: Instant,
    error: ErrorContext,
    processing: bool,
    photo: PhotoSequence,
    trapdoor_closed_at: Option<Instant>,
    stats: Stats,
    outbox: Deque<Command, OUTBOX_LEN>,
}

impl ControllerContext {
    fn new(config: Config, detector: &'static EdgeDetector, now: Instant) -> Self {
        Self {
            config,
            detector,
            now,
            state: MachineState::Init,
            previous: MachineState::Init,
            entered_at: now,
            error: ErrorContext::default(),
            processing: false,
            photo: PhotoSequence::new(),
            trapdoor_closed_at: None,
            stats: Stats::default(),
            outbox: Deque::new(),
        }
    }

    fn enter(&mut self, next: MachineState) {
        info!("State: {} -> {}", self.state.as_str(), next.as_str());
        self.previous = self.state;
        self.state = next;
        self.entered_at = self.now;
    }

    fn issue(&mut self, command: Command) {
        if self.outbox.push_back(command).is_err() {
            error!("Command queue full, dropped {}", command);
        }
    }

    fn in_state_for(&self, budget_ms: u32) -> bool {
        self.now.has_elapsed(self.entered_at, budget_ms)
    }

    fn raise(&mut self, status: StatusCode) {
        warn!("Status: {}", status.description());
        self.error.status = status;
    }

    /// Checks the conditions every state honours before its own logic.
    fn escalation(&mut self, evt: &ControllerEvent) -> Option<Escalation> {
        if matches!(*evt, ControllerEvent::Reset) {
            info!("Reset requested in {}", self.state.as_str());
            self.issue(Command::SafeReset);
            return Some(Escalation::Reset);
        }
        if self.in_state_for(self.config.reset_timeout_ms) {
            warn!("{} exceeded reset timeout", self.state.as_str());
            self.raise(StatusCode::TimeoutError);
            return Some(Escalation::Timeout);
        }
        None
    }

    /// Entry work of WaitingForCoin: the recovery funnel.
    fn rearm(&mut self) {
        self.error.status = StatusCode::Ok;
        let discarded = self.detector.consume();
        if discarded > 0 {
            debug!("Discarded {} edges outside a detection window", discarded);
        }
        self.processing = false;
        self.trapdoor_closed_at = None;
        self.issue(Command::Indicate(Indicator::Ready));
    }

    fn close_window(&mut self) -> WindowOutcome {
        match self.detector.window_age(self.now) {
            None => WindowOutcome::Empty,
            Some(age) if age < self.config.multi_coin_window_ms => WindowOutcome::Open,
            Some(_) => {
                let count = self.detector.consume();
                let multiple = count >= self.config.multi_coin_threshold;
                info!("Coin detection complete. Count: {}, multiple: {}", count, multiple);
                if multiple {
                    WindowOutcome::Multiple
                } else {
                    WindowOutcome::Single
                }
            }
        }
    }

    fn photo_overrun(&mut self) -> bool {
        if self.in_state_for(self.config.processing_timeout_ms) {
            warn!("Photography exceeded its budget at step {}", self.photo.step() as u8);
            self.raise(StatusCode::TimeoutError);
            true
        } else {
            false
        }
    }

    fn advance_photo(&mut self, evt: &ControllerEvent) -> PhotoProgress {
        let action = match *evt {
            ControllerEvent::Tick => self.photo.tick(self.now, &self.config),
            ControllerEvent::CaptureFinished(result) => self.photo.capture_finished(self.now, result),
            ControllerEvent::Reset => PhotoAction::Wait,
        };
        match action {
            PhotoAction::Wait => PhotoProgress::Running,
            PhotoAction::MoveFlipper(position) => {
                self.issue(Command::Flipper(position));
                PhotoProgress::Running
            }
            PhotoAction::Capture(side) => {
                self.issue(Command::Capture(side));
                PhotoProgress::Running
            }
            PhotoAction::Complete => {
                self.stats.coins_accepted += 1;
                PhotoProgress::Done
            }
            PhotoAction::Failed(err) => {
                self.raise(StatusCode::from(err));
                PhotoProgress::Failed
            }
        }
    }

    /// Closes the trapdoor once it has been open long enough; `true` once it
    /// has also had time to settle.
    fn trapdoor_cycled(&mut self) -> bool {
        match self.trapdoor_closed_at {
            None => {
                if self.in_state_for(self.config.trapdoor_open_ms) {
                    self.issue(Command::Trapdoor(Trapdoor::Closed));
                    self.trapdoor_closed_at = Some(self.now);
                }
                false
            }
            Some(closed) => self.now.has_elapsed(closed, self.config.servo_move_delay_ms),
        }
    }

    /// Restarts the time-in-state clock without a transition.
    fn restart_clock(&mut self) {
        self.entered_at = self.now;
    }

    fn begin_error_episode(&mut self) {
        self.error.reports = 0;
        self.error.last_report = None;
        self.restart_clock();
    }

    /// Emits a throttled report; `true` once the report limit is reached.
    fn report_error_if_due(&mut self) -> bool {
        let due = match self.error.last_report {
            None => true,
            Some(last) => self.now.has_elapsed(last, self.config.error_report_interval_ms),
        };
        if !due {
            return false;
        }
        self.error.last_report = Some(self.now);
        self.error.reports = self.error.reports.saturating_add(1);
        error!(
            "System error: {} (report {})",
            self.error.status.description(),
            self.error.reports
        );
        self.issue(Command::ReportError(self.error.status));
        self.error.reports >= self.config.error_reports_before_reset
    }
}

// State Machine Definition
state_machine! {
    Name: CoinFsm,
    Context: ControllerContext,
    Event: ControllerEvent,
    States: {
        Init => {
            entry: |ctx| {
                ctx.enter(MachineState::Init);
            }
            process: |_ctx, _evt| {
                Transition::To(CoinFsm::WaitingForCoin)
            }
        },

        WaitingForCoin => {
            entry: |ctx| {
                ctx.enter(MachineState::WaitingForCoin);
                ctx.rearm();
            }
            process: |ctx, evt| {
                match ctx.escalation(evt) {
                    Some(Escalation::Timeout) => Transition::To(CoinFsm::Error),
                    Some(Escalation::Reset) => {
                        ctx.restart_clock();
                        ctx.rearm();
                        Transition::None
                    }
                    None => {
                        if matches!(*evt, ControllerEvent::Tick) && ctx.detector.pending() {
                            ctx.detector.clear_triggered();
                            Transition::To(CoinFsm::CoinDetected)
                        } else {
                            Transition::None
                        }
                    }
                }
            }
        },

        CoinDetected => {
            entry: |ctx| {
                ctx.enter(MachineState::CoinDetected);
                ctx.processing = true;
                ctx.issue(Command::Indicate(Indicator::Processing));
            }
            process: |ctx, evt| {
                match ctx.escalation(evt) {
                    Some(Escalation::Timeout) => Transition::To(CoinFsm::Error),
                    Some(Escalation::Reset) => Transition::To(CoinFsm::WaitingForCoin),
                    None => {
                        if matches!(*evt, ControllerEvent::Tick) {
                            match ctx.close_window() {
                                WindowOutcome::Open => Transition::None,
                                WindowOutcome::Empty => Transition::To(CoinFsm::WaitingForCoin),
                                WindowOutcome::Single => Transition::To(CoinFsm::Processing),
                                WindowOutcome::Multiple => {
                                    ctx.raise(StatusCode::MultipleCoins);
                                    Transition::To(CoinFsm::Rejecting)
                                }
                            }
                        } else {
                            Transition::None
                        }
                    }
                }
            }
        },

        Processing => {
            entry: |ctx| {
                ctx.enter(MachineState::Processing);
                ctx.issue(Command::Indicate(Indicator::Processing));
            }
            process: |ctx, evt| {
                match ctx.escalation(evt) {
                    Some(Escalation::Timeout) => Transition::To(CoinFsm::Error),
                    Some(Escalation::Reset) => Transition::To(CoinFsm::WaitingForCoin),
                    None => {
                        if !matches!(*evt, ControllerEvent::Tick) {
                            Transition::None
                        } else if ctx.detector.pending() {
                            ctx.raise(StatusCode::CoinDuringProcessing);
                            ctx.detector.consume();
                            Transition::To(CoinFsm::Rejecting)
                        } else if ctx.in_state_for(ctx.config.processing_settle_ms) {
                            Transition::To(CoinFsm::Photographing)
                        } else {
                            Transition::None
                        }
                    }
                }
            }
        },

        Photographing => {
            entry: |ctx| {
                ctx.enter(MachineState::Photographing);
                ctx.issue(Command::Indicate(Indicator::Busy));
                ctx.photo.restart(ctx.now);
            }
            process: |ctx, evt| {
                match ctx.escalation(evt) {
                    Some(Escalation::Timeout) => Transition::To(CoinFsm::Error),
                    Some(Escalation::Reset) => Transition::To(CoinFsm::WaitingForCoin),
                    None => {
                        if ctx.photo_overrun() {
                            Transition::To(CoinFsm::Error)
                        } else {
                            match ctx.advance_photo(evt) {
                                PhotoProgress::Running => Transition::None,
                                PhotoProgress::Done => Transition::To(CoinFsm::WaitingForCoin),
                                PhotoProgress::Failed => Transition::To(CoinFsm::Error),
                            }
                        }
                    }
                }
            }
        },

        Rejecting => {
            entry: |ctx| {
                ctx.enter(MachineState::Rejecting);
                ctx.stats.coins_rejected += 1;
                ctx.trapdoor_closed_at = None;
                ctx.issue(Command::Indicate(Indicator::Busy));
                ctx.issue(Command::Trapdoor(Trapdoor::Open));
            }
            process: |ctx, evt| {
                match ctx.escalation(evt) {
                    Some(Escalation::Timeout) => Transition::To(CoinFsm::Error),
                    Some(Escalation::Reset) => Transition::To(CoinFsm::WaitingForCoin),
                    None => {
                        if matches!(*evt, ControllerEvent::Tick) && ctx.trapdoor_cycled() {
                            Transition::To(CoinFsm::WaitingForCoin)
                        } else {
                            Transition::None
                        }
                    }
                }
            }
        },

        Error => {
            entry: |ctx| {
                ctx.enter(MachineState::Error);
                ctx.stats.error_episodes += 1;
                ctx.begin_error_episode();
                ctx.issue(Command::Indicate(Indicator::Error));
            }
            process: |ctx, evt| {
                match ctx.escalation(evt) {
                    Some(Escalation::Reset) => Transition::To(CoinFsm::WaitingForCoin),
                    Some(Escalation::Timeout) => {
                        ctx.begin_error_episode();
                        Transition::None
                    }
                    None => {
                        if matches!(*evt, ControllerEvent::Tick) && ctx.report_error_if_due() {
                            info!("Error report limit reached, performing safe reset");
                            ctx.issue(Command::SafeReset);
                            Transition::To(CoinFsm::WaitingForCoin)
                        } else {
                            Transition::None
                        }
                    }
                }
            }
        }
    }
}

/// The coin controller: FSM plus its context.
pub struct Controller {
    fsm: CoinFsm,
    ctx: ControllerContext,
}

impl Controller {
    /// Builds the controller and runs it out of `Init`, so it starts in
    /// `WaitingForCoin` with its entry commands queued.
    pub fn new(config: Config, detector: &'static EdgeDetector, now: Instant) -> Self {
        if detector.debounce_ms() != config.debounce_ms {
            warn!(
                "Detector debounce {} ms differs from configured {} ms",
                detector.debounce_ms(),
                config.debounce_ms
            );
        }
        let mut ctx = ControllerContext::new(config, detector, now);
        let mut fsm = CoinFsm::Init;
        fsm.init(&mut ctx);
        let mut controller = Self { fsm, ctx };
        controller.tick(now);
        controller
    }

    pub fn tick(&mut self, now: Instant) {
        self.dispatch(now, ControllerEvent::Tick);
    }

    pub fn capture_finished(&mut self, now: Instant, result: Result<(), CaptureError>) {
        self.dispatch(now, ControllerEvent::CaptureFinished(result));
    }

    pub fn reset(&mut self, now: Instant) {
        self.dispatch(now, ControllerEvent::Reset);
    }

    fn dispatch(&mut self, now: Instant, event: ControllerEvent) {
        self.ctx.now = now;
        self.fsm.dispatch(&mut self.ctx, &event);
    }

    /// Pops the oldest pending command.
    pub fn next_command(&mut self) -> Option<Command> {
        self.ctx.outbox.pop_front()
    }

    pub fn state(&self) -> MachineState {
        self.ctx.state
    }

    pub fn previous_state(&self) -> MachineState {
        self.ctx.previous
    }

    pub fn time_in_state(&self, now: Instant) -> u32 {
        now.millis_since(self.ctx.entered_at)
    }

    /// The active error, `Ok` outside of a fault or rejection.
    pub fn status(&self) -> StatusCode {
        self.ctx.error.status
    }

    pub fn is_processing(&self) -> bool {
        self.ctx.processing
    }

    pub fn photo_step(&self) -> PhotoStep {
        self.ctx.photo.step()
    }

    pub fn stats(&self) -> Stats {
        self.ctx.stats
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn detector(&self) -> &'static EdgeDetector {
        self.ctx.detector
    }
}
