//! Photography sub-sequence.
//!
//! A linear, time-gated walk through both photo positions:
//!
//! ```text
//! MoveToSide1 -> AwaitSide1 (capture side 1) -> MoveToSide2 -> AwaitSide2 (capture side 2)
//!             -> ReturnHome -> AwaitHome -> complete
//! ```
//!
//! Servo moves are fire-and-forget; each await step only checks elapsed time
//! against its settle budget. A capture is requested once per await step and
//! the sequence holds there until the result is reported back. A failed
//! capture abandons the sequence and rewinds it to step 0.

use crate::collaborators::Flipper;
use crate::config::Config;
use crate::error::CaptureError;
use crate::time::Instant;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhotoStep {
    MoveToSide1 = 0,
    AwaitSide1 = 1,
    MoveToSide2 = 2,
    AwaitSide2 = 3,
    ReturnHome = 4,
    AwaitHome = 5,
}

/// Coin face being photographed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhotoSide {
    One,
    Two,
}

/// What the sequence needs from the controller after a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PhotoAction {
    /// Nothing to do yet.
    Wait,
    MoveFlipper(Flipper),
    Capture(PhotoSide),
    /// Both sides captured and the flipper is home.
    Complete,
    Failed(CaptureError),
}

#[derive(Debug)]
pub struct PhotoSequence {
    step: PhotoStep,
    step_started: Instant,
    pending: Option<PhotoSide>,
}

impl PhotoSequence {
    pub const fn new() -> Self {
        Self {
            step: PhotoStep::MoveToSide1,
            step_started: Instant::from_millis(0),
            pending: None,
        }
    }

    pub fn step(&self) -> PhotoStep {
        self.step
    }

    /// The side whose capture result is outstanding.
    pub fn pending_capture(&self) -> Option<PhotoSide> {
        self.pending
    }

    /// Rewinds to step 0.
    pub fn restart(&mut self, now: Instant) {
        self.enter(PhotoStep::MoveToSide1, now);
    }

    /// Advances on a poll tick.
    pub fn tick(&mut self, now: Instant, config: &Config) -> PhotoAction {
        match self.step {
            PhotoStep::MoveToSide1 => {
                self.enter(PhotoStep::AwaitSide1, now);
                PhotoAction::MoveFlipper(Flipper::Side1)
            }
            PhotoStep::AwaitSide1 => self.await_capture(PhotoSide::One, now, config),
            PhotoStep::MoveToSide2 => {
                self.enter(PhotoStep::AwaitSide2, now);
                PhotoAction::MoveFlipper(Flipper::Side2)
            }
            PhotoStep::AwaitSide2 => self.await_capture(PhotoSide::Two, now, config),
            PhotoStep::ReturnHome => {
                self.enter(PhotoStep::AwaitHome, now);
                PhotoAction::MoveFlipper(Flipper::Home)
            }
            PhotoStep::AwaitHome => {
                if now.has_elapsed(self.step_started, config.servo_move_delay_ms) {
                    self.restart(now);
                    PhotoAction::Complete
                } else {
                    PhotoAction::Wait
                }
            }
        }
    }

    /// Feeds back the result of the outstanding capture. Results that arrive
    /// with no capture outstanding are ignored.
    pub fn capture_finished(
        &mut self,
        now: Instant,
        result: Result<(), CaptureError>,
    ) -> PhotoAction {
        let Some(side) = self.pending.take() else {
            return PhotoAction::Wait;
        };
        match result {
            Ok(()) => {
                let next = match side {
                    PhotoSide::One => PhotoStep::MoveToSide2,
                    PhotoSide::Two => PhotoStep::ReturnHome,
                };
                self.enter(next, now);
                PhotoAction::Wait
            }
            Err(err) => {
                self.restart(now);
                PhotoAction::Failed(err)
            }
        }
    }

    fn await_capture(&mut self, side: PhotoSide, now: Instant, config: &Config) -> PhotoAction {
        if self.pending.is_some() {
            return PhotoAction::Wait;
        }
        if now.has_elapsed(self.step_started, config.flipper_photo_delay_ms) {
            self.pending = Some(side);
            PhotoAction::Capture(side)
        } else {
            PhotoAction::Wait
        }
    }

    fn enter(&mut self, step: PhotoStep, now: Instant) {
        self.step = step;
        self.step_started = now;
        self.pending = None;
    }
}

impl Default for PhotoSequence {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u32) -> Instant {
        Instant::from_millis(ms)
    }

    #[test]
    fn full_sequence_with_successful_captures() {
        let cfg = Config::DEFAULT;
        let mut seq = PhotoSequence::new();
        seq.restart(at(0));

        assert_eq!(seq.tick(at(0), &cfg), PhotoAction::MoveFlipper(Flipper::Side1));
        assert_eq!(seq.tick(at(299), &cfg), PhotoAction::Wait);
        assert_eq!(seq.tick(at(300), &cfg), PhotoAction::Capture(PhotoSide::One));
        // Still waiting on the result: no second capture request.
        assert_eq!(seq.tick(at(310), &cfg), PhotoAction::Wait);
        assert_eq!(seq.capture_finished(at(320), Ok(())), PhotoAction::Wait);
        assert_eq!(seq.step(), PhotoStep::MoveToSide2);

        assert_eq!(seq.tick(at(330), &cfg), PhotoAction::MoveFlipper(Flipper::Side2));
        assert_eq!(seq.tick(at(630), &cfg), PhotoAction::Capture(PhotoSide::Two));
        assert_eq!(seq.capture_finished(at(640), Ok(())), PhotoAction::Wait);

        assert_eq!(seq.tick(at(650), &cfg), PhotoAction::MoveFlipper(Flipper::Home));
        assert_eq!(seq.tick(at(1149), &cfg), PhotoAction::Wait);
        assert_eq!(seq.tick(at(1150), &cfg), PhotoAction::Complete);
        assert_eq!(seq.step(), PhotoStep::MoveToSide1);
    }

    #[test]
    fn failed_capture_rewinds_to_first_step() {
        let cfg = Config::DEFAULT;
        let mut seq = PhotoSequence::new();
        seq.restart(at(0));
        seq.tick(at(0), &cfg);
        seq.tick(at(300), &cfg);
        seq.capture_finished(at(300), Ok(()));
        seq.tick(at(310), &cfg);
        assert_eq!(seq.tick(at(610), &cfg), PhotoAction::Capture(PhotoSide::Two));
        assert_eq!(
            seq.capture_finished(at(620), Err(CaptureError::Sensor)),
            PhotoAction::Failed(CaptureError::Sensor)
        );
        assert_eq!(seq.step(), PhotoStep::MoveToSide1);
        assert_eq!(seq.pending_capture(), None);
    }

    #[test]
    fn stray_capture_result_is_ignored() {
        let mut seq = PhotoSequence::new();
        seq.restart(at(0));
        assert_eq!(seq.capture_finished(at(5), Err(CaptureError::Storage)), PhotoAction::Wait);
        assert_eq!(seq.step(), PhotoStep::MoveToSide1);
    }

    #[test]
    fn step_numbers_follow_sequence_order() {
        assert_eq!(PhotoStep::MoveToSide1 as u8, 0);
        assert_eq!(PhotoStep::AwaitHome as u8, 5);
    }
}
