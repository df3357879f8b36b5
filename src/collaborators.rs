//! Collaborator contracts.
//!
//! The controller never touches hardware. It emits commands, and the
//! [`CoinSorter`](crate::sorter::CoinSorter) executes them through these
//! traits. The firmware implements them on RP2350 peripherals; tests use
//! recording mocks.

use core::fmt::Write;

use heapless::String;

use crate::config::{
    FLIPPER_HOME_DEG, FLIPPER_SIDE_1_DEG, FLIPPER_SIDE_2_DEG, IMAGE_FILENAME_PREFIX,
    IMAGE_FILENAME_SUFFIX, STATUS_LED_BRIGHTNESS, TRAPDOOR_CLOSED_DEG, TRAPDOOR_OPEN_DEG,
};
use crate::error::CaptureError;
use crate::time::Instant;

/// Capacity of an image filename, e.g. `/coin_4294967295_4294967295.jpg`.
pub const IMAGE_NAME_LEN: usize = 32;

pub type ImageName = String<IMAGE_NAME_LEN>;

/// Synchronous photo capture and save.
pub trait Camera {
    /// Captures one frame into `filename`. On error nothing was written.
    fn capture(&mut self, filename: &str) -> Result<(), CaptureError>;

    /// Switches the illumination ring. Cameras without lights ignore it.
    fn set_lights(&mut self, _on: bool) {}
}

/// Which servo a position command addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Actuator {
    Trapdoor,
    Flipper,
}

/// Fire-and-forget servo positioning. There is no completion signal; the
/// caller waits a fixed settle time.
pub trait Actuators {
    fn set_actuator(&mut self, which: Actuator, angle: u8);
}

/// Status LED states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Indicator {
    Ready,
    Processing,
    Busy,
    Error,
    Off,
}

impl Indicator {
    /// RGB colour shown for this state.
    pub const fn color(self) -> Rgb {
        match self {
            Indicator::Ready => Rgb::new(0, 255, 0),
            Indicator::Processing => Rgb::new(255, 255, 0),
            Indicator::Busy => Rgb::new(255, 0, 0),
            Indicator::Error => Rgb::new(255, 0, 255),
            Indicator::Off => Rgb::new(0, 0, 0),
        }
    }
}

pub trait StatusIndicator {
    fn set_indicator(&mut self, state: Indicator);
}

/// Produces image filenames that never repeat within a process lifetime.
pub trait FilenameSource {
    fn next_filename(&mut self, now: Instant) -> ImageName;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Scales each channel from `0..=255` into `0..=STATUS_LED_BRIGHTNESS`.
    pub const fn dimmed(self) -> Rgb {
        Rgb::new(
            scale_channel(self.r),
            scale_channel(self.g),
            scale_channel(self.b),
        )
    }
}

const fn scale_channel(value: u8) -> u8 {
    ((value as u16 * STATUS_LED_BRIGHTNESS as u16) / 255) as u8
}

/// Trapdoor positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trapdoor {
    Closed,
    Open,
}

impl Trapdoor {
    pub const fn angle(self) -> u8 {
        match self {
            Trapdoor::Closed => TRAPDOOR_CLOSED_DEG,
            Trapdoor::Open => TRAPDOOR_OPEN_DEG,
        }
    }
}

/// Flipper positions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Flipper {
    Home,
    Side1,
    Side2,
}

impl Flipper {
    pub const fn angle(self) -> u8 {
        match self {
            Flipper::Home => FLIPPER_HOME_DEG,
            Flipper::Side1 => FLIPPER_SIDE_1_DEG,
            Flipper::Side2 => FLIPPER_SIDE_2_DEG,
        }
    }
}

/// Hobby servo frame period.
pub const SERVO_PERIOD_US: u16 = 20_000;
const SERVO_MIN_PULSE_US: u32 = 500;
const SERVO_MAX_PULSE_US: u32 = 2500;

/// Pulse width for a servo angle, clamped to 0..=180 degrees.
pub const fn servo_pulse_us(angle: u8) -> u16 {
    let angle = if angle > 180 { 180 } else { angle as u32 };
    (SERVO_MIN_PULSE_US + angle * (SERVO_MAX_PULSE_US - SERVO_MIN_PULSE_US) / 180) as u16
}

/// `"/coin_<millis>_<counter>.jpg"` names. The counter makes names unique
/// even when two captures share a millisecond.
#[derive(Debug, Default)]
pub struct ImageNamer {
    counter: u32,
}

impl ImageNamer {
    pub const fn new() -> Self {
        Self { counter: 0 }
    }

    /// Images named so far.
    pub fn issued(&self) -> u32 {
        self.counter
    }
}

impl FilenameSource for ImageNamer {
    fn next_filename(&mut self, now: Instant) -> ImageName {
        self.counter = self.counter.wrapping_add(1);
        let mut name = ImageName::new();
        // Fits by construction: prefix + two u32 + separator + suffix <= 31 bytes.
        let _ = write!(
            name,
            "{}{}_{}{}",
            IMAGE_FILENAME_PREFIX,
            now.as_millis(),
            self.counter,
            IMAGE_FILENAME_SUFFIX
        );
        name
    }
}
