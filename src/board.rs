//! Board drivers for the sorter's collaborators.
//!
//! Generic over `embedded-hal` traits so the pin and PWM types stay in
//! `hardware.rs`.

use defmt::{info, warn};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_hal::pwm::SetDutyCycle;

use coin_sorter::collaborators::{servo_pulse_us, SERVO_PERIOD_US};
use coin_sorter::config::CAMERA_WARMUP_MS;
use coin_sorter::{Actuator, Actuators, CaptureError, Camera, Indicator, StatusIndicator};

use crate::usb_module;

/// Shutter trigger pulse width.
const SHUTTER_PULSE_US: u32 = 1_000;
/// How long the camera module may take to confirm a saved frame.
const CAPTURE_TIMEOUT_MS: u32 = 2_000;

/// Trapdoor and flipper hobby servos on two PWM channels.
pub struct PwmServos<T, F> {
    trapdoor: T,
    flipper: F,
}

impl<T: SetDutyCycle, F: SetDutyCycle> PwmServos<T, F> {
    pub fn new(trapdoor: T, flipper: F) -> Self {
        Self { trapdoor, flipper }
    }
}

impl<T: SetDutyCycle, F: SetDutyCycle> Actuators for PwmServos<T, F> {
    fn set_actuator(&mut self, which: Actuator, angle: u8) {
        let pulse = servo_pulse_us(angle);
        let failed = match which {
            Actuator::Trapdoor => self.trapdoor.set_duty_cycle_fraction(pulse, SERVO_PERIOD_US).is_err(),
            Actuator::Flipper => self.flipper.set_duty_cycle_fraction(pulse, SERVO_PERIOD_US).is_err(),
        };
        if failed {
            warn!("{} rejected pulse of {} us", which, pulse);
        } else {
            info!("{} moved to: {}", which, angle);
        }
    }
}

/// Common-cathode RGB status LED on three PWM channels.
pub struct RgbLed<R, G, B> {
    red: R,
    green: G,
    blue: B,
}

impl<R: SetDutyCycle, G: SetDutyCycle, B: SetDutyCycle> RgbLed<R, G, B> {
    pub fn new(red: R, green: G, blue: B) -> Self {
        Self { red, green, blue }
    }
}

impl<R: SetDutyCycle, G: SetDutyCycle, B: SetDutyCycle> StatusIndicator for RgbLed<R, G, B> {
    fn set_indicator(&mut self, state: Indicator) {
        let rgb = state.color().dimmed();
        let _ = self.red.set_duty_cycle_fraction(rgb.r.into(), 255);
        let _ = self.green.set_duty_cycle_fraction(rgb.g.into(), 255);
        let _ = self.blue.set_duty_cycle_fraction(rgb.b.into(), 255);
    }
}

/// Camera module triggered over GPIO.
///
/// The filename is announced on the USB console for the storage host, the
/// shutter line is pulsed, and the module raises `ready` once the frame has
/// been written.
pub struct ShutterCamera<S, R, L, D> {
    shutter: S,
    ready: R,
    lights: L,
    delay: D,
}

impl<S: OutputPin, R: InputPin, L: OutputPin, D: DelayNs> ShutterCamera<S, R, L, D> {
    pub fn new(shutter: S, ready: R, lights: L, delay: D) -> Self {
        Self { shutter, ready, lights, delay }
    }

    fn wait_ready(&mut self) -> Result<(), CaptureError> {
        for _ in 0..CAPTURE_TIMEOUT_MS {
            match self.ready.is_high() {
                Ok(true) => return Ok(()),
                Ok(false) => self.delay.delay_ms(1),
                Err(_) => return Err(CaptureError::Sensor),
            }
        }
        warn!("Camera capture failed: no confirmation");
        Err(CaptureError::Sensor)
    }
}

impl<S: OutputPin, R: InputPin, L: OutputPin, D: DelayNs> Camera for ShutterCamera<S, R, L, D> {
    fn capture(&mut self, filename: &str) -> Result<(), CaptureError> {
        self.set_lights(true);
        self.delay.delay_ms(CAMERA_WARMUP_MS);

        usb_module::write(b"CAPTURE ");
        usb_module::write(filename.as_bytes());
        usb_module::write(b"\r\n");

        let _ = self.shutter.set_high();
        self.delay.delay_us(SHUTTER_PULSE_US);
        let _ = self.shutter.set_low();

        let saved = self.wait_ready();
        self.set_lights(false);
        saved
    }

    fn set_lights(&mut self, on: bool) {
        let _ = if on { self.lights.set_high() } else { self.lights.set_low() };
    }
}
