//! Timing, threshold and actuator constants for the sorting station.
//!
//! The constants are the shipped calibration. [`Config`] carries the subset
//! the controller consumes at run time so tests and alternative mechanics can
//! tune them without touching the firmware.

// --- Sensor timing ---

/// Edges closer together than this are treated as contact bounce.
pub const SENSOR_DEBOUNCE_MS: u32 = 50;
/// Length of a detection window, measured from its first edge.
pub const MULTI_COIN_TIMEOUT_MS: u32 = 1000;
/// Edge count inside one window that means more than one coin.
pub const MULTI_COIN_THRESHOLD: u32 = 2;

// --- Servo timing ---

/// How long the trapdoor stays open while rejecting.
pub const TRAPDOOR_OPEN_MS: u32 = 2000;
/// Time allowed for a servo to reach a commanded angle.
pub const SERVO_MOVE_DELAY_MS: u32 = 500;
/// Settle time after the flipper reaches a photo position.
pub const FLIPPER_PHOTO_DELAY_MS: u32 = 300;
/// Settle time between an accepted coin and the first flip.
pub const PROCESSING_SETTLE_MS: u32 = 500;

// --- Camera timing ---

/// Illumination warm-up before the shutter is released.
pub const CAMERA_WARMUP_MS: u32 = 100;

// --- State timeouts ---

/// Budget for the whole photography sequence.
pub const PROCESSING_TIMEOUT_MS: u32 = 10_000;
/// Any state held this long is treated as stuck.
pub const RESET_TIMEOUT_MS: u32 = 30_000;
/// Minimum spacing of error reports while in `Error`.
pub const ERROR_REPORT_INTERVAL_MS: u32 = 5000;
/// Error reports issued before the automatic safe reset.
pub const ERROR_REPORTS_BEFORE_RESET: u8 = 3;

// --- Main loop ---

/// Controller polling period used by the firmware main loop.
pub const POLL_INTERVAL_MS: u32 = 10;

// --- Servo positions (degrees) ---

pub const TRAPDOOR_CLOSED_DEG: u8 = 0;
pub const TRAPDOOR_OPEN_DEG: u8 = 90;

pub const FLIPPER_HOME_DEG: u8 = 0;
pub const FLIPPER_SIDE_1_DEG: u8 = 90;
pub const FLIPPER_SIDE_2_DEG: u8 = 180;

// --- LEDs ---

/// PWM ceiling for the RGB status LED (out of 255).
pub const STATUS_LED_BRIGHTNESS: u8 = 100;

// --- Image files ---

pub const IMAGE_FILENAME_PREFIX: &str = "/coin_";
pub const IMAGE_FILENAME_SUFFIX: &str = ".jpg";
/// Number of recent filenames kept for the `photos` console command.
pub const PHOTO_HISTORY_LEN: usize = 8;

/// Run-time tunables.
///
/// `debounce_ms` sizes the [`EdgeDetector`](crate::EdgeDetector), which must be
/// built from the same `Config`; the controller warns on a mismatch. The rest
/// drive the controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    pub debounce_ms: u32,
    pub multi_coin_window_ms: u32,
    pub multi_coin_threshold: u32,
    pub processing_settle_ms: u32,
    pub trapdoor_open_ms: u32,
    pub servo_move_delay_ms: u32,
    pub flipper_photo_delay_ms: u32,
    pub processing_timeout_ms: u32,
    pub reset_timeout_ms: u32,
    pub error_report_interval_ms: u32,
    pub error_reports_before_reset: u8,
}

impl Config {
    pub const DEFAULT: Config = Config {
        debounce_ms: SENSOR_DEBOUNCE_MS,
        multi_coin_window_ms: MULTI_COIN_TIMEOUT_MS,
        multi_coin_threshold: MULTI_COIN_THRESHOLD,
        processing_settle_ms: PROCESSING_SETTLE_MS,
        trapdoor_open_ms: TRAPDOOR_OPEN_MS,
        servo_move_delay_ms: SERVO_MOVE_DELAY_MS,
        flipper_photo_delay_ms: FLIPPER_PHOTO_DELAY_MS,
        processing_timeout_ms: PROCESSING_TIMEOUT_MS,
        reset_timeout_ms: RESET_TIMEOUT_MS,
        error_report_interval_ms: ERROR_REPORT_INTERVAL_MS,
        error_reports_before_reset: ERROR_REPORTS_BEFORE_RESET,
    };
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}
