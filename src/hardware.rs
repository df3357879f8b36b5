//! Hardware Abstraction Module
//!
//! This module handles the low-level configuration of the RP2350 peripherals.
//! It encapsulates the setup of Clocks, PLLs, Timer, GPIOs and PWM slices,
//! exposing a `Hardware` struct with the sorter's collaborators ready to use.

use rp235x_hal as hal;
use hal::gpio::{FunctionSio, PullDown, PullUp, SioInput, SioOutput};
use hal::pac;
use hal::pwm::{FreeRunning, Slice};

use coin_sorter::Instant;

use crate::board::{PwmServos, RgbLed, ShutterCamera};
use crate::usb_module;

/// External crystal frequency used by the Raspberry Pi Pico 2 W.
const XTAL_FREQ_HZ: u32 = 12_000_000u32;

/// 150 MHz / 64 = 2.34375 MHz PWM clock for the servo slice.
const SERVO_PWM_DIV: u8 = 64;
/// 2.34375 MHz / (46_874 + 1) = 50 Hz servo frame.
const SERVO_PWM_TOP: u16 = 46_874;

pub type HalTimer = hal::Timer<hal::timer::CopyableTimer0>;

/// Optical gate: open-collector output, low while a coin blocks the beam.
pub type SensorPin = hal::gpio::Pin<hal::gpio::bank0::Gpio2, FunctionSio<SioInput>, PullUp>;

type OutputPin<G> = hal::gpio::Pin<G, FunctionSio<SioOutput>, PullDown>;
type InputPin<G> = hal::gpio::Pin<G, FunctionSio<SioInput>, PullDown>;
type PwmChannel<S, C> = hal::pwm::Channel<Slice<S, FreeRunning>, C>;

pub type Servos = PwmServos<PwmChannel<hal::pwm::Pwm0, hal::pwm::A>, PwmChannel<hal::pwm::Pwm0, hal::pwm::B>>;

pub type StatusLed = RgbLed<
    PwmChannel<hal::pwm::Pwm6, hal::pwm::A>,
    PwmChannel<hal::pwm::Pwm6, hal::pwm::B>,
    PwmChannel<hal::pwm::Pwm7, hal::pwm::A>,
>;

pub type CameraModule = ShutterCamera<
    OutputPin<hal::gpio::bank0::Gpio18>,
    InputPin<hal::gpio::bank0::Gpio19>,
    OutputPin<hal::gpio::bank0::Gpio15>,
    HalTimer,
>;

/// Everything `main` needs after initialisation.
pub struct Hardware {
    pub timer: HalTimer,
    pub sensor: SensorPin,
    pub servos: Servos,
    pub status_led: StatusLed,
    pub camera: CameraModule,
}

/// Current time on the sorter's millisecond clock.
///
/// The 64-bit microsecond counter is truncated to 32-bit milliseconds; the
/// core handles the wrap.
pub fn now(timer: &HalTimer) -> Instant {
    Instant::from_millis((timer.get_counter().ticks() / 1_000) as u32)
}

/// `IO_BANK0.INTR0` bit for a falling edge on GPIO2: four flags per pin,
/// edge-low is the third.
const GATE_EDGE_LOW: u32 = 1 << (2 * 4 + 2);

/// Same clock as [`now`], read straight from the TIMER0 registers for the
/// gate interrupt, which owns no `Timer`.
pub fn now_raw() -> Instant {
    // Safety: read-only access to the free-running counter.
    let timer = unsafe { &*pac::TIMER0::ptr() };
    let micros = loop {
        let hi = timer.timerawh().read().bits();
        let lo = timer.timerawl().read().bits();
        if timer.timerawh().read().bits() == hi {
            break (u64::from(hi) << 32) | u64::from(lo);
        }
    };
    Instant::from_millis((micros / 1_000) as u32)
}

/// Checks and acknowledges the gate's falling-edge flag.
pub fn take_gate_edge() -> bool {
    // Safety: only this interrupt touches the GPIO2 edge flag after init,
    // and the register is write-one-to-clear.
    let io = unsafe { &*pac::IO_BANK0::ptr() };
    if io.intr(0).read().bits() & GATE_EDGE_LOW == 0 {
        return false;
    }
    io.intr(0).write(|w| unsafe { w.bits(GATE_EDGE_LOW) });
    true
}

/// Initializes the entire hardware stack.
///
/// This function:
/// 1.  Takes ownership of the raw PAC peripherals.
/// 2.  Configures the Watchdog and Clocks (System & USB).
/// 3.  Initializes the Microsecond Timer.
/// 4.  Configures GPIO pins (optical gate, camera shutter/ready, lights).
/// 5.  Sets up PWM for the two servos (50 Hz) and the RGB status LED.
/// 6.  Initializes the USB Serial console.
///
/// The gate interrupt is enabled on the pin here but left masked in the
/// NVIC; `main` unmasks it once the sorter is running.
///
/// Any failure here is fatal: the station cannot run without its hardware.
pub fn init() -> Hardware {
    // 1. Take ownership of raw peripherals
    let mut pac = pac::Peripherals::take().unwrap();
    let mut watchdog = hal::Watchdog::new(pac.WATCHDOG);

    // 2. Configure Clocks
    let clocks = hal::clocks::init_clocks_and_plls(
        XTAL_FREQ_HZ,
        pac.XOSC,
        pac.CLOCKS,
        pac.PLL_SYS,
        pac.PLL_USB,
        &mut pac.RESETS,
        &mut watchdog,
    )
    .unwrap();

    // 3. Configure Timer (Microsecond precision)
    let timer = hal::Timer::new_timer0(pac.TIMER0, &mut pac.RESETS, &clocks);

    // 4. Configure GPIOs
    let sio = hal::Sio::new(pac.SIO);
    let pins = hal::gpio::Pins::new(
        pac.IO_BANK0,
        pac.PADS_BANK0,
        sio.gpio_bank0,
        &mut pac.RESETS,
    );

    let sensor = pins.gpio2.into_pull_up_input();
    sensor.set_interrupt_enabled(hal::gpio::Interrupt::EdgeLow, true);

    let camera = ShutterCamera::new(
        pins.gpio18.into_push_pull_output(),
        pins.gpio19.into_pull_down_input(),
        pins.gpio15.into_push_pull_output(),
        timer,
    );

    // 5. Configure PWM
    let pwm_slices = hal::pwm::Slices::new(pac.PWM, &mut pac.RESETS);

    // Servos: GPIO16 (trapdoor) and GPIO17 (flipper) share slice 0.
    let mut servo_slice = pwm_slices.pwm0;
    servo_slice.set_div_int(SERVO_PWM_DIV);
    servo_slice.set_top(SERVO_PWM_TOP);
    servo_slice.enable();
    let mut trapdoor = servo_slice.channel_a;
    let mut flipper = servo_slice.channel_b;
    trapdoor.output_to(pins.gpio16);
    flipper.output_to(pins.gpio17);

    // Status LED: GPIO12/13 on slice 6, GPIO14 on slice 7, default 16-bit top.
    let mut rg_slice = pwm_slices.pwm6;
    rg_slice.enable();
    let mut b_slice = pwm_slices.pwm7;
    b_slice.enable();
    let mut red = rg_slice.channel_a;
    let mut green = rg_slice.channel_b;
    let mut blue = b_slice.channel_a;
    red.output_to(pins.gpio12);
    green.output_to(pins.gpio13);
    blue.output_to(pins.gpio14);

    // 6. Configure USB Serial (via module)
    usb_module::init(
        pac.USB,
        pac.USB_DPRAM,
        clocks.usb_clock,
        &mut pac.RESETS,
    );

    // Return ready-to-use hardware
    Hardware {
        timer,
        sensor,
        servos: PwmServos::new(trapdoor, flipper),
        status_led: RgbLed::new(red, green, blue),
        camera,
    }
}
