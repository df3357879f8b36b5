//! SPDX-License-Identifier: MIT OR Apache-2.0
//!
//! # Coin Sorter Firmware
//!
//! Camera-assisted coin sorting station:
//! - **Hardware Module:** HAL setup and pin map (`hardware.rs`).
//! - **Board Module:** Servo, RGB LED and camera drivers (`board.rs`).
//! - **USB Module:** Serial console with interrupts (`usb_module.rs`).
//! - **Library:** Edge detector and typed state machine (`coin_sorter`).
//!
//! The optical gate interrupt only counts edges; everything else runs in the
//! 10 ms polling loop below.
//!
//! Target: Raspberry Pi Pico 2 W (RP2350).

#![no_std]
#![no_main]

// --- Imports ---
use core::fmt::Write as FmtWrite;
use defmt::*;
use defmt_rtt as _;
use panic_probe as _;

use coin_sorter::config::POLL_INTERVAL_MS;
use coin_sorter::{CoinSorter, Config, EdgeDetector};

// --- Modules ---
mod board;
mod hardware;
mod usb_module;

// --- HAL Selection ---
use rp235x_hal as hal;
use hal::entry;
use hal::pac;

// Select appropriate interrupt macro based on chip architecture
use rp235x_hal::pac::interrupt;

// --- Bootloader Configuration ---

#[unsafe(link_section = ".start_block")]
#[used]
pub static IMAGE_DEF: hal::block::ImageDef = hal::block::ImageDef::secure_exe();

// --- Shared State ---

const CONFIG: Config = Config::DEFAULT;

/// Edge counter shared between the gate interrupt and the polling loop.
static DETECTOR: EdgeDetector = EdgeDetector::new(CONFIG.debounce_ms);

/// Entry point.
#[entry]
fn main() -> ! {
    info!("Coin sorter start");

    // 1. Initialize Hardware Stack (Clocks, GPIO, Timer, PWM, USB)
    let hw = hardware::init();
    let mut timer = hw.timer;

    // 2. Initialize the sorter (safe reset, then waiting for a coin)
    let mut sorter = CoinSorter::new(
        CONFIG,
        &DETECTOR,
        hw.camera,
        hw.servos,
        hw.status_led,
        hardware::now(&timer),
    );

    // 3. Start counting edges. The pin stays configured while `_gate` lives;
    // the handler reaches its interrupt flag through the PAC.
    let _gate = hw.sensor;
    unsafe {
        cortex_m::peripheral::NVIC::unmask(pac::Interrupt::IO_IRQ_BANK0);
    }

    let mut console = usb_module::Console;
    let mut last_poll = hardware::now(&timer);

    // 4. Main Application Loop
    loop {
        let now = hardware::now(&timer);

        // Periodic Task: controller tick (every 10ms)
        if now.has_elapsed(last_poll, POLL_INTERVAL_MS) {
            last_poll = now;
            if let Some(code) = sorter.poll(now) {
                warn!("Status: {}", code);
                let _ = FmtWrite::write_fmt(&mut console, format_args!("ERROR: {}\r\n", code.description()));
            }
        }

        // Console commands assembled by the USB interrupt
        if let Some(line) = usb_module::take_line() {
            debug!("Console: {}", line.as_str());
            let _ = sorter.handle_line(&line, now, &mut console, &mut timer);
        }
    }
}

// --- Interrupt Handlers ---

/// Optical gate falling edge.
///
/// Only timestamps and counts the edge; debouncing and window bookkeeping
/// live in the lock-free detector. No critical section is taken here.
#[allow(non_snake_case)]
#[interrupt]
fn IO_IRQ_BANK0() {
    if hardware::take_gate_edge() {
        DETECTOR.on_edge(hardware::now_raw());
    }
}

// --- Metadata ---

#[unsafe(link_section = ".bi_entries")]
#[used]
pub static PICOTOOL_ENTRIES: [hal::binary_info::EntryAddr; 4] = [
    hal::binary_info::rp_cargo_bin_name!(),
    hal::binary_info::rp_cargo_version!(),
    hal::binary_info::rp_program_description!(c"Coin Sorter"),
    hal::binary_info::rp_program_build_attribute!()
];
