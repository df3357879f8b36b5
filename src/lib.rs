//! SPDX-License-Identifier: MIT OR Apache-2.0
//!
//! # Coin Sorter Core
//!
//! Control logic for a coin photographing station: an optical gate reports
//! coin passages, the controller decides whether exactly one coin passed and
//! then flips it through two photo positions, or opens a reject trapdoor when
//! several coins arrived together.
//!
//! - **Edge Detector:** lock-free counter shared with the gate interrupt (`edge_detector.rs`).
//! - **Controller:** typed state machine consuming detector windows (`controller.rs`).
//! - **Photo Sequence:** the two-sided flip-and-capture steps (`photo.rs`).
//! - **Sorter:** the polling-loop driver executing controller commands (`sorter.rs`).
//!
//! Hardware (camera, servos, status LED, storage) is reached only through the
//! traits in `collaborators.rs`; the RP2350 firmware binary implements them.

#![cfg_attr(not(test), no_std)]

// This must go first so the macros are visible to every other module.
mod fmt;

pub mod collaborators;
pub mod config;
pub mod console;
pub mod controller;
pub mod edge_detector;
pub mod error;
pub mod photo;
pub mod sorter;
pub mod time;

pub use collaborators::{
    Actuator, Actuators, Camera, FilenameSource, ImageName, ImageNamer, Indicator, StatusIndicator,
};
pub use config::Config;
pub use console::ConsoleCommand;
pub use controller::{Command, MachineState};
pub use edge_detector::EdgeDetector;
pub use error::{CaptureError, Error, Result, StatusCode};
pub use photo::{PhotoSequence, PhotoStep};
pub use sorter::{CoinSorter, SorterStatus};
pub use time::Instant;
