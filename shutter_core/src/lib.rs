#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Roller-shutter position estimation (hardware-agnostic).
//!
//! Shutters report only "moving up", "moving down" and "stopped". This crate
//! estimates the position (0 = open, 100 = closed) from how long each motion
//! lasted, drives timed moves to arbitrary percentages, and learns the full
//! travel time (the *shutter run*) when it is not configured.
//!
//! ## Architecture
//!
//! - **Estimation**: integer time <-> percentage math (`estimate`)
//! - **State machine**: pure command/event handling returning actions (`machine`)
//! - **Scheduling**: delayed stop delivery with stale-firing protection (`scheduler`)
//! - **Handle**: thread-safe `Shutter` that executes actions (`shutter`)
//! - **Delivery**: gateway frame pump (`runner`)
//! - **Status**: motion, calibration and device status (`status`)
//!
//! All bus traffic goes through `shutter_traits::Gateway`.

pub mod command;
pub mod config;
pub mod conversions;
pub mod error;
pub mod estimate;
pub mod hw_error;
pub mod machine;
pub mod mocks;
pub mod persist;
pub mod runner;
pub mod scheduler;
pub mod shutter;
pub mod status;

pub use command::{Command, CommandOutcome};
pub use config::{ShutterCfg, ShutterRun};
pub use error::{BuildError, Result, ShutterError};
pub use machine::{Action, BusCommand, ShutterMachine};
pub use persist::TomlRunStore;
pub use runner::EventPump;
pub use scheduler::{StopTimer, StopToken, ThreadStopTimer};
pub use shutter::{Shutter, ShutterBuilder, ShutterSnapshot};
pub use status::{CalibrationState, DeviceStatus, MotionState};
