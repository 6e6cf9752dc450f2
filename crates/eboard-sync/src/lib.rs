//! # eboard-sync
//!
//! Keeps a physical board and a game position in step.
//!
//! - `BoardTracker` holds the live snapshot and debounces square updates
//! - `Calibration` syncs against the expected position and records sensor gaps
//! - `MoveResolver` turns settled snapshots into legal moves
//! - `GuidanceController` drives the LEDs for moves the user must replay
//! - `BoardLink` composes them; `run_session` drives it over a transport

pub mod calibration;
pub mod config;
pub mod guidance;
pub mod resolver;
pub mod service;
pub mod session;
pub mod timer;
pub mod tracker;

#[cfg(test)]
pub(crate) mod fixtures;

pub use calibration::{Calibration, SyncOutcome};
pub use config::LinkConfig;
pub use guidance::GuidanceController;
pub use resolver::{MoveResolver, Resolution, disambiguate};
pub use service::BoardLink;
pub use session::{LinkCommand, run_session};
pub use timer::Timer;
pub use tracker::{BoardTracker, DeviceInfo};
