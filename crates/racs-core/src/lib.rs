//! # RACS Core
//!
//! Flight-control core of the rocket active control system, designed for
//! `no_std` targets with no allocator. This crate contains only the code
//! that runs on the flight computer:
//! - Attitude estimation (gravity levelling, gyro integration, bias calibration)
//! - Fin stabilization (PID with anti-windup, control mixer)
//! - Flight phase state machine with command lockout
//! - Configuration record, command protocol and telemetry records
//! - The fixed-rate control loop that ties them together
//!
//! Hardware is reached only through the traits in [`hal`].
//!
//! # Features
//! - `std`: Enable standard library support (host bench and tests)
//! - `euler-telemetry` (default): include Euler angles in records

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod attitude;
pub mod baro;
pub mod command;
pub mod config;
pub mod error;
pub mod flight;
pub mod hal;
pub mod record;
pub mod sample;
pub mod stabilizer;
pub mod state_machine;
pub mod text;

#[cfg(test)]
pub(crate) mod testing;

// Re-export core types
pub use attitude::{AttitudeEstimator, EulerAngles, LevelingStrategy};
pub use config::{ConfigField, ConfigLoad, ConfigValue, ControlConfig, PidGains, StoredConfig};
pub use error::{
    AttitudeError, BootError, CommandError, FormatError, LogError, RecordError, SensorError,
    StorageError,
};
pub use flight::{BootReport, ControlLoop, Diagnostic, Diagnostics, FlightComputer, TickReport};
pub use hal::{Board, Clock, ManualClock};
pub use sample::FlightSample;
pub use stabilizer::{Axes, MixerTopology, StabilizationController};
pub use state_machine::{FlightPhase, FlightStateMachine, PhaseRequest};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
