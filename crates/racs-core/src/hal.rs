//! Collaborator traits: everything the flight core needs from the board.
//!
//! None of these may block for longer than a fraction of a control tick,
//! except [`Clock::delay_us`] which is only used during boot calibration.

use core::cell::Cell;

use nalgebra::Vector3;

use crate::config::ControlConfig;
use crate::error::{LogError, SensorError, StorageError};

/// Monotonic microsecond time source.
pub trait Clock {
    fn now_us(&self) -> u64;

    /// Busy-wait for `us` microseconds.
    fn delay_us(&self, us: u64) {
        let start = self.now_us();
        while self.now_us().saturating_sub(start) < us {
            core::hint::spin_loop();
        }
    }
}

/// Accelerometer (m/s²) and gyroscope (rad/s), body frame, X along the
/// vehicle's longitudinal axis.
pub trait InertialSensor {
    fn init(&mut self) -> Result<(), SensorError>;
    fn read_accel_gyro(&mut self) -> Result<(Vector3<f32>, Vector3<f32>), SensorError>;
}

pub trait PressureSensor {
    /// Latest pressure in hPa, or `None` when no new conversion is ready.
    fn read_pressure(&mut self) -> Option<f32>;
}

pub trait ActuatorOutput {
    /// Drive the four fins to `cmd_deg`. Implementations map degrees to
    /// their physical unit with [`degrees_to_pulse_us`].
    fn write_actuators(&mut self, cmd_deg: &[f32; 4], config: &ControlConfig);
}

/// Fin angle at which the servo sits at `actuator_center_us`.
pub const SERVO_NEUTRAL_DEG: f32 = 90.0;

/// Map a fin angle to a servo pulse width. The neutral angle is fixed, so a
/// configured `actuator_center_deg` other than 90 trims the fins.
pub fn degrees_to_pulse_us(deg: f32, config: &ControlConfig) -> u32 {
    let us = config.actuator_center_us + (deg - SERVO_NEUTRAL_DEG) * config.actuator_us_per_deg;
    if !us.is_finite() || us <= 0.0 {
        return 0;
    }
    libm::roundf(us) as u32
}

/// Append-only flight log.
pub trait LogSink {
    fn open(&mut self) -> Result<(), LogError>;
    fn write_record(&mut self, record: &str) -> Result<(), LogError>;
    fn flush(&mut self) -> Result<(), LogError>;
}

/// Non-volatile storage for the configuration record.
pub trait ConfigStore {
    /// Copy the stored bytes into `buf`, returning how many were read.
    /// An empty store reads zero bytes.
    fn load_bytes(&mut self, buf: &mut [u8]) -> Result<usize, StorageError>;
    fn store_bytes(&mut self, bytes: &[u8]) -> Result<(), StorageError>;
}

/// Line-oriented serial link to the ground station.
pub trait CommandLink {
    fn poll_byte(&mut self) -> Option<u8>;
    /// Send one line; the implementation appends the line terminator.
    fn send_line(&mut self, line: &str);
}

pub trait SystemControl {
    fn request_restart(&mut self);
}

/// Everything a flight computer is wired to.
pub trait Board:
    InertialSensor + PressureSensor + ActuatorOutput + LogSink + ConfigStore + CommandLink + SystemControl
{
}

impl<T> Board for T where
    T: InertialSensor
        + PressureSensor
        + ActuatorOutput
        + LogSink
        + ConfigStore
        + CommandLink
        + SystemControl
{
}

// ---------------------------------------------------------------------------
// Deterministic clock
// ---------------------------------------------------------------------------

/// Clock advanced only by the caller. `delay_us` advances it instantly.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<u64>,
}

impl ManualClock {
    pub fn new(start_us: u64) -> Self {
        Self {
            now: Cell::new(start_us),
        }
    }

    pub fn set(&self, us: u64) {
        self.now.set(us);
    }

    pub fn advance(&self, us: u64) {
        self.now.set(self.now.get().saturating_add(us));
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.now.get()
    }

    fn delay_us(&self, us: u64) {
        self.advance(us);
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }

    fn delay_us(&self, us: u64) {
        (**self).delay_us(us)
    }
}
