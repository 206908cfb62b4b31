use nalgebra::{Quaternion, Vector3};

use crate::attitude::EulerAngles;

/// Per-tick sensor and derived state, owned by the control loop.
#[derive(Debug, Clone, Copy)]
pub struct FlightSample {
    /// Oriented accelerometer reading, m/s².
    pub accel: Vector3<f32>,
    /// Bias-corrected body rate, rad/s.
    pub gyro: Vector3<f32>,
    /// hPa; NaN until the first barometer reading.
    pub pressure: f32,
    /// Metres above the pad reference.
    pub altitude: f32,
    pub orientation: Quaternion<f32>,
    pub euler: EulerAngles,
    /// Fin commands, degrees.
    pub actuator_cmd: [f32; 4],
    pub gyro_bias: Vector3<f32>,
}

impl FlightSample {
    pub fn new(actuator_center_deg: f32) -> Self {
        Self {
            accel: Vector3::zeros(),
            gyro: Vector3::zeros(),
            pressure: f32::NAN,
            altitude: f32::NAN,
            orientation: Quaternion::identity(),
            euler: EulerAngles::default(),
            actuator_cmd: [actuator_center_deg; 4],
            gyro_bias: Vector3::zeros(),
        }
    }
}

impl Default for FlightSample {
    fn default() -> Self {
        Self::new(90.0)
    }
}
