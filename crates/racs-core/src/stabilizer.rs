//! Fin stabilization: small-angle attitude error, per-axis PID with
//! anti-windup and derivative on measurement, and the control mixer.

use nalgebra::{Quaternion, Vector3};

use crate::config::{ControlConfig, PidGains};

const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// A value per body axis. Roll is about X (longitudinal).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Axes {
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
}

impl Axes {
    pub const ZERO: Self = Self {
        roll: 0.0,
        pitch: 0.0,
        yaw: 0.0,
    };
}

/// Physical fin layout. Fixed when the controller is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixerTopology {
    #[default]
    Plus,
    X,
}

impl MixerTopology {
    pub fn label(self) -> &'static str {
        match self {
            Self::Plus => "plus",
            Self::X => "x",
        }
    }

    /// Map axis outputs to four fin deflections (degrees from centre).
    pub fn mix(self, out: &Axes) -> [f32; 4] {
        let Axes { roll, pitch, yaw } = *out;
        match self {
            Self::Plus => [pitch + roll, yaw + roll, -pitch + roll, -yaw + roll],
            Self::X => [
                pitch - yaw + roll,
                -pitch - yaw + roll,
                -pitch + yaw + roll,
                pitch + yaw + roll,
            ],
        }
    }
}

/// Clamp to `[-|limit|, |limit|]`. Never panics; a NaN limit clamps to 0.
pub fn clamp_symmetric(value: f32, limit: f32) -> f32 {
    let limit = libm::fabsf(limit);
    if limit.is_nan() {
        return 0.0;
    }
    if value > limit {
        limit
    } else if value < -limit {
        -limit
    } else {
        value
    }
}

/// Attitude error against the vertical target, in degrees.
///
/// First-order approximation: only valid for small deviations.
pub fn compute_error(q: &Quaternion<f32>) -> Axes {
    Axes {
        roll: -2.0 * q.i * RAD_TO_DEG,
        pitch: -2.0 * q.j * RAD_TO_DEG,
        yaw: -2.0 * q.k * RAD_TO_DEG,
    }
}

/// Clamp fin deflections and add the neutral angle.
pub fn finalize(mixed: &[f32; 4], config: &ControlConfig) -> [f32; 4] {
    mixed.map(|m| {
        let m = if m.is_finite() { m } else { 0.0 };
        clamp_symmetric(m, config.actuator_limit_deg) + config.actuator_center_deg
    })
}

fn accumulate(integral: f32, error: f32, dt: f32, limit: f32) -> f32 {
    let next = integral + error * dt;
    if next.is_nan() {
        return integral;
    }
    clamp_symmetric(next, limit)
}

fn pid(gains: &PidGains, error: f32, integral: f32, rate: f32) -> f32 {
    gains.kp * error + gains.ki * integral - gains.kd * rate
}

#[derive(Debug, Clone)]
pub struct StabilizationController {
    topology: MixerTopology,
    integral: Axes,
}

impl Default for StabilizationController {
    fn default() -> Self {
        Self::new(MixerTopology::default())
    }
}

impl StabilizationController {
    pub fn new(topology: MixerTopology) -> Self {
        Self {
            topology,
            integral: Axes::ZERO,
        }
    }

    pub fn topology(&self) -> MixerTopology {
        self.topology
    }

    pub fn integral(&self) -> Axes {
        self.integral
    }

    pub fn reset_integral(&mut self) {
        self.integral = Axes::ZERO;
    }

    /// One PID step. `gyro` is the bias-corrected body rate; its X, Y, Z
    /// components damp roll, pitch and yaw respectively.
    pub fn update(
        &mut self,
        error: &Axes,
        gyro: &Vector3<f32>,
        dt: f32,
        config: &ControlConfig,
    ) -> Axes {
        let limit = config.integral_limit;
        let dt = if dt.is_finite() && dt > 0.0 { dt } else { 0.0 };

        self.integral.roll = accumulate(self.integral.roll, error.roll, dt, limit);
        self.integral.pitch = accumulate(self.integral.pitch, error.pitch, dt, limit);
        self.integral.yaw = accumulate(self.integral.yaw, error.yaw, dt, limit);

        Axes {
            roll: pid(&config.roll, error.roll, self.integral.roll, gyro.x),
            pitch: pid(&config.pitch, error.pitch, self.integral.pitch, gyro.y),
            yaw: pid(&config.yaw, error.yaw, self.integral.yaw, gyro.z),
        }
    }

    pub fn mix(&self, out: &Axes) -> [f32; 4] {
        self.topology.mix(out)
    }

    /// Full pipeline from orientation and rate to fin angles in degrees.
    pub fn step(
        &mut self,
        q: &Quaternion<f32>,
        gyro: &Vector3<f32>,
        dt: f32,
        config: &ControlConfig,
    ) -> [f32; 4] {
        let error = compute_error(q);
        let out = self.update(&error, gyro, dt, config);
        finalize(&self.mix(&out), config)
    }
}
