//! Attitude estimation: gravity levelling on the pad, open-loop gyro
//! integration in flight, and gyro bias calibration.
//!
//! Body frame: X is the vehicle's longitudinal axis (up on the pad).
//! Orientation is a unit quaternion `(w, x, y, z)` and is re-normalized
//! after every operation.

use nalgebra::{Quaternion, Vector3};

use crate::error::AttitudeError;

pub const CALIBRATION_SAMPLES: usize = 500;
pub const CALIBRATION_INTERVAL_US: u64 = 1000;

const MIN_NORM: f32 = 1e-6;
const RAD_TO_DEG: f32 = 180.0 / core::f32::consts::PI;

/// How the pad attitude is built from the measured gravity vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LevelingStrategy {
    /// Shortest rotation taking measured gravity onto the X axis.
    #[default]
    GravityAlignment,
    /// Pitch/yaw decomposition with roll forced to zero.
    EulerDecomposition,
}

impl LevelingStrategy {
    pub fn label(self) -> &'static str {
        match self {
            Self::GravityAlignment => "gravity",
            Self::EulerDecomposition => "euler",
        }
    }
}

/// Telemetry-only Euler angles in degrees. Never fed back into control.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerAngles {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

// ---------------------------------------------------------------------------
// Quaternion helpers
// ---------------------------------------------------------------------------

/// Scale `q` to unit norm. `None` if the norm is zero or not finite.
pub fn normalize(q: Quaternion<f32>) -> Option<Quaternion<f32>> {
    let norm = libm::sqrtf(q.w * q.w + q.i * q.i + q.j * q.j + q.k * q.k);
    if !norm.is_finite() || norm < MIN_NORM {
        return None;
    }
    Some(Quaternion::new(q.w / norm, q.i / norm, q.j / norm, q.k / norm))
}

fn unit_gravity(accel: &Vector3<f32>) -> Result<Vector3<f32>, AttitudeError> {
    let norm = libm::sqrtf(accel.x * accel.x + accel.y * accel.y + accel.z * accel.z);
    if !norm.is_finite() || norm < MIN_NORM {
        return Err(AttitudeError::DegenerateGravity);
    }
    Ok(accel / norm)
}

/// Rotation that takes the measured gravity direction onto +X.
pub fn initialize_attitude(accel: &Vector3<f32>) -> Result<Quaternion<f32>, AttitudeError> {
    let g = unit_gravity(accel)?;

    if 1.0 + g.x < MIN_NORM {
        // Anti-parallel: half turn about an axis perpendicular to g.
        let axis = normalize(Quaternion::new(0.0, g.y, -g.x, 0.0))
            .ok_or(AttitudeError::DegenerateGravity)?;
        return Ok(Quaternion::new(0.0, axis.i, axis.j, 0.0));
    }

    normalize(Quaternion::new(1.0 + g.x, 0.0, g.z, -g.y)).ok_or(AttitudeError::DegenerateGravity)
}

/// Pad attitude from pitch/yaw angles of the gravity vector, roll = 0.
pub fn initialize_attitude_euler(accel: &Vector3<f32>) -> Result<Quaternion<f32>, AttitudeError> {
    let g = unit_gravity(accel)?;

    let yaw = libm::asinf((-g.y).clamp(-1.0, 1.0));
    let pitch = libm::atan2f(g.z, g.x);

    let (a, b) = (libm::cosf(yaw * 0.5), libm::sinf(yaw * 0.5));
    let (c, d) = (libm::cosf(pitch * 0.5), libm::sinf(pitch * 0.5));

    normalize(Quaternion::new(a * c, -b * d, a * d, b * c)).ok_or(AttitudeError::DegenerateGravity)
}

/// One forward-Euler step of `q̇ = ½ q ⊗ (0, ω)`, then re-normalize.
///
/// Returns `q` unchanged when `dt` is not positive or the step would
/// produce a degenerate quaternion.
pub fn integrate_attitude(q: Quaternion<f32>, gyro: &Vector3<f32>, dt: f32) -> Quaternion<f32> {
    if !dt.is_finite() || dt <= 0.0 || gyro.iter().any(|v| !v.is_finite()) {
        return q;
    }
    let q_dot = q * Quaternion::from_imag(*gyro) * 0.5;
    normalize(q + q_dot * dt).unwrap_or(q)
}

/// ZYX Euler angles in degrees, asin argument clamped against gimbal lock.
pub fn derive_euler(q: &Quaternion<f32>) -> EulerAngles {
    let (w, x, y, z) = (q.w, q.i, q.j, q.k);

    let roll = libm::atan2f(2.0 * (w * x + y * z), 1.0 - 2.0 * (x * x + y * y));
    let pitch = libm::asinf((2.0 * (w * y - z * x)).clamp(-1.0, 1.0));
    let yaw = libm::atan2f(2.0 * (w * z + x * y), 1.0 - 2.0 * (y * y + z * z));

    EulerAngles {
        pitch: pitch * RAD_TO_DEG,
        yaw: yaw * RAD_TO_DEG,
        roll: roll * RAD_TO_DEG,
    }
}

/// Negate X and Z for a board mounted upside down on the test bench.
pub fn bench_orient(v: Vector3<f32>, invert: bool) -> Vector3<f32> {
    if invert {
        Vector3::new(-v.x, v.y, -v.z)
    } else {
        v
    }
}

// ---------------------------------------------------------------------------
// Gyro bias
// ---------------------------------------------------------------------------

/// Running mean of stationary gyro samples.
#[derive(Debug, Clone, Copy, Default)]
pub struct GyroBiasAccumulator {
    sum: Vector3<f32>,
    count: u32,
}

impl GyroBiasAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, raw_gyro: &Vector3<f32>) {
        self.sum += raw_gyro;
        self.count += 1;
    }

    pub fn sample_count(&self) -> u32 {
        self.count
    }

    /// Mean of the raw samples, expressed in the (possibly inverted)
    /// frame that live readings are corrected in.
    pub fn finish(&self, bench_test_invert: bool) -> Result<Vector3<f32>, AttitudeError> {
        if self.count == 0 {
            return Err(AttitudeError::NoCalibrationSamples);
        }
        Ok(bench_orient(self.sum / self.count as f32, bench_test_invert))
    }
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct AttitudeEstimator {
    orientation: Quaternion<f32>,
    gyro_bias: Vector3<f32>,
    strategy: LevelingStrategy,
}

impl Default for AttitudeEstimator {
    fn default() -> Self {
        Self::new(LevelingStrategy::default())
    }
}

impl AttitudeEstimator {
    pub fn new(strategy: LevelingStrategy) -> Self {
        Self {
            orientation: Quaternion::identity(),
            gyro_bias: Vector3::zeros(),
            strategy,
        }
    }

    pub fn orientation(&self) -> Quaternion<f32> {
        self.orientation
    }

    pub fn gyro_bias(&self) -> Vector3<f32> {
        self.gyro_bias
    }

    pub fn strategy(&self) -> LevelingStrategy {
        self.strategy
    }

    /// Re-level from the measured gravity vector. On error the previous
    /// orientation is kept.
    pub fn level(&mut self, accel: &Vector3<f32>) -> Result<(), AttitudeError> {
        self.orientation = match self.strategy {
            LevelingStrategy::GravityAlignment => initialize_attitude(accel)?,
            LevelingStrategy::EulerDecomposition => initialize_attitude_euler(accel)?,
        };
        Ok(())
    }

    /// Propagate with a bias-corrected rate.
    pub fn integrate(&mut self, gyro: &Vector3<f32>, dt: f32) {
        self.orientation = integrate_attitude(self.orientation, gyro, dt);
    }

    pub fn euler(&self) -> EulerAngles {
        derive_euler(&self.orientation)
    }

    /// Subtract the calibrated bias from an already-oriented reading.
    pub fn correct(&self, gyro: &Vector3<f32>) -> Vector3<f32> {
        gyro - self.gyro_bias
    }

    /// Average raw stationary samples into the gyro bias.
    pub fn calibrate_gyro_bias<I>(
        &mut self,
        samples: I,
        bench_test_invert: bool,
    ) -> Result<Vector3<f32>, AttitudeError>
    where
        I: IntoIterator<Item = Vector3<f32>>,
    {
        let mut acc = GyroBiasAccumulator::new();
        for sample in samples {
            acc.push(&sample);
        }
        self.gyro_bias = acc.finish(bench_test_invert)?;
        Ok(self.gyro_bias)
    }

    pub fn set_gyro_bias(&mut self, bias: Vector3<f32>) {
        self.gyro_bias = bias;
    }
}
