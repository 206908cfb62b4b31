//! Ground-truth vehicle motion for the bench.
//!
//! World frame has X pointing up, matching the body frame of a vehicle
//! standing on the pad. Only attitude and vertical motion are modelled.

use std::f64::consts::TAU;

use nalgebra::{UnitQuaternion, Vector3};
use racs_core::stabilizer::MixerTopology;

use crate::profile::FlightProfile;

pub const GRAVITY: f64 = 9.80665;
const STEP_US: u64 = 500;
const DESCENT_RATE: f64 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruthPhase {
    Pad,
    Burn,
    Coast,
    Descent,
}

#[derive(Debug, Clone)]
pub struct TruthModel {
    profile: FlightProfile,
    topology: MixerTopology,
    time_us: u64,
    /// Body to world.
    attitude: UnitQuaternion<f64>,
    /// Rate produced by the fins, on top of the disturbance.
    control_rate: Vector3<f64>,
    altitude: f64,
    velocity: f64,
    /// Deflection from centre, degrees.
    fins_deg: [f32; 4],
    apogee: f64,
    max_tilt_deg: f64,
}

/// Axis torques (roll, pitch, yaw) implied by four fin deflections.
pub fn unmix(topology: MixerTopology, fins: &[f32; 4]) -> Vector3<f64> {
    let [m1, m2, m3, m4] = fins.map(f64::from);
    let roll = (m1 + m2 + m3 + m4) / 4.0;
    match topology {
        MixerTopology::Plus => Vector3::new(roll, (m1 - m3) / 2.0, (m2 - m4) / 2.0),
        MixerTopology::X => Vector3::new(
            roll,
            (m1 - m2 - m3 + m4) / 4.0,
            (-m1 - m2 + m3 + m4) / 4.0,
        ),
    }
}

impl TruthModel {
    pub fn new(profile: &FlightProfile, topology: MixerTopology) -> Self {
        let attitude =
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), profile.pad_tilt_deg.to_radians());
        Self {
            profile: profile.clone(),
            topology,
            time_us: 0,
            attitude,
            control_rate: Vector3::zeros(),
            altitude: 0.0,
            velocity: 0.0,
            fins_deg: [0.0; 4],
            apogee: 0.0,
            max_tilt_deg: tilt_deg(&attitude),
        }
    }

    fn seconds(&self) -> f64 {
        self.time_us as f64 * 1e-6
    }

    pub fn phase(&self) -> TruthPhase {
        let t = self.seconds();
        match (self.profile.liftoff_s, self.profile.burnout_s()) {
            (Some(liftoff), Some(burnout)) if t >= liftoff => {
                if t < burnout {
                    TruthPhase::Burn
                } else if self.velocity > 0.0 {
                    TruthPhase::Coast
                } else {
                    TruthPhase::Descent
                }
            }
            _ => TruthPhase::Pad,
        }
    }

    /// Step the model forward to `time_us`. Never goes backwards.
    pub fn advance_to(&mut self, time_us: u64) {
        while self.time_us < time_us {
            let step = STEP_US.min(time_us - self.time_us);
            self.step(step as f64 * 1e-6);
            self.time_us += step;
        }
    }

    fn disturbance(&self) -> Vector3<f64> {
        let t = self.seconds();
        let d = &self.profile.disturbance;
        Vector3::from_fn(|i, _| d.amplitude[i] * (TAU * d.frequency_hz[i] * t).sin())
    }

    fn step(&mut self, dt: f64) {
        let phase = self.phase();
        if phase == TruthPhase::Pad {
            return;
        }

        let torque = unmix(self.topology, &self.fins_deg) * self.profile.fin_authority;
        self.control_rate += (torque - self.control_rate * self.profile.rate_damping) * dt;
        self.attitude *= UnitQuaternion::from_scaled_axis(self.body_rate() * dt);

        if phase == TruthPhase::Descent {
            self.velocity = -DESCENT_RATE;
        } else {
            let up_accel = (self.attitude * self.specific_force()).x - GRAVITY;
            self.velocity += up_accel * dt;
        }
        self.altitude = (self.altitude + self.velocity * dt).max(0.0);
        self.apogee = self.apogee.max(self.altitude);
        self.max_tilt_deg = self.max_tilt_deg.max(tilt_deg(&self.attitude));
    }

    pub fn body_rate(&self) -> Vector3<f64> {
        match self.phase() {
            TruthPhase::Pad => Vector3::zeros(),
            _ => self.control_rate + self.disturbance(),
        }
    }

    /// What an ideal accelerometer reads, body frame.
    pub fn specific_force(&self) -> Vector3<f64> {
        match self.phase() {
            TruthPhase::Burn => Vector3::new(self.profile.thrust_accel, 0.0, 0.0),
            TruthPhase::Coast => Vector3::new(-self.profile.coast_decel, 0.0, 0.0),
            TruthPhase::Pad | TruthPhase::Descent => self
                .attitude
                .inverse_transform_vector(&Vector3::new(GRAVITY, 0.0, 0.0)),
        }
    }

    pub fn pressure_hpa(&self) -> f64 {
        self.profile.pad_pressure_hpa * (1.0 - self.altitude / 44_330.0).powf(5.255)
    }

    pub fn set_fins(&mut self, deflection_deg: [f32; 4]) {
        self.fins_deg = deflection_deg;
    }

    pub fn attitude(&self) -> UnitQuaternion<f64> {
        self.attitude
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn apogee(&self) -> f64 {
        self.apogee
    }

    pub fn max_tilt_deg(&self) -> f64 {
        self.max_tilt_deg
    }
}

/// Angle between the body axis and vertical, degrees.
pub fn tilt_deg(attitude: &UnitQuaternion<f64>) -> f64 {
    let axis = attitude * Vector3::x();
    axis.x.clamp(-1.0, 1.0).acos().to_degrees()
}
