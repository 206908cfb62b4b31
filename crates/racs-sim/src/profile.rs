//! Flight profile: everything that shapes a simulated flight.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// A ground command released onto the link at a given time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedCommand {
    /// Seconds since power-on.
    pub at_s: f64,
    pub line: String,
}

/// Sinusoidal body-rate disturbance applied while airborne, per axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Disturbance {
    /// rad/s
    pub amplitude: [f64; 3],
    pub frequency_hz: [f64; 3],
}

impl Default for Disturbance {
    fn default() -> Self {
        Self {
            amplitude: [0.3, 0.15, 0.15],
            frequency_hz: [0.9, 1.7, 2.3],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuModel {
    /// Constant gyro bias, rad/s.
    pub gyro_bias: [f64; 3],
    pub gyro_noise_std: f64,
    pub accel_noise_std: f64,
    /// hPa
    pub baro_noise_std: f64,
    /// Windows `[start_s, end_s)` during which IMU reads fail.
    pub dropouts: Vec<[f64; 2]>,
}

impl Default for ImuModel {
    fn default() -> Self {
        Self {
            gyro_bias: [0.004, -0.003, 0.002],
            gyro_noise_std: 0.002,
            accel_noise_std: 0.05,
            baro_noise_std: 0.02,
            dropouts: vec![[3.2, 3.21]],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlightProfile {
    /// Liftoff time since power-on, seconds. `None` keeps the vehicle on the pad.
    pub liftoff_s: Option<f64>,
    pub burn_s: f64,
    /// Specific force along the body axis during the burn, m/s².
    pub thrust_accel: f64,
    /// Drag deceleration after burnout, m/s².
    pub coast_decel: f64,
    /// Total simulated time, seconds.
    pub duration_s: f64,
    /// Rail tilt about body Y, degrees.
    pub pad_tilt_deg: f64,
    pub pad_pressure_hpa: f64,
    /// Fin angular acceleration per degree of deflection, rad/s² per deg.
    pub fin_authority: f64,
    /// Aerodynamic rate damping, 1/s.
    pub rate_damping: f64,
    pub disturbance: Disturbance,
    pub imu: ImuModel,
    pub seed: u64,
    pub commands: Vec<ScriptedCommand>,
}

impl Default for FlightProfile {
    fn default() -> Self {
        Self {
            liftoff_s: Some(2.0),
            burn_s: 2.5,
            thrust_accel: 60.0,
            coast_decel: 4.0,
            duration_s: 14.0,
            pad_tilt_deg: 2.0,
            pad_pressure_hpa: 1013.25,
            fin_authority: 0.4,
            rate_damping: 2.0,
            disturbance: Disturbance::default(),
            imu: ImuModel::default(),
            seed: 42,
            commands: vec![
                ScriptedCommand {
                    at_s: 0.6,
                    line: "SET PARACHUTE_TIMEOUT_FROM_IGN_MS 9000".into(),
                },
                ScriptedCommand {
                    at_s: 0.8,
                    line: "DUMP".into(),
                },
                ScriptedCommand {
                    at_s: 1.0,
                    line: "ARM".into(),
                },
                ScriptedCommand {
                    at_s: 3.0,
                    line: "PREFLT".into(),
                },
            ],
        }
    }
}

impl FlightProfile {
    /// A vehicle sitting on the bench, for interactive sessions.
    pub fn bench() -> Self {
        Self {
            liftoff_s: None,
            duration_s: f64::INFINITY,
            pad_tilt_deg: 0.0,
            commands: Vec::new(),
            imu: ImuModel {
                dropouts: Vec::new(),
                ..ImuModel::default()
            },
            ..Self::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading profile {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing profile {}", path.display()))
    }

    pub fn burnout_s(&self) -> Option<f64> {
        self.liftoff_s.map(|t| t + self.burn_s)
    }
}
