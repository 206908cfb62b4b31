//! Simulated flight computer board: noisy sensors over the truth model,
//! fin outputs fed back into it, and pluggable log, storage and link.

use anyhow::{Context, Result};
use nalgebra::Vector3;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use racs_core::baro::BARO_INTERVAL_US;
use racs_core::error::{LogError, SensorError, StorageError};
use racs_core::hal::{
    degrees_to_pulse_us, ActuatorOutput, CommandLink, ConfigStore, InertialSensor, LogSink,
    PressureSensor, SystemControl, SERVO_NEUTRAL_DEG,
};
use racs_core::stabilizer::MixerTopology;
use racs_core::{Clock, ControlConfig};

use crate::profile::FlightProfile;
use crate::truth::TruthModel;

struct Noise {
    gyro: Normal<f64>,
    accel: Normal<f64>,
    baro: Normal<f64>,
}

pub struct SimBoard<C, L, S, K> {
    clock: C,
    truth: TruthModel,
    rng: StdRng,
    noise: Noise,
    gyro_bias: Vector3<f64>,
    dropouts: Vec<[f64; 2]>,
    imu_ready: bool,
    last_baro_us: Option<u64>,
    link: L,
    log: S,
    store: K,
    pulses_us: [u32; 4],
    max_deflection_deg: f32,
    restart_requested: bool,
}

impl<C, L, S, K> SimBoard<C, L, S, K>
where
    C: Clock,
{
    pub fn new(
        profile: &FlightProfile,
        topology: MixerTopology,
        clock: C,
        link: L,
        log: S,
        store: K,
    ) -> Result<Self> {
        let imu = &profile.imu;
        let noise = Noise {
            gyro: Normal::new(0.0, imu.gyro_noise_std).context("gyro noise")?,
            accel: Normal::new(0.0, imu.accel_noise_std).context("accel noise")?,
            baro: Normal::new(0.0, imu.baro_noise_std).context("baro noise")?,
        };
        Ok(Self {
            clock,
            truth: TruthModel::new(profile, topology),
            rng: StdRng::seed_from_u64(profile.seed),
            noise,
            gyro_bias: Vector3::from(imu.gyro_bias),
            dropouts: imu.dropouts.clone(),
            imu_ready: false,
            last_baro_us: None,
            link,
            log,
            store,
            pulses_us: [0; 4],
            max_deflection_deg: 0.0,
            restart_requested: false,
        })
    }

    fn sync(&mut self) -> u64 {
        let now = self.clock.now_us();
        self.truth.advance_to(now);
        now
    }

    fn noisy(&mut self, v: Vector3<f64>, dist: Normal<f64>) -> Vector3<f32> {
        v.map(|x| x + dist.sample(&mut self.rng)).cast::<f32>()
    }

    pub fn truth(&self) -> &TruthModel {
        &self.truth
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn log(&self) -> &S {
        &self.log
    }

    pub fn into_parts(self) -> (L, S, K) {
        (self.link, self.log, self.store)
    }

    /// Servo pulse widths of the last actuator write.
    pub fn pulses_us(&self) -> [u32; 4] {
        self.pulses_us
    }

    pub fn max_deflection_deg(&self) -> f32 {
        self.max_deflection_deg
    }

    /// Returns and clears a pending restart request.
    pub fn take_restart_request(&mut self) -> bool {
        std::mem::take(&mut self.restart_requested)
    }
}

impl<C: Clock, L, S, K> InertialSensor for SimBoard<C, L, S, K> {
    fn init(&mut self) -> Result<(), SensorError> {
        self.imu_ready = true;
        Ok(())
    }

    fn read_accel_gyro(&mut self) -> Result<(Vector3<f32>, Vector3<f32>), SensorError> {
        if !self.imu_ready {
            return Err(SensorError::InitFailed);
        }
        let t = self.sync() as f64 * 1e-6;
        if self.dropouts.iter().any(|[start, end]| t >= *start && t < *end) {
            return Err(SensorError::BusFault);
        }

        let accel = self.truth.specific_force();
        let gyro = self.truth.body_rate() + self.gyro_bias;
        let (accel_noise, gyro_noise) = (self.noise.accel, self.noise.gyro);
        Ok((self.noisy(accel, accel_noise), self.noisy(gyro, gyro_noise)))
    }
}

impl<C: Clock, L, S, K> PressureSensor for SimBoard<C, L, S, K> {
    fn read_pressure(&mut self) -> Option<f32> {
        let now = self.sync();
        let ready = self
            .last_baro_us
            .map_or(true, |last| now.saturating_sub(last) >= BARO_INTERVAL_US);
        if !ready {
            return None;
        }
        self.last_baro_us = Some(now);
        let pressure = self.truth.pressure_hpa() + self.noise.baro.sample(&mut self.rng);
        Some(pressure as f32)
    }
}

impl<C: Clock, L, S, K> ActuatorOutput for SimBoard<C, L, S, K> {
    fn write_actuators(&mut self, cmd_deg: &[f32; 4], config: &ControlConfig) {
        self.sync();
        self.pulses_us = cmd_deg.map(|deg| degrees_to_pulse_us(deg, config));
        let deflection = cmd_deg.map(|deg| deg - SERVO_NEUTRAL_DEG);
        for d in deflection {
            self.max_deflection_deg = self.max_deflection_deg.max(d.abs());
        }
        self.truth.set_fins(deflection);
    }
}

impl<C, L, S: LogSink, K> LogSink for SimBoard<C, L, S, K> {
    fn open(&mut self) -> Result<(), LogError> {
        self.log.open()
    }

    fn write_record(&mut self, record: &str) -> Result<(), LogError> {
        self.log.write_record(record)
    }

    fn flush(&mut self) -> Result<(), LogError> {
        self.log.flush()
    }
}

impl<C, L, S, K: ConfigStore> ConfigStore for SimBoard<C, L, S, K> {
    fn load_bytes(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.store.load_bytes(buf)
    }

    fn store_bytes(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        self.store.store_bytes(bytes)
    }
}

impl<C, L: CommandLink, S, K> CommandLink for SimBoard<C, L, S, K> {
    fn poll_byte(&mut self) -> Option<u8> {
        self.link.poll_byte()
    }

    fn send_line(&mut self, line: &str) {
        self.link.send_line(line);
    }
}

impl<C, L, S, K> SystemControl for SimBoard<C, L, S, K> {
    fn request_restart(&mut self) {
        self.restart_requested = true;
    }
}
