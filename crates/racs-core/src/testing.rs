//! In-memory board used by the unit tests.

use std::collections::VecDeque;

use nalgebra::Vector3;

use crate::config::{ControlConfig, RamConfigStore};
use crate::error::{LogError, SensorError, StorageError};
use crate::hal::{
    ActuatorOutput, CommandLink, ConfigStore, InertialSensor, LogSink, PressureSensor,
    SystemControl,
};

pub struct FakeBoard {
    pub accel: Vector3<f32>,
    pub gyro: Vector3<f32>,
    pub init_fault: Option<SensorError>,
    pub imu_fault: Option<SensorError>,
    pub pressure: Option<f32>,
    pub actuator_writes: Vec<[f32; 4]>,
    pub log_open: bool,
    pub open_fault: Option<LogError>,
    pub records: Vec<String>,
    pub flushes: u32,
    pub store: RamConfigStore,
    pub rx: VecDeque<u8>,
    pub tx: Vec<String>,
    pub restarts: u32,
}

impl FakeBoard {
    /// Upright on the pad, at rest.
    pub fn new() -> Self {
        Self {
            accel: Vector3::new(9.81, 0.0, 0.0),
            gyro: Vector3::zeros(),
            init_fault: None,
            imu_fault: None,
            pressure: None,
            actuator_writes: Vec::new(),
            log_open: false,
            open_fault: None,
            records: Vec::new(),
            flushes: 0,
            store: RamConfigStore::new(),
            rx: VecDeque::new(),
            tx: Vec::new(),
            restarts: 0,
        }
    }

    pub fn type_line(&mut self, line: &str) {
        self.rx.extend(line.bytes());
        self.rx.push_back(b'\n');
    }

    pub fn take_tx(&mut self) -> Vec<String> {
        std::mem::take(&mut self.tx)
    }
}

impl InertialSensor for FakeBoard {
    fn init(&mut self) -> Result<(), SensorError> {
        self.init_fault.map_or(Ok(()), Err)
    }

    fn read_accel_gyro(&mut self) -> Result<(Vector3<f32>, Vector3<f32>), SensorError> {
        match self.imu_fault {
            Some(e) => Err(e),
            None => Ok((self.accel, self.gyro)),
        }
    }
}

impl PressureSensor for FakeBoard {
    fn read_pressure(&mut self) -> Option<f32> {
        self.pressure
    }
}

impl ActuatorOutput for FakeBoard {
    fn write_actuators(&mut self, cmd_deg: &[f32; 4], _config: &ControlConfig) {
        self.actuator_writes.push(*cmd_deg);
    }
}

impl LogSink for FakeBoard {
    fn open(&mut self) -> Result<(), LogError> {
        if let Some(e) = self.open_fault {
            return Err(e);
        }
        self.log_open = true;
        Ok(())
    }

    fn write_record(&mut self, record: &str) -> Result<(), LogError> {
        if !self.log_open {
            return Err(LogError::NotOpen);
        }
        self.records.push(record.to_owned());
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LogError> {
        if !self.log_open {
            return Err(LogError::NotOpen);
        }
        self.flushes += 1;
        Ok(())
    }
}

impl ConfigStore for FakeBoard {
    fn load_bytes(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        self.store.load_bytes(buf)
    }

    fn store_bytes(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        self.store.store_bytes(bytes)
    }
}

impl CommandLink for FakeBoard {
    fn poll_byte(&mut self) -> Option<u8> {
        self.rx.pop_front()
    }

    fn send_line(&mut self, line: &str) {
        self.tx.push(line.to_owned());
    }
}

impl SystemControl for FakeBoard {
    fn request_restart(&mut self) {
        self.restarts += 1;
    }
}
