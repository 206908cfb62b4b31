//! Control configuration, its persisted record and the tuneable-field registry.

use core::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::error::{CommandError, RecordError, StorageError};
use crate::hal::ConfigStore;

pub const CONFIG_MAGIC: u32 = 0xDEAD_0002;
pub const CONFIG_VERSION: u32 = 2;

const FLAG_SERVO_IN_BURN: u32 = 1 << 0;
const FLAG_BENCH_TEST_INVERT: u32 = 1 << 1;
const CHECKSUM_SEED: u32 = 0xA5A5_A5A5;

// ---------------------------------------------------------------------------
// Live configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f32,
    pub ki: f32,
    pub kd: f32,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlConfig {
    pub roll: PidGains,
    pub pitch: PidGains,
    pub yaw: PidGains,
    /// Anti-windup bound on each integral accumulator (deg·s).
    pub integral_limit: f32,
    /// Neutral fin angle in degrees.
    pub actuator_center_deg: f32,
    /// Maximum fin deflection either side of centre, degrees.
    pub actuator_limit_deg: f32,
    /// Servo pulse width at the neutral angle.
    pub actuator_center_us: f32,
    pub actuator_us_per_deg: f32,
    pub motor_burn_ms: u32,
    /// Time from ignition until the recovery phase.
    pub recovery_delay_ms: u32,
    pub log_interval_ms: u32,
    pub log_flush_interval_ms: u32,
    pub telemetry_interval_ms: u32,
    pub servo_in_burn: bool,
    /// Board mounted upside down on the bench: negate X/Z accel and gyro.
    pub bench_test_invert: bool,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            roll: PidGains::default(),
            pitch: PidGains::default(),
            yaw: PidGains::default(),
            integral_limit: 10.0,
            actuator_center_deg: 90.0,
            actuator_limit_deg: 30.0,
            actuator_center_us: 1500.0,
            actuator_us_per_deg: 10.0,
            motor_burn_ms: 3000,
            recovery_delay_ms: 60_000,
            log_interval_ms: 10,
            log_flush_interval_ms: 100,
            telemetry_interval_ms: 50,
            servo_in_burn: false,
            bench_test_invert: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted record
// ---------------------------------------------------------------------------

/// Binary configuration record as written to non-volatile storage.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct StoredConfig {
    pub magic: u32,
    pub version: u32,
    /// Roll, pitch, yaw triples of kp, ki, kd.
    pub gains: [f32; 9],
    pub integral_limit: f32,
    pub actuator_center_deg: f32,
    pub actuator_limit_deg: f32,
    pub actuator_center_us: f32,
    pub actuator_us_per_deg: f32,
    pub motor_burn_ms: u32,
    pub recovery_delay_ms: u32,
    pub log_interval_ms: u32,
    pub log_flush_interval_ms: u32,
    pub telemetry_interval_ms: u32,
    pub flags: u32,
    pub checksum: u32,
}

pub const STORED_CONFIG_LEN: usize = core::mem::size_of::<StoredConfig>();

impl StoredConfig {
    pub fn from_config(config: &ControlConfig) -> Self {
        let mut flags = 0;
        if config.servo_in_burn {
            flags |= FLAG_SERVO_IN_BURN;
        }
        if config.bench_test_invert {
            flags |= FLAG_BENCH_TEST_INVERT;
        }

        let mut gains = [0.0; 9];
        for (slot, pid) in gains
            .chunks_exact_mut(3)
            .zip([config.roll, config.pitch, config.yaw])
        {
            slot.copy_from_slice(&[pid.kp, pid.ki, pid.kd]);
        }

        let mut record = Self {
            magic: CONFIG_MAGIC,
            version: CONFIG_VERSION,
            gains,
            integral_limit: config.integral_limit,
            actuator_center_deg: config.actuator_center_deg,
            actuator_limit_deg: config.actuator_limit_deg,
            actuator_center_us: config.actuator_center_us,
            actuator_us_per_deg: config.actuator_us_per_deg,
            motor_burn_ms: config.motor_burn_ms,
            recovery_delay_ms: config.recovery_delay_ms,
            log_interval_ms: config.log_interval_ms,
            log_flush_interval_ms: config.log_flush_interval_ms,
            telemetry_interval_ms: config.telemetry_interval_ms,
            flags,
            checksum: 0,
        };
        record.checksum = record.calculate_checksum();
        record
    }

    pub fn to_config(&self) -> ControlConfig {
        let pid = |i: usize| PidGains {
            kp: self.gains[i * 3],
            ki: self.gains[i * 3 + 1],
            kd: self.gains[i * 3 + 2],
        };
        ControlConfig {
            roll: pid(0),
            pitch: pid(1),
            yaw: pid(2),
            integral_limit: self.integral_limit,
            actuator_center_deg: self.actuator_center_deg,
            actuator_limit_deg: self.actuator_limit_deg,
            actuator_center_us: self.actuator_center_us,
            actuator_us_per_deg: self.actuator_us_per_deg,
            motor_burn_ms: self.motor_burn_ms,
            recovery_delay_ms: self.recovery_delay_ms,
            log_interval_ms: self.log_interval_ms,
            log_flush_interval_ms: self.log_flush_interval_ms,
            telemetry_interval_ms: self.telemetry_interval_ms,
            servo_in_burn: self.flags & FLAG_SERVO_IN_BURN != 0,
            bench_test_invert: self.flags & FLAG_BENCH_TEST_INVERT != 0,
        }
    }

    /// Validate and decode a record read back from storage.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let record = Self::read_from_bytes(bytes).map_err(|_| RecordError::Truncated {
            len: bytes.len(),
            expected: STORED_CONFIG_LEN,
        })?;

        if record.magic != CONFIG_MAGIC {
            return Err(RecordError::BadMagic {
                found: record.magic,
            });
        }
        if record.version != CONFIG_VERSION {
            return Err(RecordError::VersionMismatch {
                found: record.version,
            });
        }
        if record.checksum != record.calculate_checksum() {
            return Err(RecordError::BadChecksum);
        }
        Ok(record)
    }

    /// XOR of every 32-bit word before the checksum field.
    fn calculate_checksum(&self) -> u32 {
        let bytes = self.as_bytes();
        bytes[..STORED_CONFIG_LEN - 4]
            .chunks_exact(4)
            .fold(CHECKSUM_SEED, |acc, word| {
                acc ^ u32::from_ne_bytes([word[0], word[1], word[2], word[3]])
            })
    }
}

/// Outcome of reading the configuration at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLoad {
    Loaded,
    /// The stored record was unusable; defaults were written back.
    RestoredDefaults(RecordError),
}

/// Load the stored configuration, replacing and persisting defaults when the
/// record is missing or invalid.
pub fn load_or_default<S: ConfigStore + ?Sized>(
    store: &mut S,
) -> Result<(ControlConfig, ConfigLoad), StorageError> {
    let mut buf = [0u8; STORED_CONFIG_LEN];
    let len = store.load_bytes(&mut buf)?;

    match StoredConfig::decode(&buf[..len.min(STORED_CONFIG_LEN)]) {
        Ok(record) => Ok((record.to_config(), ConfigLoad::Loaded)),
        Err(reason) => {
            let defaults = ControlConfig::default();
            save_config(store, &defaults)?;
            Ok((defaults, ConfigLoad::RestoredDefaults(reason)))
        }
    }
}

pub fn save_config<S: ConfigStore + ?Sized>(
    store: &mut S,
    config: &ControlConfig,
) -> Result<(), StorageError> {
    store.store_bytes(StoredConfig::from_config(config).as_bytes())
}

/// Fixed-size in-memory store, for tests and boards without EEPROM.
pub struct RamConfigStore {
    data: [u8; STORED_CONFIG_LEN],
    len: usize,
    pub fail_writes: bool,
}

impl Default for RamConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RamConfigStore {
    pub const fn new() -> Self {
        Self {
            data: [0u8; STORED_CONFIG_LEN],
            len: 0,
            fail_writes: false,
        }
    }

    pub fn contents(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl ConfigStore for RamConfigStore {
    fn load_bytes(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        let n = self.len.min(buf.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        Ok(n)
    }

    fn store_bytes(&mut self, bytes: &[u8]) -> Result<(), StorageError> {
        if self.fail_writes || bytes.len() > self.data.len() {
            return Err(StorageError::WriteFailed);
        }
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tuneable registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    F32,
    U32,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConfigValue {
    F32(f32),
    U32(u32),
    Bool(bool),
}

impl ConfigValue {
    /// Parse `text` as a value of `kind`. Non-finite floats are rejected.
    pub fn parse(kind: ValueKind, text: &str) -> Option<Self> {
        match kind {
            ValueKind::F32 => text
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Self::F32),
            ValueKind::U32 => text.parse::<u32>().ok().map(Self::U32),
            ValueKind::Bool => match text {
                "true" => Some(Self::Bool(true)),
                "false" => Some(Self::Bool(false)),
                _ => text.parse::<i64>().ok().map(|v| Self::Bool(v > 0)),
            },
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::F32(v) => write!(f, "{v:.3}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{}", u8::from(*v)),
        }
    }
}

/// One named, typed field of [`ControlConfig`].
pub struct ConfigField {
    pub name: &'static str,
    pub kind: ValueKind,
    pub get: fn(&ControlConfig) -> ConfigValue,
    set: fn(&mut ControlConfig, ConfigValue),
}

impl fmt::Debug for ConfigField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigField")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

macro_rules! field {
    ($name:literal, F32, $($path:ident).+) => {
        ConfigField {
            name: $name,
            kind: ValueKind::F32,
            get: |c| ConfigValue::F32(c.$($path).+),
            set: |c, v| {
                if let ConfigValue::F32(x) = v {
                    c.$($path).+ = x;
                }
            },
        }
    };
    ($name:literal, U32, $($path:ident).+) => {
        ConfigField {
            name: $name,
            kind: ValueKind::U32,
            get: |c| ConfigValue::U32(c.$($path).+),
            set: |c, v| {
                if let ConfigValue::U32(x) = v {
                    c.$($path).+ = x;
                }
            },
        }
    };
    ($name:literal, Bool, $($path:ident).+) => {
        ConfigField {
            name: $name,
            kind: ValueKind::Bool,
            get: |c| ConfigValue::Bool(c.$($path).+),
            set: |c, v| {
                if let ConfigValue::Bool(x) = v {
                    c.$($path).+ = x;
                }
            },
        }
    };
}

/// Every tuneable field, in `DUMP` order.
pub static CONFIG_FIELDS: [ConfigField; 21] = [
    field!("PITCH_KP", F32, pitch.kp),
    field!("PITCH_KI", F32, pitch.ki),
    field!("PITCH_KD", F32, pitch.kd),
    field!("ROLL_KP", F32, roll.kp),
    field!("ROLL_KI", F32, roll.ki),
    field!("ROLL_KD", F32, roll.kd),
    field!("YAW_KP", F32, yaw.kp),
    field!("YAW_KI", F32, yaw.ki),
    field!("YAW_KD", F32, yaw.kd),
    field!("PID_I_MAX", F32, integral_limit),
    field!("SERVO_CENTER_DEG", F32, actuator_center_deg),
    field!("SERVO_CENTER_US", F32, actuator_center_us),
    field!("SERVO_FLT_LIM_DEG", F32, actuator_limit_deg),
    field!("SERVO_US_PER_DEG", F32, actuator_us_per_deg),
    field!("PARACHUTE_TIMEOUT_FROM_IGN_MS", U32, recovery_delay_ms),
    field!("MOTOR_BURN_MS", U32, motor_burn_ms),
    field!("LOG_RATE_MS", U32, log_interval_ms),
    field!("LOG_FLUSH_MS", U32, log_flush_interval_ms),
    field!("TELEM_RATE_MS", U32, telemetry_interval_ms),
    field!("SERVO_BURN_EN", Bool, servo_in_burn),
    field!("INVERTED_TEST_EN", Bool, bench_test_invert),
];

impl ConfigField {
    pub fn lookup(name: &str) -> Option<&'static ConfigField> {
        CONFIG_FIELDS.iter().find(|f| f.name == name)
    }
}

impl ControlConfig {
    pub fn get(&self, name: &str) -> Option<ConfigValue> {
        ConfigField::lookup(name).map(|f| (f.get)(self))
    }

    /// Parse and assign one named field. On error nothing is modified.
    pub fn set(
        &mut self,
        name: &str,
        text: &str,
    ) -> Result<(&'static str, ConfigValue), CommandError> {
        let field = ConfigField::lookup(name).ok_or(CommandError::UnknownVariable)?;
        let value = ConfigValue::parse(field.kind, text)
            .ok_or(CommandError::InvalidValue { name: field.name })?;
        (field.set)(self, value);
        Ok((field.name, (field.get)(self)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_roundtrip_keeps_every_field() {
        let mut config = ControlConfig::default();
        config.pitch.kd = 0.25;
        config.recovery_delay_ms = 12_345;
        config.bench_test_invert = true;

        let record = StoredConfig::from_config(&config);
        let decoded = StoredConfig::decode(record.as_bytes()).unwrap();
        assert_eq!(decoded.to_config(), config);
    }

    #[test]
    fn test_decode_rejects_bad_records() {
        let record = StoredConfig::from_config(&ControlConfig::default());
        let bytes = record.as_bytes();

        assert_eq!(
            StoredConfig::decode(&bytes[..10]).unwrap_err(),
            RecordError::Truncated {
                len: 10,
                expected: STORED_CONFIG_LEN
            }
        );

        let mut stale = record;
        stale.version = 1;
        stale.checksum = stale.calculate_checksum();
        assert_eq!(
            StoredConfig::decode(stale.as_bytes()).unwrap_err(),
            RecordError::VersionMismatch { found: 1 }
        );

        let mut corrupt = record;
        corrupt.motor_burn_ms ^= 1;
        assert_eq!(
            StoredConfig::decode(corrupt.as_bytes()).unwrap_err(),
            RecordError::BadChecksum
        );

        let mut foreign = record;
        foreign.magic = 0xDEAD_0001;
        assert!(matches!(
            StoredConfig::decode(foreign.as_bytes()),
            Err(RecordError::BadMagic { found: 0xDEAD_0001 })
        ));
    }

    #[test]
    fn test_load_or_default_self_heals_empty_store() {
        let mut store = RamConfigStore::new();
        let (config, load) = load_or_default(&mut store).unwrap();

        assert_eq!(config, ControlConfig::default());
        assert!(matches!(
            load,
            ConfigLoad::RestoredDefaults(RecordError::Truncated { len: 0, .. })
        ));
        // Defaults were persisted, so the next boot loads cleanly.
        assert_eq!(store.contents().len(), STORED_CONFIG_LEN);
        let (_, second) = load_or_default(&mut store).unwrap();
        assert_eq!(second, ConfigLoad::Loaded);
    }

    #[test]
    fn test_load_or_default_reports_persist_failure() {
        let mut store = RamConfigStore::new();
        store.fail_writes = true;
        assert_eq!(
            load_or_default(&mut store).unwrap_err(),
            StorageError::WriteFailed
        );
    }

    #[test]
    fn test_set_parses_by_kind() {
        let mut config = ControlConfig::default();

        let (name, value) = config.set("PITCH_KP", "2.5").unwrap();
        assert_eq!(name, "PITCH_KP");
        assert_eq!(value, ConfigValue::F32(2.5));
        assert_eq!(config.pitch.kp, 2.5);

        config.set("MOTOR_BURN_MS", "4200").unwrap();
        assert_eq!(config.motor_burn_ms, 4200);

        config.set("SERVO_BURN_EN", "1").unwrap();
        assert!(config.servo_in_burn);
        config.set("SERVO_BURN_EN", "false").unwrap();
        assert!(!config.servo_in_burn);
    }

    #[test]
    fn test_set_rejects_without_partial_effect() {
        let mut config = ControlConfig::default();
        let before = config;

        assert_eq!(config.set("NOT_A_FIELD", "1"), Err(CommandError::UnknownVariable));
        assert_eq!(
            config.set("PITCH_KP", "abc"),
            Err(CommandError::InvalidValue { name: "PITCH_KP" })
        );
        assert_eq!(
            config.set("PID_I_MAX", "NaN"),
            Err(CommandError::InvalidValue { name: "PID_I_MAX" })
        );
        assert_eq!(
            config.set("LOG_RATE_MS", "-5"),
            Err(CommandError::InvalidValue { name: "LOG_RATE_MS" })
        );
        assert_eq!(config, before);
    }

    #[test]
    fn test_registry_names_are_unique() {
        for (i, a) in CONFIG_FIELDS.iter().enumerate() {
            for b in &CONFIG_FIELDS[i + 1..] {
                assert_ne!(a.name, b.name);
            }
        }
    }

    #[test]
    fn test_value_display() {
        assert_eq!(format!("{}", ConfigValue::F32(1.0)), "1.000");
        assert_eq!(format!("{}", ConfigValue::U32(60000)), "60000");
        assert_eq!(format!("{}", ConfigValue::Bool(true)), "1");
    }
}
