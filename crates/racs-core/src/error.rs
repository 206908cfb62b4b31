//! Error types for the flight core.
//!
//! Every enum is `Copy` so errors can travel inside per-tick reports
//! without allocation.

use thiserror::Error;

/// Inertial or barometric sensor failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorError {
    #[error("sensor did not respond during initialization")]
    InitFailed,

    #[error("sensor bus transfer failed")]
    BusFault,

    #[error("sensor returned out-of-range data")]
    InvalidData,
}

/// Flight log sink failures. Logging is best-effort: these never stop the loop.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogError {
    #[error("log sink could not be opened")]
    OpenFailed,

    #[error("log sink is not open")]
    NotOpen,

    #[error("log write failed")]
    WriteFailed,

    #[error("log flush failed")]
    FlushFailed,
}

/// Non-volatile configuration storage failures.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    #[error("configuration storage read failed")]
    ReadFailed,

    #[error("configuration storage write failed")]
    WriteFailed,
}

/// Reasons a stored configuration record is not usable.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    #[error("stored record is {len} bytes, expected {expected}")]
    Truncated { len: usize, expected: usize },

    #[error("stored record magic {found:#010x} does not match")]
    BadMagic { found: u32 },

    #[error("stored record version {found} is not supported")]
    VersionMismatch { found: u32 },

    #[error("stored record checksum mismatch")]
    BadChecksum,
}

/// Bounded text buffer overflow.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    #[error("formatted output exceeds {capacity} bytes")]
    Overflow { capacity: usize },
}

/// Attitude estimator input problems.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttitudeError {
    #[error("gravity vector is zero or not finite")]
    DegenerateGravity,

    #[error("no gyro samples collected for bias calibration")]
    NoCalibrationSamples,
}

/// Fatal boot failures. The vehicle never leaves SELFTEST after one of these.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    #[error("inertial sensor: {0}")]
    Sensor(#[from] SensorError),

    #[error("flight log: {0}")]
    Log(#[from] LogError),

    #[error("configuration storage: {0}")]
    Storage(#[from] StorageError),

    #[error("gyro calibration: {0}")]
    Calibration(#[from] AttitudeError),
}

/// Rejected or malformed commands. The display text is the body of the
/// single `MSG:` line sent back on the command link.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("COMMAND IGNORED IN FLIGHT LOCKOUT")]
    Lockout,

    #[error("NOT READY")]
    NotReady,

    #[error("UNKNOWN COMMAND")]
    UnknownCommand,

    #[error("SYNTAX ERROR. USE: SET <VAR> <VALUE>")]
    SetSyntax,

    #[error("UNKNOWN TUNEABLE VARIABLE")]
    UnknownVariable,

    #[error("INVALID VALUE FOR {name}")]
    InvalidValue { name: &'static str },

    #[error("COMMAND TOO LONG")]
    TooLong,

    #[error("STORAGE ERROR")]
    Storage,
}
