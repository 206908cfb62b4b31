//! One-line JSON flight record, shared by the log file and telemetry.

use core::fmt::{self, Write};

use crate::error::FormatError;
use crate::sample::FlightSample;
use crate::state_machine::FlightPhase;
use crate::text::FixedBuf;

pub const RECORD_CAPACITY: usize = 512;

pub type RecordBuf = FixedBuf<RECORD_CAPACITY>;

/// Fixed-precision number; non-finite values become `null`.
struct JsonNum(f32, usize);

impl fmt::Display for JsonNum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_finite() {
            write!(f, "{:.*}", self.1, self.0)
        } else {
            f.write_str("null")
        }
    }
}

fn write_array<const N: usize>(
    out: &mut impl Write,
    key: &str,
    values: [f32; N],
    precision: usize,
) -> fmt::Result {
    write!(out, ",\"{key}\":[")?;
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            out.write_char(',')?;
        }
        write!(out, "{}", JsonNum(*v, precision))?;
    }
    out.write_char(']')
}

fn write_fields(
    out: &mut impl Write,
    timestamp_ms: u64,
    phase: FlightPhase,
    s: &FlightSample,
) -> fmt::Result {
    write!(out, "{{\"timestamp\":{timestamp_ms},\"state\":{}", phase.ordinal())?;
    write_array(out, "raw_accel", [s.accel.x, s.accel.y, s.accel.z], 3)?;
    write_array(out, "raw_gyro", [s.gyro.x, s.gyro.y, s.gyro.z], 3)?;
    write!(
        out,
        ",\"pressure\":{},\"altitude\":{}",
        JsonNum(s.pressure, 3),
        JsonNum(s.altitude, 3)
    )?;
    let q = &s.orientation;
    write_array(out, "quats", [q.w, q.i, q.j, q.k], 3)?;
    #[cfg(feature = "euler-telemetry")]
    write_array(out, "euler_angle", [s.euler.pitch, s.euler.yaw, s.euler.roll], 3)?;
    write_array(out, "servo", s.actuator_cmd, 1)?;
    write_array(out, "gyro_bias", [s.gyro_bias.x, s.gyro_bias.y, s.gyro_bias.z], 3)?;
    out.write_char('}')
}

/// Serialize one record into `buf`, replacing its contents.
pub fn write_record<const N: usize>(
    buf: &mut FixedBuf<N>,
    timestamp_ms: u64,
    phase: FlightPhase,
    sample: &FlightSample,
) -> Result<(), FormatError> {
    buf.clear();
    write_fields(buf, timestamp_ms, phase, sample).map_err(|_| FormatError::Overflow { capacity: N })
}
