//! Ground command protocol: line assembly, parsing and response text.
//!
//! Tokens are case-sensitive and separated by ASCII whitespace. Every
//! command yields exactly one `MSG:` line; `DUMP` additionally emits one
//! `CFG:` line per tuneable field before its acknowledgement.

use core::fmt;

use crate::config::{ConfigField, ConfigValue, ControlConfig, CONFIG_FIELDS};
use crate::error::CommandError;

pub const COMMAND_LINE_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Line assembly
// ---------------------------------------------------------------------------

/// A complete received line, copied out of the assembler.
#[derive(Clone, Copy)]
pub struct Line<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

impl<const N: usize> Line<N> {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// Non-UTF-8 input cannot name any command.
    pub fn text(&self) -> Result<&str, CommandError> {
        core::str::from_utf8(self.as_bytes()).map_err(|_| CommandError::UnknownCommand)
    }
}

impl<const N: usize> fmt::Debug for Line<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Line({:?})", self.text().unwrap_or("<invalid utf-8>"))
    }
}

/// Accumulates bytes until `\n` or `\r`.
pub struct LineAssembler<const N: usize> {
    buf: [u8; N],
    len: usize,
    discarding: bool,
}

impl<const N: usize> Default for LineAssembler<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> LineAssembler<N> {
    pub const fn new() -> Self {
        Self {
            buf: [0u8; N],
            len: 0,
            discarding: false,
        }
    }

    /// Feed one byte. Returns a line when a terminator completes one;
    /// empty lines are skipped and an over-long line is dropped whole.
    pub fn push(&mut self, byte: u8) -> Option<Result<Line<N>, CommandError>> {
        if byte == b'\n' || byte == b'\r' {
            let result = if self.discarding {
                Some(Err(CommandError::TooLong))
            } else if self.len > 0 {
                Some(Ok(Line {
                    bytes: self.buf,
                    len: self.len,
                }))
            } else {
                None
            };
            self.len = 0;
            self.discarding = false;
            return result;
        }

        if self.discarding {
            return None;
        }
        if self.len == N {
            self.discarding = true;
            return None;
        }
        self.buf[self.len] = byte;
        self.len += 1;
        None
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Arm,
    Override,
    Preflight,
    Set { name: &'a str, value: &'a str },
    Dump,
    Save,
    Default,
    Restart,
}

/// Parse one line. Whitespace-only lines yield `Ok(None)`.
pub fn parse(line: &str) -> Result<Option<Command<'_>>, CommandError> {
    let mut tokens = line.split_ascii_whitespace();
    let Some(head) = tokens.next() else {
        return Ok(None);
    };

    if head == "SET" {
        return match (tokens.next(), tokens.next(), tokens.next()) {
            (Some(name), Some(value), None) => Ok(Some(Command::Set { name, value })),
            _ => Err(CommandError::SetSyntax),
        };
    }

    let command = match head {
        "ARM" => Command::Arm,
        "OVRD" => Command::Override,
        "PREFLT" => Command::Preflight,
        "DUMP" => Command::Dump,
        "SAVE" => Command::Save,
        "DEFAULT" => Command::Default,
        "MAGICRESET" => Command::Restart,
        _ => return Err(CommandError::UnknownCommand),
    };
    if tokens.next().is_some() {
        return Err(CommandError::UnknownCommand);
    }
    Ok(Some(command))
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// Acknowledgement of an accepted command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Response {
    GuidanceInternal,
    GroundOverride,
    RevertedToPreflight,
    Set {
        name: &'static str,
        value: ConfigValue,
    },
    ConfigSaved,
    ConfigReset,
    Restarting,
    DumpComplete,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MSG: ")?;
        match self {
            Self::GuidanceInternal => f.write_str("GUIDANCE IS INTERNAL"),
            Self::GroundOverride => f.write_str("GROUND OVERRIDE MODE"),
            Self::RevertedToPreflight => f.write_str("REVERTED TO PREFLT"),
            Self::Set { name, value } => write!(f, "{name} = {value}"),
            Self::ConfigSaved => f.write_str("CONFIG SAVED"),
            Self::ConfigReset => f.write_str("CONFIG RESET TO DEFAULTS"),
            Self::Restarting => f.write_str("RESTARTING"),
            Self::DumpComplete => f.write_str("DUMP COMPLETE"),
        }
    }
}

/// Error line for a rejected command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection(pub CommandError);

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MSG: {}", self.0)
    }
}

/// One `CFG: <NAME> <value>` line of a configuration dump.
pub struct DumpLine<'a> {
    field: &'static ConfigField,
    config: &'a ControlConfig,
}

impl fmt::Display for DumpLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CFG: {} {}", self.field.name, (self.field.get)(self.config))
    }
}

pub fn dump_lines(config: &ControlConfig) -> impl Iterator<Item = DumpLine<'_>> {
    CONFIG_FIELDS
        .iter()
        .map(move |field| DumpLine { field, config })
}
