//! RACS Simulation Library
//!
//! Host bench for the flight core: a ground-truth vehicle model, a
//! simulated board with noisy sensors, file-backed storage and logs, and
//! ground links for scripted or interactive sessions.

pub mod board;
pub mod clock;
pub mod diag;
pub mod link;
pub mod log;
pub mod profile;
pub mod run;
pub mod store;
pub mod truth;

// Re-export main types
pub use board::SimBoard;
pub use clock::{SimClock, SystemClock};
pub use diag::trace_diagnostic;
pub use link::{ScriptedLink, StdinLink};
pub use log::{read_log, JsonArrayLog};
pub use profile::{Disturbance, FlightProfile, ImuModel, ScriptedCommand};
pub use run::{run_flight, FlightReport, RunOptions};
pub use store::FileConfigStore;
pub use truth::{TruthModel, TruthPhase};
