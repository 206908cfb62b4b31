//! Closed-loop simulated flight: the flight core on a [`SimBoard`],
//! driven by the fixed-rate control loop on simulated time.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use racs_core::attitude::LevelingStrategy;
use racs_core::config::RamConfigStore;
use racs_core::hal::ConfigStore;
use racs_core::stabilizer::MixerTopology;
use racs_core::{Clock, ConfigLoad, ControlLoop, Diagnostic, FlightComputer, TickReport};
use serde::Serialize;

use crate::board::SimBoard;
use crate::clock::SimClock;
use crate::diag::trace_diagnostic;
use crate::link::ScriptedLink;
use crate::log::JsonArrayLog;
use crate::profile::{FlightProfile, ScriptedCommand};
use crate::store::FileConfigStore;

pub const LOG_FILE: &str = "flight_log.json";
pub const CONFIG_FILE: &str = "config.bin";
pub const REPORT_FILE: &str = "report.json";

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub topology: MixerTopology,
    pub leveling: LevelingStrategy,
    /// Let the fins act during powered flight.
    pub servo_in_burn: bool,
    /// Write the flight log, config record and report here.
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhaseEntry {
    pub phase: &'static str,
    pub time_s: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkLine {
    pub time_s: f64,
    pub line: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BootSummary {
    pub config_restored: bool,
    /// rad/s
    pub gyro_bias: [f32; 3],
}

#[derive(Debug, Clone, Serialize)]
pub struct FlightReport {
    pub mixer: &'static str,
    pub leveling: &'static str,
    pub boot: BootSummary,
    pub ticks: u64,
    pub duration_s: f64,
    pub phases: Vec<PhaseEntry>,
    pub final_phase: &'static str,
    pub max_fin_deflection_deg: f32,
    pub sensor_faults: u32,
    pub dropped_log_records: u32,
    pub record_overflows: u32,
    pub log_records: u64,
    pub telemetry_frames: usize,
    /// Everything but telemetry frames sent over the ground link.
    pub responses: Vec<LinkLine>,
    pub apogee_m: f64,
    pub max_tilt_deg: f64,
}

#[derive(Debug, Default)]
struct Tally {
    phases: Vec<PhaseEntry>,
    sensor_faults: u32,
    dropped_log_records: u32,
    record_overflows: u32,
}

impl Tally {
    fn record(&mut self, time_us: u64, event: &Diagnostic) {
        trace_diagnostic(time_us, event);
        match event {
            Diagnostic::PhaseChanged(t) => self.phases.push(PhaseEntry {
                phase: t.to.label(),
                time_s: t.time_us as f64 * 1e-6,
            }),
            Diagnostic::SensorFault(_) => self.sensor_faults += 1,
            Diagnostic::LogDropped(_) => self.dropped_log_records += 1,
            Diagnostic::RecordOverflow(_) => self.record_overflows += 1,
            _ => {}
        }
    }

    fn tick(&mut self, report: &TickReport) {
        for event in report.diagnostics.iter() {
            self.record(report.time_us, event);
        }
    }
}

/// Fly `profile` to completion and summarise the flight.
pub fn run_flight(profile: &FlightProfile, options: &RunOptions) -> Result<FlightReport> {
    let mut profile = profile.clone();
    if options.servo_in_burn {
        profile.commands.insert(
            0,
            ScriptedCommand {
                at_s: 0.0,
                line: "SET SERVO_BURN_EN 1".into(),
            },
        );
    }

    let Some(dir) = &options.output_dir else {
        let (report, _) = fly(
            &profile,
            options,
            JsonArrayLog::new(io::sink()),
            RamConfigStore::new(),
        )?;
        return Ok(report);
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("creating output directory {}", dir.display()))?;
    let log = JsonArrayLog::create(&dir.join(LOG_FILE))?;
    let store = FileConfigStore::new(dir.join(CONFIG_FILE));
    let (report, log) = fly(&profile, options, log, store)?;
    log.into_inner().flush().context("flushing flight log")?;

    let path = dir.join(REPORT_FILE);
    let file = File::create(&path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(file), &report).context("writing report")?;
    tracing::info!(dir = %dir.display(), "flight artefacts written");
    Ok(report)
}

fn fly<W, K>(
    profile: &FlightProfile,
    options: &RunOptions,
    log: JsonArrayLog<W>,
    store: K,
) -> Result<(FlightReport, JsonArrayLog<W>)>
where
    W: Write,
    K: ConfigStore,
{
    let clock = SimClock::new();
    let link = ScriptedLink::new(clock.clone(), &profile.commands);
    let mut board = SimBoard::new(profile, options.topology, clock.clone(), link, log, store)?;
    let mut computer = FlightComputer::new(options.topology, options.leveling);
    let mut tally = Tally::default();

    let boot = computer
        .boot(&mut board, &clock)
        .context("flight computer failed to boot")?;
    for event in boot.diagnostics.iter() {
        tally.record(clock.now_us(), event);
    }
    tracing::info!(
        bias = ?boot.gyro_bias,
        "boot complete, calibrated gyro bias"
    );

    let end_us = (profile.duration_s.max(0.0) * 1e6) as u64;
    let ticks = ControlLoop::new(clock.clone()).run_until(
        &mut computer,
        &mut board,
        end_us,
        |report| tally.tick(report),
    );

    let max_fin_deflection_deg = board.max_deflection_deg();
    let (apogee_m, max_tilt_deg) = (board.truth().apogee(), board.truth().max_tilt_deg());
    let log_records = board.log().records();
    let (link, log, _) = board.into_parts();

    let sent = link.into_sent();
    let telemetry_frames = sent.iter().filter(|(_, line)| line.starts_with('{')).count();
    let responses = sent
        .into_iter()
        .filter(|(_, line)| !line.starts_with('{'))
        .map(|(time_us, line)| LinkLine {
            time_s: time_us as f64 * 1e-6,
            line,
        })
        .collect();

    let report = FlightReport {
        mixer: options.topology.label(),
        leveling: options.leveling.label(),
        boot: BootSummary {
            config_restored: matches!(boot.config_load, ConfigLoad::RestoredDefaults(_)),
            gyro_bias: boot.gyro_bias.into(),
        },
        ticks,
        duration_s: clock.seconds(),
        phases: tally.phases,
        final_phase: computer.phase().label(),
        max_fin_deflection_deg,
        sensor_faults: tally.sensor_faults,
        dropped_log_records: tally.dropped_log_records,
        record_overflows: tally.record_overflows,
        log_records,
        telemetry_frames,
        responses,
        apogee_m,
        max_tilt_deg,
    };
    Ok((report, log))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::read_log;

    fn phase_time(report: &FlightReport, phase: &str) -> Option<f64> {
        report
            .phases
            .iter()
            .find(|p| p.phase == phase)
            .map(|p| p.time_s)
    }

    #[test]
    fn test_default_flight_walks_every_phase() {
        let report = run_flight(&FlightProfile::default(), &RunOptions::default()).unwrap();

        let order: Vec<_> = report.phases.iter().map(|p| p.phase).collect();
        assert_eq!(order, ["PREFLT", "NAVLK", "BURN", "COAST", "RECVY"]);
        assert_eq!(report.final_phase, "RECVY");

        let burn = phase_time(&report, "BURN").unwrap();
        assert!((burn - 2.0).abs() < 0.01, "liftoff at {burn}");
        let coast = phase_time(&report, "COAST").unwrap();
        assert!((coast - burn - 3.0).abs() < 0.01);
        let recovery = phase_time(&report, "RECVY").unwrap();
        assert!((recovery - burn - 9.0).abs() < 0.01);

        assert!(report.boot.config_restored);
        assert!(report.sensor_faults > 0);
        assert!(report.apogee_m > 100.0);
        assert!(report.telemetry_frames > 0);
        assert!(report.max_fin_deflection_deg > 0.0);
        assert!(report.max_fin_deflection_deg <= 30.0 + 1e-3);
    }

    #[test]
    fn test_ground_link_transcript() {
        let report = run_flight(&FlightProfile::default(), &RunOptions::default()).unwrap();
        let lines: Vec<_> = report.responses.iter().map(|r| r.line.as_str()).collect();

        assert!(lines.contains(&"MSG: PARACHUTE_TIMEOUT_FROM_IGN_MS = 9000"));
        assert!(lines.contains(&"CFG: PARACHUTE_TIMEOUT_FROM_IGN_MS 9000"));
        assert!(lines.contains(&"MSG: GUIDANCE IS INTERNAL"));
        // PREFLT arrives after liftoff.
        assert_eq!(lines.last(), Some(&"MSG: COMMAND IGNORED IN FLIGHT LOCKOUT"));
    }

    #[test]
    fn test_servo_in_burn_moves_fins_during_burn() {
        let mut profile = FlightProfile::default();
        profile.duration_s = 4.5;
        let passive = run_flight(&profile, &RunOptions::default()).unwrap();
        let active = run_flight(
            &profile,
            &RunOptions {
                servo_in_burn: true,
                ..RunOptions::default()
            },
        )
        .unwrap();

        assert_eq!(passive.max_fin_deflection_deg, 0.0);
        assert!(active.max_fin_deflection_deg > 0.0);
        assert_eq!(active.responses[0].line, "MSG: SERVO_BURN_EN = 1");
    }

    #[test]
    fn test_x_mixer_flight() {
        let options = RunOptions {
            topology: MixerTopology::X,
            leveling: LevelingStrategy::EulerDecomposition,
            ..RunOptions::default()
        };
        let report = run_flight(&FlightProfile::default(), &options).unwrap();
        assert_eq!(report.mixer, options.topology.label());
        assert_eq!(report.final_phase, "RECVY");
    }

    #[test]
    fn test_output_dir_artefacts() {
        let dir = tempfile::tempdir().unwrap();
        let mut profile = FlightProfile::default();
        profile.duration_s = 1.5;
        let options = RunOptions {
            output_dir: Some(dir.path().to_path_buf()),
            ..RunOptions::default()
        };
        let first = run_flight(&profile, &options).unwrap();
        assert!(first.boot.config_restored);

        let log = std::fs::read_to_string(dir.path().join(LOG_FILE)).unwrap();
        let records = read_log(&log).unwrap();
        assert_eq!(records.len() as u64, first.log_records);
        assert_eq!(records[0]["state"], 1);

        assert!(dir.path().join(REPORT_FILE).exists());
        let stored = std::fs::read(dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(stored.len(), racs_core::config::STORED_CONFIG_LEN);

        // The defaults written on the first boot load cleanly on the next.
        let second = run_flight(&profile, &options).unwrap();
        assert!(!second.boot.config_restored);
    }
}
