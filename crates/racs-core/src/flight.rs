//! The flight computer: boot sequence, the per-tick pipeline and the
//! fixed-rate control loop that drives it.

use core::fmt;

use nalgebra::Vector3;

use crate::attitude::{
    bench_orient, AttitudeEstimator, LevelingStrategy, CALIBRATION_INTERVAL_US, CALIBRATION_SAMPLES,
};
use crate::baro::{Altimeter, BARO_INTERVAL_US};
use crate::command::{
    dump_lines, parse, Command, Line, LineAssembler, Rejection, Response, COMMAND_LINE_CAPACITY,
};
use crate::config::{load_or_default, save_config, ConfigLoad, ControlConfig};
use crate::error::{
    AttitudeError, BootError, CommandError, FormatError, LogError, RecordError, SensorError,
    StorageError,
};
use crate::hal::{Board, Clock, CommandLink};
use crate::record::{write_record, RecordBuf};
use crate::sample::FlightSample;
use crate::stabilizer::{MixerTopology, StabilizationController};
use crate::state_machine::{
    EstimatorMode, FlightPhase, FlightStateMachine, PhaseRequest, StateInput, StateMachineConfig,
    Transition,
};
use crate::text::FixedBuf;

/// Control tick period (1600 Hz).
pub const TICK_PERIOD_US: u64 = 625;

/// Upper bound on command bytes consumed in one tick.
const MAX_COMMAND_BYTES_PER_TICK: usize = 128;
const MAX_DIAGNOSTICS: usize = 8;
const LINE_CAPACITY: usize = 128;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Events the host may want to log. The core itself never logs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Diagnostic {
    SensorFault(SensorError),
    LevelingFailed(AttitudeError),
    LogDropped(LogError),
    RecordOverflow(FormatError),
    ConfigRestored(RecordError),
    StorageFailed(StorageError),
    PhaseChanged(Transition),
    CommandAccepted(Response),
    CommandRejected(CommandError),
    RestartRequested,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SensorFault(e) => write!(f, "IMU read failed: {e}"),
            Self::LevelingFailed(e) => write!(f, "levelling skipped: {e}"),
            Self::LogDropped(e) => write!(f, "log record dropped: {e}"),
            Self::RecordOverflow(e) => write!(f, "record not written: {e}"),
            Self::ConfigRestored(e) => write!(f, "configuration restored to defaults: {e}"),
            Self::StorageFailed(e) => write!(f, "{e}"),
            Self::PhaseChanged(t) => write!(f, "{} -> {}", t.from.label(), t.to.label()),
            Self::CommandAccepted(r) => write!(f, "{r}"),
            Self::CommandRejected(e) => write!(f, "{}", Rejection(*e)),
            Self::RestartRequested => f.write_str("restart requested"),
        }
    }
}

/// Bounded list of diagnostics; extra events are counted, not stored.
#[derive(Debug, Clone, Copy, Default)]
pub struct Diagnostics {
    events: [Option<Diagnostic>; MAX_DIAGNOSTICS],
    len: usize,
    dropped: u32,
}

impl Diagnostics {
    pub fn push(&mut self, event: Diagnostic) {
        match self.events.get_mut(self.len) {
            Some(slot) => {
                *slot = Some(event);
                self.len += 1;
            }
            None => self.dropped = self.dropped.saturating_add(1),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.events[..self.len].iter().flatten()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dropped(&self) -> u32 {
        self.dropped
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TickReport {
    pub time_us: u64,
    /// Phase at the end of the tick.
    pub phase: FlightPhase,
    pub sensor_ok: bool,
    pub controller_ran: bool,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Copy)]
pub struct BootReport {
    pub config_load: ConfigLoad,
    pub gyro_bias: Vector3<f32>,
    pub diagnostics: Diagnostics,
}

// ---------------------------------------------------------------------------
// Scheduling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct Schedule {
    last_us: Option<u64>,
}

impl Schedule {
    fn is_due(&self, now_us: u64, interval_us: u64) -> bool {
        self.last_us
            .map_or(true, |last| now_us.saturating_sub(last) >= interval_us)
    }

    fn mark(&mut self, now_us: u64) {
        self.last_us = Some(now_us);
    }
}

fn ms_to_us(ms: u32) -> u64 {
    u64::from(ms) * 1000
}

// ---------------------------------------------------------------------------
// Flight computer
// ---------------------------------------------------------------------------

pub struct FlightComputer {
    config: ControlConfig,
    sample: FlightSample,
    estimator: AttitudeEstimator,
    controller: StabilizationController,
    state: FlightStateMachine,
    altimeter: Altimeter,
    assembler: LineAssembler<COMMAND_LINE_CAPACITY>,
    record: RecordBuf,
    line: FixedBuf<LINE_CAPACITY>,
    last_tick_us: Option<u64>,
    baro: Schedule,
    log: Schedule,
    flush: Schedule,
    telemetry: Schedule,
}

impl Default for FlightComputer {
    fn default() -> Self {
        Self::new(MixerTopology::default(), LevelingStrategy::default())
    }
}

impl FlightComputer {
    pub fn new(topology: MixerTopology, leveling: LevelingStrategy) -> Self {
        let config = ControlConfig::default();
        Self {
            sample: FlightSample::new(config.actuator_center_deg),
            estimator: AttitudeEstimator::new(leveling),
            controller: StabilizationController::new(topology),
            state: FlightStateMachine::new(StateMachineConfig::from(&config)),
            altimeter: Altimeter::default(),
            assembler: LineAssembler::new(),
            record: RecordBuf::new(),
            line: FixedBuf::new(),
            last_tick_us: None,
            baro: Schedule::default(),
            log: Schedule::default(),
            flush: Schedule::default(),
            telemetry: Schedule::default(),
            config,
        }
    }

    pub fn phase(&self) -> FlightPhase {
        self.state.current_phase()
    }

    pub fn config(&self) -> &ControlConfig {
        &self.config
    }

    pub fn sample(&self) -> &FlightSample {
        &self.sample
    }

    pub fn estimator(&self) -> &AttitudeEstimator {
        &self.estimator
    }

    pub fn controller(&self) -> &StabilizationController {
        &self.controller
    }

    pub fn state_machine(&self) -> &FlightStateMachine {
        &self.state
    }

    /// Bring up sensors and logging, load configuration, calibrate the
    /// gyro and enter PREFLIGHT. Any error leaves the vehicle in SELFTEST.
    pub fn boot<B, C>(&mut self, board: &mut B, clock: &C) -> Result<BootReport, BootError>
    where
        B: Board + ?Sized,
        C: Clock + ?Sized,
    {
        let mut diagnostics = Diagnostics::default();

        board.init()?;
        board.open()?;

        let (config, config_load) = load_or_default(board)?;
        if let ConfigLoad::RestoredDefaults(reason) = config_load {
            diagnostics.push(Diagnostic::ConfigRestored(reason));
        }
        self.set_config(config);

        let mut fault = None;
        let samples = (0..CALIBRATION_SAMPLES).map_while(|_| {
            let reading = board.read_accel_gyro();
            clock.delay_us(CALIBRATION_INTERVAL_US);
            match reading {
                Ok((_, gyro)) => Some(gyro),
                Err(e) => {
                    fault = Some(e);
                    None
                }
            }
        });
        let bias = self
            .estimator
            .calibrate_gyro_bias(samples, self.config.bench_test_invert);
        if let Some(e) = fault {
            return Err(e.into());
        }
        self.sample.gyro_bias = bias?;

        self.sample.actuator_cmd = [self.config.actuator_center_deg; 4];
        board.write_actuators(&self.sample.actuator_cmd, &self.config);

        if let Some(t) = self.state.complete_self_test(clock.now_us()) {
            diagnostics.push(Diagnostic::PhaseChanged(t));
        }

        Ok(BootReport {
            config_load,
            gyro_bias: self.sample.gyro_bias,
            diagnostics,
        })
    }

    fn set_config(&mut self, config: ControlConfig) {
        self.config = config;
        self.state.set_config(StateMachineConfig::from(&self.config));
    }

    /// Run one control tick at `now_us`.
    pub fn tick<B: Board + ?Sized>(&mut self, board: &mut B, now_us: u64) -> TickReport {
        let dt = self
            .last_tick_us
            .map_or(0.0, |last| now_us.saturating_sub(last) as f32 * 1e-6);
        self.last_tick_us = Some(now_us);

        let mut report = TickReport {
            time_us: now_us,
            phase: self.phase(),
            sensor_ok: false,
            controller_ran: false,
            diagnostics: Diagnostics::default(),
        };

        if self.phase() != FlightPhase::SelfTest {
            self.control(board, now_us, dt, &mut report);
            board.write_actuators(&self.sample.actuator_cmd, &self.config);

            self.poll_baro(board, now_us);
            self.write_log(board, now_us, &mut report);
            self.send_telemetry(board, now_us, &mut report);
        }
        self.read_commands(board, now_us, &mut report);

        report.phase = self.phase();
        report
    }

    fn control<B: Board + ?Sized>(
        &mut self,
        board: &mut B,
        now_us: u64,
        dt: f32,
        report: &mut TickReport,
    ) {
        let (accel, gyro) = match board.read_accel_gyro() {
            Ok(reading) => reading,
            Err(e) => {
                report.diagnostics.push(Diagnostic::SensorFault(e));
                if let Some(t) = self.state.update_timers(now_us) {
                    self.apply_transition(t, report);
                }
                self.sample.actuator_cmd = [self.config.actuator_center_deg; 4];
                return;
            }
        };
        report.sensor_ok = true;

        let invert = self.config.bench_test_invert;
        let accel = bench_orient(accel, invert);
        let gyro = self.estimator.correct(&bench_orient(gyro, invert));
        self.sample.accel = accel;
        self.sample.gyro = gyro;

        let input = StateInput {
            time_us: now_us,
            longitudinal_accel: accel.x,
        };
        if let Some(t) = self.state.update(input) {
            self.apply_transition(t, report);
        }

        let phase = self.phase();
        match phase.estimator_mode() {
            EstimatorMode::Idle => {}
            EstimatorMode::Level => {
                if let Err(e) = self.estimator.level(&accel) {
                    report.diagnostics.push(Diagnostic::LevelingFailed(e));
                }
            }
            EstimatorMode::Integrate => self.estimator.integrate(&gyro, dt),
        }
        self.sample.orientation = self.estimator.orientation();
        #[cfg(feature = "euler-telemetry")]
        {
            self.sample.euler = self.estimator.euler();
        }

        if phase.controller_enabled(self.config.servo_in_burn) {
            self.sample.actuator_cmd =
                self.controller
                    .step(&self.sample.orientation, &gyro, dt, &self.config);
            report.controller_ran = true;
        } else {
            self.sample.actuator_cmd = [self.config.actuator_center_deg; 4];
        }
    }

    fn apply_transition(&mut self, t: Transition, report: &mut TickReport) {
        if t.reset_integral {
            self.controller.reset_integral();
        }
        if t.from != t.to {
            report.diagnostics.push(Diagnostic::PhaseChanged(t));
        }
    }

    // -----------------------------------------------------------------------
    // Auxiliary services
    // -----------------------------------------------------------------------

    fn poll_baro<B: Board + ?Sized>(&mut self, board: &mut B, now_us: u64) {
        if !self.baro.is_due(now_us, BARO_INTERVAL_US) {
            return;
        }
        // Not ready: try again next tick.
        if let Some(pressure) = board.read_pressure() {
            self.baro.mark(now_us);
            self.altimeter
                .update(pressure, self.phase() == FlightPhase::Preflight);
            self.sample.pressure = self.altimeter.pressure();
            self.sample.altitude = self.altimeter.altitude();
        }
    }

    fn write_log<B: Board + ?Sized>(&mut self, board: &mut B, now_us: u64, report: &mut TickReport) {
        if self.log.is_due(now_us, ms_to_us(self.config.log_interval_ms)) {
            self.log.mark(now_us);
            let phase = self.phase();
            match write_record(&mut self.record, now_us / 1000, phase, &self.sample) {
                Ok(()) => {
                    if let Err(e) = board.write_record(self.record.as_str()) {
                        report.diagnostics.push(Diagnostic::LogDropped(e));
                    }
                }
                Err(e) => report.diagnostics.push(Diagnostic::RecordOverflow(e)),
            }
        }

        if self
            .flush
            .is_due(now_us, ms_to_us(self.config.log_flush_interval_ms))
        {
            self.flush.mark(now_us);
            if let Err(e) = board.flush() {
                report.diagnostics.push(Diagnostic::LogDropped(e));
            }
        }
    }

    fn send_telemetry<B: Board + ?Sized>(
        &mut self,
        board: &mut B,
        now_us: u64,
        report: &mut TickReport,
    ) {
        let phase = self.phase();
        if !phase.streams_telemetry()
            || !self
                .telemetry
                .is_due(now_us, ms_to_us(self.config.telemetry_interval_ms))
        {
            return;
        }
        self.telemetry.mark(now_us);
        match write_record(&mut self.record, now_us / 1000, phase, &self.sample) {
            Ok(()) => board.send_line(self.record.as_str()),
            Err(e) => report.diagnostics.push(Diagnostic::RecordOverflow(e)),
        }
    }

    fn read_commands<B: Board + ?Sized>(
        &mut self,
        board: &mut B,
        now_us: u64,
        report: &mut TickReport,
    ) {
        for _ in 0..MAX_COMMAND_BYTES_PER_TICK {
            let Some(byte) = board.poll_byte() else {
                break;
            };
            if let Some(line) = self.assembler.push(byte) {
                self.handle_line(board, line, now_us, report);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn handle_line<B: Board + ?Sized>(
        &mut self,
        board: &mut B,
        line: Result<Line<COMMAND_LINE_CAPACITY>, CommandError>,
        now_us: u64,
        report: &mut TickReport,
    ) {
        // Lockout is decided before the line is even looked at.
        let outcome = self.command_gate().and(line).and_then(|line| {
            let text = line.text()?;
            self.execute(board, text, now_us, report)
        });

        match outcome {
            Ok(Some(response)) => {
                send(board, &mut self.line, format_args!("{response}"), report);
                report
                    .diagnostics
                    .push(Diagnostic::CommandAccepted(response));
                if response == Response::Restarting {
                    board.request_restart();
                    report.diagnostics.push(Diagnostic::RestartRequested);
                }
            }
            Ok(None) => {}
            Err(e) => {
                send(board, &mut self.line, format_args!("{}", Rejection(e)), report);
                report.diagnostics.push(Diagnostic::CommandRejected(e));
            }
        }
    }

    fn command_gate(&self) -> Result<(), CommandError> {
        match self.phase() {
            phase if phase.is_lockout() => Err(CommandError::Lockout),
            FlightPhase::SelfTest => Err(CommandError::NotReady),
            _ => Ok(()),
        }
    }

    fn execute<B: Board + ?Sized>(
        &mut self,
        board: &mut B,
        text: &str,
        now_us: u64,
        report: &mut TickReport,
    ) -> Result<Option<Response>, CommandError> {
        let Some(command) = parse(text)? else {
            return Ok(None);
        };

        let response = match command {
            Command::Arm => {
                self.request_phase(PhaseRequest::Arm, now_us, report)?;
                Response::GuidanceInternal
            }
            Command::Override => {
                self.request_phase(PhaseRequest::Override, now_us, report)?;
                Response::GroundOverride
            }
            Command::Preflight => {
                self.request_phase(PhaseRequest::Preflight, now_us, report)?;
                Response::RevertedToPreflight
            }
            Command::Set { name, value } => {
                let mut updated = self.config;
                let (name, value) = updated.set(name, value)?;
                self.set_config(updated);
                Response::Set { name, value }
            }
            Command::Dump => {
                for line in dump_lines(&self.config) {
                    send(board, &mut self.line, format_args!("{line}"), report);
                }
                Response::DumpComplete
            }
            Command::Save => {
                persist(board, &self.config, report)?;
                Response::ConfigSaved
            }
            Command::Default => {
                let defaults = ControlConfig::default();
                persist(board, &defaults, report)?;
                self.set_config(defaults);
                Response::ConfigReset
            }
            Command::Restart => Response::Restarting,
        };
        Ok(Some(response))
    }

    fn request_phase(
        &mut self,
        request: PhaseRequest,
        now_us: u64,
        report: &mut TickReport,
    ) -> Result<(), CommandError> {
        let t = self.state.request(request, now_us)?;
        self.apply_transition(t, report);
        Ok(())
    }
}

fn persist<B: Board + ?Sized>(
    board: &mut B,
    config: &ControlConfig,
    report: &mut TickReport,
) -> Result<(), CommandError> {
    save_config(board, config).map_err(|e| {
        report.diagnostics.push(Diagnostic::StorageFailed(e));
        CommandError::Storage
    })
}

fn send<L: CommandLink + ?Sized>(
    link: &mut L,
    buf: &mut FixedBuf<LINE_CAPACITY>,
    args: fmt::Arguments<'_>,
    report: &mut TickReport,
) {
    match buf.format(args) {
        Ok(text) => link.send_line(text),
        Err(e) => report.diagnostics.push(Diagnostic::RecordOverflow(e)),
    }
}

// ---------------------------------------------------------------------------
// Control loop
// ---------------------------------------------------------------------------

/// Time-gated poll loop around [`FlightComputer::tick`].
pub struct ControlLoop<C: Clock> {
    clock: C,
    period_us: u64,
    last_tick_us: Option<u64>,
}

impl<C: Clock> ControlLoop<C> {
    pub fn new(clock: C) -> Self {
        Self::with_period(clock, TICK_PERIOD_US)
    }

    pub fn with_period(clock: C, period_us: u64) -> Self {
        Self {
            clock,
            period_us: period_us.max(1),
            last_tick_us: None,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Run a tick if a full period has elapsed since the last one.
    pub fn poll<B: Board + ?Sized>(
        &mut self,
        computer: &mut FlightComputer,
        board: &mut B,
    ) -> Option<TickReport> {
        let now = self.clock.now_us();
        let due = self
            .last_tick_us
            .map_or(true, |last| now.saturating_sub(last) >= self.period_us);
        if !due {
            return None;
        }
        self.last_tick_us = Some(now);
        Some(computer.tick(board, now))
    }

    /// Drive the loop until the clock reaches `end_us`, handing every tick
    /// report to `on_tick`. Returns the number of ticks run.
    pub fn run_until<B, F>(
        &mut self,
        computer: &mut FlightComputer,
        board: &mut B,
        end_us: u64,
        mut on_tick: F,
    ) -> u64
    where
        B: Board + ?Sized,
        F: FnMut(&TickReport),
    {
        let mut ticks = 0;
        while self.clock.now_us() < end_us {
            match self.poll(computer, board) {
                Some(report) => {
                    ticks += 1;
                    on_tick(&report);
                }
                None => {
                    let next = self
                        .last_tick_us
                        .map_or(0, |last| last.saturating_add(self.period_us));
                    let wait = next.min(end_us).saturating_sub(self.clock.now_us());
                    self.clock.delay_us(wait.max(1));
                }
            }
        }
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::ManualClock;
    use crate::testing::FakeBoard;

    const DT: u64 = TICK_PERIOD_US;

    fn booted() -> (FlightComputer, FakeBoard, ManualClock) {
        let mut fc = FlightComputer::default();
        let mut board = FakeBoard::new();
        let clock = ManualClock::new(0);
        fc.boot(&mut board, &clock).unwrap();
        board.take_tx();
        (fc, board, clock)
    }

    fn command(fc: &mut FlightComputer, board: &mut FakeBoard, line: &str, now: u64) -> Vec<String> {
        board.type_line(line);
        fc.tick(board, now);
        board
            .take_tx()
            .into_iter()
            .filter(|l| !l.starts_with('{'))
            .collect()
    }

    fn fly_to_burn(fc: &mut FlightComputer, board: &mut FakeBoard, mut now: u64) -> u64 {
        assert_eq!(command(fc, board, "ARM", now), vec!["MSG: GUIDANCE IS INTERNAL"]);
        now += DT;
        board.accel = Vector3::new(25.0, 0.0, 0.0);
        let report = fc.tick(board, now);
        assert_eq!(report.phase, FlightPhase::Burn);
        now
    }

    #[test]
    fn test_boot_enters_preflight() {
        let mut fc = FlightComputer::default();
        let mut board = FakeBoard::new();
        board.gyro = Vector3::new(0.01, -0.02, 0.03);
        let clock = ManualClock::new(0);

        let report = fc.boot(&mut board, &clock).unwrap();

        assert_eq!(fc.phase(), FlightPhase::Preflight);
        assert!(matches!(report.config_load, ConfigLoad::RestoredDefaults(_)));
        assert!((report.gyro_bias - board.gyro).norm() < 1e-6);
        assert_eq!(clock.now_us(), CALIBRATION_SAMPLES as u64 * CALIBRATION_INTERVAL_US);
        assert_eq!(board.actuator_writes.last(), Some(&[90.0; 4]));
        assert!(board.log_open);

        let events: Vec<_> = report.diagnostics.iter().collect();
        assert!(matches!(events[0], Diagnostic::ConfigRestored(_)));
        assert!(matches!(events[1], Diagnostic::PhaseChanged(t) if t.to == FlightPhase::Preflight));
    }

    #[test]
    fn test_boot_fails_without_sensor_or_log() {
        let clock = ManualClock::new(0);

        let mut fc = FlightComputer::default();
        let mut board = FakeBoard::new();
        board.init_fault = Some(SensorError::InitFailed);
        assert_eq!(
            fc.boot(&mut board, &clock).unwrap_err(),
            BootError::Sensor(SensorError::InitFailed)
        );
        assert_eq!(fc.phase(), FlightPhase::SelfTest);

        let mut fc = FlightComputer::default();
        let mut board = FakeBoard::new();
        board.open_fault = Some(LogError::OpenFailed);
        assert_eq!(
            fc.boot(&mut board, &clock).unwrap_err(),
            BootError::Log(LogError::OpenFailed)
        );
        assert_eq!(fc.phase(), FlightPhase::SelfTest);

        let mut fc = FlightComputer::default();
        let mut board = FakeBoard::new();
        board.imu_fault = Some(SensorError::BusFault);
        assert_eq!(
            fc.boot(&mut board, &clock).unwrap_err(),
            BootError::Sensor(SensorError::BusFault)
        );
        assert_eq!(fc.phase(), FlightPhase::SelfTest);
    }

    #[test]
    fn test_self_test_answers_not_ready() {
        let mut fc = FlightComputer::default();
        let mut board = FakeBoard::new();
        assert_eq!(command(&mut fc, &mut board, "ARM", 0), vec!["MSG: NOT READY"]);
        assert!(board.actuator_writes.is_empty());
    }

    #[test]
    fn test_preflight_levels_from_gravity() {
        let (mut fc, mut board, _) = booted();
        board.accel = Vector3::new(0.0, 0.0, -9.81);
        fc.tick(&mut board, 1_000_000);

        let q = fc.sample().orientation;
        let h = core::f32::consts::FRAC_1_SQRT_2;
        assert!((q.w - h).abs() < 1e-5 && (q.j + h).abs() < 1e-5);
        assert_eq!(fc.sample().actuator_cmd, [90.0; 4]);
    }

    #[test]
    fn test_liftoff_then_lockout_rejects_preflight() {
        let (mut fc, mut board, _) = booted();
        let now = fly_to_burn(&mut fc, &mut board, 1_000_000);
        assert_eq!(fc.state_machine().burn_start_us(), Some(now));

        let lines = command(&mut fc, &mut board, "PREFLT", now + DT);
        assert_eq!(lines, vec!["MSG: COMMAND IGNORED IN FLIGHT LOCKOUT"]);
        assert_eq!(fc.phase(), FlightPhase::Burn);
    }

    #[test]
    fn test_lockout_covers_garbled_and_overlong_lines() {
        let (mut fc, mut board, _) = booted();
        let now = fly_to_burn(&mut fc, &mut board, 1_000_000);

        for line in ["SET PITCH_KP 5", "\u{1}\u{2}garbage", "MAGICRESET", &"X".repeat(100)] {
            let lines = command(&mut fc, &mut board, line, now + DT);
            assert_eq!(lines, vec!["MSG: COMMAND IGNORED IN FLIGHT LOCKOUT"], "{line:?}");
        }
        assert_eq!(fc.phase(), FlightPhase::Burn);
        assert_eq!(fc.config().pitch.kp, 1.0);
        assert_eq!(board.restarts, 0);
    }

    #[test]
    fn test_sensor_fault_skips_update_only() {
        let (mut fc, mut board, _) = booted();
        command(&mut fc, &mut board, "OVRD", 1_000_000);
        let before = fc.sample().orientation;

        board.imu_fault = Some(SensorError::BusFault);
        board.gyro = Vector3::new(1.0, 0.0, 0.0);
        let report = fc.tick(&mut board, 1_000_000 + DT);
        assert!(!report.sensor_ok);
        assert!(!report.controller_ran);
        assert!(report
            .diagnostics
            .iter()
            .any(|d| *d == Diagnostic::SensorFault(SensorError::BusFault)));
        assert_eq!(fc.sample().orientation, before);

        board.imu_fault = None;
        let report = fc.tick(&mut board, 1_000_000 + 2 * DT);
        assert!(report.sensor_ok && report.controller_ran);
        assert_ne!(fc.sample().orientation, before);
    }

    #[test]
    fn test_imu_loss_in_burn_still_reaches_recovery() {
        let (mut fc, mut board, _) = booted();
        command(&mut fc, &mut board, "SET SERVO_BURN_EN 1", 1_000_000);
        let liftoff = fly_to_burn(&mut fc, &mut board, 1_000_000 + DT);

        board.gyro = Vector3::new(0.0, 0.8, 0.0);
        let mut now = liftoff;
        for _ in 0..100 {
            now += DT;
            fc.tick(&mut board, now);
        }
        assert!(fc.sample().actuator_cmd.iter().any(|c| (c - 90.0).abs() > 0.5));

        board.imu_fault = Some(SensorError::BusFault);
        now += DT;
        let report = fc.tick(&mut board, now);
        assert!(!report.controller_ran);
        assert_eq!(board.actuator_writes.last(), Some(&[90.0; 4]));

        let mut phases = Vec::new();
        while now < liftoff + 70_000_000 {
            now += 100_000;
            let report = fc.tick(&mut board, now);
            for d in report.diagnostics.iter() {
                if let Diagnostic::PhaseChanged(t) = d {
                    phases.push(t.to);
                }
            }
        }
        assert_eq!(phases, vec![FlightPhase::Coast, FlightPhase::Recovery]);
        assert_eq!(fc.phase(), FlightPhase::Recovery);
        assert_eq!(board.actuator_writes.last(), Some(&[90.0; 4]));
    }

    #[test]
    fn test_override_runs_controller_and_navlocked_centres() {
        let (mut fc, mut board, _) = booted();
        let mut now = 1_000_000;
        command(&mut fc, &mut board, "OVRD", now);
        board.gyro = Vector3::new(0.0, 0.5, 0.0);
        for _ in 0..400 {
            now += DT;
            assert!(fc.tick(&mut board, now).controller_ran);
        }
        let cmd = fc.sample().actuator_cmd;
        assert!(cmd.iter().any(|c| (c - 90.0).abs() > 1.0));
        assert!(cmd.iter().all(|c| (60.0..=120.0).contains(c)));

        command(&mut fc, &mut board, "PREFLT", now + DT);
        command(&mut fc, &mut board, "ARM", now + 2 * DT);
        let report = fc.tick(&mut board, now + 3 * DT);
        assert_eq!(report.phase, FlightPhase::NavLocked);
        assert!(!report.controller_ran);
        assert_eq!(board.actuator_writes.last(), Some(&[90.0; 4]));
        assert_eq!(fc.controller().integral(), crate::stabilizer::Axes::ZERO);
    }

    #[test]
    fn test_dump_is_idempotent() {
        let (mut fc, mut board, _) = booted();
        let first = command(&mut fc, &mut board, "DUMP", 1_000_000);
        let second = command(&mut fc, &mut board, "DUMP", 1_000_000 + DT);
        assert_eq!(first, second);
        assert_eq!(first.len(), crate::config::CONFIG_FIELDS.len() + 1);
        assert_eq!(first.last().map(String::as_str), Some("MSG: DUMP COMPLETE"));
    }

    #[test]
    fn test_set_errors_have_no_effect() {
        let (mut fc, mut board, _) = booted();
        let before = *fc.config();

        let cases = [
            ("SET NOPE 1", "MSG: UNKNOWN TUNEABLE VARIABLE"),
            ("SET PITCH_KP x", "MSG: INVALID VALUE FOR PITCH_KP"),
            ("SET PITCH_KP", "MSG: SYNTAX ERROR. USE: SET <VAR> <VALUE>"),
            ("FLY", "MSG: UNKNOWN COMMAND"),
        ];
        for (i, (line, expected)) in cases.into_iter().enumerate() {
            let lines = command(&mut fc, &mut board, line, 1_000_000 + i as u64 * DT);
            assert_eq!(lines, vec![expected]);
        }
        assert_eq!(*fc.config(), before);

        let lines = command(&mut fc, &mut board, "SET MOTOR_BURN_MS 1500", 2_000_000);
        assert_eq!(lines, vec!["MSG: MOTOR_BURN_MS = 1500"]);
        assert_eq!(fc.config().motor_burn_ms, 1500);
    }

    #[test]
    fn test_live_burn_time_applies_to_state_machine() {
        let (mut fc, mut board, _) = booted();
        command(&mut fc, &mut board, "SET MOTOR_BURN_MS 10", 1_000_000);
        let now = fly_to_burn(&mut fc, &mut board, 1_000_000 + DT);
        board.accel = Vector3::new(-5.0, 0.0, 0.0);
        let report = fc.tick(&mut board, now + 10_000);
        assert_eq!(report.phase, FlightPhase::Coast);
        assert!(report.controller_ran);
    }

    #[test]
    fn test_save_and_default() {
        let (mut fc, mut board, _) = booted();
        command(&mut fc, &mut board, "SET YAW_KP 3", 1_000_000);
        assert_eq!(command(&mut fc, &mut board, "SAVE", 1_001_000), vec!["MSG: CONFIG SAVED"]);

        let (stored, _) = load_or_default(&mut board.store).unwrap();
        assert_eq!(stored.yaw.kp, 3.0);

        board.store.fail_writes = true;
        assert_eq!(
            command(&mut fc, &mut board, "DEFAULT", 1_002_000),
            vec!["MSG: STORAGE ERROR"]
        );
        assert_eq!(fc.config().yaw.kp, 3.0);

        board.store.fail_writes = false;
        assert_eq!(
            command(&mut fc, &mut board, "DEFAULT", 1_003_000),
            vec!["MSG: CONFIG RESET TO DEFAULTS"]
        );
        assert_eq!(*fc.config(), ControlConfig::default());
    }

    #[test]
    fn test_restart_acknowledged_then_requested() {
        let (mut fc, mut board, _) = booted();
        let lines = command(&mut fc, &mut board, "MAGICRESET", 1_000_000);
        assert_eq!(lines, vec!["MSG: RESTARTING"]);
        assert_eq!(board.restarts, 1);
    }

    #[test]
    fn test_telemetry_only_on_ground() {
        let (mut fc, mut board, _) = booted();
        let mut now = 1_000_000;
        for _ in 0..200 {
            now += DT;
            fc.tick(&mut board, now);
        }
        let telemetry = board.take_tx();
        // 125 ms at 50 ms intervals.
        assert_eq!(telemetry.len(), 3);
        assert!(telemetry.iter().all(|l| l.starts_with("{\"timestamp\":")));

        command(&mut fc, &mut board, "ARM", now + DT);
        for _ in 0..200 {
            now += DT;
            fc.tick(&mut board, now + DT);
        }
        assert!(board.take_tx().is_empty());
    }

    #[test]
    fn test_log_and_flush_cadence() {
        let (mut fc, mut board, _) = booted();
        let mut now = 1_000_000;
        for _ in 0..160 {
            fc.tick(&mut board, now);
            now += DT;
        }
        // 100 ms of ticks, 10 ms log interval, 100 ms flush interval.
        assert_eq!(board.records.len(), 10);
        assert_eq!(board.flushes, 1);
        assert!(board.records[0].contains("\"state\":1"));
    }

    #[test]
    fn test_log_failure_is_not_fatal() {
        let (mut fc, mut board, _) = booted();
        board.log_open = false;
        let report = fc.tick(&mut board, 1_000_000);
        assert!(report
            .diagnostics
            .iter()
            .any(|d| *d == Diagnostic::LogDropped(LogError::NotOpen)));
        assert!(report.sensor_ok);
    }

    #[test]
    fn test_baro_altitude_relative_to_pad() {
        let (mut fc, mut board, _) = booted();
        board.pressure = Some(1000.0);
        fc.tick(&mut board, 1_000_000);
        assert_eq!(fc.sample().altitude, 0.0);

        let now = fly_to_burn(&mut fc, &mut board, 1_100_000);
        board.pressure = Some(990.0);
        fc.tick(&mut board, now + 20_000);
        assert!(fc.sample().altitude > 80.0);

        board.pressure = None;
        fc.tick(&mut board, now + 40_000);
        assert_eq!(fc.sample().pressure, 990.0);
    }

    #[test]
    fn test_control_loop_full_flight() {
        let mut fc = FlightComputer::new(MixerTopology::X, LevelingStrategy::GravityAlignment);
        let mut board = FakeBoard::new();
        let clock = ManualClock::new(0);
        fc.boot(&mut board, &clock).unwrap();
        board.type_line("SET PARACHUTE_TIMEOUT_FROM_IGN_MS 5000");
        board.type_line("ARM");

        let mut control = ControlLoop::new(&clock);
        let start = clock.now_us();
        let ticks = control.run_until(&mut fc, &mut board, start + 1_000_000, |_| {});
        assert_eq!(ticks, 1_000_000 / TICK_PERIOD_US);
        assert_eq!(fc.phase(), FlightPhase::NavLocked);

        board.accel = Vector3::new(30.0, 0.0, 0.0);
        let mut phases = Vec::new();
        control.run_until(&mut fc, &mut board, start + 7_000_000, |report| {
            for d in report.diagnostics.iter() {
                if let Diagnostic::PhaseChanged(t) = d {
                    phases.push(t.to);
                }
            }
        });
        assert_eq!(
            phases,
            vec![FlightPhase::Burn, FlightPhase::Coast, FlightPhase::Recovery]
        );
        assert_eq!(board.actuator_writes.last(), Some(&[90.0; 4]));
    }
}
