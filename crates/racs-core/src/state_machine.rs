use crate::config::ControlConfig;
use crate::error::CommandError;

// ---------------------------------------------------------------------------
// Enums & Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FlightPhase {
    SelfTest = 0,
    Preflight = 1,
    NavLocked = 2, // Armed, waiting for liftoff
    Burn = 3,      // Powered flight
    Coast = 4,     // Unpowered ascent
    Recovery = 5,  // Parachute, actuation disabled
    Override = 6,  // Ground-commanded fin test
}

pub const NUM_PHASES: usize = 7;

/// What the attitude estimator does in a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimatorMode {
    Idle,
    Level,
    Integrate,
}

impl FlightPhase {
    pub const ALL: [FlightPhase; NUM_PHASES] = [
        Self::SelfTest,
        Self::Preflight,
        Self::NavLocked,
        Self::Burn,
        Self::Coast,
        Self::Recovery,
        Self::Override,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Self::SelfTest => "SELFTEST",
            Self::Preflight => "PREFLT",
            Self::NavLocked => "NAVLK",
            Self::Burn => "BURN",
            Self::Coast => "COAST",
            Self::Recovery => "RECVY",
            Self::Override => "OVRD",
        }
    }

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    /// Phases in which ground commands are refused.
    pub fn is_lockout(self) -> bool {
        matches!(
            self,
            Self::NavLocked | Self::Burn | Self::Coast | Self::Recovery
        )
    }

    pub fn estimator_mode(self) -> EstimatorMode {
        match self {
            Self::SelfTest => EstimatorMode::Idle,
            Self::Preflight => EstimatorMode::Level,
            _ => EstimatorMode::Integrate,
        }
    }

    pub fn controller_enabled(self, servo_in_burn: bool) -> bool {
        match self {
            Self::Coast | Self::Override => true,
            Self::Burn => servo_in_burn,
            _ => false,
        }
    }

    /// Telemetry is only streamed while on the ground.
    pub fn streams_telemetry(self) -> bool {
        matches!(self, Self::Preflight | Self::Override)
    }
}

/// Liftoff threshold on longitudinal acceleration, m/s².
pub const LIFTOFF_ACCEL_THRESHOLD: f32 = 20.0;

#[derive(Debug, Clone, Copy)]
pub struct StateMachineConfig {
    pub liftoff_accel_thresh: f32,
    pub motor_burn_us: u64,
    /// Measured from liftoff, not from burnout.
    pub recovery_delay_us: u64,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        Self::from(&ControlConfig::default())
    }
}

impl From<&ControlConfig> for StateMachineConfig {
    fn from(config: &ControlConfig) -> Self {
        Self {
            liftoff_accel_thresh: LIFTOFF_ACCEL_THRESHOLD,
            motor_burn_us: u64::from(config.motor_burn_ms) * 1000,
            recovery_delay_us: u64::from(config.recovery_delay_ms) * 1000,
        }
    }
}

/// Inputs required by the state machine update.
#[derive(Debug, Clone, Copy)]
pub struct StateInput {
    pub time_us: u64,
    /// Body X acceleration, m/s² (gravity reaction included).
    pub longitudinal_accel: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseRequest {
    Arm,
    Override,
    Preflight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: FlightPhase,
    pub to: FlightPhase,
    pub time_us: u64,
    /// The controller's integrators must be zeroed.
    pub reset_integral: bool,
}

// ---------------------------------------------------------------------------
// State Machine
// ---------------------------------------------------------------------------

pub struct FlightStateMachine {
    config: StateMachineConfig,
    phase: FlightPhase,

    /// Liftoff time, once detected.
    burn_start_us: Option<u64>,

    /// Last entry time of each phase.
    transition_times: [Option<u64>; NUM_PHASES],
}

impl Default for FlightStateMachine {
    fn default() -> Self {
        Self::new(StateMachineConfig::default())
    }
}

impl FlightStateMachine {
    pub fn new(config: StateMachineConfig) -> Self {
        let mut transition_times = [None; NUM_PHASES];
        transition_times[FlightPhase::SelfTest as usize] = Some(0);

        Self {
            config,
            phase: FlightPhase::SelfTest,
            burn_start_us: None,
            transition_times,
        }
    }

    /// Timing thresholds follow live configuration changes.
    pub fn set_config(&mut self, config: StateMachineConfig) {
        self.config = config;
    }

    /// Boot sequence finished: leave SELFTEST.
    pub fn complete_self_test(&mut self, time_us: u64) -> Option<Transition> {
        (self.phase == FlightPhase::SelfTest)
            .then(|| self.transition_to(FlightPhase::Preflight, time_us, false))
    }

    /// Apply a ground command. Refused in every lockout phase.
    pub fn request(
        &mut self,
        request: PhaseRequest,
        time_us: u64,
    ) -> Result<Transition, CommandError> {
        if self.phase.is_lockout() {
            return Err(CommandError::Lockout);
        }
        if self.phase == FlightPhase::SelfTest {
            return Err(CommandError::NotReady);
        }

        let transition = match request {
            PhaseRequest::Arm => self.transition_to(FlightPhase::NavLocked, time_us, true),
            PhaseRequest::Override => self.transition_to(FlightPhase::Override, time_us, true),
            PhaseRequest::Preflight => self.transition_to(FlightPhase::Preflight, time_us, false),
        };
        Ok(transition)
    }

    /// Automatic transitions driven by sensors and elapsed time.
    pub fn update(&mut self, input: StateInput) -> Option<Transition> {
        if self.phase == FlightPhase::NavLocked
            && input.longitudinal_accel > self.config.liftoff_accel_thresh
        {
            self.burn_start_us = Some(input.time_us);
            return Some(self.transition_to(FlightPhase::Burn, input.time_us, false));
        }
        self.update_timers(input.time_us)
    }

    /// Burn and recovery timeouts. Needs no sensor data, so it runs even
    /// on ticks where the IMU could not be read.
    pub fn update_timers(&mut self, time_us: u64) -> Option<Transition> {
        let since_liftoff = time_us.saturating_sub(self.burn_start_us?);

        let next_phase = match self.phase {
            FlightPhase::Burn if since_liftoff >= self.config.motor_burn_us => FlightPhase::Coast,
            FlightPhase::Coast if since_liftoff >= self.config.recovery_delay_us => {
                FlightPhase::Recovery
            }
            _ => return None,
        };
        Some(self.transition_to(next_phase, time_us, false))
    }

    fn transition_to(&mut self, to: FlightPhase, time_us: u64, reset_integral: bool) -> Transition {
        let from = self.phase;
        self.phase = to;
        if from != to {
            self.transition_times[to as usize] = Some(time_us);
        }
        Transition {
            from,
            to,
            time_us,
            reset_integral,
        }
    }

    pub fn current_phase(&self) -> FlightPhase {
        self.phase
    }

    pub fn burn_start_us(&self) -> Option<u64> {
        self.burn_start_us
    }

    pub fn transition_time(&self, phase: FlightPhase) -> Option<u64> {
        self.transition_times[phase as usize]
    }
}
