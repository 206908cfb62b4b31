//! RACS - rocket active control system bench

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use racs_core::{Clock, ControlLoop, FlightComputer, LevelingStrategy, MixerTopology};
use racs_sim::{
    run_flight, trace_diagnostic, FileConfigStore, FlightProfile, JsonArrayLog, RunOptions,
    SimBoard, StdinLink, SystemClock,
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Idle wait between control loop polls in console mode.
const CONSOLE_POLL_US: u64 = 200;

#[derive(Parser)]
#[command(name = "racs")]
#[command(about = "Rocket fin stabilization: simulated flights and a ground console")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fly a simulated flight and print the flight report as JSON
    Sim {
        /// Flight profile (JSON); defaults to the built-in profile
        #[arg(short, long)]
        profile: Option<PathBuf>,

        /// Write the flight log, config record and report here
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        #[arg(long, value_enum, default_value = "plus")]
        mixer: Mixer,

        #[arg(long, value_enum, default_value = "gravity")]
        leveling: Leveling,

        /// Let the fins act during powered flight
        #[arg(long)]
        servo_in_burn: bool,
    },
    /// Run the flight computer on the bench, taking commands from stdin
    Console {
        /// Configuration record file
        #[arg(short, long, default_value = "racs_config.bin")]
        config: PathBuf,

        /// Directory for per-boot flight logs
        #[arg(short, long, default_value = ".")]
        log_dir: PathBuf,

        #[arg(long, value_enum, default_value = "plus")]
        mixer: Mixer,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Mixer {
    Plus,
    X,
}

impl From<Mixer> for MixerTopology {
    fn from(mixer: Mixer) -> Self {
        match mixer {
            Mixer::Plus => MixerTopology::Plus,
            Mixer::X => MixerTopology::X,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Leveling {
    Gravity,
    Euler,
}

impl From<Leveling> for LevelingStrategy {
    fn from(leveling: Leveling) -> Self {
        match leveling {
            Leveling::Gravity => LevelingStrategy::GravityAlignment,
            Leveling::Euler => LevelingStrategy::EulerDecomposition,
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Stdout carries the ground link in console mode.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Sim {
            profile,
            output_dir,
            mixer,
            leveling,
            servo_in_burn,
        } => {
            let profile = match profile {
                Some(path) => FlightProfile::load(&path)?,
                None => FlightProfile::default(),
            };
            let options = RunOptions {
                topology: mixer.into(),
                leveling: leveling.into(),
                servo_in_burn,
                output_dir,
            };
            let report = run_flight(&profile, &options)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Commands::Console {
            config,
            log_dir,
            mixer,
        } => run_console(&config, &log_dir, mixer.into()),
    }
}

/// Boot the flight computer on a bench board and serve the ground link
/// until stdin closes. `MAGICRESET` reboots with fresh state.
fn run_console(config: &Path, log_dir: &Path, topology: MixerTopology) -> anyhow::Result<()> {
    let profile = FlightProfile::bench();
    let clock = SystemClock::new();
    let mut link = StdinLink::spawn();
    let mut store = FileConfigStore::new(config);

    for boot in 0u32.. {
        let log_path = log_dir.join(format!("flight_log_{boot:03}.json"));
        let log = JsonArrayLog::create(&log_path)?;
        let mut board = SimBoard::new(&profile, topology, clock, link, log, store)?;
        let mut computer = FlightComputer::new(topology, LevelingStrategy::default());

        let report = computer
            .boot(&mut board, &clock)
            .context("flight computer failed to boot")?;
        for event in report.diagnostics.iter() {
            trace_diagnostic(clock.now_us(), event);
        }
        tracing::info!(log = %log_path.display(), "ready for commands");

        let mut control = ControlLoop::new(clock);
        let restart = loop {
            match control.poll(&mut computer, &mut board) {
                Some(report) => {
                    for event in report.diagnostics.iter() {
                        trace_diagnostic(report.time_us, event);
                    }
                }
                None => clock.delay_us(CONSOLE_POLL_US),
            }
            if board.take_restart_request() {
                break true;
            }
            if board.link().is_closed() {
                break false;
            }
        };

        let (returned_link, log, returned_store) = board.into_parts();
        log.into_inner().flush().context("flushing flight log")?;
        if !restart {
            break;
        }
        link = returned_link;
        store = returned_store;
    }
    Ok(())
}
