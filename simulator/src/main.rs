use clap::Parser;
use log::{info, warn, LevelFilter};
use pif_common::{parse_time_pair, read_toml, TestCase, TomlParameters};
use pif_simulator::{
    simulation_object::*,
    utils::io::{
        open_log, parameters_from_toml, write_parameter_log, ConsoleSink, DiagnosticSink, ModeLog,
        ModeSink, NpySnapshotWriter, NullSink, SnapshotSink,
    },
};
use std::error::Error;
use std::path::PathBuf;
use std::time::Instant;

/// One-dimensional electrostatic Particle-in-Fourier plasma simulator
#[derive(Parser)]
#[clap(name = "pif")]
pub struct CommandLineArguments {
    /// Initial distribution: 2stream, landau or standing
    #[clap(long, short = 'c')]
    case: Option<TestCase>,
    /// Timestep and optional stop time, as dt[,tmax]
    #[clap(long, short = 't')]
    time: Option<String>,
    /// Do not write snapshots
    #[clap(long, short)]
    quiet: bool,
    /// Where to write the parameter log
    #[clap(long, short = 'p')]
    param_log: Option<PathBuf>,
    /// Where to write the per-mode energy log
    #[clap(long, short = 'm')]
    mode_log: Option<PathBuf>,
    /// Parameter file; command line options take precedence
    #[clap(long)]
    toml: Option<String>,
    /// Directory for .npy snapshots
    #[clap(long)]
    dump_dir: Option<PathBuf>,
    /// Log level (error, warn, info, debug, trace)
    #[clap(long, short, default_value = "warn")]
    verbosity: LevelFilter,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Parse arguments first so the log level is known
    let args = CommandLineArguments::parse();

    env_logger::builder()
        .format_timestamp_secs()
        .filter_level(args.verbosity)
        .init();

    // Start timer
    let now = Instant::now();

    // File parameters, then command line overrides
    let mut toml: TomlParameters = match args.toml {
        Some(ref path) => read_toml(path)?,
        None => TomlParameters::default(),
    };
    if let Some(case) = args.case {
        toml.test_case = Some(case);
    }
    if let Some(ref time) = args.time {
        let (dt, t_max) = parse_time_pair(time)?;
        toml.dt = dt;
        if let Some(t_max) = t_max {
            toml.t_max = t_max;
        }
    }
    let parameters = parameters_from_toml(toml)?;
    info!("Simulation Parameters\n{parameters}");

    if let Some(ref path) = args.param_log {
        if let Some(mut writer) = open_log(path) {
            if let Err(e) = write_parameter_log(&mut writer, &parameters) {
                warn!("Failed to write parameter log {}: {e}", path.display());
            }
        }
    }

    // Sinks
    let mode_sink: Box<dyn ModeSink> = match args.mode_log {
        Some(ref path) => ModeLog::create_or_skip(path, parameters.mode_log_max),
        None => Box::new(NullSink),
    };
    let snapshot_sink: Box<dyn SnapshotSink> = match args.dump_dir {
        Some(ref dir) if !args.quiet => match NpySnapshotWriter::new(dir, parameters.dump_stride) {
            Ok(writer) => Box::new(writer),
            Err(e) => {
                warn!("Could not use dump directory {}: {e}", dir.display());
                Box::new(NullSink)
            }
        },
        _ => Box::new(NullSink),
    };
    let diagnostic_sink: Box<dyn DiagnosticSink> = Box::new(ConsoleSink::stdout());

    // Draw initial conditions and run
    let mut simulation_object = SimulationObject::new_from_params(parameters)?
        .with_diagnostic_sink(diagnostic_sink)
        .with_mode_sink(mode_sink)
        .with_snapshot_sink(snapshot_sink);
    simulation_object.run()?;

    info!("Finished in {} seconds", now.elapsed().as_secs());

    Ok(())
}

#[test]
fn test_parse_command_line() {
    let args = CommandLineArguments::try_parse_from([
        "pif", "-c", "landau", "-t", "0.01,5", "-q", "-m", "modes.csv", "-v", "info",
    ])
    .unwrap();
    assert_eq!(args.case, Some(TestCase::Landau));
    assert_eq!(args.time.as_deref(), Some("0.01,5"));
    assert!(args.quiet);
    assert_eq!(args.mode_log, Some(PathBuf::from("modes.csv")));
    assert_eq!(args.verbosity, LevelFilter::Info);
    assert!(args.param_log.is_none());

    // Defaults
    let args = CommandLineArguments::try_parse_from(["pif"]).unwrap();
    assert_eq!(args.case, None);
    assert_eq!(args.verbosity, LevelFilter::Warn);

    // Unknown case is rejected by the parser
    assert!(CommandLineArguments::try_parse_from(["pif", "-c", "bump"]).is_err());
}
