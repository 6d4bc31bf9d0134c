use anyhow::Result;
use log::{debug, warn};
use ndarray_npy::write_npy;
use pif_common::{CommonError, TestCase, TomlParameters};
use std::fs::File;
use std::io::{BufWriter, Stdout, Write};
use std::path::{Path, PathBuf};

use super::{error::RuntimeError, transform::SpectralTransform};
use crate::{
    diagnostics::DiagnosticRecord, fields::FieldSolver, particles::ParticleEnsemble,
    simulation_object::SimulationParameters,
};

/// Receives every energy/momentum record the driver produces
pub trait DiagnosticSink {
    fn record(&mut self, record: &DiagnosticRecord) -> Result<()>;
}

/// Receives the per-mode electrostatic energies once per step
pub trait ModeSink {
    fn record_modes(&mut self, time: f64, energies: &[f64]) -> Result<()>;
}

/// Receives the state once per step. Returning `false` stops the run.
pub trait SnapshotSink {
    fn snapshot(&mut self, snapshot: &Snapshot<'_>) -> Result<bool>;
}

/// Borrowed view of the simulation state handed to a [`SnapshotSink`].
/// Velocities are synchronized with positions at this point of the step.
pub struct Snapshot<'a> {
    pub step: usize,
    pub time: f64,
    pub particles: &'a ParticleEnsemble,
    pub fields: &'a FieldSolver,
    pub transform: &'a dyn SpectralTransform,
}

impl Snapshot<'_> {
    /// Uniform grid the real-space fields are sampled on
    pub fn grid(&self) -> Vec<f64> {
        let dx = self.transform.axis_length() / self.transform.n_grid() as f64;
        (0..self.transform.n_grid()).map(|j| j as f64 * dx).collect()
    }

    pub fn density(&self) -> Result<Vec<f64>, RuntimeError> {
        self.fields.density(self.transform)
    }

    pub fn potential(&self) -> Result<Vec<f64>, RuntimeError> {
        self.fields.potential(self.transform)
    }
}

/// Accepts and discards everything; never asks the run to stop
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn record(&mut self, _record: &DiagnosticRecord) -> Result<()> {
        Ok(())
    }
}

impl ModeSink for NullSink {
    fn record_modes(&mut self, _time: f64, _energies: &[f64]) -> Result<()> {
        Ok(())
    }
}

impl SnapshotSink for NullSink {
    fn snapshot(&mut self, _snapshot: &Snapshot<'_>) -> Result<bool> {
        Ok(true)
    }
}

/// Writes diagnostic records as CSV, with the header before the first row
pub struct ConsoleSink<W: Write = Stdout> {
    writer: W,
    wrote_header: bool,
}

impl ConsoleSink<Stdout> {
    pub fn stdout() -> Self {
        ConsoleSink::new(std::io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(writer: W) -> Self {
        ConsoleSink {
            writer,
            wrote_header: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> DiagnosticSink for ConsoleSink<W> {
    fn record(&mut self, record: &DiagnosticRecord) -> Result<()> {
        if !self.wrote_header {
            writeln!(self.writer, "time,potential,kinetic,total,momentum")?;
            self.wrote_header = true;
        }
        writeln!(
            self.writer,
            "{:.6},{:.6},{:.6},{:.6},{:.6}",
            record.time, record.potential, record.kinetic, record.total, record.momentum
        )?;
        Ok(())
    }
}

/// CSV of per-mode energies, one row per step
pub struct ModeLog<W: Write> {
    writer: W,
}

impl ModeLog<BufWriter<File>> {
    /// Opens the mode log at `path`. A file that cannot be created is logged
    /// and skipped, and the run continues without a mode log.
    pub fn create_or_skip(path: &Path, n_modes: usize) -> Box<dyn ModeSink> {
        match open_log(path).map(|writer| ModeLog::new(writer, n_modes)) {
            Some(Ok(log)) => Box::new(log),
            Some(Err(e)) => {
                warn!("Could not write mode log header to {}: {e}", path.display());
                Box::new(NullSink)
            }
            None => Box::new(NullSink),
        }
    }
}

impl<W: Write> ModeLog<W> {
    pub fn new(mut writer: W, n_modes: usize) -> std::io::Result<Self> {
        write!(writer, "time")?;
        for m in 1..=n_modes {
            write!(writer, ",m{m}")?;
        }
        writeln!(writer)?;
        Ok(ModeLog { writer })
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ModeSink for ModeLog<W> {
    fn record_modes(&mut self, time: f64, energies: &[f64]) -> Result<()> {
        write!(self.writer, "{time:.6}")?;
        for &energy in energies {
            write!(self.writer, ",{}", scientific(energy))?;
        }
        writeln!(self.writer)?;
        Ok(())
    }
}

/// Dumps phase space and real-space fields as `.npy` files every `stride`
/// steps. Never stops the run.
pub struct NpySnapshotWriter {
    dump_dir: PathBuf,
    stride: usize,
}

impl NpySnapshotWriter {
    pub fn new(dump_dir: impl Into<PathBuf>, stride: usize) -> Result<Self, RuntimeError> {
        let dump_dir = dump_dir.into();
        std::fs::create_dir_all(&dump_dir)?;
        Ok(NpySnapshotWriter {
            dump_dir,
            stride: stride.max(1),
        })
    }

    fn path(&self, name: &str, step: usize) -> PathBuf {
        self.dump_dir.join(format!("{name}_{step:06}.npy"))
    }
}

impl SnapshotSink for NpySnapshotWriter {
    fn snapshot(&mut self, snapshot: &Snapshot<'_>) -> Result<bool> {
        if snapshot.step % self.stride != 0 {
            return Ok(true);
        }
        let step = snapshot.step;
        let particles = snapshot.particles;

        write_npy(
            self.path("x", step),
            &ndarray::Array1::from_vec(particles.positions().to_vec()),
        )?;
        write_npy(
            self.path("v", step),
            &ndarray::Array1::from_vec(particles.velocities().to_vec()),
        )?;
        write_npy(
            self.path("tag", step),
            &ndarray::Array1::from_vec(particles.tags().to_vec()),
        )?;
        write_npy(self.path("x_grid", step), &ndarray::Array1::from_vec(snapshot.grid()))?;
        write_npy(self.path("rho", step), &ndarray::Array1::from_vec(snapshot.density()?))?;
        write_npy(self.path("phi", step), &ndarray::Array1::from_vec(snapshot.potential()?))?;
        debug!("Dumped snapshot {step} at t = {:.6}", snapshot.time);

        Ok(true)
    }
}

/// Opens a log file for writing, or warns and returns `None`
pub fn open_log(path: &Path) -> Option<BufWriter<File>> {
    match File::create(path) {
        Ok(file) => Some(BufWriter::new(file)),
        Err(e) => {
            warn!("Could not open {}: {e}; continuing without it", path.display());
            None
        }
    }
}

/// Writes the parameter log, including derived Debye length and plasma
/// frequency
pub fn write_parameter_log<W: Write>(
    writer: &mut W,
    params: &SimulationParameters,
) -> std::io::Result<()> {
    writeln!(writer, " particles: {}", params.n_particles)?;
    writeln!(writer, "  timestep: {}", scientific(params.dt))?;
    writeln!(writer, "    length: {}", scientific(params.axis_length))?;
    writeln!(writer, "    v_beam: {}", scientific(params.beam_speed))?;
    writeln!(writer, "      mass: {}", scientific(params.particle_mass))?;
    writeln!(writer, "    charge: {}", scientific(params.particle_charge))?;
    writeln!(writer, "     eps_0: {}", scientific(params.eps_0))?;
    writeln!(writer)?;
    writeln!(writer, "    lambda: {}", scientific(params.debye_length()))?;
    writeln!(writer, " frequency: {}", scientific(params.plasma_frequency()))?;
    writer.flush()
}

/// Six-digit scientific notation with a signed exponent of at least two
/// digits, e.g. `1.000000e-03`
fn scientific(value: f64) -> String {
    let formatted = format!("{value:.6e}");
    match formatted.split_once('e') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(digits) => ('-', digits),
                None => ('+', exponent),
            };
            format!("{mantissa}e{sign}{digits:0>2}")
        }
        // NaN and inf
        None => formatted,
    }
}

/// Validates `toml` and builds the immutable run parameters from it
pub fn parameters_from_toml(toml: TomlParameters) -> Result<SimulationParameters, CommonError> {
    let test_case: TestCase = toml.validate()?;

    // Highest mode carried by the half spectrum
    let max_mode = toml.n_grid / 2 - 1;
    let mode_log_max = if toml.mode_log_max > max_mode {
        warn!(
            "mode_log_max = {} exceeds the {} modes below Nyquist; clamping",
            toml.mode_log_max, max_mode
        );
        max_mode
    } else {
        toml.mode_log_max
    };

    Ok(SimulationParameters {
        test_case,
        n_grid: toml.n_grid,
        axis_length: toml.axis_length,
        dx: toml.axis_length / toml.n_grid as f64,
        dk: 2.0 * std::f64::consts::PI / toml.axis_length,
        dt: toml.dt,
        t_max: toml.t_max,
        n_particles: toml.n_particles,
        particle_mass: toml.particle_mass,
        particle_charge: toml.particle_charge,
        eps_0: toml.eps_0,
        beam_speed: toml.beam_speed,
        beam_spread: toml.beam_spread,
        thermal_velocity: toml.thermal_velocity,
        wave_mode: toml.wave_mode,
        perturbation_amplitude: toml.perturbation_amplitude,
        standing_amplitude: toml.standing_amplitude,
        seed: toml.seed,
        shape: toml.shape,
        backend: toml.backend,
        nufft_order: toml.nufft_order,
        mode_log_max,
        energy_stride: toml.energy_stride,
        dump_stride: toml.dump_stride,
    })
}

#[cfg(test)]
fn two_stream_toml() -> TomlParameters {
    TomlParameters {
        test_case: Some(TestCase::TwoStream),
        ..Default::default()
    }
}

#[test]
fn test_console_sink_format() {
    let mut sink = ConsoleSink::new(Vec::new());
    sink.record(&DiagnosticRecord::new(0.0, 1.5, 2.25, -0.125)).unwrap();
    sink.record(&DiagnosticRecord::new(0.01, 1.0, 2.0, 0.0)).unwrap();

    let out = String::from_utf8(sink.into_inner()).unwrap();
    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(
        lines,
        [
            "time,potential,kinetic,total,momentum",
            "0.000000,1.500000,2.250000,3.750000,-0.125000",
            "0.010000,1.000000,2.000000,3.000000,0.000000",
        ]
    );
}

#[test]
fn test_mode_log_format() {
    let mut log = ModeLog::new(Vec::new(), 3).unwrap();
    log.record_modes(0.5, &[1.0, 0.25, 0.0]).unwrap();

    let out = String::from_utf8(log.into_inner()).unwrap();
    assert_eq!(
        out,
        "time,m1,m2,m3\n0.500000,1.000000e+00,2.500000e-01,0.000000e+00\n"
    );
}

#[test]
fn test_parameter_log() {
    let params = parameters_from_toml(two_stream_toml()).unwrap();
    let mut out = Vec::new();
    write_parameter_log(&mut out, &params).unwrap();
    let out = String::from_utf8(out).unwrap();

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines[0], " particles: 10000");
    assert_eq!(lines[1], "  timestep: 1.000000e-03");
    assert_eq!(lines[2], "    length: 1.600000e+01");
    assert_eq!(lines[5], "    charge: -2.000000e-02");
    assert_eq!(lines[7], "");
    assert!(lines[8].starts_with("    lambda: "));
    assert!(lines[9].starts_with(" frequency: "));
}

#[test]
fn test_scientific_exponent_is_padded() {
    assert_eq!(scientific(0.001), "1.000000e-03");
    assert_eq!(scientific(0.0), "0.000000e+00");
    assert_eq!(scientific(-123.456), "-1.234560e+02");
    assert_eq!(scientific(1.5e-300), "1.500000e-300");
    assert_eq!(scientific(f64::NAN), "NaN");
}

#[test]
fn test_mode_log_width_is_clamped() {
    let params = parameters_from_toml(TomlParameters {
        n_grid: 16,
        mode_log_max: 32,
        ..two_stream_toml()
    })
    .unwrap();
    assert_eq!(params.mode_log_max, 7);

    let params = parameters_from_toml(two_stream_toml()).unwrap();
    assert_eq!(params.mode_log_max, 31);
}

#[test]
fn test_unopenable_mode_log_is_skipped() {
    let path = Path::new("/definitely/not/a/dir/modes.csv");
    let mut sink = ModeLog::create_or_skip(path, 4);
    assert!(sink.record_modes(0.0, &[0.0; 4]).is_ok());
}

#[test]
fn test_npy_snapshot_writer() {
    use crate::{fields::FieldSolver, ics::initial_conditions, utils::shape::ShapeFilter};
    use crate::utils::transform::DirectSummation;

    let params = parameters_from_toml(TomlParameters {
        n_particles: 64,
        n_grid: 16,
        ..two_stream_toml()
    })
    .unwrap();
    let mut transform = DirectSummation::new(params.n_grid, params.axis_length);
    let shape = ShapeFilter::new(&transform, params.shape).unwrap();
    let mut fields = FieldSolver::new(&params, shape).unwrap();
    let particles = initial_conditions(&params).unwrap();
    fields.compute(&mut transform, particles.positions()).unwrap();

    let dir = std::env::temp_dir().join(format!("pif-snapshots-{}", std::process::id()));
    let mut writer = NpySnapshotWriter::new(&dir, 2).unwrap();
    for step in 0..3 {
        let snapshot = Snapshot {
            step,
            time: step as f64 * params.dt,
            particles: &particles,
            fields: &fields,
            transform: &transform,
        };
        assert!(writer.snapshot(&snapshot).unwrap());
    }

    for name in ["x", "v", "tag", "x_grid", "rho", "phi"] {
        assert!(dir.join(format!("{name}_000000.npy")).exists());
        assert!(dir.join(format!("{name}_000002.npy")).exists());
        assert!(!dir.join(format!("{name}_000001.npy")).exists());
    }

    // Grid matches the sampled fields
    let read = |name: &str| -> ndarray::Array1<f64> {
        ndarray_npy::read_npy(dir.join(format!("{name}_000000.npy"))).unwrap()
    };
    let (grid, rho) = (read("x_grid"), read("rho"));
    assert_eq!(grid.len(), rho.len());
    assert_eq!(grid[1], params.dx);
    std::fs::remove_dir_all(&dir).unwrap();
}
