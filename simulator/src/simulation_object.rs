use anyhow::Result;
use log::{debug, info, trace};
use pif_common::{ParticleShape, TestCase, TransformBackend};
use std::fmt::Display;
use std::time::Instant;

use crate::{
    diagnostics::{kinetic_energy, momentum, DiagnosticLog, DiagnosticRecord},
    fields::FieldSolver,
    ics::initial_conditions,
    particles::ParticleEnsemble,
    pusher::{Leapfrog, PushDirection},
    utils::{
        error::{check_len, RuntimeError},
        io::{DiagnosticSink, ModeSink, NullSink, Snapshot, SnapshotSink},
        shape::ShapeFilter,
        transform::{DirectSummation, GaussianGridding, SpectralTransform},
    },
};

/// This `SimulationParameters` struct stores the validated, immutable
/// parameters of a run. Build it with
/// [`parameters_from_toml`](crate::utils::io::parameters_from_toml).
#[derive(Clone, Debug, PartialEq)]
pub struct SimulationParameters {
    /// Initial distribution
    pub test_case: TestCase,

    // Grid Parameters
    /// Number of spectral grid points
    pub n_grid: usize,
    /// Physical length of the periodic domain
    pub axis_length: f64,
    /// Spatial cell size
    pub dx: f64,
    /// k-space cell size
    pub dk: f64,

    // Temporal Parameters
    /// Timestep
    pub dt: f64,
    /// Stop time
    pub t_max: f64,

    // Species
    pub n_particles: usize,
    pub particle_mass: f64,
    pub particle_charge: f64,
    pub eps_0: f64,

    // Initial conditions
    pub beam_speed: f64,
    pub beam_spread: f64,
    pub thermal_velocity: f64,
    pub wave_mode: usize,
    pub perturbation_amplitude: f64,
    pub standing_amplitude: f64,
    pub seed: u64,

    // Numerics
    pub shape: ParticleShape,
    pub backend: TransformBackend,
    pub nufft_order: usize,

    // Output
    /// Number of modes in the mode log, at most `G/2 - 1`
    pub mode_log_max: usize,
    pub energy_stride: usize,
    pub dump_stride: usize,
}

impl SimulationParameters {
    pub fn q_over_m(&self) -> f64 {
        self.particle_charge / self.particle_mass
    }

    /// Wavenumber of the initial perturbation
    pub fn wave_number(&self) -> f64 {
        self.wave_mode as f64 * self.dk
    }

    /// `sqrt(n q^2 / (m eps_0))` for the mean density `n = N / L`
    pub fn plasma_frequency(&self) -> f64 {
        let ne2 = self.n_particles as f64 / self.axis_length * self.particle_charge.powi(2);
        (ne2 / (self.particle_mass * self.eps_0)).sqrt()
    }

    /// Debye length, taking the thermal energy from the beam speed for the
    /// two-stream case and from the thermal velocity otherwise
    pub fn debye_length(&self) -> f64 {
        let speed = match self.test_case {
            TestCase::TwoStream => self.beam_speed,
            TestCase::Landau | TestCase::Standing => self.thermal_velocity,
        };
        let kt = self.particle_mass * speed * speed;
        let ne2 = self.n_particles as f64 / self.axis_length * self.particle_charge.powi(2);
        (self.eps_0 * kt / ne2).sqrt()
    }

    /// Builds the nonuniform transform selected by `backend`
    pub fn transform(&self) -> Result<Box<dyn SpectralTransform>, RuntimeError> {
        Ok(match self.backend {
            TransformBackend::GaussianGridding => Box::new(GaussianGridding::new(
                self.n_grid,
                self.axis_length,
                self.nufft_order,
            )?),
            TransformBackend::DirectSummation => {
                Box::new(DirectSummation::new(self.n_grid, self.axis_length))
            }
        })
    }
}

impl Display for SimulationParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{}", "-".repeat(40))?;
        writeln!(f, "test_case       = {}", self.test_case)?;
        writeln!(f, "n_particles     = {}", self.n_particles)?;
        writeln!(f, "n_grid          = {}", self.n_grid)?;
        writeln!(f, "axis_length     = {}", self.axis_length)?;
        writeln!(f, "dx              = {}", self.dx)?;
        writeln!(f, "dk              = {}", self.dk)?;
        writeln!(f, "dt              = {}", self.dt)?;
        writeln!(f, "t_max           = {}", self.t_max)?;
        writeln!(f, "particle_mass   = {}", self.particle_mass)?;
        writeln!(f, "particle_charge = {}", self.particle_charge)?;
        writeln!(f, "eps_0           = {}", self.eps_0)?;
        writeln!(f, "backend         = {:?} (order {})", self.backend, self.nufft_order)?;
        writeln!(f, "shape           = {:?}", self.shape)?;
        writeln!(f, "debye_length    = {:.6e}", self.debye_length())?;
        writeln!(f, "plasma_freq     = {:.6e}", self.plasma_frequency())?;
        writeln!(f, "{}", "-".repeat(40))?;
        Ok(())
    }
}

/// This holds the particles, the spectral field state and the transform, and
/// advances them in time with a kick-drift-kick leapfrog.
///
/// After construction the velocities lag the positions by half a step.
pub struct SimulationObject {
    /// This has the simulation parameters
    pub parameters: SimulationParameters,

    /// Phase space of every particle
    pub particles: ParticleEnsemble,

    /// Spectral charge, potential and field
    pub fields: FieldSolver,

    /// Every record produced so far
    pub diagnostics: DiagnosticLog,

    transform: Box<dyn SpectralTransform>,
    pusher: Leapfrog,

    diagnostic_sink: Box<dyn DiagnosticSink>,
    mode_sink: Box<dyn ModeSink>,
    snapshot_sink: Box<dyn SnapshotSink>,

    step: usize,
    stopped: bool,
}

impl SimulationObject {
    /// Draws the initial ensemble for `parameters.test_case` and bootstraps
    /// the integrator
    pub fn new_from_params(parameters: SimulationParameters) -> Result<Self, RuntimeError> {
        let particles = initial_conditions(&parameters)?;
        SimulationObject::new_from_particles(parameters, particles)
    }

    /// Like [`SimulationObject::new_from_params`] but with a given ensemble
    pub fn new_from_particles(
        parameters: SimulationParameters,
        particles: ParticleEnsemble,
    ) -> Result<Self, RuntimeError> {
        check_len("particles", parameters.n_particles, particles.len())?;

        // Create transform and the filter it builds
        let transform = parameters.transform()?;
        let shape = ShapeFilter::new(transform.as_ref(), parameters.shape)?;
        let fields = FieldSolver::new(&parameters, shape)?;
        let pusher = Leapfrog::new(parameters.dt, parameters.q_over_m(), parameters.axis_length);

        let mut simulation_object = SimulationObject {
            parameters,
            particles,
            fields,
            diagnostics: DiagnosticLog::new(),
            transform,
            pusher,
            diagnostic_sink: Box::new(NullSink),
            mode_sink: Box::new(NullSink),
            snapshot_sink: Box::new(NullSink),
            step: 0,
            stopped: false,
        };
        simulation_object.bootstrap()?;

        Ok(simulation_object)
    }

    pub fn with_diagnostic_sink(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.diagnostic_sink = sink;
        self
    }

    pub fn with_mode_sink(mut self, sink: Box<dyn ModeSink>) -> Self {
        self.mode_sink = sink;
        self
    }

    pub fn with_snapshot_sink(mut self, sink: Box<dyn SnapshotSink>) -> Self {
        self.snapshot_sink = sink;
        self
    }

    /// Solves for the initial field and pushes the velocities back half a step
    fn bootstrap(&mut self) -> Result<(), RuntimeError> {
        self.fields
            .compute(self.transform.as_mut(), self.particles.positions())?;
        self.pusher.half_kick(
            self.particles.velocities_mut(),
            self.fields.e_particles(),
            PushDirection::Backward,
        )?;
        debug!(
            "Bootstrapped {} particles, initial potential energy {:.6e}",
            self.particles.len(),
            self.fields.potential_energy()
        );
        Ok(())
    }

    /// Time of the positions at the start of the next step
    pub fn time(&self) -> f64 {
        self.step as f64 * self.parameters.dt
    }

    /// Number of completed steps
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn transform(&self) -> &dyn SpectralTransform {
        self.transform.as_ref()
    }

    pub fn not_finished(&self) -> bool {
        !self.stopped && self.time() < self.parameters.t_max
    }

    /// Stops the run before the next step
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    /// This function advances the particles and fields by one step.
    pub fn update(&mut self) -> Result<()> {
        let time = self.time();

        // Field at the current positions
        self.fields
            .compute(self.transform.as_mut(), self.particles.positions())?;
        self.mode_sink
            .record_modes(time, self.fields.mode_energies())?;

        // Velocities are synchronized with positions after this kick
        self.pusher.half_kick(
            self.particles.velocities_mut(),
            self.fields.e_particles(),
            PushDirection::Forward,
        )?;

        let keep_going = self.snapshot_sink.snapshot(&Snapshot {
            step: self.step,
            time,
            particles: &self.particles,
            fields: &self.fields,
            transform: self.transform.as_ref(),
        })?;
        if !keep_going {
            debug!("Stop requested at t = {time:.6}");
            self.stopped = true;
        }

        if self.step % self.parameters.energy_stride == 0 {
            let record = DiagnosticRecord::new(
                time,
                self.fields.potential_energy(),
                kinetic_energy(self.particles.velocities(), self.parameters.particle_mass),
                momentum(self.particles.velocities(), self.parameters.particle_mass),
            );
            record.check_finite()?;
            self.diagnostic_sink.record(&record)?;
            self.diagnostics.push(record);
        }

        // Second half of the kick, then drift
        self.pusher.half_kick(
            self.particles.velocities_mut(),
            self.fields.e_particles(),
            PushDirection::Forward,
        )?;
        self.pusher.drift(&mut self.particles);

        self.step += 1;
        trace!("Finished step {} (t = {:.6})", self.step, self.time());

        Ok(())
    }

    /// Steps until `t_max` or until a sink asks to stop; returns the number of
    /// steps taken
    pub fn run(&mut self) -> Result<usize> {
        let start = Instant::now();
        let first_step = self.step;
        while self.not_finished() {
            self.update()?;
        }
        let steps = self.step - first_step;
        info!(
            "Finished {steps} steps to t = {:.6} in {:.3} seconds",
            self.time(),
            start.elapsed().as_secs_f64()
        );
        if let (Some(first), Some(last)) =
            (self.diagnostics.records().first(), self.diagnostics.last())
        {
            info!(
                "Total energy {:.6e} -> {:.6e}, momentum spread {:.3e}",
                first.total,
                last.total,
                self.diagnostics.momentum_spread()
            );
        }
        Ok(steps)
    }
}

#[cfg(test)]
fn small_params(test_case: TestCase) -> SimulationParameters {
    use crate::utils::io::parameters_from_toml;
    use pif_common::TomlParameters;

    parameters_from_toml(TomlParameters {
        test_case: Some(test_case),
        n_particles: 512,
        n_grid: 32,
        dt: 0.01,
        t_max: 0.1,
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_new_sim_parameters() {
    let params = small_params(TestCase::TwoStream);
    assert_eq!(params.dx, 0.5);
    approx::assert_relative_eq!(params.q_over_m(), -4.0);
    approx::assert_relative_eq!(params.wave_number(), std::f64::consts::PI / 4.0);

    // omega_p^2 = (N/L) q^2 / (m eps_0)
    approx::assert_relative_eq!(
        params.plasma_frequency().powi(2),
        512.0 / 16.0 * 0.0004 / 0.005,
        max_relative = 1e-12
    );
    // lambda_D = v / omega_p
    approx::assert_relative_eq!(
        params.debye_length(),
        8.0 / params.plasma_frequency(),
        max_relative = 1e-12
    );
    println!("{}", params);
}

#[test]
fn test_run_stops_at_t_max() {
    let mut simulation_object =
        SimulationObject::new_from_params(small_params(TestCase::Landau)).unwrap();
    assert!(simulation_object.not_finished());

    let steps = simulation_object.run().unwrap();
    assert_eq!(steps, 10);
    assert!(!simulation_object.not_finished());
    assert_eq!(simulation_object.diagnostics.records().len(), 10);
    assert_eq!(simulation_object.diagnostics.records()[0].time, 0.0);
}

#[test]
fn test_snapshot_sink_can_stop_the_run() {
    struct StopAfter(usize);
    impl SnapshotSink for StopAfter {
        fn snapshot(&mut self, snapshot: &Snapshot<'_>) -> Result<bool> {
            assert!(snapshot.particles.len() == 512);
            Ok(snapshot.step + 1 < self.0)
        }
    }

    let mut simulation_object = SimulationObject::new_from_params(small_params(TestCase::TwoStream))
        .unwrap()
        .with_snapshot_sink(Box::new(StopAfter(3)));
    assert_eq!(simulation_object.run().unwrap(), 3);
    assert!(!simulation_object.not_finished());
}

#[test]
fn test_bootstrap_staggers_velocities() {
    let params = small_params(TestCase::Standing);
    let particles = initial_conditions(&params).unwrap();
    let v0 = particles.velocities().to_vec();
    let simulation_object =
        SimulationObject::new_from_particles(params.clone(), particles).unwrap();

    // v(-dt/2) = v(0) - (q/m) E dt/2
    let e = simulation_object.fields.e_particles();
    for ((v, v0), e) in simulation_object.particles.velocities().iter().zip(&v0).zip(e) {
        let expected = v0 - 0.5 * params.q_over_m() * params.dt * e;
        approx::assert_abs_diff_eq!(*v, expected, epsilon = 1e-12);
    }

    // Ensemble must match the configured particle count
    let wrong = ParticleEnsemble::new(vec![0.0], vec![0.0], vec![0]).unwrap();
    assert!(SimulationObject::new_from_particles(params, wrong).is_err());
}
