/// Default timestep
pub const DEFAULT_DT: f64 = 0.001;

/// Default simulated time at which the run stops
pub const DEFAULT_T_MAX: f64 = 20.0;

/// Default system length
pub const DEFAULT_AXIS_LENGTH: f64 = 16.0;

/// Default number of spectral grid points (must be a power of two)
pub const DEFAULT_N_GRID: usize = 64;

/// Default number of macroparticles
pub const DEFAULT_N_PARTICLES: usize = 10_000;

// Species (uniform, shared by every particle)
pub const DEFAULT_PARTICLE_MASS: f64 = 0.005;
pub const DEFAULT_PARTICLE_CHARGE: f64 = -0.02;
pub const DEFAULT_EPS_0: f64 = 1.0;

/// Beam speed used by the two-stream test case
pub const DEFAULT_BEAM_SPEED: f64 = 8.0;

/// Thermal spread added on top of each beam, sqrt(kT/m) for kT = 500 eV, m = 511 keV
pub const DEFAULT_BEAM_SPREAD: f64 = 0.031_311_214_554_257_48;

/// Thermal velocity sqrt(kT/m) used by the Landau test case
pub const DEFAULT_THERMAL_VELOCITY: f64 = 3.5;

/// Wave periods per system length for the standing wave and Landau damping
pub const DEFAULT_WAVE_MODE: usize = 2;

/// Density perturbation amplitude for Landau damping
pub const DEFAULT_PERTURBATION_AMPLITUDE: f64 = 0.25;

/// Displacement amplitude for the standing wave
pub const DEFAULT_STANDING_AMPLITUDE: f64 = 0.3;

/// Number of modes written to the mode log
pub const DEFAULT_MODE_LOG_MAX: usize = 32;

/// Interpolation order of the nonuniform transform
pub const DEFAULT_NUFFT_ORDER: usize = 5;

/// Energy diagnostics are emitted every this many steps
pub const DEFAULT_ENERGY_STRIDE: usize = 1;

/// Snapshots are dumped every this many steps
pub const DEFAULT_DUMP_STRIDE: usize = 100;

/// Seed for the initial condition rng
pub const DEFAULT_SEED: u64 = 0;
