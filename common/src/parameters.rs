use serde::{Deserialize, Serialize};

use crate::{
    constants::*,
    error::CommonError,
    ics::{ParticleShape, TestCase, TransformBackend},
};

/// Parameters as read from a toml file. Every field may be omitted, in which
/// case the default from [`crate::constants`] is used.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TomlParameters {
    /// Which initial distribution to draw (may instead be given with `-c`)
    pub test_case: Option<TestCase>,
    /// Timestep
    pub dt: f64,
    /// Simulated time at which the run stops
    pub t_max: f64,
    /// Physical length of the periodic domain
    pub axis_length: f64,
    /// Number of spectral grid points (power of two)
    pub n_grid: usize,
    /// Number of macroparticles
    pub n_particles: usize,
    /// Mass of every particle
    pub particle_mass: f64,
    /// Charge of every particle
    pub particle_charge: f64,
    /// Vacuum permittivity
    pub eps_0: f64,
    /// Beam speed for the two-stream case
    pub beam_speed: f64,
    /// Thermal spread of each beam for the two-stream case
    pub beam_spread: f64,
    /// Thermal velocity for the Landau case
    pub thermal_velocity: f64,
    /// Wave periods per system length (Landau and standing cases)
    pub wave_mode: usize,
    /// Density perturbation amplitude (Landau case)
    pub perturbation_amplitude: f64,
    /// Displacement amplitude (standing case)
    pub standing_amplitude: f64,
    /// Seed for the rng used to draw thermal velocities
    pub seed: u64,
    /// Nonuniform transform implementation
    pub backend: TransformBackend,
    /// Interpolation order of the nonuniform transform
    pub nufft_order: usize,
    /// Number of modes written to the mode log
    pub mode_log_max: usize,
    /// Steps between energy diagnostics
    pub energy_stride: usize,
    /// Steps between snapshot dumps
    pub dump_stride: usize,
    /// Particle shape used by the charge filter (a table, so it comes last)
    pub shape: ParticleShape,
}

impl Default for TomlParameters {
    fn default() -> Self {
        TomlParameters {
            test_case: None,
            dt: DEFAULT_DT,
            t_max: DEFAULT_T_MAX,
            axis_length: DEFAULT_AXIS_LENGTH,
            n_grid: DEFAULT_N_GRID,
            n_particles: DEFAULT_N_PARTICLES,
            particle_mass: DEFAULT_PARTICLE_MASS,
            particle_charge: DEFAULT_PARTICLE_CHARGE,
            eps_0: DEFAULT_EPS_0,
            beam_speed: DEFAULT_BEAM_SPEED,
            beam_spread: DEFAULT_BEAM_SPREAD,
            thermal_velocity: DEFAULT_THERMAL_VELOCITY,
            wave_mode: DEFAULT_WAVE_MODE,
            perturbation_amplitude: DEFAULT_PERTURBATION_AMPLITUDE,
            standing_amplitude: DEFAULT_STANDING_AMPLITUDE,
            seed: DEFAULT_SEED,
            backend: TransformBackend::default(),
            nufft_order: DEFAULT_NUFFT_ORDER,
            mode_log_max: DEFAULT_MODE_LOG_MAX,
            energy_stride: DEFAULT_ENERGY_STRIDE,
            dump_stride: DEFAULT_DUMP_STRIDE,
            shape: ParticleShape::default(),
        }
    }
}

impl TomlParameters {
    /// Checks every parameter the simulation relies on. This is run before
    /// any simulation state is allocated.
    pub fn validate(&self) -> Result<TestCase, CommonError> {
        let test_case = self.test_case.ok_or(CommonError::MissingTestCase)?;

        fn invalid(name: &'static str, msg: String) -> CommonError {
            CommonError::InvalidParameter { name, msg }
        }

        if !(self.dt > 0.0) {
            return Err(invalid("dt", format!("timestep must be positive, got {}", self.dt)));
        }
        if !(self.t_max >= 0.0) {
            return Err(invalid("t_max", format!("must be non-negative, got {}", self.t_max)));
        }
        if !(self.axis_length > 0.0) {
            return Err(invalid(
                "axis_length",
                format!("must be positive, got {}", self.axis_length),
            ));
        }
        if self.n_grid < 4 || !self.n_grid.is_power_of_two() {
            return Err(invalid(
                "n_grid",
                format!("must be a power of two >= 4, got {}", self.n_grid),
            ));
        }
        if self.n_particles == 0 {
            return Err(invalid("n_particles", "must be nonzero".to_string()));
        }
        if self.particle_mass == 0.0 || !self.particle_mass.is_finite() {
            return Err(invalid(
                "particle_mass",
                format!("must be finite and nonzero, got {}", self.particle_mass),
            ));
        }
        if !(self.eps_0 > 0.0) {
            return Err(invalid("eps_0", format!("must be positive, got {}", self.eps_0)));
        }
        if self.wave_mode == 0 {
            return Err(invalid("wave_mode", "must be nonzero".to_string()));
        }
        if !(self.perturbation_amplitude.abs() < 1.0) {
            return Err(invalid(
                "perturbation_amplitude",
                format!(
                    "|a| must be below 1 for a positive density, got {}",
                    self.perturbation_amplitude
                ),
            ));
        }
        if self.nufft_order == 0 {
            return Err(invalid("nufft_order", "must be nonzero".to_string()));
        }
        if self.energy_stride == 0 {
            return Err(invalid("energy_stride", "must be nonzero".to_string()));
        }
        if self.dump_stride == 0 {
            return Err(invalid("dump_stride", "must be nonzero".to_string()));
        }
        self.shape.validate()?;

        Ok(test_case)
    }
}

/// This function reads toml files
pub fn read_toml(path: &str) -> Result<TomlParameters, CommonError> {
    // Read toml config file
    let toml_contents: &str =
        &std::fs::read_to_string(path).map_err(|_| CommonError::TomlReadError {
            path: path.to_string(),
        })?;

    // Return parsed toml from str
    toml::from_str(toml_contents).map_err(|e| CommonError::TomlParseError {
        msg: format!("{e:?}"),
    })
}

/// Parses the `dt[,tmax]` argument of `-t`. If `tmax` is omitted, `None` is
/// returned in its place and the caller keeps its current value.
pub fn parse_time_pair(s: &str) -> Result<(f64, Option<f64>), CommonError> {
    let err = || CommonError::TimePairParseError {
        input: s.to_string(),
    };

    let mut parts = s.split(',').map(str::trim);
    let dt: f64 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(err)?;
    let t_max: Option<f64> = match parts.next() {
        Some(p) => Some(p.parse().map_err(|_| err())?),
        None => None,
    };
    if parts.next().is_some() {
        return Err(err());
    }

    Ok((dt, t_max))
}

#[test]
fn test_deserialize_partial_toml() {
    let toml_contents = "\
    test_case                   = \"landau\"\n\
    dt                          = 0.01\n\
    n_particles                 = 2000\n\
    \n\
    [shape]\n\
    type = \"Gaussian\"\n\
    sigma = 0.05\n\
    ";

    let toml: TomlParameters = toml::from_str(toml_contents).unwrap();

    assert_eq!(toml.test_case, Some(TestCase::Landau));
    assert_eq!(toml.dt, 0.01);
    assert_eq!(toml.n_particles, 2000);
    assert_eq!(toml.shape, ParticleShape::Gaussian { sigma: 0.05 });

    // Everything else falls back to defaults
    assert_eq!(toml.t_max, DEFAULT_T_MAX);
    assert_eq!(toml.n_grid, DEFAULT_N_GRID);
    assert_eq!(toml.backend, TransformBackend::GaussianGridding);
    assert_eq!(toml.validate(), Ok(TestCase::Landau));
}

#[test]
fn test_serialize_round_trip() {
    let toml = TomlParameters {
        test_case: Some(TestCase::TwoStream),
        backend: TransformBackend::DirectSummation,
        shape: ParticleShape::Triangle { half_width: 0.25 },
        ..Default::default()
    };
    let contents = toml::to_string(&toml).unwrap();
    let parsed: TomlParameters = toml::from_str(&contents).unwrap();
    assert_eq!(parsed, toml);
}

#[test]
fn test_validate_rejects_bad_parameters() {
    let good = TomlParameters {
        test_case: Some(TestCase::TwoStream),
        ..Default::default()
    };
    assert_eq!(good.validate(), Ok(TestCase::TwoStream));

    // No test case
    let params = TomlParameters::default();
    assert_eq!(params.validate(), Err(CommonError::MissingTestCase));

    // Non-positive timestep
    let params = TomlParameters { dt: 0.0, ..good.clone() };
    assert!(matches!(
        params.validate(),
        Err(CommonError::InvalidParameter { name: "dt", .. })
    ));

    // Grid must be a power of two
    let params = TomlParameters { n_grid: 48, ..good.clone() };
    assert!(matches!(
        params.validate(),
        Err(CommonError::InvalidParameter { name: "n_grid", .. })
    ));

    // Density must stay positive
    let params = TomlParameters {
        perturbation_amplitude: 1.0,
        ..good.clone()
    };
    assert!(matches!(
        params.validate(),
        Err(CommonError::InvalidParameter { name: "perturbation_amplitude", .. })
    ));

    // Shapes need a width
    let params = TomlParameters {
        shape: ParticleShape::Gaussian { sigma: 0.0 },
        ..good
    };
    assert!(matches!(
        params.validate(),
        Err(CommonError::InvalidParameter { name: "shape", .. })
    ));
}

#[test]
fn test_parse_time_pair() {
    assert_eq!(parse_time_pair("0.01,30"), Ok((0.01, Some(30.0))));
    assert_eq!(parse_time_pair("0.002"), Ok((0.002, None)));
    assert_eq!(parse_time_pair(" 0.5 , 1 "), Ok((0.5, Some(1.0))));
    assert!(parse_time_pair("abc").is_err());
    assert!(parse_time_pair("0.1,x").is_err());
    assert!(parse_time_pair("0.1,2,3").is_err());
}

#[test]
fn test_read_missing_toml() {
    let path = "definitely/not/a/real/path.toml";
    assert_eq!(
        read_toml(path),
        Err(CommonError::TomlReadError {
            path: path.to_string()
        })
    );
}
