use log::debug;
use pif_common::TestCase;
use rand::prelude::*;
use rand_distr::StandardNormal;

use crate::{
    particles::ParticleEnsemble, pusher::wrap, simulation_object::SimulationParameters,
    utils::error::RuntimeError,
};

/// Display tag of the forward beam
pub const TAG_RED: u32 = 0xff0000;
/// Display tag of the backward beam and of single-species ensembles
pub const TAG_BLUE: u32 = 0x0000ff;

const NEWTON_TOLERANCE: f64 = 1e-9;
const NEWTON_MAX_ITERATIONS: usize = 100;

/// Draws the initial ensemble for the configured test case, using an rng
/// seeded from the parameters so that runs are reproducible.
pub fn initial_conditions(params: &SimulationParameters) -> Result<ParticleEnsemble, RuntimeError> {
    let mut rng = StdRng::seed_from_u64(params.seed);
    debug!(
        "Drawing {} particles for the {} case with seed {}",
        params.n_particles, params.test_case, params.seed
    );

    match params.test_case {
        TestCase::TwoStream => two_stream(params, &mut rng),
        TestCase::Landau => landau(params, &mut rng),
        TestCase::Standing => standing(params),
    }
}

/// Two counter-propagating cold beams on an evenly spaced lattice. Odd
/// particles move at `+v_b`, even ones at `-v_b`, each with a small gaussian
/// spread.
pub fn two_stream<R: Rng + ?Sized>(
    params: &SimulationParameters,
    rng: &mut R,
) -> Result<ParticleEnsemble, RuntimeError> {
    let n = params.n_particles;
    let mut x = Vec::with_capacity(n);
    let mut v = Vec::with_capacity(n);
    let mut tag = Vec::with_capacity(n);

    for i in 0..n {
        x.push(i as f64 * params.axis_length / n as f64);

        let (speed, color) = if i % 2 == 1 {
            (params.beam_speed, TAG_RED)
        } else {
            (-params.beam_speed, TAG_BLUE)
        };
        let noise: f64 = rng.sample(StandardNormal);
        v.push(speed + params.beam_spread * noise);
        tag.push(color);
    }

    ParticleEnsemble::new(x, v, tag)
}

/// Maxwellian velocities with a `1 + a cos(k x)` density, sampled by inverting
/// the position CDF at evenly spaced quantiles.
pub fn landau<R: Rng + ?Sized>(
    params: &SimulationParameters,
    rng: &mut R,
) -> Result<ParticleEnsemble, RuntimeError> {
    let n = params.n_particles;
    let k = params.wave_number();

    let x = (0..n)
        .map(|i| {
            invert_perturbed_cdf(
                i as f64 / n as f64,
                k,
                params.perturbation_amplitude,
                params.axis_length,
            )
        })
        .collect::<Result<Vec<f64>, RuntimeError>>()?;
    let v = (0..n)
        .map(|_| params.thermal_velocity * rng.sample::<f64, _>(StandardNormal))
        .collect();

    ParticleEnsemble::new(x, v, vec![TAG_BLUE; n])
}

/// Lattice displaced by a single cosine mode, with the velocities of the
/// matching standing plasma oscillation. Deterministic.
pub fn standing(params: &SimulationParameters) -> Result<ParticleEnsemble, RuntimeError> {
    let n = params.n_particles;
    let axis_length = params.axis_length;
    let k = params.wave_number();
    let amplitude = params.standing_amplitude;
    let omega_p = params.plasma_frequency();

    let mut x = Vec::with_capacity(n);
    let mut v = Vec::with_capacity(n);
    for i in 0..n {
        let lattice = i as f64 * axis_length / n as f64;
        let displaced = lattice + amplitude / k * (k * lattice).cos();

        // Velocity uses the displaced position
        v.push(amplitude * omega_p / k * (k * displaced).sin());
        x.push(wrap(displaced, axis_length));
    }

    ParticleEnsemble::new(x, v, vec![TAG_BLUE; n])
}

/// Solves `x/L + a/(kL) sin(kx) - u = 0` for `x` with Newton's method,
/// starting from `x = uL`.
pub fn invert_perturbed_cdf(
    u: f64,
    k: f64,
    amplitude: f64,
    axis_length: f64,
) -> Result<f64, RuntimeError> {
    let cdf = |x: f64| x / axis_length + amplitude / (k * axis_length) * (k * x).sin() - u;
    let derivative = |x: f64| (1.0 + amplitude * (k * x).cos()) / axis_length;

    let mut x = u * axis_length;
    let mut f = cdf(x);
    let mut iterations = 0;
    while f.abs() > NEWTON_TOLERANCE {
        if iterations == NEWTON_MAX_ITERATIONS || !f.is_finite() {
            return Err(RuntimeError::RootFindingDiverged { u, iterations });
        }
        x -= f / derivative(x);
        f = cdf(x);
        iterations += 1;
    }

    Ok(x)
}

#[cfg(test)]
fn test_params(test_case: TestCase, n_particles: usize) -> SimulationParameters {
    use crate::utils::io::parameters_from_toml;
    use pif_common::TomlParameters;

    parameters_from_toml(TomlParameters {
        test_case: Some(test_case),
        n_particles,
        ..Default::default()
    })
    .unwrap()
}

#[test]
fn test_two_stream_beams() {
    let params = test_params(TestCase::TwoStream, 10_000);
    let particles = initial_conditions(&params).unwrap();

    assert_eq!(particles.len(), 10_000);
    assert_eq!(particles.positions()[1], params.axis_length / 10_000.0);

    // Half the particles in each beam
    let forward = particles.tags().iter().filter(|&&t| t == TAG_RED).count();
    assert_eq!(forward, 5_000);
    for (i, (&v, &tag)) in particles.velocities().iter().zip(particles.tags()).enumerate() {
        let (speed, color) = if i % 2 == 1 { (8.0, TAG_RED) } else { (-8.0, TAG_BLUE) };
        assert_eq!(tag, color);
        assert!((v - speed).abs() < 10.0 * params.beam_spread);
    }

    // Same seed, same ensemble
    assert_eq!(initial_conditions(&params).unwrap(), particles);
}

#[test]
fn test_landau_density_follows_perturbation() {
    let params = test_params(TestCase::Landau, 20_000);
    let particles = initial_conditions(&params).unwrap();
    let axis_length = params.axis_length;
    let k = params.wave_number();
    let a = params.perturbation_amplitude;

    assert!(particles.positions().iter().all(|&x| (0.0..axis_length).contains(&x)));
    assert!(particles.positions().windows(2).all(|w| w[0] <= w[1]));

    // Every position satisfies the CDF equation
    for (i, &x) in particles.positions().iter().enumerate().step_by(997) {
        let u = i as f64 / 20_000.0;
        let f = x / axis_length + a / (k * axis_length) * (k * x).sin() - u;
        assert!(f.abs() <= NEWTON_TOLERANCE);
    }

    // Sample velocity variance is close to v_th^2
    let v = particles.velocities();
    let var = v.iter().map(|v| v * v).sum::<f64>() / v.len() as f64;
    approx::assert_relative_eq!(var, params.thermal_velocity.powi(2), max_relative = 0.05);
}

#[test]
fn test_standing_wave_is_deterministic() {
    let params = test_params(TestCase::Standing, 1_000);
    let first = initial_conditions(&params).unwrap();
    let second = standing(&params).unwrap();
    assert_eq!(first, second);
    assert!(first.positions().iter().all(|&x| (0.0..params.axis_length).contains(&x)));

    // Particle 0 is displaced by A L / (2 pi m)
    let k = params.wave_number();
    approx::assert_abs_diff_eq!(
        first.positions()[0],
        params.standing_amplitude / k,
        epsilon = 1e-12
    );
    let omega_p = params.plasma_frequency();
    approx::assert_abs_diff_eq!(
        first.velocities()[0],
        params.standing_amplitude * omega_p / k * (k * first.positions()[0]).sin(),
        epsilon = 1e-12
    );
}

#[test]
fn test_newton_guard() {
    let axis_length = 16.0;
    let k = 2.0 * std::f64::consts::PI * 2.0 / axis_length;
    assert!(invert_perturbed_cdf(0.3, k, 0.25, axis_length).is_ok());
    assert_eq!(invert_perturbed_cdf(0.0, k, 0.25, axis_length).unwrap(), 0.0);

    // Infinite amplitude never converges
    assert!(matches!(
        invert_perturbed_cdf(0.3, k, f64::INFINITY, axis_length),
        Err(RuntimeError::RootFindingDiverged { .. })
    ));
}
