use num::Complex;
use pif_common::{ParticleShape, TestCase, TomlParameters};
use pif_simulator::{simulation_object::SimulationObject, utils::io::parameters_from_toml};

/// Checks the per-step invariants: neutral charge, Hermitian field spectrum
/// and every particle inside the box.
fn check_every_step(toml: TomlParameters) {
    let params = parameters_from_toml(toml).unwrap();
    let axis_length = params.axis_length;
    let mut simulation_object = SimulationObject::new_from_params(params).unwrap();

    while simulation_object.not_finished() {
        simulation_object.update().unwrap();

        assert_eq!(simulation_object.fields.rho_k()[0], Complex::new(0.0, 0.0));
        assert_eq!(simulation_object.fields.phi_k()[0], Complex::new(0.0, 0.0));
        assert!(simulation_object.fields.field_spectrum_is_hermitian());
        assert!(simulation_object
            .particles
            .positions()
            .iter()
            .all(|&x| (0.0..axis_length).contains(&x)));
    }
    assert!(simulation_object.step() > 0);
}

#[test]
fn standing_wave_invariants() {
    check_every_step(TomlParameters {
        test_case: Some(TestCase::Standing),
        n_particles: 1024,
        n_grid: 32,
        dt: 0.01,
        t_max: 0.5,
        ..Default::default()
    });
}

#[test]
fn fast_two_stream_wraps_every_step() {
    // Beams cross the box in a handful of steps
    check_every_step(TomlParameters {
        test_case: Some(TestCase::TwoStream),
        n_particles: 500,
        n_grid: 16,
        beam_speed: 400.0,
        dt: 0.01,
        t_max: 0.3,
        shape: ParticleShape::Gaussian { sigma: 0.2 },
        ..Default::default()
    });
}

#[test]
fn landau_with_triangle_shape_invariants() {
    check_every_step(TomlParameters {
        test_case: Some(TestCase::Landau),
        n_particles: 2000,
        n_grid: 64,
        dt: 0.01,
        t_max: 0.2,
        shape: ParticleShape::Triangle { half_width: 0.5 },
        ..Default::default()
    });
}
