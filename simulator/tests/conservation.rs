use pif_common::{TestCase, TomlParameters, TransformBackend};
use pif_simulator::{
    simulation_object::{SimulationObject, SimulationParameters},
    utils::io::parameters_from_toml,
};

fn parameters(toml: TomlParameters) -> SimulationParameters {
    parameters_from_toml(toml).expect("valid parameters")
}

#[test]
fn two_stream_conserves_momentum() {
    let params = parameters(TomlParameters {
        test_case: Some(TestCase::TwoStream),
        n_particles: 1000,
        n_grid: 32,
        dt: 0.01,
        t_max: 1.0,
        backend: TransformBackend::DirectSummation,
        ..Default::default()
    });
    let scale = params.particle_mass * params.beam_speed * params.n_particles as f64;

    let mut simulation_object = SimulationObject::new_from_params(params).unwrap();
    simulation_object.run().unwrap();

    let log = &simulation_object.diagnostics;
    assert!(log.records().len() > 90);
    assert!(
        log.momentum_spread() < 1e-6 * scale,
        "momentum moved by {}",
        log.momentum_spread()
    );
}

#[test]
fn two_stream_energy_drift_is_bounded() {
    // Default beams run long enough for the instability to saturate
    let params = parameters(TomlParameters {
        test_case: Some(TestCase::TwoStream),
        ..Default::default()
    });
    assert_eq!(params.t_max, 20.0);

    let mut simulation_object = SimulationObject::new_from_params(params).unwrap();
    simulation_object.run().unwrap();

    let records = simulation_object.diagnostics.records();
    let initial = records[0].total;
    let initial_kinetic = records[0].kinetic;

    // Beam energy is exchanged with the field, not just carried along
    let peak_potential = records.iter().map(|r| r.potential).fold(0.0, f64::max);
    let least_kinetic = records.iter().map(|r| r.kinetic).fold(f64::INFINITY, f64::min);
    assert!(
        peak_potential > 0.05 * initial_kinetic,
        "potential energy peaked at {peak_potential} of {initial_kinetic}"
    );
    assert!(least_kinetic < 0.95 * initial_kinetic);

    for record in records {
        let drift = (record.total - initial).abs() / initial.abs();
        assert!(drift < 0.01, "energy drift {drift} at t = {}", record.time);
    }
}

#[test]
fn landau_mode_energy_decays() {
    let params = parameters(TomlParameters {
        test_case: Some(TestCase::Landau),
        dt: 0.01,
        t_max: 1.5,
        ..Default::default()
    });
    assert_eq!(params.wave_mode, 2);

    let mut simulation_object = SimulationObject::new_from_params(params).unwrap();

    // Mode 2 energy at each step
    let mut history = vec![];
    while simulation_object.not_finished() {
        let time = simulation_object.time();
        simulation_object.update().unwrap();
        history.push((time, simulation_object.fields.mode_energies()[1]));
    }

    let initial = history[0].1;
    let late_peak = history
        .iter()
        .filter(|(t, _)| *t >= 1.0)
        .map(|(_, e)| *e)
        .fold(0.0, f64::max);

    // The perturbation dominates every other mode at first
    let energies = simulation_object.fields.mode_energies();
    assert!(initial > 0.0);
    assert!(energies.iter().all(|e| e.is_finite()));
    assert!(
        late_peak < 0.8 * initial,
        "mode 2 energy went from {initial} to {late_peak}"
    );
}
