use rayon::prelude::*;

use crate::utils::error::RuntimeError;

/// Total kinetic energy `(m/2) sum v^2`
pub fn kinetic_energy(velocities: &[f64], particle_mass: f64) -> f64 {
    0.5 * particle_mass * velocities.par_iter().map(|v| v * v).sum::<f64>()
}

/// Total momentum `m sum v`
pub fn momentum(velocities: &[f64], particle_mass: f64) -> f64 {
    particle_mass * velocities.par_iter().sum::<f64>()
}

/// One row of the energy/momentum history
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DiagnosticRecord {
    pub time: f64,
    pub potential: f64,
    pub kinetic: f64,
    pub total: f64,
    pub momentum: f64,
}

impl DiagnosticRecord {
    pub fn new(time: f64, potential: f64, kinetic: f64, momentum: f64) -> Self {
        DiagnosticRecord {
            time,
            potential,
            kinetic,
            total: potential + kinetic,
            momentum,
        }
    }

    /// Fails if any quantity is NaN or infinite
    pub fn check_finite(&self) -> Result<(), RuntimeError> {
        let values = [self.potential, self.kinetic, self.total, self.momentum];
        if values.iter().all(|v| v.is_finite()) {
            Ok(())
        } else {
            Err(RuntimeError::NanOrInf { time: self.time })
        }
    }
}

/// Append-only history of diagnostic records
#[derive(Clone, Debug, Default)]
pub struct DiagnosticLog {
    records: Vec<DiagnosticRecord>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: DiagnosticRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[DiagnosticRecord] {
        &self.records
    }

    pub fn last(&self) -> Option<&DiagnosticRecord> {
        self.records.last()
    }

    /// Largest minus smallest momentum seen so far
    pub fn momentum_spread(&self) -> f64 {
        spread(self.records.iter().map(|r| r.momentum))
    }

    /// Largest minus smallest total energy seen so far
    pub fn energy_spread(&self) -> f64 {
        spread(self.records.iter().map(|r| r.total))
    }
}

fn spread(values: impl Iterator<Item = f64>) -> f64 {
    let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if min <= max {
        max - min
    } else {
        0.0
    }
}

#[test]
fn test_kinetic_energy_and_momentum() {
    use approx::assert_relative_eq;

    let v = [1.0, -2.0, 3.0];
    assert_relative_eq!(kinetic_energy(&v, 0.5), 0.25 * 14.0);
    assert_relative_eq!(momentum(&v, 0.5), 1.0);

    // Counter-streaming beams carry no net momentum
    let beams: Vec<f64> = (0..1000)
        .map(|i| if i % 2 == 0 { -8.0 } else { 8.0 })
        .collect();
    assert_eq!(momentum(&beams, 0.005), 0.0);
}

#[test]
fn test_diagnostic_log() {
    let mut log = DiagnosticLog::new();
    assert_eq!(log.momentum_spread(), 0.0);

    log.push(DiagnosticRecord::new(0.0, 1.0, 2.0, 0.1));
    log.push(DiagnosticRecord::new(0.1, 1.5, 1.4, -0.1));
    assert_eq!(log.records().len(), 2);
    assert_eq!(log.last().map(|r| r.time), Some(0.1));
    approx::assert_abs_diff_eq!(log.momentum_spread(), 0.2, epsilon = 1e-15);
    approx::assert_abs_diff_eq!(log.energy_spread(), 0.1, epsilon = 1e-15);

    let bad = DiagnosticRecord::new(0.2, f64::NAN, 1.0, 0.0);
    assert!(matches!(
        bad.check_finite(),
        Err(RuntimeError::NanOrInf { time }) if time == 0.2
    ));
}
