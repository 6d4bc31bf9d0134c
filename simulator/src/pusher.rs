use rayon::prelude::*;

use crate::{
    particles::ParticleEnsemble,
    utils::error::{check_len, RuntimeError},
};

/// Direction of a half-step velocity kick
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushDirection {
    /// `v += (q/m) E dt/2`
    Forward,
    /// `v -= (q/m) E dt/2`, used once to stagger the initial velocities
    Backward,
}

/// Leapfrog integrator for a single species in a periodic box
#[derive(Clone, Copy, Debug)]
pub struct Leapfrog {
    pub dt: f64,
    pub q_over_m: f64,
    pub axis_length: f64,
}

impl Leapfrog {
    pub fn new(dt: f64, q_over_m: f64, axis_length: f64) -> Self {
        Leapfrog {
            dt,
            q_over_m,
            axis_length,
        }
    }

    /// Half-step velocity update from the field at each particle
    pub fn half_kick(
        &self,
        velocities: &mut [f64],
        e_field: &[f64],
        direction: PushDirection,
    ) -> Result<(), RuntimeError> {
        check_len("e_field", velocities.len(), e_field.len())?;

        let kick = match direction {
            PushDirection::Forward => 0.5 * self.q_over_m * self.dt,
            PushDirection::Backward => -0.5 * self.q_over_m * self.dt,
        };
        velocities
            .par_iter_mut()
            .zip(e_field.par_iter())
            .for_each(|(v, e)| *v += kick * e);

        Ok(())
    }

    /// Full-step position update, wrapping every particle back into `[0, L)`
    pub fn drift(&self, particles: &mut ParticleEnsemble) {
        let (dt, axis_length) = (self.dt, self.axis_length);
        let (x, v) = particles.phase_space_mut();
        x.par_iter_mut().zip(v.par_iter()).for_each(|(x, v)| {
            *x = wrap(*x + v * dt, axis_length);
        });
    }
}

/// Maps `x` into `[0, L)` assuming it is at most one period outside
#[inline]
pub fn wrap(x: f64, axis_length: f64) -> f64 {
    if x < 0.0 {
        let wrapped = x + axis_length;
        // x slightly below zero rounds up to exactly L
        if wrapped >= axis_length {
            0.0
        } else {
            wrapped
        }
    } else if x >= axis_length {
        x - axis_length
    } else {
        x
    }
}

#[test]
fn test_drift_wraps_into_domain() {
    let axis_length = 16.0;
    let pusher = Leapfrog::new(0.1, -4.0, axis_length);

    let mut particles = ParticleEnsemble::new(
        vec![0.05, 15.95, 8.0, 0.0],
        vec![-1.0, 1.0, 2.0, -1e-20],
        vec![0; 4],
    )
    .unwrap();
    pusher.drift(&mut particles);

    let x = particles.positions();
    approx::assert_abs_diff_eq!(x[0], 15.95, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(x[1], 0.05, epsilon = 1e-12);
    approx::assert_abs_diff_eq!(x[2], 8.2, epsilon = 1e-12);
    assert!(x.iter().all(|&x| (0.0..axis_length).contains(&x)));
}

#[test]
fn test_half_kicks_cancel() {
    let pusher = Leapfrog::new(0.01, -4.0, 16.0);
    let e_field = [1.0, -2.0, 0.5];
    let mut v = vec![0.0, 1.0, -1.0];

    // Negative charge is pushed against the field
    pusher.half_kick(&mut v, &e_field, PushDirection::Forward).unwrap();
    approx::assert_abs_diff_eq!(v[0], -0.02, epsilon = 1e-15);
    approx::assert_abs_diff_eq!(v[1], 1.04, epsilon = 1e-15);

    pusher.half_kick(&mut v, &e_field, PushDirection::Backward).unwrap();
    approx::assert_abs_diff_eq!(v[0], 0.0, epsilon = 1e-15);
    approx::assert_abs_diff_eq!(v[2], -1.0, epsilon = 1e-15);

    assert!(pusher
        .half_kick(&mut v, &e_field[..2], PushDirection::Forward)
        .is_err());
}
