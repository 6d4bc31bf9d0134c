use num::Complex;
use std::f64::consts::PI;

use crate::{
    simulation_object::SimulationParameters,
    utils::{
        error::{check_len, RuntimeError},
        shape::ShapeFilter,
        transform::{Sign, SpectralTransform, Weights},
    },
};

/// Spectral field state and the buffers reused every step.
///
/// `rho_k` and `phi_k` hold modes `0..G/2`. `e_k` is the full, centered field
/// spectrum (entry `G/2 + j` is mode `j`) handed to the inverse transform.
pub struct FieldSolver {
    axis_length: f64,
    n_grid: usize,
    charge: f64,
    eps_0: f64,
    shape: ShapeFilter,

    // Raw charge counts from the forward transform
    counts: Vec<Complex<f64>>,
    rho_k: Vec<Complex<f64>>,
    phi_k: Vec<Complex<f64>>,
    e_k: Vec<Complex<f64>>,

    // Per-particle interpolation output
    e_interp: Vec<Complex<f64>>,
    e_particles: Vec<f64>,

    potential_energy: f64,
    mode_energies: Vec<f64>,
}

impl FieldSolver {
    pub fn new(params: &SimulationParameters, shape: ShapeFilter) -> Result<Self, RuntimeError> {
        let n_grid = params.n_grid;
        check_len("shape filter", n_grid / 2, shape.len())?;

        let zeros = |n| vec![Complex::new(0.0, 0.0); n];
        Ok(FieldSolver {
            axis_length: params.axis_length,
            n_grid,
            charge: params.particle_charge,
            eps_0: params.eps_0,
            shape,
            counts: zeros(n_grid / 2),
            rho_k: zeros(n_grid / 2),
            phi_k: zeros(n_grid / 2),
            e_k: zeros(n_grid),
            e_interp: zeros(params.n_particles),
            e_particles: vec![0.0; params.n_particles],
            potential_energy: 0.0,
            mode_energies: vec![0.0; params.mode_log_max],
        })
    }

    /// Deposits the charge of every particle directly into `rho_k`, smooths it
    /// with the shape filter and removes the neutralizing background (mode 0).
    pub fn deposit(
        &mut self,
        transform: &mut dyn SpectralTransform,
        positions: &[f64],
    ) -> Result<(), RuntimeError> {
        transform.forward_nonuniform(positions, Weights::Unit, Sign::Negative, &mut self.counts)?;

        let scale = self.charge / self.n_grid as f64;
        for ((rho, count), s) in self
            .rho_k
            .iter_mut()
            .zip(&self.counts)
            .zip(self.shape.coefficients())
        {
            *rho = *count * scale * *s;
        }

        // Background
        self.rho_k[0] = Complex::new(0.0, 0.0);

        Ok(())
    }

    /// Solves for `phi_k` and the field spectrum mode by mode and returns the
    /// electrostatic potential energy.
    pub fn solve_fields(&mut self) -> f64 {
        let half = self.n_grid / 2;
        let dx = self.shape.dx();

        self.phi_k[0] = Complex::new(0.0, 0.0);
        for j in 1..half {
            let k = 2.0 * PI * j as f64 / self.axis_length;

            // Poisson, then the normalized shape once more
            let phi = self.rho_k[j] / (k * k * self.eps_0) * self.shape[j] * dx;
            self.phi_k[j] = phi;

            // E = -d(phi)/dx, i.e. E_k = -i k phi_k
            self.e_k[half + j] = Complex::new(k * phi.im, -k * phi.re);
        }

        // Discrete analogue of (1/2) integral of phi rho over both signs of k
        let mode_energy = |j: usize| {
            let (phi, rho) = (self.phi_k[j], self.rho_k[j]);
            self.axis_length * (phi.re * rho.re + phi.im * rho.im)
        };
        self.potential_energy = (1..half).map(mode_energy).sum();
        for (j, energy) in (1..).zip(self.mode_energies.iter_mut()) {
            *energy = mode_energy(j);
        }

        self.potential_energy
    }

    /// Fills in the negative half of the field spectrum so that it is
    /// Hermitian, evaluates it at every particle and returns the real field.
    pub fn interpolate_field(
        &mut self,
        transform: &mut dyn SpectralTransform,
        positions: &[f64],
    ) -> Result<&[f64], RuntimeError> {
        let half = self.n_grid / 2;

        // Zero mode and Nyquist carry no field
        self.e_k[half] = Complex::new(0.0, 0.0);
        self.e_k[0] = Complex::new(0.0, 0.0);
        for j in 1..half {
            self.e_k[half - j] = self.e_k[half + j].conj();
        }

        if self.e_interp.len() != positions.len() {
            self.e_interp.resize(positions.len(), Complex::new(0.0, 0.0));
            self.e_particles.resize(positions.len(), 0.0);
        }
        transform.inverse_nonuniform(&self.e_k, positions, Sign::Positive, &mut self.e_interp)?;
        for (e, z) in self.e_particles.iter_mut().zip(&self.e_interp) {
            *e = z.re;
        }

        Ok(&self.e_particles)
    }

    /// Deposit, solve and interpolate at the current positions
    pub fn compute(
        &mut self,
        transform: &mut dyn SpectralTransform,
        positions: &[f64],
    ) -> Result<(), RuntimeError> {
        self.deposit(transform, positions)?;
        self.solve_fields();
        self.interpolate_field(transform, positions)?;
        Ok(())
    }

    /// Checks `E(-k) == conj(E(k))` for every mode of the full field spectrum
    pub fn field_spectrum_is_hermitian(&self) -> bool {
        let half = self.n_grid / 2;
        self.e_k[half].norm() == 0.0
            && (1..half).all(|j| self.e_k[half - j] == self.e_k[half + j].conj())
    }

    /// Real-space charge density on the uniform grid
    pub fn density(&self, transform: &dyn SpectralTransform) -> Result<Vec<f64>, RuntimeError> {
        transform.uniform_inverse_fft(&self.rho_k)
    }

    /// Real-space potential on the uniform grid
    pub fn potential(&self, transform: &dyn SpectralTransform) -> Result<Vec<f64>, RuntimeError> {
        transform.uniform_inverse_fft(&self.phi_k)
    }

    pub fn rho_k(&self) -> &[Complex<f64>] {
        &self.rho_k
    }

    pub fn phi_k(&self) -> &[Complex<f64>] {
        &self.phi_k
    }

    pub fn e_k(&self) -> &[Complex<f64>] {
        &self.e_k
    }

    /// Field at each particle from the last interpolation
    pub fn e_particles(&self) -> &[f64] {
        &self.e_particles
    }

    /// Potential energy from the last solve
    pub fn potential_energy(&self) -> f64 {
        self.potential_energy
    }

    /// Electrostatic energy of modes `1..=M` from the last solve. Each entry
    /// is scaled by `L` like [`FieldSolver::potential_energy`], so with
    /// `M = G/2 - 1` the entries sum to the total.
    pub fn mode_energies(&self) -> &[f64] {
        &self.mode_energies
    }
}

#[cfg(test)]
fn test_solver(
    n_particles: usize,
    n_grid: usize,
    charge: f64,
) -> (FieldSolver, Box<dyn SpectralTransform>) {
    use crate::utils::{io::parameters_from_toml, transform::DirectSummation};
    use pif_common::{TestCase, TomlParameters};

    let params = parameters_from_toml(TomlParameters {
        test_case: Some(TestCase::TwoStream),
        n_particles,
        n_grid,
        particle_charge: charge,
        ..Default::default()
    })
    .unwrap();
    let transform = DirectSummation::new(n_grid, params.axis_length);
    let shape = ShapeFilter::new(&transform, params.shape).unwrap();
    (FieldSolver::new(&params, shape).unwrap(), Box::new(transform))
}

#[test]
fn test_deposit_removes_background() {
    let positions: Vec<f64> = (0..100).map(|i| (i as f64 * 0.37) % 16.0).collect();
    let (mut solver, mut transform) = test_solver(positions.len(), 32, -0.02);

    solver.deposit(transform.as_mut(), &positions).unwrap();
    assert_eq!(solver.rho_k()[0], Complex::new(0.0, 0.0));

    // Uniformly spread charge has no other modes either
    let uniform: Vec<f64> = (0..128).map(|i| i as f64 * 16.0 / 128.0).collect();
    let (mut solver, mut transform) = test_solver(uniform.len(), 32, -0.02);
    solver.deposit(transform.as_mut(), &uniform).unwrap();
    assert!(solver.rho_k().iter().all(|rho| rho.norm() < 1e-12));
}

#[test]
fn test_field_spectrum_is_hermitian() {
    let positions: Vec<f64> = (0..50).map(|i| (i as f64).sqrt() * 2.1 % 16.0).collect();
    let (mut solver, mut transform) = test_solver(positions.len(), 64, -0.02);

    solver.compute(transform.as_mut(), &positions).unwrap();
    assert!(solver.field_spectrum_is_hermitian());

    // A real spectrum gives a real field
    transform
        .inverse_nonuniform(&solver.e_k, &positions, Sign::Positive, &mut solver.e_interp)
        .unwrap();
    assert!(solver.e_interp.iter().all(|z| z.im.abs() < 1e-12));
}

#[test]
fn test_single_charge_field_is_a_sawtooth() {
    use approx::assert_abs_diff_eq;

    // One unit charge at the center of the box: E(s) = (q / eps_0) (1/2 - s / L)
    let (mut solver, mut transform) = test_solver(1, 64, 1.0);
    let axis_length = 16.0;
    let x0 = axis_length / 2.0;
    solver.deposit(transform.as_mut(), &[x0]).unwrap();
    solver.solve_fields();

    let targets = [x0 + axis_length / 4.0, x0 - axis_length / 4.0];
    let field = solver.interpolate_field(transform.as_mut(), &targets).unwrap();

    // Field points away from a positive charge
    assert_abs_diff_eq!(field[0], 0.25, epsilon = 0.0125);
    assert_abs_diff_eq!(field[1], -0.25, epsilon = 0.0125);
}

#[test]
fn test_potential_energy_of_single_mode() {
    use approx::assert_relative_eq;

    let (mut solver, _) = test_solver(1, 32, 1.0);
    let axis_length = 16.0;

    // rho(x) = A cos(k x) for mode 3 has energy L A^2 / (4 eps_0 k^2)
    let amplitude = 0.7;
    let k = 2.0 * PI * 3.0 / axis_length;
    solver.rho_k[3] = Complex::new(amplitude / 2.0, 0.0);
    let energy = solver.solve_fields();

    assert_relative_eq!(
        energy,
        axis_length * amplitude * amplitude / (4.0 * k * k),
        max_relative = 1e-12
    );
    assert_relative_eq!(solver.mode_energies()[2], energy, max_relative = 1e-12);
    assert!(solver.mode_energies()[0].abs() < 1e-15);

    // E_k = -i k phi_k
    let phi = solver.phi_k()[3];
    assert_relative_eq!(solver.e_k()[16 + 3].im, -k * phi.re, max_relative = 1e-12);
}
