use num::Complex;
use rayon::prelude::*;
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;
use std::sync::Arc;

use super::error::{check_len, RuntimeError};

/// Ratio between the oversampled spreading grid and the number of modes
const OVERSAMPLING: usize = 2;

/// Minimum number of particles handed to a single rayon task while spreading
const MIN_SPREAD_CHUNK: usize = 1024;

/// Sign of the exponent, i.e. `exp(-i k x)` for `Negative`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sign {
    Negative,
    Positive,
}

impl Sign {
    fn as_f64(self) -> f64 {
        match self {
            Sign::Negative => -1.0,
            Sign::Positive => 1.0,
        }
    }
}

/// Per-particle weights fed to the forward nonuniform transform
#[derive(Clone, Copy, Debug)]
pub enum Weights<'a> {
    /// Every particle carries weight 1 + 0i
    Unit,
    /// One complex weight per particle
    Each(&'a [Complex<f64>]),
}

impl Weights<'_> {
    #[inline(always)]
    fn get(&self, i: usize) -> Complex<f64> {
        match self {
            Weights::Unit => Complex::new(1.0, 0.0),
            Weights::Each(w) => w[i],
        }
    }
}

/// The transforms the field solver needs. Positions are always physical
/// positions in `[0, L)` and mode `j` has wavenumber `k_j = 2 pi j / L`.
///
/// Half spectra hold the non-negative modes `j = 0..G/2`. Full spectra are
/// two-sided and centered: entry `G/2 + j` holds mode `j` for `j` in `-G/2..G/2`.
pub trait SpectralTransform: Send {
    /// The uniform transforms backing this adapter
    fn uniform(&self) -> &UniformFft;

    /// Physical length of the periodic domain
    fn axis_length(&self) -> f64;

    /// Computes `modes[j] = sum_i w_i exp(sign i k_j x_i)` for the `G/2`
    /// non-negative modes.
    fn forward_nonuniform(
        &mut self,
        positions: &[f64],
        weights: Weights<'_>,
        sign: Sign,
        modes: &mut [Complex<f64>],
    ) -> Result<(), RuntimeError>;

    /// Computes `values[i] = sum_j spectrum[G/2 + j] exp(sign i k_j x_i)` from a
    /// full, centered spectrum of length `G`.
    fn inverse_nonuniform(
        &mut self,
        spectrum: &[Complex<f64>],
        positions: &[f64],
        sign: Sign,
        values: &mut [Complex<f64>],
    ) -> Result<(), RuntimeError>;

    /// Number of uniform modes `G`
    fn n_grid(&self) -> usize {
        self.uniform().size()
    }

    /// Unnormalized forward DFT of a real signal sampled on the uniform grid
    fn uniform_fft(&self, signal: &[f64]) -> Result<Vec<Complex<f64>>, RuntimeError> {
        self.uniform().forward(signal)
    }

    /// Real signal on the uniform grid synthesized from a half spectrum
    fn uniform_inverse_fft(
        &self,
        half_spectrum: &[Complex<f64>],
    ) -> Result<Vec<f64>, RuntimeError> {
        self.uniform().inverse_hermitian(half_spectrum)
    }
}

/// This struct is intended to be initialized at the
/// beginning of a simulation. It holds the forward
/// and inverse fft objects that perform uniform FFTs.
pub struct UniformFft {
    // Forward operation
    fwd: Arc<dyn Fft<f64>>,
    // Inverse operation
    inv: Arc<dyn Fft<f64>>,
    // Keep size on record
    size: usize,
}

impl UniformFft {
    pub fn new(size: usize) -> Self {
        // Create forward and inverse plans
        let mut planner = FftPlanner::<f64>::new();
        let fwd = planner.plan_fft_forward(size);
        let inv = planner.plan_fft_inverse(size);

        UniformFft { fwd, inv, size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// `X[k] = sum_n x[n] exp(-2 pi i k n / G)`, no normalization
    pub fn forward(&self, signal: &[f64]) -> Result<Vec<Complex<f64>>, RuntimeError> {
        check_len("uniform signal", self.size, signal.len())?;

        let mut buffer: Vec<Complex<f64>> = signal.iter().map(|&x| Complex::new(x, 0.0)).collect();
        self.fwd.process(&mut buffer);

        Ok(buffer)
    }

    /// Extends `half_spectrum` (modes `0..G/2`) to a Hermitian spectrum with a
    /// zero Nyquist bin and returns the real part of its unnormalized inverse DFT.
    pub fn inverse_hermitian(
        &self,
        half_spectrum: &[Complex<f64>],
    ) -> Result<Vec<f64>, RuntimeError> {
        check_len("half spectrum", self.size / 2, half_spectrum.len())?;

        let mut buffer = vec![Complex::new(0.0, 0.0); self.size];
        buffer[0] = Complex::new(half_spectrum[0].re, 0.0);
        for j in 1..self.size / 2 {
            buffer[j] = half_spectrum[j];
            buffer[self.size - j] = half_spectrum[j].conj();
        }
        self.inv.process(&mut buffer);

        Ok(buffer.into_iter().map(|z| z.re).collect())
    }
}

/// Exact transforms by direct summation over every (particle, mode) pair.
/// O(N G) per call; used as a reference and for small ensembles.
pub struct DirectSummation {
    uniform: UniformFft,
    axis_length: f64,
}

impl DirectSummation {
    pub fn new(n_grid: usize, axis_length: f64) -> Self {
        DirectSummation {
            uniform: UniformFft::new(n_grid),
            axis_length,
        }
    }
}

impl SpectralTransform for DirectSummation {
    fn uniform(&self) -> &UniformFft {
        &self.uniform
    }

    fn axis_length(&self) -> f64 {
        self.axis_length
    }

    fn forward_nonuniform(
        &mut self,
        positions: &[f64],
        weights: Weights<'_>,
        sign: Sign,
        modes: &mut [Complex<f64>],
    ) -> Result<(), RuntimeError> {
        check_len("modes", self.n_grid() / 2, modes.len())?;
        if let Weights::Each(w) = weights {
            check_len("weights", positions.len(), w.len())?;
        }

        let scale = sign.as_f64() * 2.0 * PI / self.axis_length;
        modes.par_iter_mut().enumerate().for_each(|(j, mode)| {
            let k = scale * j as f64;
            *mode = positions
                .iter()
                .enumerate()
                .map(|(i, &x)| weights.get(i) * Complex::from_polar(1.0, k * x))
                .sum();
        });

        Ok(())
    }

    fn inverse_nonuniform(
        &mut self,
        spectrum: &[Complex<f64>],
        positions: &[f64],
        sign: Sign,
        values: &mut [Complex<f64>],
    ) -> Result<(), RuntimeError> {
        let n_grid = self.n_grid();
        check_len("spectrum", n_grid, spectrum.len())?;
        check_len("values", positions.len(), values.len())?;

        let half = (n_grid / 2) as i64;
        let scale = sign.as_f64() * 2.0 * PI / self.axis_length;
        values
            .par_iter_mut()
            .zip(positions.par_iter())
            .for_each(|(value, &x)| {
                *value = spectrum
                    .iter()
                    .enumerate()
                    .map(|(idx, c)| {
                        let j = idx as i64 - half;
                        *c * Complex::from_polar(1.0, scale * j as f64 * x)
                    })
                    .sum();
            });

        Ok(())
    }
}

/// Gaussian spreading kernel on the oversampled grid, shared by the spread
/// and gather passes.
struct GaussianKernel {
    axis_length: f64,
    order: usize,
    // Oversampled grid size
    n_over: usize,
    // Gaussian variance parameter
    tau: f64,
    // exp(-(l h)^2 / 4 tau) for l in 1-order..=order
    e3: Vec<f64>,
}

impl GaussianKernel {
    /// Calls `f(grid index, gaussian weight)` for each of the `2 order` grid
    /// points around the particle at physical position `x`.
    #[inline(always)]
    fn for_each_neighbor<F>(&self, x: f64, mut f: F)
    where
        F: FnMut(usize, f64),
    {
        let h = 2.0 * PI / self.n_over as f64;
        let theta = 2.0 * PI * x / self.axis_length;
        let m0 = (theta / h).floor() as i64;
        let d = theta - m0 as f64 * h;

        // exp(-(d - l h)^2 / 4 tau) = e1 * e2^l * e3(l)
        let e1 = (-d * d / (4.0 * self.tau)).exp();
        let e2 = (d * h / (2.0 * self.tau)).exp();
        let first = 1 - self.order as i64;
        let mut e2_pow = e2.powi(first as i32);

        for (l, e3) in (first..=self.order as i64).zip(&self.e3) {
            let idx = (m0 + l).rem_euclid(self.n_over as i64) as usize;
            f(idx, e1 * e2_pow * e3);
            e2_pow *= e2;
        }
    }
}

/// Nonuniform transforms by gaussian gridding (Greengard & Lee, 2004).
///
/// Particles are spread with a gaussian onto a uniform grid that is
/// oversampled by a factor of two, the grid is transformed with an FFT and the
/// gaussian is divided back out per mode. The interpolation order is the
/// half-width of the gaussian in oversampled cells; the truncation error is
/// roughly `exp(-3 pi order / 4)`.
pub struct GaussianGridding {
    uniform: UniformFft,
    kernel: GaussianKernel,
    // sqrt(pi / tau) exp(j^2 tau), indexed like a centered full spectrum
    deconvolution: Vec<f64>,
    fwd_over: Arc<dyn Fft<f64>>,
    inv_over: Arc<dyn Fft<f64>>,
    // Reused for every transform
    grid: Vec<Complex<f64>>,
    // One private spreading grid per rayon task, kept between calls
    spread_grids: Vec<Vec<Complex<f64>>>,
}

impl GaussianGridding {
    pub fn new(n_grid: usize, axis_length: f64, order: usize) -> Result<Self, RuntimeError> {
        if order == 0 {
            return Err(RuntimeError::ZeroInterpolationOrder);
        }

        let n_over = OVERSAMPLING * n_grid;
        let r = OVERSAMPLING as f64;
        let tau = PI * order as f64 / ((n_grid * n_grid) as f64 * r * (r - 0.5));

        // Grid spacing in angle
        let h = 2.0 * PI / n_over as f64;
        let e3 = (1 - order as i64..=order as i64)
            .map(|l| {
                let lh = l as f64 * h;
                (-lh * lh / (4.0 * tau)).exp()
            })
            .collect();

        let half = (n_grid / 2) as i64;
        let deconvolution = (-half..half)
            .map(|j| (PI / tau).sqrt() * ((j * j) as f64 * tau).exp())
            .collect();

        let mut planner = FftPlanner::<f64>::new();
        let fwd_over = planner.plan_fft_forward(n_over);
        let inv_over = planner.plan_fft_inverse(n_over);

        Ok(GaussianGridding {
            uniform: UniformFft::new(n_grid),
            kernel: GaussianKernel {
                axis_length,
                order,
                n_over,
                tau,
                e3,
            },
            deconvolution,
            fwd_over,
            inv_over,
            grid: vec![Complex::new(0.0, 0.0); n_over],
            spread_grids: Vec::new(),
        })
    }
}

impl SpectralTransform for GaussianGridding {
    fn uniform(&self) -> &UniformFft {
        &self.uniform
    }

    fn axis_length(&self) -> f64 {
        self.kernel.axis_length
    }

    fn forward_nonuniform(
        &mut self,
        positions: &[f64],
        weights: Weights<'_>,
        sign: Sign,
        modes: &mut [Complex<f64>],
    ) -> Result<(), RuntimeError> {
        let n_grid = self.n_grid();
        check_len("modes", n_grid / 2, modes.len())?;
        if let Weights::Each(w) = weights {
            check_len("weights", positions.len(), w.len())?;
        }

        // Spread onto the oversampled grid, one private grid per chunk of particles
        let n_over = self.kernel.n_over;
        let chunk = (positions.len() / rayon::current_num_threads().max(1)).max(MIN_SPREAD_CHUNK);
        let n_chunks = (positions.len() + chunk - 1) / chunk;
        if self.spread_grids.len() < n_chunks {
            self.spread_grids
                .resize_with(n_chunks, || vec![Complex::new(0.0, 0.0); n_over]);
        }

        let kernel = &self.kernel;
        let spread_grids = &mut self.spread_grids[..n_chunks];
        spread_grids
            .par_iter_mut()
            .zip(positions.par_chunks(chunk))
            .enumerate()
            .for_each(|(c, (local, xs))| {
                local.iter_mut().for_each(|z| *z = Complex::new(0.0, 0.0));
                for (offset, &x) in xs.iter().enumerate() {
                    let w = weights.get(c * chunk + offset);
                    kernel.for_each_neighbor(x, |idx, g| local[idx] += w * g);
                }
            });

        // Sum the private grids straight into the shared one
        let spread_grids = &self.spread_grids[..n_chunks];
        self.grid.par_iter_mut().enumerate().for_each(|(idx, z)| {
            *z = spread_grids.iter().map(|local| local[idx]).sum();
        });

        // Transform and divide the gaussian back out
        self.fwd_over.process(&mut self.grid);
        let half = n_grid / 2;
        let n_over_f = n_over as f64;
        for (j, mode) in modes.iter_mut().enumerate() {
            // exp(+i k x) picks up the negative frequency of the standard transform
            let idx = match sign {
                Sign::Negative => j,
                Sign::Positive => (n_over - j) % n_over,
            };
            *mode = self.grid[idx] * self.deconvolution[half + j] / n_over_f;
        }

        Ok(())
    }

    fn inverse_nonuniform(
        &mut self,
        spectrum: &[Complex<f64>],
        positions: &[f64],
        sign: Sign,
        values: &mut [Complex<f64>],
    ) -> Result<(), RuntimeError> {
        let n_grid = self.n_grid();
        check_len("spectrum", n_grid, spectrum.len())?;
        check_len("values", positions.len(), values.len())?;

        // Load the deconvolved spectrum into the oversampled grid
        let half = (n_grid / 2) as i64;
        let n_over = self.kernel.n_over as i64;
        self.grid.iter_mut().for_each(|z| *z = Complex::new(0.0, 0.0));
        for (idx, (c, d)) in spectrum.iter().zip(&self.deconvolution).enumerate() {
            let j = idx as i64 - half;
            let freq = match sign {
                Sign::Positive => j,
                Sign::Negative => -j,
            };
            self.grid[freq.rem_euclid(n_over) as usize] = *c * *d;
        }
        self.inv_over.process(&mut self.grid);

        // Gather with the same gaussian
        let (kernel, grid) = (&self.kernel, &self.grid);
        let n_over_f = n_over as f64;
        values
            .par_iter_mut()
            .zip(positions.par_iter())
            .for_each(|(value, &x)| {
                let mut sum = Complex::new(0.0, 0.0);
                kernel.for_each_neighbor(x, |idx, g| sum += grid[idx] * g);
                *value = sum / n_over_f;
            });

        Ok(())
    }
}

#[cfg(test)]
fn random_positions(n: usize, axis_length: f64, seed: u64) -> Vec<f64> {
    use rand::{rngs::StdRng, Rng, SeedableRng};
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n).map(|_| rng.gen_range(0.0..axis_length)).collect()
}

#[test]
fn test_gridding_matches_direct_forward() {
    use approx::assert_abs_diff_eq;

    const G: usize = 64;
    const N: usize = 500;
    let axis_length = 16.0;
    let positions = random_positions(N, axis_length, 1);

    let mut direct = DirectSummation::new(G, axis_length);
    let mut gridding = GaussianGridding::new(G, axis_length, 5).unwrap();

    for sign in [Sign::Negative, Sign::Positive] {
        let mut exact = vec![Complex::new(0.0, 0.0); G / 2];
        let mut approx = vec![Complex::new(0.0, 0.0); G / 2];
        direct
            .forward_nonuniform(&positions, Weights::Unit, sign, &mut exact)
            .unwrap();
        gridding
            .forward_nonuniform(&positions, Weights::Unit, sign, &mut approx)
            .unwrap();

        // DC is just the particle count
        assert_abs_diff_eq!(exact[0].re, N as f64, epsilon = 1e-9);

        let max_err = exact
            .iter()
            .zip(&approx)
            .fold(0.0, |acc: f64, (e, a)| acc.max((e - a).norm()));
        assert!(max_err < 1e-3 * N as f64, "max error {max_err}");
    }
}

#[test]
fn test_gridding_matches_direct_forward_complex_weights() {
    const G: usize = 32;
    const N: usize = 300;
    let axis_length = 2.0 * PI;
    let positions = random_positions(N, axis_length, 2);
    let weights: Vec<Complex<f64>> = (0..N)
        .map(|i| Complex::new((i as f64).cos(), (i as f64 * 0.5).sin()))
        .collect();

    let mut direct = DirectSummation::new(G, axis_length);
    let mut gridding = GaussianGridding::new(G, axis_length, 6).unwrap();

    let mut exact = vec![Complex::new(0.0, 0.0); G / 2];
    let mut approx = vec![Complex::new(0.0, 0.0); G / 2];
    direct
        .forward_nonuniform(&positions, Weights::Each(&weights), Sign::Negative, &mut exact)
        .unwrap();
    gridding
        .forward_nonuniform(&positions, Weights::Each(&weights), Sign::Negative, &mut approx)
        .unwrap();

    let scale: f64 = weights.iter().map(|w| w.norm()).sum();
    for (e, a) in exact.iter().zip(&approx) {
        assert!((e - a).norm() < 1e-4 * scale);
    }
}

#[test]
fn test_gridding_matches_direct_inverse() {
    const G: usize = 64;
    const N: usize = 400;
    let axis_length = 16.0;
    let positions = random_positions(N, axis_length, 3);

    // Smooth, two-sided spectrum
    let spectrum: Vec<Complex<f64>> = (0..G)
        .map(|idx| {
            let j = idx as f64 - (G / 2) as f64;
            Complex::new((-0.01 * j * j).exp(), 0.1 * j / G as f64)
        })
        .collect();

    let mut direct = DirectSummation::new(G, axis_length);
    let mut gridding = GaussianGridding::new(G, axis_length, 5).unwrap();

    for sign in [Sign::Negative, Sign::Positive] {
        let mut exact = vec![Complex::new(0.0, 0.0); N];
        let mut approx = vec![Complex::new(0.0, 0.0); N];
        direct
            .inverse_nonuniform(&spectrum, &positions, sign, &mut exact)
            .unwrap();
        gridding
            .inverse_nonuniform(&spectrum, &positions, sign, &mut approx)
            .unwrap();

        let scale: f64 = spectrum.iter().map(|c| c.norm()).sum();
        for (e, a) in exact.iter().zip(&approx) {
            assert!((e - a).norm() < 1e-4 * scale, "{e} vs {a}");
        }
    }
}

#[test]
fn test_single_particle_round_trip() {
    use approx::assert_abs_diff_eq;

    const G: usize = 64;
    let axis_length = 16.0;
    let x0 = [3.7];

    for order in [3, 5, 8] {
        let mut gridding = GaussianGridding::new(G, axis_length, order).unwrap();

        // Deposit
        let mut half = vec![Complex::new(0.0, 0.0); G / 2];
        gridding
            .forward_nonuniform(&x0, Weights::Unit, Sign::Negative, &mut half)
            .unwrap();

        // Two-sided spectrum, Nyquist bin left empty
        let mut full = vec![Complex::new(0.0, 0.0); G];
        for j in 0..G / 2 {
            full[G / 2 + j] = half[j];
            if j > 0 {
                full[G / 2 - j] = half[j].conj();
            }
        }

        // Every retained mode contributes exp(-ikx0) exp(ikx0) = 1
        let mut value = [Complex::new(0.0, 0.0)];
        gridding
            .inverse_nonuniform(&full, &x0, Sign::Positive, &mut value)
            .unwrap();
        let tolerance = (G - 1) as f64 * 50.0 * (-3.0 * PI * order as f64 / 4.0).exp();
        assert_abs_diff_eq!(value[0].re, (G - 1) as f64, epsilon = tolerance);
        assert_abs_diff_eq!(value[0].im, 0.0, epsilon = tolerance);
    }
}

#[test]
fn test_uniform_fft_of_cosine() {
    use approx::assert_abs_diff_eq;

    const G: usize = 16;
    let fft = UniformFft::new(G);
    let signal: Vec<f64> = (0..G)
        .map(|n| (2.0 * PI * 3.0 * n as f64 / G as f64).cos())
        .collect();

    let spectrum = fft.forward(&signal).unwrap();
    for (k, c) in spectrum.iter().enumerate() {
        let expected = if k == 3 || k == G - 3 { G as f64 / 2.0 } else { 0.0 };
        assert_abs_diff_eq!(c.re, expected, epsilon = 1e-9);
        assert_abs_diff_eq!(c.im, 0.0, epsilon = 1e-9);
    }

    // Synthesizing from the half spectrum recovers G times the signal
    let back = fft.inverse_hermitian(&spectrum[..G / 2]).unwrap();
    for (b, s) in back.iter().zip(&signal) {
        assert_abs_diff_eq!(*b, G as f64 * s, epsilon = 1e-9);
    }
}

#[test]
fn test_length_mismatch_is_an_error() {
    let mut gridding = GaussianGridding::new(16, 1.0, 5).unwrap();
    let mut modes = vec![Complex::new(0.0, 0.0); 7];
    let result = gridding.forward_nonuniform(&[0.5], Weights::Unit, Sign::Negative, &mut modes);
    assert!(matches!(
        result,
        Err(RuntimeError::LengthMismatch {
            name: "modes",
            expected: 8,
            actual: 7
        })
    ));
}

#[test]
fn test_zero_order_is_rejected() {
    assert!(matches!(
        GaussianGridding::new(16, 1.0, 0),
        Err(RuntimeError::ZeroInterpolationOrder)
    ));
}

#[test]
fn test_spreading_workspace_is_reused() {
    const G: usize = 32;
    let axis_length = 16.0;
    let many = random_positions(5000, axis_length, 4);
    let few = random_positions(300, axis_length, 5);

    let mut direct = DirectSummation::new(G, axis_length);
    let mut gridding = GaussianGridding::new(G, axis_length, 5).unwrap();
    let mut modes = vec![Complex::new(0.0, 0.0); G / 2];

    gridding
        .forward_nonuniform(&many, Weights::Unit, Sign::Negative, &mut modes)
        .unwrap();
    let n_workspaces = gridding.spread_grids.len();
    assert!(n_workspaces >= 1);

    // A smaller ensemble afterwards sees none of the earlier charge
    gridding
        .forward_nonuniform(&few, Weights::Unit, Sign::Negative, &mut modes)
        .unwrap();
    assert_eq!(gridding.spread_grids.len(), n_workspaces);

    let mut exact = vec![Complex::new(0.0, 0.0); G / 2];
    direct
        .forward_nonuniform(&few, Weights::Unit, Sign::Negative, &mut exact)
        .unwrap();
    for (e, a) in exact.iter().zip(&modes) {
        assert!((e - a).norm() < 1e-3 * few.len() as f64, "{e} vs {a}");
    }

    // No particles, no charge
    gridding
        .forward_nonuniform(&[], Weights::Unit, Sign::Negative, &mut modes)
        .unwrap();
    assert!(modes.iter().all(|m| m.norm() == 0.0));
}
