use num::Complex;
use pif_common::ParticleShape;

use super::{error::RuntimeError, transform::SpectralTransform};

/// Fourier coefficients of the particle shape for modes `0..G/2`.
///
/// The shape is sampled on the uniform grid and normalized so that its sum
/// times the grid spacing is one, i.e. `coefficients[0] = 1 / dx`. Built once
/// at startup and never modified.
#[derive(Clone, Debug)]
pub struct ShapeFilter {
    coefficients: Vec<Complex<f64>>,
    dx: f64,
}

impl ShapeFilter {
    /// Samples `shape` on the `G` grid points covering one period (each point
    /// together with its mirror so the result is real and even), normalizes it
    /// and keeps the first `G/2` coefficients of its FFT.
    pub fn new<F>(transform: &F, shape: ParticleShape) -> Result<Self, RuntimeError>
    where
        F: SpectralTransform + ?Sized,
    {
        let n_grid = transform.n_grid();
        let axis_length = transform.axis_length();
        let dx = axis_length / n_grid as f64;

        // Sample shape symmetrically
        let mut samples: Vec<f64> = (0..n_grid)
            .map(|j| {
                let x = j as f64 * dx;
                shape.evaluate(x) + shape.evaluate(axis_length - x)
            })
            .collect();

        // Normalize to unit integral
        let norm: f64 = samples.iter().sum::<f64>() * dx;
        samples.iter_mut().for_each(|s| *s /= norm);

        let mut coefficients = transform.uniform_fft(&samples)?;
        coefficients.truncate(n_grid / 2);

        Ok(ShapeFilter { coefficients, dx })
    }

    pub fn coefficients(&self) -> &[Complex<f64>] {
        &self.coefficients
    }

    /// Grid spacing the filter was normalized with
    pub fn dx(&self) -> f64 {
        self.dx
    }

    /// Number of coefficients, `G/2`
    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }
}

impl std::ops::Index<usize> for ShapeFilter {
    type Output = Complex<f64>;

    fn index(&self, j: usize) -> &Complex<f64> {
        &self.coefficients[j]
    }
}

#[test]
fn test_point_shape_is_flat() {
    use super::transform::DirectSummation;
    use approx::assert_abs_diff_eq;

    const G: usize = 32;
    let axis_length = 16.0;
    let transform = DirectSummation::new(G, axis_length);
    let filter = ShapeFilter::new(&transform, ParticleShape::Point).unwrap();

    // Delta shape: every mode is 1/dx
    let dx = axis_length / G as f64;
    assert_eq!(filter.len(), G / 2);
    for c in filter.coefficients() {
        assert_abs_diff_eq!(c.re, 1.0 / dx, epsilon = 1e-9);
        assert_abs_diff_eq!(c.im, 0.0, epsilon = 1e-9);
    }
}

#[test]
fn test_shape_normalization_independent_of_grid() {
    use super::transform::DirectSummation;
    use approx::assert_abs_diff_eq;

    let axis_length = 16.0;
    let shapes = [
        ParticleShape::Point,
        ParticleShape::Gaussian { sigma: 0.4 },
        ParticleShape::Triangle { half_width: 1.0 },
    ];

    for n_grid in [16, 64, 256] {
        let transform = DirectSummation::new(n_grid, axis_length);
        for shape in shapes {
            let filter = ShapeFilter::new(&transform, shape).unwrap();

            // Back to real space, then integrate
            let real = transform.uniform_inverse_fft(filter.coefficients()).unwrap();
            let total: f64 = real.iter().sum::<f64>() / n_grid as f64 * filter.dx();
            assert_abs_diff_eq!(total, 1.0, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_smooth_shapes_attenuate_high_modes() {
    use super::transform::DirectSummation;

    const G: usize = 64;
    let transform = DirectSummation::new(G, 16.0);
    let filter = ShapeFilter::new(&transform, ParticleShape::Gaussian { sigma: 0.5 }).unwrap();

    // Real, even shape gives real coefficients that decay with k
    for j in 1..G / 2 {
        assert!(filter[j].im.abs() < 1e-9 * filter[0].re);
        assert!(filter[j].norm() <= filter[j - 1].norm() + 1e-12);
    }
    assert!(filter[G / 2 - 1].norm() < 1e-3 * filter[0].norm());
}
