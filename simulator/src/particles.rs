//! The particle ensemble: positions, velocities and display tags stored as
//! three parallel arrays of equal length.

use crate::utils::error::{check_len, RuntimeError};

/// Structure-of-arrays storage for `N` particles of a single species.
/// The particle id is the index into each array; no particle is ever added or
/// removed after construction.
#[derive(Clone, Debug, PartialEq)]
pub struct ParticleEnsemble {
    x: Vec<f64>,
    v: Vec<f64>,
    tag: Vec<u32>,
}

impl ParticleEnsemble {
    pub fn new(x: Vec<f64>, v: Vec<f64>, tag: Vec<u32>) -> Result<Self, RuntimeError> {
        check_len("velocities", x.len(), v.len())?;
        check_len("tags", x.len(), tag.len())?;
        Ok(ParticleEnsemble { x, v, tag })
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    pub fn positions(&self) -> &[f64] {
        &self.x
    }

    pub fn velocities(&self) -> &[f64] {
        &self.v
    }

    /// Display tags (e.g. an RGB color); not used by the physics
    pub fn tags(&self) -> &[u32] {
        &self.tag
    }

    pub fn velocities_mut(&mut self) -> &mut [f64] {
        &mut self.v
    }

    /// Both mutable views at once, for the position push
    pub fn phase_space_mut(&mut self) -> (&mut [f64], &mut [f64]) {
        (&mut self.x, &mut self.v)
    }
}

#[test]
fn test_ensemble_rejects_ragged_arrays() {
    let ok = ParticleEnsemble::new(vec![0.0, 1.0], vec![1.0, -1.0], vec![0, 0]);
    assert!(ok.is_ok());
    assert_eq!(ok.unwrap().len(), 2);

    let ragged = ParticleEnsemble::new(vec![0.0, 1.0], vec![1.0], vec![0, 0]);
    assert!(matches!(
        ragged,
        Err(RuntimeError::LengthMismatch {
            name: "velocities",
            expected: 2,
            actual: 1
        })
    ));

    let ragged = ParticleEnsemble::new(vec![0.0], vec![1.0], vec![]);
    assert!(matches!(
        ragged,
        Err(RuntimeError::LengthMismatch { name: "tags", .. })
    ));
}
