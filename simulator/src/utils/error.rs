use pif_common::CommonError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Failed to write to disk: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Failed to write npy array: {0}")]
    NpyError(#[from] ndarray_npy::WriteNpyError),

    #[error("A NaN or Inf value was produced at t = {time}")]
    NanOrInf { time: f64 },

    #[error("Buffer {name} has length {actual:}, expected {expected:}")]
    LengthMismatch {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error(
        "Inverting the position CDF did not converge for u = {u:} after {iterations:} iterations"
    )]
    RootFindingDiverged { u: f64, iterations: usize },

    #[error("The NUFFT interpolation order must be nonzero")]
    ZeroInterpolationOrder,

    #[error("Error in common: {err}")]
    ParameterError {
        #[from]
        err: CommonError,
    },
}

/// Returns an error if `actual` does not match the `expected` buffer length
pub(crate) fn check_len(
    name: &'static str,
    expected: usize,
    actual: usize,
) -> Result<(), RuntimeError> {
    if expected == actual {
        Ok(())
    } else {
        Err(RuntimeError::LengthMismatch {
            name,
            expected,
            actual,
        })
    }
}
