use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

use crate::error::CommonError;

/// The canonical test distributions an initial ensemble can be drawn from
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TestCase {
    /// Two counter-propagating beams with a small thermal spread
    #[serde(rename = "2stream")]
    TwoStream,

    /// Maxwellian with a sinusoidal density perturbation (Landau damping)
    #[serde(rename = "landau")]
    Landau,

    /// Deterministic standing density wave
    #[serde(rename = "standing")]
    Standing,
}

impl FromStr for TestCase {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "2stream" => Ok(TestCase::TwoStream),
            "landau" => Ok(TestCase::Landau),
            "standing" => Ok(TestCase::Standing),
            _ => Err(CommonError::UnknownTestCase {
                name: s.to_string(),
            }),
        }
    }
}

impl Display for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestCase::TwoStream => write!(f, "2stream"),
            TestCase::Landau => write!(f, "landau"),
            TestCase::Standing => write!(f, "standing"),
        }
    }
}

/// Particle shape used to smooth the deposited charge
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum ParticleShape {
    /// Delta function (filter is flat)
    Point,

    /// Normalized gaussian of width `sigma`
    Gaussian { sigma: f64 },

    /// Triangle (tent) of half-width `half_width`
    Triangle { half_width: f64 },
}

impl Default for ParticleShape {
    fn default() -> Self {
        ParticleShape::Point
    }
}

impl ParticleShape {
    /// Evaluates the shape, centered at 0, at displacement `x`
    pub fn evaluate(&self, x: f64) -> f64 {
        match *self {
            ParticleShape::Point => {
                if x == 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            ParticleShape::Gaussian { sigma } => {
                let two_var = 2.0 * sigma * sigma;
                (-x * x / two_var).exp() / (std::f64::consts::PI * two_var).sqrt()
            }
            ParticleShape::Triangle { half_width } => (1.0 - (x / half_width).abs()).max(0.0),
        }
    }

    pub(crate) fn validate(&self) -> Result<(), CommonError> {
        match *self {
            ParticleShape::Point => Ok(()),
            ParticleShape::Gaussian { sigma } if sigma > 0.0 => Ok(()),
            ParticleShape::Triangle { half_width } if half_width > 0.0 => Ok(()),
            _ => Err(CommonError::InvalidParameter {
                name: "shape",
                msg: format!("{self:?} must have a positive width"),
            }),
        }
    }
}

/// Which implementation of the nonuniform transform to use
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransformBackend {
    /// Gaussian gridding on an oversampled uniform grid
    #[serde(rename = "gaussian")]
    GaussianGridding,

    /// Exact summation over every (particle, mode) pair
    #[serde(rename = "direct")]
    DirectSummation,
}

impl Default for TransformBackend {
    fn default() -> Self {
        TransformBackend::GaussianGridding
    }
}

#[test]
fn test_case_from_str() {
    assert_eq!("2stream".parse::<TestCase>(), Ok(TestCase::TwoStream));
    assert_eq!("landau".parse::<TestCase>(), Ok(TestCase::Landau));
    assert_eq!("standing".parse::<TestCase>(), Ok(TestCase::Standing));
    assert_eq!(
        "twostream".parse::<TestCase>(),
        Err(CommonError::UnknownTestCase {
            name: "twostream".to_string()
        })
    );
}

#[test]
fn test_case_display_round_trips() {
    for case in [TestCase::TwoStream, TestCase::Landau, TestCase::Standing] {
        assert_eq!(case.to_string().parse::<TestCase>(), Ok(case));
    }
}

#[test]
fn test_shapes_are_even() {
    let shapes = [
        ParticleShape::Gaussian { sigma: 0.3 },
        ParticleShape::Triangle { half_width: 0.5 },
    ];
    for shape in shapes {
        for x in [0.1, 0.25, 0.4] {
            assert_eq!(shape.evaluate(x), shape.evaluate(-x));
        }
    }
    assert_eq!(ParticleShape::Point.evaluate(0.0), 1.0);
    assert_eq!(ParticleShape::Point.evaluate(1e-12), 0.0);
}
