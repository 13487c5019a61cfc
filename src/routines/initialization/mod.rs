use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::InferenceError;

pub mod latin;
pub mod sobol;

/// The sampler used to spread the starting points over the bounded space
///
/// The sampler can be one of the following:
///
/// - `Latin`: Generates a Latin hypercube (default)
/// - `Sobol`: Generates a scrambled Sobol sequence
#[derive(Debug, Deserialize, Clone, Copy, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sampler {
    #[default]
    Latin,
    Sobol,
}

impl Sampler {
    /// Draw `n_points` points over `ranges`, one row per point
    pub fn generate(
        &self,
        n_points: usize,
        ranges: &[(f64, f64)],
        seed: Option<u64>,
    ) -> Result<Array2<f64>, InferenceError> {
        match self {
            Sampler::Latin => latin::generate(n_points, ranges, seed),
            Sampler::Sobol => sobol::generate(n_points, ranges, seed),
        }
    }
}

impl std::fmt::Display for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sampler::Latin => write!(f, "Latin hypercube"),
            Sampler::Sobol => write!(f, "Sobol"),
        }
    }
}

/// Shared input checks for every sampler
fn validate(n_points: usize, ranges: &[(f64, f64)]) -> Result<(), InferenceError> {
    if n_points == 0 {
        return Err(InferenceError::Configuration(
            "at least one point must be sampled".to_string(),
        ));
    }
    for (dimension, &(lower, upper)) in ranges.iter().enumerate() {
        if !(lower <= upper) || !lower.is_finite() || !upper.is_finite() {
            return Err(InferenceError::InvalidBounds {
                dimension,
                lower,
                upper,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_points_is_a_configuration_error() {
        assert!(matches!(
            Sampler::Latin.generate(0, &[(0.0, 1.0)], Some(1)),
            Err(InferenceError::Configuration(_))
        ));
    }

    #[test]
    fn non_finite_bounds_are_invalid() {
        assert!(matches!(
            Sampler::Latin.generate(3, &[(0.0, f64::INFINITY)], Some(1)),
            Err(InferenceError::InvalidBounds { dimension: 0, .. })
        ));
    }

    #[test]
    fn zero_dimensions_yield_empty_points() {
        let points = Sampler::Latin.generate(4, &[], Some(1)).unwrap();
        assert_eq!(points.shape(), &[4, 0]);
    }
}
