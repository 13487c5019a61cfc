use ndarray::Array2;
use sobol_burley::sample;

use crate::error::InferenceError;

use super::validate;

/// Number of dimensions provided by `sobol_burley`
const MAX_DIMENSIONS: usize = 256;

/// Generates a 2-dimensional array containing a Sobol sequence within the given ranges.
///
/// This function samples the space using an Owen-scrambled Sobol sequence of `n_points` points, distributed along `ranges.len()` dimensions.
/// The sequence is fully determined by the seed; without one, seed `0` is used.
///
/// # Arguments
///
/// * `n_points` - The number of points in the Sobol sequence.
/// * `ranges` - A slice of tuples, where each tuple represents the minimum and maximum value of a dimension.
/// * `seed` - The seed for the Sobol sequence generator.
///
/// # Returns
///
/// A 2D array where each row is a point in the Sobol sequence, and each column corresponds to a dimension.
/// The value of each dimension is scaled to be within the corresponding range.
///
pub fn generate(
    n_points: usize,
    ranges: &[(f64, f64)],
    seed: Option<u64>,
) -> Result<Array2<f64>, InferenceError> {
    validate(n_points, ranges)?;
    if ranges.len() > MAX_DIMENSIONS {
        return Err(InferenceError::Configuration(format!(
            "the Sobol sampler supports at most {} dimensions, {} requested",
            MAX_DIMENSIONS,
            ranges.len()
        )));
    }
    let n_points_u32 = u32::try_from(n_points).map_err(|_| {
        InferenceError::Configuration(format!("too many Sobol points requested: {}", n_points))
    })?;
    // sobol_burley seeds are 32 bits wide
    let seed = seed.unwrap_or(0) as u32;

    let seq = Array2::from_shape_fn((n_points_u32 as usize, ranges.len()), |(i, j)| {
        let (min, max) = ranges[j];
        let unscaled = sample(i as u32, j as u32, seed) as f64;
        min + unscaled * (max - min)
    });
    Ok(seq)
}
