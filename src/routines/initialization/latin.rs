use ndarray::Array2;
use rand::prelude::*;
use rand::rngs::StdRng;

use crate::error::InferenceError;

use super::validate;

/// Generates a 2-dimensional array containing Latin Hypercube Sampling points within the given ranges.
///
/// Each range is split into `n_points` strata of equal width. For every dimension one value is
/// drawn uniformly inside each stratum, and the strata are assigned to the points in a random
/// order, so that every stratum of every dimension is used by exactly one point.
///
/// # Arguments
///
/// * `n_points` - The number of points to generate, i.e. the number of rows in the array.
/// * `ranges` - A slice of tuples, where each tuple represents the minimum and maximum value of a dimension.
/// * `seed` - The seed for the random number generator. Without a seed, the generator is seeded from the OS.
///
/// # Returns
///
/// A 2D array where each row is a point, and each column corresponds to a dimension.
/// Dimensions with equal bounds take that value in every point.
///
pub fn generate(
    n_points: usize,
    ranges: &[(f64, f64)],
    seed: Option<u64>,
) -> Result<Array2<f64>, InferenceError> {
    validate(n_points, ranges)?;
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let mut seq = Array2::<f64>::zeros((n_points, ranges.len()));
    for (j, &(min, max)) in ranges.iter().enumerate() {
        if min == max {
            seq.column_mut(j).fill(min);
            continue;
        }
        let mut intervals: Vec<usize> = (0..n_points).collect();
        intervals.shuffle(&mut rng);

        for (i, interval) in intervals.into_iter().enumerate() {
            let value = rng.random::<f64>();
            seq[[i, j]] = min + ((interval as f64 + value) / n_points as f64) * (max - min);
        }
    }
    Ok(seq)
}
