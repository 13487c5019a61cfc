use crate::error::InferenceError;
use crate::structs::model::MomentModel;
use crate::structs::trajectories::{ObservedData, Trajectories};

use super::{finite_or_penalty, resolve_symbols, Objective, PENALTY};

/// Sum of squared differences over every observed (time, moment) pair
#[derive(Debug, Clone)]
pub struct SumOfSquares {
    indices: Vec<usize>,
}

impl SumOfSquares {
    pub fn new(model: &MomentModel, observed: &ObservedData) -> Result<Self, InferenceError> {
        Ok(SumOfSquares {
            indices: resolve_symbols(model, observed)?,
        })
    }
}

impl Objective for SumOfSquares {
    fn evaluate(&self, simulated: &Trajectories, observed: &ObservedData) -> f64 {
        let mut sum = 0.0;
        for (&index, obs) in self.indices.iter().zip(observed.trajectories()) {
            let sim = simulated.moment(index);
            for (s, o) in sim.iter().zip(obs.values.iter()) {
                if !s.is_finite() {
                    return PENALTY;
                }
                sum += (s - o).powi(2);
            }
        }
        finite_or_penalty(sum)
    }
}
