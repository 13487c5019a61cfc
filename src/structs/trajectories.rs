use crate::error::InferenceError;

/// Simulated moment trajectories
///
/// `values[m][t]` is moment `m` at `times[t]`. Moments follow the order of the model.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectories {
    times: Vec<f64>,
    symbols: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl Trajectories {
    pub fn new(times: Vec<f64>, symbols: Vec<String>, values: Vec<Vec<f64>>) -> Self {
        Trajectories {
            times,
            symbols,
            values,
        }
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn moment(&self, index: usize) -> &[f64] {
        &self.values[index]
    }

    pub fn n_moments(&self) -> usize {
        self.values.len()
    }

    pub fn is_finite(&self) -> bool {
        self.values.iter().flatten().all(|v| v.is_finite())
    }
}

/// One observed trajectory of a moment
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedTrajectory {
    pub symbol: String,
    pub values: Vec<f64>,
}

/// Experimental data, aligned on a common set of time points
///
/// The same symbol may appear several times, once per replicate or sample path.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedData {
    times: Vec<f64>,
    trajectories: Vec<ObservedTrajectory>,
}

impl ObservedData {
    /// Fails unless every trajectory holds exactly one value per time point
    pub fn new(
        times: Vec<f64>,
        trajectories: Vec<ObservedTrajectory>,
    ) -> Result<Self, InferenceError> {
        if let Some(short) = trajectories.iter().find(|t| t.values.len() != times.len()) {
            return Err(InferenceError::Configuration(format!(
                "observed trajectory '{}' has {} values for {} time points",
                short.symbol,
                short.values.len(),
                times.len()
            )));
        }
        Ok(ObservedData {
            times,
            trajectories,
        })
    }

    /// Treat every moment of `simulated` as an observation of itself
    pub fn from_trajectories(simulated: &Trajectories) -> Self {
        ObservedData {
            times: simulated.times().to_vec(),
            trajectories: simulated
                .symbols()
                .iter()
                .enumerate()
                .map(|(i, symbol)| ObservedTrajectory {
                    symbol: symbol.clone(),
                    values: simulated.moment(i).to_vec(),
                })
                .collect(),
        }
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn trajectories(&self) -> &[ObservedTrajectory] {
        &self.trajectories
    }

    pub fn n_observations(&self) -> usize {
        self.trajectories.iter().map(|t| t.values.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trajectory(values: Vec<f64>) -> ObservedTrajectory {
        ObservedTrajectory {
            symbol: "y_0".to_string(),
            values,
        }
    }

    #[test]
    fn observations_must_cover_every_time_point() {
        let err = ObservedData::new(vec![0.0, 1.0], vec![trajectory(vec![1.0])]).unwrap_err();
        assert!(matches!(err, InferenceError::Configuration(_)));
        assert!(err.to_string().contains("'y_0' has 1 values for 2 time points"));

        let data = ObservedData::new(
            vec![0.0, 1.0],
            vec![trajectory(vec![1.0, 2.0]), trajectory(vec![3.0, 4.0])],
        )
        .unwrap();
        assert_eq!(data.n_observations(), 4);
    }
}
