use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InferenceError;
use crate::structs::model::MomentModel;
use crate::structs::trajectories::{ObservedData, Trajectories};

pub mod maxent;
pub mod parametric;
pub mod sumsq;

use maxent::MaxEnt;
use parametric::{Family, Parametric};
use sumsq::SumOfSquares;

/// Finite value returned in place of NaN or infinite objective values, and for failed evaluations
pub const PENALTY: f64 = 1e12;

/// Scores simulated trajectories against observed data; lower is better
pub trait Objective: Send + Sync {
    fn evaluate(&self, simulated: &Trajectories, observed: &ObservedData) -> f64;
}

/// The objective used to compare simulations with data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    /// Sum of squared differences between simulated and observed moments
    #[default]
    SumOfSquares,
    /// Negative log-likelihood under a normal density
    #[serde(alias = "normal")]
    Gaussian,
    /// Negative log-likelihood under a log-normal density
    Lognormal,
    /// Negative log-likelihood under a gamma density
    Gamma,
    /// Negative log-likelihood under the maximum-entropy density matching the simulated moments
    Maxent,
}

impl ObjectiveKind {
    /// Build the strategy for this kind, resolving observed symbols against `model`
    pub fn strategy(
        self,
        model: &MomentModel,
        observed: &ObservedData,
    ) -> Result<Box<dyn Objective>, InferenceError> {
        let strategy: Box<dyn Objective> = match self {
            ObjectiveKind::SumOfSquares => Box::new(SumOfSquares::new(model, observed)?),
            ObjectiveKind::Gaussian => {
                Box::new(Parametric::new(Family::Normal, model, observed)?)
            }
            ObjectiveKind::Lognormal => {
                Box::new(Parametric::new(Family::LogNormal, model, observed)?)
            }
            ObjectiveKind::Gamma => Box::new(Parametric::new(Family::Gamma, model, observed)?),
            ObjectiveKind::Maxent => Box::new(MaxEnt::new(model, observed)?),
        };
        Ok(strategy)
    }
}

impl std::fmt::Display for ObjectiveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ObjectiveKind::SumOfSquares => "sum_of_squares",
            ObjectiveKind::Gaussian => "gaussian",
            ObjectiveKind::Lognormal => "lognormal",
            ObjectiveKind::Gamma => "gamma",
            ObjectiveKind::Maxent => "maxent",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for ObjectiveKind {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "sum_of_squares" | "sumsq" => Ok(ObjectiveKind::SumOfSquares),
            "gaussian" | "normal" => Ok(ObjectiveKind::Gaussian),
            "lognormal" => Ok(ObjectiveKind::Lognormal),
            "gamma" => Ok(ObjectiveKind::Gamma),
            "maxent" => Ok(ObjectiveKind::Maxent),
            other => Err(InferenceError::Configuration(format!(
                "unknown objective '{}', expected one of sum_of_squares, gaussian, lognormal, gamma, maxent",
                other
            ))),
        }
    }
}

pub(crate) fn finite_or_penalty(value: f64) -> f64 {
    if value.is_finite() {
        value.min(PENALTY)
    } else {
        PENALTY
    }
}

/// Model index of each observed trajectory
fn resolve_symbols(
    model: &MomentModel,
    observed: &ObservedData,
) -> Result<Vec<usize>, InferenceError> {
    observed
        .trajectories()
        .iter()
        .map(|o| {
            model.index_of(&o.symbol).ok_or_else(|| {
                InferenceError::Configuration(format!(
                    "observed moment '{}' is not part of the model (available: {})",
                    o.symbol,
                    model.symbols().join(", ")
                ))
            })
        })
        .collect()
}

/// Species index of each observed trajectory, which must refer to a species mean
fn resolve_species(
    model: &MomentModel,
    observed: &ObservedData,
    objective: ObjectiveKind,
) -> Result<Vec<usize>, InferenceError> {
    resolve_symbols(model, observed)?
        .into_iter()
        .zip(observed.trajectories())
        .map(|(index, o)| {
            let moment = &model.moments()[index];
            match moment.species() {
                Some(species) if moment.order() == 1 => Ok(species),
                _ => Err(InferenceError::Configuration(format!(
                    "the {} objective needs observations of species means, '{}' is not one",
                    objective, o.symbol
                ))),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn objective_kind_parses_names_and_aliases() {
        assert_eq!(
            "sum_of_squares".parse::<ObjectiveKind>().unwrap(),
            ObjectiveKind::SumOfSquares
        );
        assert_eq!("normal".parse::<ObjectiveKind>().unwrap(), ObjectiveKind::Gaussian);
        assert_eq!("MaxEnt".parse::<ObjectiveKind>().unwrap(), ObjectiveKind::Maxent);
        assert!(matches!(
            "poisson".parse::<ObjectiveKind>(),
            Err(InferenceError::Configuration(_))
        ));
    }

    #[test]
    fn objective_kind_round_trips_through_display() {
        for kind in [
            ObjectiveKind::SumOfSquares,
            ObjectiveKind::Gaussian,
            ObjectiveKind::Lognormal,
            ObjectiveKind::Gamma,
            ObjectiveKind::Maxent,
        ] {
            assert_eq!(kind.to_string().parse::<ObjectiveKind>().unwrap(), kind);
        }
    }

    #[test]
    fn penalty_replaces_non_finite_values() {
        assert_eq!(finite_or_penalty(f64::NAN), PENALTY);
        assert_eq!(finite_or_penalty(f64::INFINITY), PENALTY);
        assert_eq!(finite_or_penalty(f64::NEG_INFINITY), PENALTY);
        assert_eq!(finite_or_penalty(3.5), 3.5);
    }
}
