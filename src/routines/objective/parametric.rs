use statrs::distribution::{Continuous, Gamma, LogNormal, Normal};

use crate::error::InferenceError;
use crate::structs::model::MomentModel;
use crate::structs::trajectories::{ObservedData, Trajectories};

use super::{finite_or_penalty, resolve_species, Objective, ObjectiveKind, PENALTY};

/// Parametric family of the per-observation density
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Normal,
    LogNormal,
    Gamma,
}

impl Family {
    fn kind(self) -> ObjectiveKind {
        match self {
            Family::Normal => ObjectiveKind::Gaussian,
            Family::LogNormal => ObjectiveKind::Lognormal,
            Family::Gamma => ObjectiveKind::Gamma,
        }
    }

    /// Log-density at `x` of the member of this family with the given mean and variance
    ///
    /// `None` when no member has these moments.
    pub fn ln_pdf(self, mean: f64, variance: f64, x: f64) -> Option<f64> {
        if !(variance > 0.0) || !mean.is_finite() || !variance.is_finite() {
            return None;
        }
        match self {
            Family::Normal => Normal::new(mean, variance.sqrt()).ok().map(|d| d.ln_pdf(x)),
            Family::LogNormal => {
                if mean <= 0.0 {
                    return None;
                }
                let scale2 = (1.0 + variance / (mean * mean)).ln();
                let location = mean.ln() - scale2 / 2.0;
                LogNormal::new(location, scale2.sqrt())
                    .ok()
                    .map(|d| d.ln_pdf(x))
            }
            Family::Gamma => {
                if mean <= 0.0 {
                    return None;
                }
                let shape = mean * mean / variance;
                let rate = mean / variance;
                Gamma::new(shape, rate).ok().map(|d| d.ln_pdf(x))
            }
        }
    }
}

/// Negative log-likelihood of the observations under a parametric density per species and time point
///
/// Every observed trajectory must be a species mean; its density at each time point takes the
/// simulated mean and variance of that species.
#[derive(Debug, Clone)]
pub struct Parametric {
    family: Family,
    // (mean index, variance index) per observed trajectory
    moments: Vec<(usize, usize)>,
}

impl Parametric {
    pub fn new(
        family: Family,
        model: &MomentModel,
        observed: &ObservedData,
    ) -> Result<Self, InferenceError> {
        let moments = resolve_species(model, observed, family.kind())?
            .into_iter()
            .map(|species| {
                match (model.mean_of(species), model.variance_of(species)) {
                    (Some(mean), Some(variance)) => Ok((mean, variance)),
                    _ => Err(InferenceError::Configuration(format!(
                        "the {} objective needs the variance of species {}, which the model does not provide",
                        family.kind(),
                        species
                    ))),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Parametric { family, moments })
    }
}

impl Objective for Parametric {
    fn evaluate(&self, simulated: &Trajectories, observed: &ObservedData) -> f64 {
        let mut nll = 0.0;
        for (&(m, v), obs) in self.moments.iter().zip(observed.trajectories()) {
            let means = simulated.moment(m);
            let variances = simulated.moment(v);
            for ((&mean, &variance), &x) in means.iter().zip(variances).zip(&obs.values) {
                match self.family.ln_pdf(mean, variance, x) {
                    Some(ln_p) => nll -= ln_p,
                    None => return PENALTY,
                }
            }
        }
        finite_or_penalty(nll)
    }
}
