use argmin::core::{CostFunction, Error, Executor, Gradient};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;

use crate::error::InferenceError;
use crate::structs::model::MomentModel;
use crate::structs::trajectories::{ObservedData, Trajectories};

use super::{finite_or_penalty, resolve_species, Objective, ObjectiveKind, PENALTY};

/// Highest central moment used in the reconstruction
const MAX_ORDER: u32 = 4;
/// Half-width of the standardized support, in standard deviations
const SUPPORT: f64 = 10.0;
const GRID_POINTS: usize = 256;
const MAX_ITERS: u64 = 200;
const TOLERANCE: f64 = 1e-7;

/// Negative log-likelihood under the maximum-entropy density matching the simulated moments
///
/// For every species and time point, the density on a non-negative support is
/// `p(z) ∝ exp(-Σ λ_k z^k)` over the standardized variable `z = (x - mean) / sd`, with the
/// multipliers chosen so that its central moments match the simulated ones up to order four.
#[derive(Debug, Clone)]
pub struct MaxEnt {
    groups: Vec<SpeciesGroup>,
}

#[derive(Debug, Clone)]
struct SpeciesGroup {
    /// Model indices of the mean and of the central moments of order 2, 3, ...
    moments: Vec<usize>,
    /// Observed trajectories of this species
    observations: Vec<usize>,
}

impl MaxEnt {
    pub fn new(model: &MomentModel, observed: &ObservedData) -> Result<Self, InferenceError> {
        let species = resolve_species(model, observed, ObjectiveKind::Maxent)?;
        let mut groups: Vec<(usize, SpeciesGroup)> = Vec::new();
        for (obs, s) in species.into_iter().enumerate() {
            if let Some((_, group)) = groups.iter_mut().find(|(g, _)| *g == s) {
                group.observations.push(obs);
                continue;
            }
            let moments: Vec<usize> = (1..=MAX_ORDER)
                .map_while(|order| model.central_moment(s, order))
                .collect();
            if moments.len() < 2 {
                return Err(InferenceError::Configuration(format!(
                    "the maxent objective needs at least the variance of species {}",
                    s
                )));
            }
            groups.push((
                s,
                SpeciesGroup {
                    moments,
                    observations: vec![obs],
                },
            ));
        }
        Ok(MaxEnt {
            groups: groups.into_iter().map(|(_, g)| g).collect(),
        })
    }
}

impl Objective for MaxEnt {
    fn evaluate(&self, simulated: &Trajectories, observed: &ObservedData) -> f64 {
        let mut nll = 0.0;
        for group in &self.groups {
            for t in 0..observed.times().len() {
                let moments: Option<Vec<f64>> = group
                    .moments
                    .iter()
                    .map(|&m| simulated.moment(m).get(t).copied())
                    .collect();
                let density = match moments.as_deref().and_then(Density::reconstruct) {
                    Some(density) => density,
                    None => return PENALTY,
                };
                for &obs in &group.observations {
                    match observed.trajectories()[obs].values.get(t) {
                        Some(&value) => nll -= density.ln_pdf(value),
                        None => return PENALTY,
                    }
                }
            }
        }
        finite_or_penalty(nll)
    }
}

/// A maximum-entropy density in standardized coordinates
#[derive(Debug, Clone)]
pub struct Density {
    mean: f64,
    sd: f64,
    lower: f64,
    lambda: Vec<f64>,
    ln_z: f64,
}

impl Density {
    /// Fit the density to `[mean, variance, third central moment, ...]`
    ///
    /// `None` if the moments are not finite, the variance is not positive, the mean is not
    /// positive, or the dual problem cannot be solved.
    pub fn reconstruct(moments: &[f64]) -> Option<Density> {
        if moments.len() < 2 || moments.iter().any(|m| !m.is_finite()) {
            return None;
        }
        let (mean, variance) = (moments[0], moments[1]);
        if !(variance > 0.0) || mean <= 0.0 {
            return None;
        }
        let sd = variance.sqrt();

        // Standardized raw moments: E[z] = 0, E[z^2] = 1, E[z^k] = c_k / sd^k
        let mut targets = vec![0.0, 1.0];
        for (k, c) in moments.iter().enumerate().skip(2) {
            targets.push(c / sd.powi(k as i32 + 1));
        }

        let lower = (-mean / sd).max(-SUPPORT);
        let step = (SUPPORT - lower) / (GRID_POINTS - 1) as f64;
        let grid: Vec<f64> = (0..GRID_POINTS).map(|i| lower + i as f64 * step).collect();

        let dual = Dual {
            grid: &grid,
            step,
            targets: &targets,
        };
        let init = vec![0.0; targets.len()];
        let linesearch = MoreThuenteLineSearch::new();
        let solver = LBFGS::new(linesearch, 7)
            .with_tolerance_grad(TOLERANCE)
            .ok()?
            .with_tolerance_cost(1e-12)
            .ok()?;
        let res = Executor::new(dual, solver)
            .configure(|state| state.param(init).max_iters(MAX_ITERS))
            .run()
            .ok()?;
        let lambda = res.state.best_param?;

        let ln_z = log_partition(&grid, step, &lambda);
        if !ln_z.is_finite() {
            return None;
        }
        Some(Density {
            mean,
            sd,
            lower,
            lambda,
            ln_z,
        })
    }

    /// Log-density at `x`; points outside the support are evaluated at its edge
    pub fn ln_pdf(&self, x: f64) -> f64 {
        let z = ((x - self.mean) / self.sd).clamp(self.lower, SUPPORT);
        -polynomial(&self.lambda, z) - self.ln_z - self.sd.ln()
    }
}

/// `Σ λ_k z^k` for k starting at one
fn polynomial(lambda: &[f64], z: f64) -> f64 {
    let mut power = 1.0;
    let mut sum = 0.0;
    for l in lambda {
        power *= z;
        sum += l * power;
    }
    sum
}

fn log_partition(grid: &[f64], step: f64, lambda: &[f64]) -> f64 {
    let exponents: Vec<f64> = grid.iter().map(|&z| -polynomial(lambda, z)).collect();
    let max = exponents.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let sum: f64 = exponents.iter().map(|a| (a - max).exp()).sum();
    max + (sum * step).ln()
}

/// Convex dual of the moment-matching problem: `ln Z(λ) + Σ λ_k m_k`
struct Dual<'a> {
    grid: &'a [f64],
    step: f64,
    targets: &'a [f64],
}

impl CostFunction for Dual<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, lambda: &Self::Param) -> Result<Self::Output, Error> {
        let linear: f64 = lambda.iter().zip(self.targets).map(|(l, m)| l * m).sum();
        Ok(log_partition(self.grid, self.step, lambda) + linear)
    }
}

impl Gradient for Dual<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, lambda: &Self::Param) -> Result<Self::Gradient, Error> {
        let exponents: Vec<f64> = self.grid.iter().map(|&z| -polynomial(lambda, z)).collect();
        let max = exponents.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = exponents.iter().map(|a| (a - max).exp()).collect();
        let total: f64 = weights.iter().sum();

        // d/dλ_k = m_k - E_p[z^k]
        let mut expected = vec![0.0; lambda.len()];
        for (&z, w) in self.grid.iter().zip(&weights) {
            let mut power = 1.0;
            for e in expected.iter_mut() {
                power *= z;
                *e += w * power;
            }
        }
        Ok(self
            .targets
            .iter()
            .zip(expected)
            .map(|(m, e)| m - e / total)
            .collect())
    }
}
