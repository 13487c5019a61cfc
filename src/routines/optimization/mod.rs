use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use argmin::{
    core::{CostFunction, Error, Executor, State},
    solver::neldermead::NelderMead,
};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::routines::objective::{Objective, PENALTY};
use crate::routines::simulation::Simulate;
use crate::structs::model::MomentModel;
use crate::structs::result::{Diagnostics, InferenceResult};
use crate::structs::spec::{BoxConstraints, SlotId, StartingPoint};
use crate::structs::trajectories::ObservedData;

/// Perturbation used for coordinates that start at zero
const ZERO_PERTURBATION: f64 = 0.00025;

/// Options for the Nelder-Mead search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct OptimizerOptions {
    /// Maximum number of iterations per start
    pub max_iters: u64,
    /// Stop when the standard deviation of the simplex costs falls below this value
    pub sd_tolerance: f64,
    /// Relative size of the initial simplex
    pub simplex_scale: f64,
}

impl Default for OptimizerOptions {
    fn default() -> Self {
        OptimizerOptions {
            max_iters: 1000,
            sd_tolerance: 1e-8,
            simplex_scale: 0.05,
        }
    }
}

/// Runs one bounded Nelder-Mead search from a starting point
///
/// The search moves only the variable slots. The reduced vector holds the variable parameters
/// followed by the variable initial conditions; fixed slots keep the values of the start.
pub struct SingleStartOptimizer<'a> {
    model: &'a MomentModel,
    simulator: &'a dyn Simulate,
    objective: &'a dyn Objective,
    observed: &'a ObservedData,
    times: &'a [f64],
    bounds: Option<&'a BoxConstraints>,
    options: OptimizerOptions,
}

impl<'a> SingleStartOptimizer<'a> {
    pub fn new(
        model: &'a MomentModel,
        simulator: &'a dyn Simulate,
        objective: &'a dyn Objective,
        observed: &'a ObservedData,
        times: &'a [f64],
    ) -> Self {
        SingleStartOptimizer {
            model,
            simulator,
            objective,
            observed,
            times,
            bounds: None,
            options: OptimizerOptions::default(),
        }
    }

    /// Enforce `bounds` during the search
    pub fn with_bounds(mut self, bounds: &'a BoxConstraints) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_options(mut self, options: OptimizerOptions) -> Self {
        self.options = options;
        self
    }

    /// Optimize from `start`; evaluation failures never escape, they show up in the result
    pub fn optimize(&self, start: &StartingPoint, index: usize) -> InferenceResult {
        let problem = FitProblem::new(self, start);
        let x0 = Array1::from(problem.reduce());

        let mut diagnostics = Diagnostics {
            start: index,
            starting_parameters: start.parameters.values(),
            starting_initial_conditions: start.initial_conditions.values(),
            iterations: 0,
            evaluations: 0,
            failed_evaluations: 0,
            termination: String::new(),
            message: None,
        };

        let (best, best_cost) = if x0.is_empty() {
            // Nothing to optimize, score the start as is
            let cost = problem.evaluate(&x0);
            diagnostics.termination = "no variable slots".to_string();
            (x0, cost)
        } else {
            match self.run_nelder_mead(&problem, x0.clone()) {
                Ok((best, cost, iterations, termination)) => {
                    diagnostics.iterations = iterations;
                    diagnostics.termination = termination;
                    (best, cost)
                }
                Err(e) => {
                    diagnostics.termination = "solver error".to_string();
                    problem.record_failure(e.to_string());
                    (x0, f64::INFINITY)
                }
            }
        };

        diagnostics.evaluations = problem.evaluations.load(Ordering::Relaxed);
        diagnostics.failed_evaluations = problem.failures.load(Ordering::Relaxed);
        diagnostics.message = problem.last_failure();

        let succeeded = diagnostics.evaluations > diagnostics.failed_evaluations;
        let objective = if succeeded && best_cost.is_finite() {
            best_cost
        } else {
            f64::INFINITY
        };
        let (parameters, initial_conditions) = problem.expand(best.as_slice().unwrap_or(&[]));

        InferenceResult {
            parameters,
            initial_conditions,
            objective,
            diagnostics,
        }
    }

    fn run_nelder_mead(
        &self,
        problem: &FitProblem<'_>,
        x0: Array1<f64>,
    ) -> Result<(Array1<f64>, f64, u64, String), Error> {
        let simplex = create_initial_simplex(&x0, self.options.simplex_scale);
        let solver = NelderMead::new(simplex).with_sd_tolerance(self.options.sd_tolerance)?;
        let res = Executor::new(problem, solver)
            .configure(|state| state.max_iters(self.options.max_iters))
            .run()?;

        let iterations = res.state.get_iter();
        let termination = format!("{:?}", res.state.get_termination_status());
        let cost = res.state.get_best_cost();
        let best = res.state.best_param.unwrap_or(x0);
        Ok((best, cost, iterations, termination))
    }
}

/// The composition `objective(simulate(expand(x)))` seen by the solver
struct FitProblem<'a> {
    optimizer: &'a SingleStartOptimizer<'a>,
    start: &'a StartingPoint,
    n_parameters: usize,
    // (slot, position in the reduced vector) for every bounded variable slot
    bounded: Vec<(SlotId, usize)>,
    evaluations: AtomicUsize,
    failures: AtomicUsize,
    last_failure: Mutex<Option<String>>,
}

impl<'a> FitProblem<'a> {
    fn new(optimizer: &'a SingleStartOptimizer<'a>, start: &'a StartingPoint) -> Self {
        let n_parameters = start.parameters.n_variable();
        let bounded = match optimizer.bounds {
            Some(bounds) => start
                .parameters
                .variable_indices()
                .into_iter()
                .map(SlotId::Parameter)
                .chain(
                    start
                        .initial_conditions
                        .variable_indices()
                        .into_iter()
                        .map(SlotId::InitialCondition),
                )
                .enumerate()
                .filter(|(_, slot)| bounds.get(*slot).is_some())
                .map(|(position, slot)| (slot, position))
                .collect(),
            None => Vec::new(),
        };
        FitProblem {
            optimizer,
            start,
            n_parameters,
            bounded,
            evaluations: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
            last_failure: Mutex::new(None),
        }
    }

    fn reduce(&self) -> Vec<f64> {
        let mut x = self.start.parameters.reduce();
        x.extend(self.start.initial_conditions.reduce());
        x
    }

    fn expand(&self, x: &[f64]) -> (Vec<f64>, Vec<f64>) {
        let split = self.n_parameters.min(x.len());
        (
            self.start.parameters.expand(&x[..split]),
            self.start.initial_conditions.expand(&x[split..]),
        )
    }

    /// Total distance of `x` outside the enforced bounds
    fn violation(&self, x: &Array1<f64>) -> f64 {
        let bounds = match self.optimizer.bounds {
            Some(bounds) => bounds,
            None => return 0.0,
        };
        self.bounded
            .iter()
            .filter_map(|&(slot, position)| bounds.get(slot).map(|b| b.violation(x[position])))
            .sum()
    }

    fn evaluate(&self, x: &Array1<f64>) -> f64 {
        let violation = self.violation(x);
        if violation > 0.0 {
            return PENALTY + violation;
        }
        let (parameters, initial_conditions) = self.expand(x.as_slice().unwrap_or(&[]));
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        let opt = self.optimizer;
        match opt
            .simulator
            .simulate(opt.model, &parameters, &initial_conditions, opt.times)
        {
            Ok(trajectories) => opt.objective.evaluate(&trajectories, opt.observed),
            Err(failure) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                tracing::trace!("{}", failure);
                self.record_failure(failure.to_string());
                PENALTY
            }
        }
    }

    fn record_failure(&self, message: String) {
        if let Ok(mut last) = self.last_failure.lock() {
            *last = Some(message);
        }
    }

    fn last_failure(&self) -> Option<String> {
        self.last_failure.lock().ok().and_then(|last| last.clone())
    }
}

impl CostFunction for &FitProblem<'_> {
    type Param = Array1<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> Result<Self::Output, Error> {
        Ok(self.evaluate(x))
    }
}

/// Simplex of `n + 1` vertices: the start plus one vertex per coordinate moved by `scale` of its value
fn create_initial_simplex(initial_point: &Array1<f64>, scale: f64) -> Vec<Array1<f64>> {
    let mut vertices = Vec::with_capacity(initial_point.len() + 1);
    vertices.push(initial_point.to_owned());

    for i in 0..initial_point.len() {
        let perturbation = if initial_point[i] == 0.0 {
            ZERO_PERTURBATION
        } else {
            scale * initial_point[i]
        };
        let mut perturbed_point = initial_point.to_owned();
        perturbed_point[i] += perturbation;
        vertices.push(perturbed_point);
    }

    vertices
}
