use serde::Serialize;

use crate::routines::objective::ObjectiveKind;

/// Bookkeeping for one optimization run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostics {
    /// Submission index of the starting point
    pub start: usize,
    pub starting_parameters: Vec<f64>,
    pub starting_initial_conditions: Vec<f64>,
    pub iterations: u64,
    /// Objective evaluations that ran a simulation
    pub evaluations: usize,
    /// Evaluations whose simulation failed and were scored with the penalty
    pub failed_evaluations: usize,
    pub termination: String,
    /// Last failure seen, if any
    pub message: Option<String>,
}

/// Outcome of a single optimization run
///
/// A run without a single successful evaluation has an infinite objective value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceResult {
    pub parameters: Vec<f64>,
    pub initial_conditions: Vec<f64>,
    pub objective: f64,
    pub diagnostics: Diagnostics,
}

impl InferenceResult {
    pub fn is_success(&self) -> bool {
        self.objective.is_finite()
    }
}

/// The selected best fit together with the context needed to report it
#[derive(Debug, Clone, Serialize)]
pub struct BestFitReport {
    pub objective_kind: ObjectiveKind,
    pub times: Vec<f64>,
    pub parameter_names: Vec<String>,
    pub symbols: Vec<String>,
    pub parameter_mask: Vec<bool>,
    pub initial_condition_mask: Vec<bool>,
    /// Every result, best first
    pub ranked: Vec<InferenceResult>,
}

impl BestFitReport {
    pub fn best(&self) -> &InferenceResult {
        &self.ranked[0]
    }

    pub fn n_failed(&self) -> usize {
        self.ranked.iter().filter(|r| !r.is_success()).count()
    }
}
