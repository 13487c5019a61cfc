use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::structs::spec::SlotId;

/// Fatal errors raised while configuring or running an inference
///
/// Everything here aborts the run. Failures local to a single evaluation are
/// [EvaluationFailure]s instead, and are turned into penalty values by the optimizer.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// Invalid settings, such as a restart count of zero or an unknown objective
    #[error("configuration error: {0}")]
    Configuration(String),
    /// A malformed input file
    #[error("'{}' is not in the correct format: {detail}", path.display())]
    InputFormat { path: PathBuf, detail: String },
    /// The number of specified slots does not fit the model
    #[error("{what}: the model expects {expected} entries, found {found}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    /// A sampling dimension with a lower bound above its upper bound
    #[error("invalid bounds for dimension {dimension}: lower bound ({lower}) is greater than upper bound ({upper})")]
    InvalidBounds {
        dimension: usize,
        lower: f64,
        upper: f64,
    },
    /// Bounds of a parameter or initial condition that are inverted or not finite
    #[error("invalid bounds for {slot}: [{lower}, {upper}] is not a finite interval with lower <= upper")]
    InvalidSlotBounds { slot: SlotId, lower: f64, upper: f64 },
    /// Every starting point ended without a finite objective value
    #[error("all {} starting points failed to produce a finite objective value:\n{}", .0.len(), FailureSummary(.0))]
    AllStartsFailed(Vec<StartFailure>),
    /// The run was cancelled before every start completed
    #[error("the run was cancelled after {completed} of {total} starting points")]
    Cancelled { completed: usize, total: usize },
    /// A result file could not be written
    #[error("could not write '{}'", path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl InferenceError {
    pub(crate) fn input_format(path: impl Into<PathBuf>, detail: impl fmt::Display) -> Self {
        InferenceError::InputFormat {
            path: path.into(),
            detail: detail.to_string(),
        }
    }
}

/// Diagnostics for a starting point that did not produce a finite objective
#[derive(Debug, Clone, PartialEq)]
pub struct StartFailure {
    pub start: usize,
    pub evaluations: usize,
    pub message: String,
}

struct FailureSummary<'a>(&'a [StartFailure]);

impl fmt::Display for FailureSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for failure in self.0 {
            writeln!(
                f,
                "  start #{} ({} evaluations): {}",
                failure.start, failure.evaluations, failure.message
            )?;
        }
        Ok(())
    }
}

/// A single evaluation of the objective could not be completed
///
/// Typically raised by the simulator when the ODE integrator gives up on a candidate parameter set.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("evaluation failed: {0}")]
pub struct EvaluationFailure(pub String);

impl EvaluationFailure {
    pub fn new(message: impl Into<String>) -> Self {
        EvaluationFailure(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_starts_failed_lists_every_start() {
        let error = InferenceError::AllStartsFailed(vec![
            StartFailure {
                start: 0,
                evaluations: 3,
                message: "solver diverged".to_string(),
            },
            StartFailure {
                start: 1,
                evaluations: 2,
                message: "step size underflow".to_string(),
            },
        ]);
        let message = error.to_string();
        assert!(message.starts_with("all 2 starting points failed"));
        assert!(message.contains("start #0 (3 evaluations): solver diverged"));
        assert!(message.contains("start #1 (2 evaluations): step size underflow"));
    }

    #[test]
    fn input_format_names_the_file() {
        let error = InferenceError::input_format("paramtime.toml", "missing field `times`");
        assert_eq!(
            error.to_string(),
            "'paramtime.toml' is not in the correct format: missing field `times`"
        );
    }
}
