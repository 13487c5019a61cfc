use serde::{Deserialize, Serialize};

pub mod multistart;

pub use multistart::{rank, InferenceConfig, MultiStart};

/// Lifecycle of a multi-start run
///
/// `Configured → Sampling → Optimizing → Ranked → Reported`, with `Sampling` skipped for a
/// single start. Any fatal error moves the run to `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Inputs validated, nothing has run yet
    Configured,
    /// Drawing starting points
    Sampling,
    /// Running one optimization per starting point
    Optimizing,
    /// Results collected and sorted
    Ranked,
    /// Best fit handed to the report writer
    Reported,
    /// Stopped on a fatal error
    Failed,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Configured => write!(f, "Configured"),
            Status::Sampling => write!(f, "Sampling starting points"),
            Status::Optimizing => write!(f, "Optimizing"),
            Status::Ranked => write!(f, "Ranked"),
            Status::Reported => write!(f, "Reported"),
            Status::Failed => write!(f, "Failed"),
        }
    }
}
