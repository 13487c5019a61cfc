//! Multi-start parameter inference for moment-expansion approximations of stochastic reaction networks.
//!
//! A [MomentModel](structs::model::MomentModel) describes the moment ODE system. Given a paramtime
//! file (time points, parameters, initial conditions, bounds) and experimental data, the
//! [MultiStart](algorithms::MultiStart) orchestrator samples starting points, runs one bounded
//! Nelder-Mead search per start against the chosen objective, and ranks the results.
//!
//! Most users only need [entrypoints::fit] and the [prelude].

/// Provides the multi-start orchestrator and its lifecycle
pub mod algorithms;
/// Entry points reading settings and input files
pub mod entrypoints;
/// Library error types
pub mod error;
/// Logging configuration
pub mod logger;
/// Routines for sampling, simulation, objectives, optimization and input/output
pub mod routines {
    pub mod datafile;
    pub mod initialization;
    pub mod objective;
    pub mod optimization;
    pub mod output;
    pub mod paramtime;
    pub mod settings;
    pub mod simulation;
}
/// Data structures shared across the crate
pub mod structs;

pub use crate::entrypoints::{fit, fit_from_file, fit_with, simulate};

/// A collection of commonly used items
pub mod prelude {
    pub use crate::algorithms::{rank, InferenceConfig, MultiStart, Status};
    pub use crate::entrypoints::{fit, fit_from_file, fit_with, simulate};
    pub use crate::error::{EvaluationFailure, InferenceError, StartFailure};
    pub use crate::routines::datafile::{check_times, parse_data, read_data};
    pub use crate::routines::initialization::Sampler;
    pub use crate::routines::objective::{Objective, ObjectiveKind, PENALTY};
    pub use crate::routines::optimization::{OptimizerOptions, SingleStartOptimizer};
    pub use crate::routines::output::{render, write_trajectories, ReportWriter, TextReport};
    pub use crate::routines::paramtime::{parse_paramtime, read_paramtime, ParamTimeSpec};
    pub use crate::routines::settings::{read_settings, Settings};
    pub use crate::routines::simulation::{OdeSimulator, Simulate, Tolerances};
    pub use crate::structs::model::{Moment, MomentModel, State, T};
    pub use crate::structs::result::{BestFitReport, Diagnostics, InferenceResult};
    pub use crate::structs::spec::{
        pad_initial_conditions, Bounds, BoxConstraints, InitialConditionSpec, ParameterSpec, Slot,
        SlotId, SlotSpec, StartingPoint,
    };
    pub use crate::structs::trajectories::{ObservedData, ObservedTrajectory, Trajectories};
}
