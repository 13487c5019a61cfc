use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rayon::prelude::*;

use crate::algorithms::Status;
use crate::error::{InferenceError, StartFailure};
use crate::routines::datafile::check_times;
use crate::routines::initialization::Sampler;
use crate::routines::objective::ObjectiveKind;
use crate::routines::optimization::{OptimizerOptions, SingleStartOptimizer};
use crate::routines::output::ReportWriter;
use crate::routines::paramtime::ParamTimeSpec;
use crate::routines::settings::Settings;
use crate::routines::simulation::Simulate;
use crate::structs::model::MomentModel;
use crate::structs::result::{BestFitReport, InferenceResult};
use crate::structs::spec::{pad_initial_conditions, SlotId, StartingPoint};
use crate::structs::trajectories::ObservedData;

/// Immutable configuration of a multi-start run
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceConfig {
    pub restarts: usize,
    pub objective: ObjectiveKind,
    pub bounds_enabled: bool,
    pub seed: Option<u64>,
    pub sampler: Sampler,
    /// Worker threads, 0 for one per core
    pub threads: usize,
    pub optimizer: OptimizerOptions,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        InferenceConfig {
            restarts: 1,
            objective: ObjectiveKind::default(),
            bounds_enabled: false,
            seed: None,
            sampler: Sampler::default(),
            threads: 0,
            optimizer: OptimizerOptions::default(),
        }
    }
}

impl From<&Settings> for InferenceConfig {
    fn from(settings: &Settings) -> Self {
        InferenceConfig {
            restarts: settings.config.restarts,
            objective: settings.config.objective,
            bounds_enabled: settings.config.bounds,
            seed: settings.config.seed,
            sampler: settings.config.sampler,
            threads: settings.config.threads,
            optimizer: settings.optimizer,
        }
    }
}

/// Multi-start inference: sample starting points, optimize each one, and keep the best
///
/// Starts are independent and run on a dedicated `rayon` pool. Inputs are only ever read; the
/// single shared mutable resource is the buffer the workers append their results to.
pub struct MultiStart<'a, S: Simulate> {
    model: &'a MomentModel,
    simulator: &'a S,
    config: InferenceConfig,
    cancel: Option<Arc<AtomicBool>>,
    status: Status,
}

impl<'a, S: Simulate> MultiStart<'a, S> {
    pub fn new(model: &'a MomentModel, simulator: &'a S, config: InferenceConfig) -> Self {
        MultiStart {
            model,
            simulator,
            config,
            cancel: None,
            status: Status::Configured,
        }
    }

    /// Starts not yet running when `flag` is raised are skipped
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn config(&self) -> &InferenceConfig {
        &self.config
    }

    /// The starting points of a run, in submission order
    ///
    /// A single start is the spec as given, with padded initial conditions. Otherwise every
    /// variable slot is sampled within its bounds, which must then exist.
    pub fn starting_points(&self, spec: &ParamTimeSpec) -> Result<Vec<StartingPoint>, InferenceError> {
        if self.config.restarts == 0 {
            return Err(InferenceError::Configuration(
                "the number of restarts must be at least 1".to_string(),
            ));
        }
        spec.check_model(self.model)?;
        spec.bounds.validate()?;
        let initial_conditions =
            pad_initial_conditions(&spec.initial_conditions, self.model.number_of_equations())?;
        let template = StartingPoint {
            parameters: spec.parameters.clone(),
            initial_conditions,
        };
        if self.config.restarts == 1 {
            return Ok(vec![template]);
        }

        let slots: Vec<SlotId> = template
            .parameters
            .variable_indices()
            .into_iter()
            .map(SlotId::Parameter)
            .chain(
                template
                    .initial_conditions
                    .variable_indices()
                    .into_iter()
                    .map(SlotId::InitialCondition),
            )
            .collect();
        let ranges = slots
            .iter()
            .map(|&slot| match spec.bounds.get(slot) {
                Some(b) => Ok((b.lower, b.upper)),
                None => Err(InferenceError::Configuration(format!(
                    "{} is variable but has no bounds, which are required to sample {} starting points",
                    slot, self.config.restarts
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let seed = match self.config.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random::<u64>();
                tracing::info!("No seed configured, sampling with seed {}", seed);
                seed
            }
        };
        let points = self
            .config
            .sampler
            .generate(self.config.restarts, &ranges, Some(seed))
            .map_err(|e| match e {
                InferenceError::InvalidBounds {
                    dimension,
                    lower,
                    upper,
                } => InferenceError::InvalidSlotBounds {
                    slot: slots[dimension],
                    lower,
                    upper,
                },
                other => other,
            })?;

        let n_parameters = template.parameters.n_variable();
        Ok(points
            .rows()
            .into_iter()
            .map(|row| {
                let row = row.to_vec();
                StartingPoint {
                    parameters: template.parameters.with_variable_values(&row[..n_parameters]),
                    initial_conditions: template
                        .initial_conditions
                        .with_variable_values(&row[n_parameters..]),
                }
            })
            .collect())
    }

    /// Run every start and rank the results
    pub fn run(
        &mut self,
        spec: &ParamTimeSpec,
        observed: &ObservedData,
    ) -> Result<BestFitReport, InferenceError> {
        let outcome = self.try_run(spec, observed);
        if let Err(e) = &outcome {
            self.status = Status::Failed;
            tracing::error!("Inference failed: {}", e);
        }
        outcome
    }

    fn try_run(
        &mut self,
        spec: &ParamTimeSpec,
        observed: &ObservedData,
    ) -> Result<BestFitReport, InferenceError> {
        self.status = Status::Configured;
        check_times(observed, &spec.times)?;
        let objective = self.config.objective.strategy(self.model, observed)?;
        tracing::info!(
            "Fitting {} observed trajectories with the {} objective",
            observed.trajectories().len(),
            self.config.objective
        );

        if self.config.restarts > 1 {
            self.status = Status::Sampling;
            tracing::info!(
                "Sampling {} starting points ({})",
                self.config.restarts,
                self.config.sampler
            );
        }
        let starts = self.starting_points(spec)?;
        let total = starts.len();

        self.status = Status::Optimizing;
        tracing::info!("Optimizing from {} starting points", total);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads)
            .build()
            .map_err(|e| {
                InferenceError::Configuration(format!("could not start the worker pool: {}", e))
            })?;

        let mut optimizer = SingleStartOptimizer::new(
            self.model,
            self.simulator,
            objective.as_ref(),
            observed,
            &spec.times,
        )
        .with_options(self.config.optimizer);
        if self.config.bounds_enabled {
            optimizer = optimizer.with_bounds(&spec.bounds);
        }

        let buffer: Mutex<Vec<InferenceResult>> = Mutex::new(Vec::with_capacity(total));
        let cancel = self.cancel.as_deref();
        pool.install(|| {
            starts.par_iter().enumerate().for_each(|(index, start)| {
                if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                    return;
                }
                let span = tracing::info_span!("start", index);
                let _enter = span.enter();
                let result = optimizer.optimize(start, index);
                if result.is_success() {
                    tracing::debug!(
                        "Objective {} after {} evaluations",
                        result.objective,
                        result.diagnostics.evaluations
                    );
                } else {
                    tracing::warn!(
                        "No finite objective after {} evaluations: {}",
                        result.diagnostics.evaluations,
                        result.diagnostics.message.as_deref().unwrap_or("unknown failure")
                    );
                }
                buffer
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(result);
            })
        });
        let results = buffer
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if results.len() < total {
            return Err(InferenceError::Cancelled {
                completed: results.len(),
                total,
            });
        }

        let ranked = rank(results);
        self.status = Status::Ranked;
        if !ranked[0].is_success() {
            return Err(InferenceError::AllStartsFailed(
                ranked
                    .iter()
                    .map(|r| StartFailure {
                        start: r.diagnostics.start,
                        evaluations: r.diagnostics.evaluations,
                        message: r
                            .diagnostics
                            .message
                            .clone()
                            .unwrap_or_else(|| r.diagnostics.termination.clone()),
                    })
                    .collect(),
            ));
        }

        let best = &ranked[0];
        tracing::info!(
            "Best fit from start #{} with objective {}: parameters {:?}",
            best.diagnostics.start,
            best.objective,
            best.parameters
        );
        let failed = ranked.iter().filter(|r| !r.is_success()).count();
        if failed > 0 {
            tracing::warn!("{} of {} starts failed", failed, total);
        }

        let parameter_names = self
            .model
            .parameter_names()
            .iter()
            .enumerate()
            .map(|(i, name)| {
                spec.parameter_names
                    .get(i)
                    .cloned()
                    .flatten()
                    .unwrap_or_else(|| name.clone())
            })
            .collect();
        Ok(BestFitReport {
            objective_kind: self.config.objective,
            times: spec.times.clone(),
            parameter_names,
            symbols: self.model.symbols(),
            parameter_mask: spec.parameters.mask(),
            initial_condition_mask: starts[0].initial_conditions.mask(),
            ranked,
        })
    }

    /// Hand `report` to `writer`
    pub fn report(
        &mut self,
        report: &BestFitReport,
        writer: &dyn ReportWriter,
    ) -> Result<(), InferenceError> {
        match writer.write(report) {
            Ok(()) => {
                self.status = Status::Reported;
                Ok(())
            }
            Err(e) => {
                self.status = Status::Failed;
                Err(e)
            }
        }
    }

    /// [MultiStart::run] followed by [MultiStart::report]
    pub fn run_and_report(
        &mut self,
        spec: &ParamTimeSpec,
        observed: &ObservedData,
        writer: &dyn ReportWriter,
    ) -> Result<BestFitReport, InferenceError> {
        let report = self.run(spec, observed)?;
        self.report(&report, writer)?;
        Ok(report)
    }
}

/// Sort results ascending by objective value; ties keep submission order
///
/// Results may arrive in any order, so they are first put back in submission order.
pub fn rank(mut results: Vec<InferenceResult>) -> Vec<InferenceResult> {
    results.sort_by_key(|r| r.diagnostics.start);
    results.sort_by(|a, b| a.objective.total_cmp(&b.objective));
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routines::simulation::OdeSimulator;
    use crate::structs::model::{Moment, State, T};
    use crate::structs::result::Diagnostics;
    use crate::structs::spec::{Bounds, BoxConstraints, SlotSpec};

    fn result(start: usize, objective: f64) -> InferenceResult {
        InferenceResult {
            parameters: vec![start as f64],
            initial_conditions: vec![],
            objective,
            diagnostics: Diagnostics {
                start,
                starting_parameters: vec![],
                starting_initial_conditions: vec![],
                iterations: 0,
                evaluations: 1,
                failed_evaluations: 0,
                termination: String::new(),
                message: None,
            },
        }
    }

    #[test]
    fn ranking_selects_the_lowest_objective() {
        let ranked = rank(vec![result(0, 5.0), result(1, 1.0), result(2, 3.0)]);
        let objectives: Vec<f64> = ranked.iter().map(|r| r.objective).collect();
        assert_eq!(objectives, vec![1.0, 3.0, 5.0]);
    }

    #[test]
    fn ties_go_to_the_first_submitted_start() {
        // Arrival order differs from submission order
        let ranked = rank(vec![result(1, 1.0), result(0, 1.0)]);
        assert_eq!(ranked[0].diagnostics.start, 0);
    }

    #[test]
    fn failed_starts_rank_last() {
        let ranked = rank(vec![result(0, f64::INFINITY), result(1, 2.0)]);
        assert_eq!(ranked[0].diagnostics.start, 1);
    }

    fn dimer(_t: T, _y: &State, _p: &[T], dy: &mut State) {
        dy.fill(0.0);
    }

    fn model() -> MomentModel {
        MomentModel::new(
            dimer,
            vec![
                Moment::new("y_0", vec![1]),
                Moment::new("yx1", vec![2]),
                Moment::new("yx2", vec![3]),
            ],
            vec!["k1".to_string(), "k2".to_string()],
        )
    }

    fn spec() -> ParamTimeSpec {
        let mut bounds = BoxConstraints::new();
        bounds.insert(SlotId::Parameter(0), Bounds::new(0.0, 10.0));
        bounds.insert(SlotId::InitialCondition(0), Bounds::new(5.0, 6.0));
        ParamTimeSpec {
            times: vec![0.0, 1.0],
            parameters: SlotSpec::from_pairs(&[(1.0, true), (2.0, false)]),
            initial_conditions: SlotSpec::from_pairs(&[(5.5, true)]),
            bounds,
            parameter_names: vec![None, None],
        }
    }

    fn config(restarts: usize) -> InferenceConfig {
        InferenceConfig {
            restarts,
            seed: Some(7),
            ..InferenceConfig::default()
        }
    }

    #[test]
    fn single_start_uses_the_spec_unchanged() {
        let model = model();
        let simulator = OdeSimulator::default();
        let multistart = MultiStart::new(&model, &simulator, config(1));
        let starts = multistart.starting_points(&spec()).unwrap();
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[0].parameters, spec().parameters);
        assert_eq!(starts[0].initial_conditions.values(), vec![5.5, 0.0, 0.0]);
        assert_eq!(
            starts[0].initial_conditions.mask(),
            vec![true, false, false]
        );
    }

    #[test]
    fn sampled_starts_respect_masks_and_bounds() {
        let model = model();
        let simulator = OdeSimulator::default();
        let multistart = MultiStart::new(&model, &simulator, config(8));
        let starts = multistart.starting_points(&spec()).unwrap();
        assert_eq!(starts.len(), 8);
        for start in &starts {
            let p = start.parameters.values();
            assert!((0.0..=10.0).contains(&p[0]));
            assert_eq!(p[1], 2.0);
            let ic = start.initial_conditions.values();
            assert!((5.0..=6.0).contains(&ic[0]));
            assert_eq!(&ic[1..], &[0.0, 0.0]);
            assert_eq!(start.parameters.mask(), vec![true, false]);
        }
    }

    #[test]
    fn same_seed_gives_same_starts() {
        let model = model();
        let simulator = OdeSimulator::default();
        let a = MultiStart::new(&model, &simulator, config(5))
            .starting_points(&spec())
            .unwrap();
        let b = MultiStart::new(&model, &simulator, config(5))
            .starting_points(&spec())
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn sampling_requires_bounds_on_variable_slots() {
        let model = model();
        let simulator = OdeSimulator::default();
        let mut spec = spec();
        spec.bounds = BoxConstraints::new().with(SlotId::Parameter(0), 0.0, 1.0);
        let err = MultiStart::new(&model, &simulator, config(4))
            .starting_points(&spec)
            .unwrap_err();
        assert!(err.to_string().contains("initial condition 0"));
    }

    #[test]
    fn inverted_bounds_are_rejected_for_a_single_start() {
        let model = model();
        let simulator = OdeSimulator::default();
        let mut spec = spec();
        spec.bounds.insert(SlotId::Parameter(0), Bounds::new(5.0, 1.0));
        assert!(matches!(
            MultiStart::new(&model, &simulator, config(1)).starting_points(&spec),
            Err(InferenceError::InvalidSlotBounds {
                slot: SlotId::Parameter(0),
                ..
            })
        ));
    }

    #[test]
    fn invalid_sampling_bounds_name_the_slot() {
        let model = model();
        let simulator = OdeSimulator::default();
        let mut spec = spec();
        spec.bounds
            .insert(SlotId::InitialCondition(0), Bounds::new(6.0, f64::INFINITY));
        let err = MultiStart::new(&model, &simulator, config(4))
            .starting_points(&spec)
            .unwrap_err();
        assert!(matches!(
            err,
            InferenceError::InvalidSlotBounds {
                slot: SlotId::InitialCondition(0),
                ..
            }
        ));
        assert!(err.to_string().contains("initial condition 0"));
    }

    #[test]
    fn zero_restarts_are_a_configuration_error() {
        let model = model();
        let simulator = OdeSimulator::default();
        assert!(matches!(
            MultiStart::new(&model, &simulator, config(0)).starting_points(&spec()),
            Err(InferenceError::Configuration(_))
        ));
    }

    #[test]
    fn parameter_count_must_match_the_model() {
        let model = model();
        let simulator = OdeSimulator::default();
        let mut spec = spec();
        spec.parameters = SlotSpec::from_pairs(&[(1.0, true)]);
        assert!(matches!(
            MultiStart::new(&model, &simulator, config(1)).starting_points(&spec),
            Err(InferenceError::DimensionMismatch { expected: 2, found: 1, .. })
        ));
    }

    #[test]
    fn too_many_initial_conditions_are_rejected() {
        let model = model();
        let simulator = OdeSimulator::default();
        let mut spec = spec();
        spec.initial_conditions = SlotSpec::from_pairs(&[(1.0, false); 4]);
        assert!(matches!(
            MultiStart::new(&model, &simulator, config(1)).starting_points(&spec),
            Err(InferenceError::DimensionMismatch { expected: 3, found: 4, .. })
        ));
    }
}
