use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use eyre::Result;
use momentfit::prelude::*;

fn decay(_t: T, y: &State, p: &[T], dy: &mut State) {
    dy[0] = -p[0] * y[0];
}

fn decay_model() -> MomentModel {
    MomentModel::new(decay, vec![Moment::new("y_0", vec![1])], vec!["k".to_string()])
}

const TIMES: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

/// Five synthetic observations of exponential decay with rate 2
fn decay_data() -> ObservedData {
    ObservedData::new(
        TIMES.to_vec(),
        vec![ObservedTrajectory {
            symbol: "y_0".to_string(),
            values: TIMES.iter().map(|t| 10.0 * (-2.0 * t).exp()).collect(),
        }],
    )
    .unwrap()
}

fn decay_spec() -> ParamTimeSpec {
    ParamTimeSpec {
        times: TIMES.to_vec(),
        parameters: SlotSpec::from_pairs(&[(1.0, true)]),
        initial_conditions: SlotSpec::from_pairs(&[(10.0, false)]),
        bounds: BoxConstraints::new().with(SlotId::Parameter(0), 0.0, 10.0),
        parameter_names: vec![Some("k".to_string())],
    }
}

fn config(restarts: usize) -> InferenceConfig {
    InferenceConfig {
        restarts,
        objective: ObjectiveKind::SumOfSquares,
        bounds_enabled: true,
        seed: Some(42),
        ..InferenceConfig::default()
    }
}

#[test]
fn test_decay_rate_is_recovered_from_ten_restarts() -> Result<()> {
    let model = decay_model();
    let simulator = OdeSimulator::default();
    let mut multistart = MultiStart::new(&model, &simulator, config(10));

    let report = multistart.run(&decay_spec(), &decay_data())?;

    assert_eq!(report.ranked.len(), 10);
    assert!((report.best().parameters[0] - 2.0).abs() < 0.05);
    assert_eq!(report.best().initial_conditions, vec![10.0]);
    assert_eq!(report.parameter_names, vec!["k".to_string()]);
    assert_eq!(report.parameter_mask, vec![true]);
    assert_eq!(report.initial_condition_mask, vec![false]);
    assert_eq!(*multistart.status(), Status::Ranked);
    Ok(())
}

#[test]
fn test_sobol_sampler_recovers_decay_rate() -> Result<()> {
    let model = decay_model();
    let simulator = OdeSimulator::default();
    let config = InferenceConfig {
        sampler: Sampler::Sobol,
        ..config(6)
    };
    let report = MultiStart::new(&model, &simulator, config).run(&decay_spec(), &decay_data())?;
    assert!((report.best().parameters[0] - 2.0).abs() < 0.05);
    Ok(())
}

#[test]
fn test_fixed_seed_is_deterministic() -> Result<()> {
    let model = decay_model();
    let simulator = OdeSimulator::default();
    let a = MultiStart::new(&model, &simulator, config(6)).run(&decay_spec(), &decay_data())?;
    let b = MultiStart::new(&model, &simulator, config(6)).run(&decay_spec(), &decay_data())?;
    assert_eq!(a.ranked, b.ranked);
    Ok(())
}

#[test]
fn test_single_start_begins_at_the_given_values() -> Result<()> {
    let model = decay_model();
    let simulator = OdeSimulator::default();
    let mut spec = decay_spec();
    // Without restarts no bounds are needed
    spec.bounds = BoxConstraints::new();
    let mut multistart = MultiStart::new(
        &model,
        &simulator,
        InferenceConfig {
            bounds_enabled: false,
            ..config(1)
        },
    );
    let report = multistart.run(&spec, &decay_data())?;
    assert_eq!(report.ranked.len(), 1);
    assert_eq!(report.best().diagnostics.starting_parameters, vec![1.0]);
    assert_eq!(report.best().diagnostics.starting_initial_conditions, vec![10.0]);
    assert!((report.best().parameters[0] - 2.0).abs() < 0.05);
    Ok(())
}

/// Fails for every rate of at least one
struct Flaky(OdeSimulator);

impl Simulate for Flaky {
    fn simulate(
        &self,
        model: &MomentModel,
        parameters: &[f64],
        initial_conditions: &[f64],
        times: &[f64],
    ) -> Result<Trajectories, EvaluationFailure> {
        if parameters[0] >= 1.0 {
            return Err(EvaluationFailure::new("step size became too small"));
        }
        self.0.simulate(model, parameters, initial_conditions, times)
    }
}

#[test]
fn test_run_survives_failing_starts() -> Result<()> {
    let model = decay_model();
    let simulator = Flaky(OdeSimulator::default());
    // One Latin stratum out of ten lies below the failure threshold
    let report = MultiStart::new(&model, &simulator, config(10)).run(&decay_spec(), &decay_data())?;

    assert!(report.best().is_success());
    assert!(report.best().parameters[0] < 1.0);
    assert_eq!(report.n_failed(), 9);
    for failed in report.ranked.iter().filter(|r| !r.is_success()) {
        assert_eq!(failed.objective, f64::INFINITY);
        assert!(failed.diagnostics.message.is_some());
    }
    Ok(())
}

struct AlwaysFails;

impl Simulate for AlwaysFails {
    fn simulate(
        &self,
        _model: &MomentModel,
        _parameters: &[f64],
        _initial_conditions: &[f64],
        _times: &[f64],
    ) -> Result<Trajectories, EvaluationFailure> {
        Err(EvaluationFailure::new("maximum number of steps reached"))
    }
}

#[test]
fn test_all_starts_failing_is_an_error() {
    let model = decay_model();
    let mut multistart = MultiStart::new(&model, &AlwaysFails, config(3));
    match multistart.run(&decay_spec(), &decay_data()) {
        Err(InferenceError::AllStartsFailed(failures)) => {
            assert_eq!(failures.len(), 3);
            for failure in &failures {
                assert!(failure.evaluations > 0);
                assert!(failure.message.contains("maximum number of steps"));
            }
        }
        other => panic!("expected every start to fail, got {:?}", other),
    }
    assert_eq!(*multistart.status(), Status::Failed);
}

#[test]
fn test_cancelled_run_reports_progress() {
    let model = decay_model();
    let simulator = OdeSimulator::default();
    let flag = Arc::new(AtomicBool::new(true));
    let mut multistart =
        MultiStart::new(&model, &simulator, config(4)).with_cancellation(flag.clone());
    match multistart.run(&decay_spec(), &decay_data()) {
        Err(InferenceError::Cancelled { completed, total }) => {
            assert_eq!(completed, 0);
            assert_eq!(total, 4);
        }
        other => panic!("expected a cancelled run, got {:?}", other),
    }
    assert_eq!(*multistart.status(), Status::Failed);
}

#[test]
fn test_mismatched_time_points_are_rejected() {
    let model = decay_model();
    let simulator = OdeSimulator::default();
    let mut spec = decay_spec();
    spec.times = vec![0.0, 1.0];
    let result = MultiStart::new(&model, &simulator, config(2)).run(&spec, &decay_data());
    assert!(matches!(result, Err(InferenceError::Configuration(_))));
}

#[test]
fn test_inverted_bounds_fail_before_optimizing() {
    let model = decay_model();
    let simulator = OdeSimulator::default();
    let mut spec = decay_spec();
    spec.bounds = BoxConstraints::new().with(SlotId::Parameter(0), 5.0, 1.0);
    let mut multistart = MultiStart::new(&model, &simulator, config(1));
    match multistart.run(&spec, &decay_data()) {
        Err(InferenceError::InvalidSlotBounds { slot, lower, upper }) => {
            assert_eq!(slot, SlotId::Parameter(0));
            assert_eq!((lower, upper), (5.0, 1.0));
        }
        other => panic!("expected invalid bounds, got {:?}", other),
    }
    assert_eq!(*multistart.status(), Status::Failed);
}

#[test]
fn test_short_observed_trajectories_are_rejected() {
    let result = ObservedData::new(
        vec![0.0, 1.0],
        vec![ObservedTrajectory {
            symbol: "y_0".to_string(),
            values: vec![1.0],
        }],
    );
    assert!(matches!(result, Err(InferenceError::Configuration(_))));
}

/// Birth-death process: the mean and variance equations are exact
fn birth_death(_t: T, y: &State, p: &[T], dy: &mut State) {
    let (k1, k2) = (p[0], p[1]);
    dy[0] = k1 - k2 * y[0];
    dy[1] = k1 + k2 * y[0] - 2.0 * k2 * y[1];
}

#[test]
fn test_parametric_objectives_fit_birth_death() -> Result<()> {
    let model = MomentModel::new(
        birth_death,
        vec![Moment::new("y_0", vec![1]), Moment::new("yx1", vec![2])],
        vec!["k1".to_string(), "k2".to_string()],
    );
    let times = vec![0.0, 1.0, 2.0, 4.0, 8.0];
    // Started from a Poisson distribution with mean 5, the process stays Poisson
    let mean = |t: f64| 20.0 + (5.0 - 20.0) * (-0.5 * t).exp();
    let observed = ObservedData::new(
        times.clone(),
        vec![ObservedTrajectory {
            symbol: "y_0".to_string(),
            values: times.iter().map(|&t| mean(t)).collect(),
        }],
    )?;
    let spec = ParamTimeSpec {
        times,
        parameters: SlotSpec::from_pairs(&[(8.0, true), (0.5, false)]),
        initial_conditions: SlotSpec::from_pairs(&[(5.0, false), (5.0, false)]),
        bounds: BoxConstraints::new(),
        parameter_names: vec![],
    };
    let simulator = OdeSimulator::default();
    for objective in [
        ObjectiveKind::Gaussian,
        ObjectiveKind::Lognormal,
        ObjectiveKind::Gamma,
        ObjectiveKind::Maxent,
    ] {
        let config = InferenceConfig {
            objective,
            ..InferenceConfig::default()
        };
        let report = MultiStart::new(&model, &simulator, config).run(&spec, &observed)?;
        let best = report.best();
        assert!(best.is_success(), "{}", objective);
        assert!(best.objective < PENALTY, "{}", objective);
        assert!((best.parameters[0] - 10.0).abs() < 2.0, "{}: {:?}", objective, best.parameters);
        assert_eq!(report.parameter_names, vec!["k1".to_string(), "k2".to_string()]);
    }
    Ok(())
}
