use ode_solvers::Dopri5;
use serde::{Deserialize, Serialize};

use crate::error::EvaluationFailure;
use crate::structs::model::{MomentModel, Rhs, State, T};
use crate::structs::trajectories::Trajectories;

/// Produces moment trajectories for a model and a concrete parameter set
///
/// Implementations must be usable from several optimization tasks at once.
pub trait Simulate: Sync {
    fn simulate(
        &self,
        model: &MomentModel,
        parameters: &[f64],
        initial_conditions: &[f64],
        times: &[f64],
    ) -> Result<Trajectories, EvaluationFailure>;
}

/// Tolerances for the ODE integrator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Tolerances {
    /// Relative tolerance
    pub rtol: f64,
    /// Absolute tolerance
    pub atol: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Tolerances {
            rtol: 1e-6,
            atol: 1e-8,
        }
    }
}

/// Simulates moment systems with the Dormand-Prince 5(4) integrator from `ode_solvers`
///
/// The state at `times[0]` is the initial condition. The system is integrated segment by segment
/// between consecutive time points, and each segment starts from the end state of the previous one.
/// Non-finite trajectories are reported as an [EvaluationFailure].
#[derive(Debug, Clone, Copy, Default)]
pub struct OdeSimulator {
    tolerances: Tolerances,
}

impl OdeSimulator {
    pub fn new(tolerances: Tolerances) -> Self {
        OdeSimulator { tolerances }
    }
}

struct System<'a> {
    rhs: Rhs,
    parameters: &'a [f64],
}

impl ode_solvers::System<T, State> for System<'_> {
    fn system(&self, t: T, y: &State, dy: &mut State) {
        (self.rhs)(t, y, self.parameters, dy)
    }
}

impl Simulate for OdeSimulator {
    fn simulate(
        &self,
        model: &MomentModel,
        parameters: &[f64],
        initial_conditions: &[f64],
        times: &[f64],
    ) -> Result<Trajectories, EvaluationFailure> {
        if parameters.len() != model.n_parameters() {
            return Err(EvaluationFailure::new(format!(
                "model expects {} parameters, got {}",
                model.n_parameters(),
                parameters.len()
            )));
        }
        let neqs = model.number_of_equations();
        if initial_conditions.len() != neqs {
            return Err(EvaluationFailure::new(format!(
                "model expects {} initial conditions, got {}",
                neqs,
                initial_conditions.len()
            )));
        }
        let t0 = match times.first() {
            Some(&t0) => t0,
            None => return Err(EvaluationFailure::new("no time points to simulate")),
        };

        let mut y = State::from_vec(initial_conditions.to_vec());
        let mut values = vec![Vec::with_capacity(times.len()); neqs];
        let mut previous = t0;
        for &t in times {
            if t < previous {
                return Err(EvaluationFailure::new(format!(
                    "time points must be increasing, found {} after {}",
                    t, previous
                )));
            }
            if t > previous {
                y = self.integrate(model, parameters, y, previous, t)?;
                previous = t;
            }
            for (m, v) in values.iter_mut().enumerate() {
                v.push(y[m]);
            }
        }

        let trajectories = Trajectories::new(times.to_vec(), model.symbols(), values);
        if !trajectories.is_finite() {
            return Err(EvaluationFailure::new("simulated trajectories are not finite"));
        }
        Ok(trajectories)
    }
}

impl OdeSimulator {
    /// State at `tf`, integrated from `y` at `ti`
    fn integrate(
        &self,
        model: &MomentModel,
        parameters: &[f64],
        y: State,
        ti: T,
        tf: T,
    ) -> Result<State, EvaluationFailure> {
        let system = System {
            rhs: model.rhs(),
            parameters,
        };
        // A zero output step records the state after every accepted step, the last one at `tf`
        let mut stepper = Dopri5::new(
            system,
            ti,
            tf,
            0.0,
            y,
            self.tolerances.rtol,
            self.tolerances.atol,
        );
        stepper
            .integrate()
            .map_err(|e| EvaluationFailure::new(format!("ODE integration failed: {:?}", e)))?;
        match (stepper.x_out().last(), stepper.y_out().last()) {
            (Some(&x), Some(state)) if (x - tf).abs() <= 1e-9 * tf.abs().max(1.0) => {
                Ok(state.clone())
            }
            (Some(&x), Some(_)) => Err(EvaluationFailure::new(format!(
                "integration stopped at t = {} before reaching {}",
                x, tf
            ))),
            _ => Err(EvaluationFailure::new("the integrator produced no output")),
        }
    }
}
