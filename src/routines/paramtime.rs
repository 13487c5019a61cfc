use std::path::Path;

use config::{Config, File, FileFormat};
use serde::Deserialize;

use crate::error::InferenceError;
use crate::structs::model::MomentModel;
use crate::structs::spec::{
    Bounds, BoxConstraints, InitialConditionSpec, ParameterSpec, Slot, SlotId, SlotSpec,
};

/// Time points, parameters, initial conditions and bounds of a run
#[derive(Debug, Clone, PartialEq)]
pub struct ParamTimeSpec {
    pub times: Vec<f64>,
    pub parameters: ParameterSpec,
    pub initial_conditions: InitialConditionSpec,
    pub bounds: BoxConstraints,
    /// Optional display names, one per parameter
    pub parameter_names: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParamTime {
    times: Vec<f64>,
    #[serde(default)]
    parameters: Vec<RawSlot>,
    #[serde(default)]
    initial_conditions: Vec<RawSlot>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSlot {
    name: Option<String>,
    value: f64,
    #[serde(default)]
    variable: bool,
    bounds: Option<[f64; 2]>,
}

/// Read a paramtime file
///
/// ```toml
/// times = [0.0, 1.0, 2.0]
///
/// [[parameters]]
/// name = "k1"
/// value = 1.0
/// variable = true
/// bounds = [0.0, 10.0]
///
/// [[initial_conditions]]
/// value = 10.0
/// ```
pub fn read_paramtime(path: impl AsRef<Path>) -> Result<ParamTimeSpec, InferenceError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(InferenceError::Configuration(format!(
            "paramtime file '{}' does not exist",
            path.display()
        )));
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| InferenceError::input_format(path, e))?;
    parse_paramtime(&content, path)
}

/// Parse the contents of a paramtime file; `origin` is only used in error messages
pub fn parse_paramtime(content: &str, origin: &Path) -> Result<ParamTimeSpec, InferenceError> {
    let raw: RawParamTime = Config::builder()
        .add_source(File::from_str(content, FileFormat::Toml))
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| {
            InferenceError::input_format(
                origin,
                format!("{}. Ensure every entry has a value and bounds are [lower, upper]", e),
            )
        })?;

    if raw.times.is_empty() {
        return Err(InferenceError::input_format(origin, "no time points"));
    }
    if raw.times.iter().any(|t| !t.is_finite()) || raw.times.windows(2).any(|w| w[0] >= w[1]) {
        return Err(InferenceError::input_format(
            origin,
            "time points must be finite and strictly increasing",
        ));
    }

    let mut bounds = BoxConstraints::new();
    let mut collect = |entries: &[RawSlot], id: fn(usize) -> SlotId| -> SlotSpec {
        for (i, entry) in entries.iter().enumerate() {
            if let Some([lower, upper]) = entry.bounds {
                bounds.insert(id(i), Bounds::new(lower, upper));
            }
        }
        SlotSpec::new(
            entries
                .iter()
                .map(|e| Slot {
                    value: e.value,
                    variable: e.variable,
                })
                .collect(),
        )
    };
    let parameters = collect(&raw.parameters, SlotId::Parameter);
    let initial_conditions = collect(&raw.initial_conditions, SlotId::InitialCondition);
    bounds
        .validate()
        .map_err(|e| InferenceError::input_format(origin, e))?;

    Ok(ParamTimeSpec {
        times: raw.times,
        parameters,
        initial_conditions,
        bounds,
        parameter_names: raw.parameters.into_iter().map(|p| p.name).collect(),
    })
}

impl ParamTimeSpec {
    /// Check the parameter count against `model`
    pub fn check_model(&self, model: &MomentModel) -> Result<(), InferenceError> {
        if self.parameters.len() != model.n_parameters() {
            return Err(InferenceError::DimensionMismatch {
                what: "parameters",
                expected: model.n_parameters(),
                found: self.parameters.len(),
            });
        }
        Ok(())
    }
}
