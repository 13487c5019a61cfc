use std::path::Path;

use config::Config as eConfig;
use serde::Deserialize;
use serde_derive::Serialize;

use crate::error::InferenceError;
use crate::routines::initialization::Sampler;
use crate::routines::objective::ObjectiveKind;
use crate::routines::optimization::OptimizerOptions;
use crate::routines::simulation::Tolerances;

/// Contains all settings for a run
///
/// Built once, validated, and then passed by reference to everything that needs it.
#[derive(Debug, Deserialize, Clone, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Input and output files
    pub paths: Paths,
    /// General configuration of the inference
    #[serde(default)]
    pub config: Config,
    /// Nelder-Mead options
    #[serde(default)]
    pub optimizer: OptimizerOptions,
    /// ODE integrator tolerances
    #[serde(default)]
    pub solver: Tolerances,
    /// Logging
    #[serde(default)]
    pub log: Log,
}

#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Paths {
    /// Parameter, time and initial-condition file
    pub paramtime: String,
    /// Experimental data, required for inference
    pub data: Option<String>,
    /// Where to write the inference report
    #[serde(default = "default_report")]
    pub report: String,
    /// Where simulation mode writes the trajectories
    #[serde(default = "default_trajectories")]
    pub trajectories: String,
    /// If set, the effective settings are written here as JSON
    pub settings: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Number of starting points
    pub restarts: usize,
    pub objective: ObjectiveKind,
    /// Enforce the bounds of the paramtime file during optimization
    pub bounds: bool,
    /// Seed for the sampler; drawn from the OS when absent
    pub seed: Option<u64>,
    pub sampler: Sampler,
    /// Size of the worker pool, 0 for one worker per core
    pub threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            restarts: 1,
            objective: ObjectiveKind::default(),
            bounds: false,
            seed: None,
            sampler: Sampler::default(),
            threads: 0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Serialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct Log {
    /// Maximum log level, or any `EnvFilter` directive
    pub level: String,
    /// Optional log file, truncated on start
    pub file: Option<String>,
    /// Also log to stdout
    pub stdout: bool,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: "info".to_string(),
            file: None,
            stdout: true,
        }
    }
}

impl Settings {
    /// Settings with default values for everything but the input files
    pub fn new(paramtime: impl Into<String>, data: Option<String>) -> Self {
        Settings {
            paths: Paths {
                paramtime: paramtime.into(),
                data,
                report: default_report(),
                trajectories: default_trajectories(),
                settings: None,
            },
            config: Config::default(),
            optimizer: OptimizerOptions::default(),
            solver: Tolerances::default(),
            log: Log::default(),
        }
    }

    /// Reject settings that cannot describe a run
    pub fn validate(&self) -> Result<(), InferenceError> {
        if self.config.restarts == 0 {
            return Err(InferenceError::Configuration(
                "the number of restarts must be at least 1".to_string(),
            ));
        }
        let positive = [
            ("solver.rtol", self.solver.rtol),
            ("solver.atol", self.solver.atol),
            ("optimizer.simplex_scale", self.optimizer.simplex_scale),
        ];
        for (name, value) in positive {
            if !(value > 0.0) || !value.is_finite() {
                return Err(InferenceError::Configuration(format!(
                    "{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        if !(self.optimizer.sd_tolerance >= 0.0) {
            return Err(InferenceError::Configuration(format!(
                "optimizer.sd_tolerance must not be negative, got {}",
                self.optimizer.sd_tolerance
            )));
        }
        Ok(())
    }
}

/// Read and validate the settings in the TOML file at `path`
///
/// Environment variables prefixed with `MOMENTFIT_` override the file, with `__` separating
/// nested keys, e.g. `MOMENTFIT_CONFIG__RESTARTS=20`.
pub fn read_settings(path: impl AsRef<Path>) -> Result<Settings, InferenceError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(InferenceError::Configuration(format!(
            "settings file '{}' does not exist",
            path.display()
        )));
    }
    let parsed = eConfig::builder()
        .add_source(config::File::from(path).format(config::FileFormat::Toml))
        .add_source(
            config::Environment::with_prefix("MOMENTFIT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .map_err(|e| InferenceError::input_format(path, e))?;

    let settings: Settings = parsed.try_deserialize().map_err(|e| {
        InferenceError::Configuration(format!("invalid settings in '{}': {}", path.display(), e))
    })?;
    settings.validate()?;
    Ok(settings)
}

/// Write the effective settings as pretty-printed JSON
pub fn write_settings_to_file(settings: &Settings, path: impl AsRef<Path>) -> std::io::Result<()> {
    let serialized = serde_json::to_string_pretty(settings)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
    std::fs::write(path, serialized)
}

// *********************************
// Default values for deserializing
// *********************************
fn default_report() -> String {
    "inference.txt".to_string()
}

fn default_trajectories() -> String {
    "trajectories.csv".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_sections() {
        let settings = Settings::new("paramtime.toml", None);
        assert_eq!(settings.config.restarts, 1);
        assert_eq!(settings.config.objective, ObjectiveKind::SumOfSquares);
        assert_eq!(settings.config.sampler, Sampler::Latin);
        assert!(!settings.config.bounds);
        assert_eq!(settings.paths.report, "inference.txt");
        assert_eq!(settings.log.level, "info");
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn zero_restarts_are_rejected() {
        let mut settings = Settings::new("paramtime.toml", None);
        settings.config.restarts = 0;
        assert!(matches!(
            settings.validate(),
            Err(InferenceError::Configuration(_))
        ));
    }

    #[test]
    fn non_positive_tolerances_are_rejected() {
        let mut settings = Settings::new("paramtime.toml", None);
        settings.solver.rtol = 0.0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::new("paramtime.toml", None);
        settings.solver.atol = f64::NAN;
        assert!(settings.validate().is_err());
    }
}
