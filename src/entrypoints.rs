use std::time::Instant;

use eyre::{eyre, Result, WrapErr};

use crate::algorithms::{InferenceConfig, MultiStart};
use crate::logger;
use crate::routines::datafile::read_data;
use crate::routines::output::{write_trajectories, TextReport};
use crate::routines::paramtime::read_paramtime;
use crate::routines::settings::{read_settings, write_settings_to_file, Settings};
use crate::routines::simulation::{OdeSimulator, Simulate};
use crate::structs::model::MomentModel;
use crate::structs::result::BestFitReport;
use crate::structs::spec::pad_initial_conditions;
use crate::structs::trajectories::Trajectories;

/// Primary entrypoint for momentfit
///
/// Infers the variable parameters and initial conditions of `model` from the data file, and writes
/// the ranked results to the report file. Both files, and everything else about the run, are
/// given by `settings`; see [Settings] for details.
pub fn fit(model: &MomentModel, settings: &Settings) -> Result<BestFitReport> {
    let simulator = OdeSimulator::new(settings.solver);
    fit_with(model, &simulator, settings)
}

/// Like [fit], with a caller-provided simulator
pub fn fit_with<S: Simulate>(
    model: &MomentModel,
    simulator: &S,
    settings: &Settings,
) -> Result<BestFitReport> {
    let now = Instant::now();
    logger::setup_log(settings)?;
    tracing::info!("Starting momentfit");
    settings.validate()?;
    write_effective_settings(settings)?;

    let spec = read_paramtime(&settings.paths.paramtime)
        .wrap_err("Failed to read the paramtime file")?;
    let data_path = settings
        .paths
        .data
        .as_ref()
        .ok_or_else(|| eyre!("No data file given; set `data` in the [paths] section"))?;
    let observed = read_data(data_path).wrap_err("Failed to read the data file")?;
    tracing::info!(
        "Data file contains {} trajectories over {} time points",
        observed.trajectories().len(),
        observed.times().len()
    );
    if let Some(seed) = settings.config.seed {
        tracing::info!("Sampling with seed {}", seed);
    }

    let writer = TextReport::new(&settings.paths.report);
    let mut multistart = MultiStart::new(model, simulator, InferenceConfig::from(settings));
    let report = multistart
        .run_and_report(&spec, &observed, &writer)
        .wrap_err_with(|| format!("Inference ended in state '{}'", multistart.status()))?;

    tracing::info!("Total time: {:.2?}", now.elapsed());
    Ok(report)
}

/// Read settings from a TOML file and [fit]
pub fn fit_from_file(model: &MomentModel, settings_path: &str) -> Result<BestFitReport> {
    let settings = read_settings(settings_path)
        .wrap_err_with(|| format!("Failed to read settings from '{}'", settings_path))?;
    fit(model, &settings)
}

/// Simulate `model` with the values of the paramtime file
///
/// Initial conditions are padded with zeros as in [fit]. The trajectories are written as CSV to
/// the `trajectories` path of the settings and returned.
pub fn simulate(model: &MomentModel, settings: &Settings) -> Result<Trajectories> {
    logger::setup_log(settings)?;
    settings.validate()?;
    write_effective_settings(settings)?;

    let spec = read_paramtime(&settings.paths.paramtime)
        .wrap_err("Failed to read the paramtime file")?;
    spec.check_model(model)?;
    let initial_conditions =
        pad_initial_conditions(&spec.initial_conditions, model.number_of_equations())?;

    let simulator = OdeSimulator::new(settings.solver);
    let trajectories = simulator
        .simulate(
            model,
            &spec.parameters.values(),
            &initial_conditions.values(),
            &spec.times,
        )
        .map_err(|failure| eyre!(failure))
        .wrap_err("Simulation failed")?;
    write_trajectories(&settings.paths.trajectories, &trajectories)?;
    Ok(trajectories)
}

fn write_effective_settings(settings: &Settings) -> Result<()> {
    if let Some(path) = &settings.paths.settings {
        write_settings_to_file(settings, path)
            .wrap_err_with(|| format!("Failed to write settings to '{}'", path))?;
        tracing::debug!("Settings written to {}", path);
    }
    Ok(())
}
