use std::fmt::Write as _;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv::WriterBuilder;

use crate::error::InferenceError;
use crate::structs::result::{BestFitReport, InferenceResult};
use crate::structs::trajectories::Trajectories;

/// Writes a [BestFitReport] somewhere
pub trait ReportWriter {
    fn write(&self, report: &BestFitReport) -> Result<(), InferenceError>;
}

/// Plain-text report with the best fit first, followed by every start ranked by objective value
#[derive(Debug, Clone)]
pub struct TextReport {
    path: PathBuf,
}

impl TextReport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        TextReport { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReportWriter for TextReport {
    fn write(&self, report: &BestFitReport) -> Result<(), InferenceError> {
        let output = |source| InferenceError::Output {
            path: self.path.clone(),
            source,
        };
        let mut file = File::create(&self.path).map_err(output)?;
        file.write_all(render(report).as_bytes()).map_err(output)?;
        tracing::info!("Inference report written to {}", self.path.display());
        Ok(())
    }
}

/// Render `report` as text
pub fn render(report: &BestFitReport) -> String {
    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = write_report(&mut out, report);
    out
}

fn write_report(out: &mut String, report: &BestFitReport) -> std::fmt::Result {
    let best = report.best();
    writeln!(out, "Objective: {}", report.objective_kind)?;
    writeln!(out, "Time points: {}", join(&report.times))?;
    writeln!(
        out,
        "Starts: {} ({} failed)",
        report.ranked.len(),
        report.n_failed()
    )?;
    writeln!(out)?;

    writeln!(out, "Best fit (start #{})", best.diagnostics.start)?;
    writeln!(out, "Objective value: {}", best.objective)?;
    writeln!(out, "Parameters:")?;
    for (i, (value, variable)) in best
        .parameters
        .iter()
        .zip(&report.parameter_mask)
        .enumerate()
    {
        let name = report
            .parameter_names
            .get(i)
            .map(String::as_str)
            .unwrap_or("?");
        writeln!(out, "  {:<12} {:<24} {}", name, value, mask_label(*variable))?;
    }
    writeln!(out, "Initial conditions:")?;
    for (i, (value, variable)) in best
        .initial_conditions
        .iter()
        .zip(&report.initial_condition_mask)
        .enumerate()
    {
        let symbol = report.symbols.get(i).map(String::as_str).unwrap_or("?");
        writeln!(out, "  {:<12} {:<24} {}", symbol, value, mask_label(*variable))?;
    }
    writeln!(out)?;

    writeln!(out, "Ranked starts")?;
    for (rank, result) in report.ranked.iter().enumerate() {
        write_start(out, rank + 1, result)?;
    }
    Ok(())
}

fn write_start(out: &mut String, rank: usize, result: &InferenceResult) -> std::fmt::Result {
    let d = &result.diagnostics;
    writeln!(out, "{}. start #{}", rank, d.start)?;
    writeln!(out, "  objective:                  {}", result.objective)?;
    writeln!(
        out,
        "  starting parameters:        {}",
        join(&d.starting_parameters)
    )?;
    writeln!(
        out,
        "  starting initial conditions: {}",
        join(&d.starting_initial_conditions)
    )?;
    writeln!(out, "  fitted parameters:          {}", join(&result.parameters))?;
    writeln!(
        out,
        "  fitted initial conditions:  {}",
        join(&result.initial_conditions)
    )?;
    writeln!(
        out,
        "  iterations: {}, evaluations: {}, failed evaluations: {}, termination: {}",
        d.iterations, d.evaluations, d.failed_evaluations, d.termination
    )?;
    if let Some(message) = &d.message {
        writeln!(out, "  last failure: {}", message)?;
    }
    Ok(())
}

fn mask_label(variable: bool) -> &'static str {
    if variable {
        "variable"
    } else {
        "fixed"
    }
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Write trajectories as CSV, one row per time point and one column per moment
pub fn write_trajectories(
    path: impl AsRef<Path>,
    trajectories: &Trajectories,
) -> Result<(), InferenceError> {
    let path = path.as_ref();
    let output = |source| InferenceError::Output {
        path: path.to_path_buf(),
        source,
    };
    let file = File::create(path).map_err(output)?;
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);

    let mut header = vec!["time".to_string()];
    header.extend(trajectories.symbols().iter().cloned());
    writer
        .write_record(&header)
        .map_err(|e| output(e.into()))?;

    for (t, time) in trajectories.times().iter().enumerate() {
        let mut row = vec![time.to_string()];
        for m in 0..trajectories.n_moments() {
            row.push(trajectories.moment(m)[t].to_string());
        }
        writer.write_record(&row).map_err(|e| output(e.into()))?;
    }
    writer.flush().map_err(output)?;
    tracing::info!("Trajectories written to {}", path.display());
    Ok(())
}
