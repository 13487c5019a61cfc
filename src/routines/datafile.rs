use std::io::Read;
use std::path::Path;

use crate::error::InferenceError;
use crate::structs::trajectories::{ObservedData, ObservedTrajectory};

/// Read experimental data from a CSV file
///
/// The first column holds the time points, every further column one observed trajectory named
/// after the moment it measures. A symbol may appear in several columns. Lines starting with `#`
/// are ignored.
///
/// ```text
/// time,y_0,y_0,yx1
/// 0,0,0,0
/// 1,7.9,8.1,7.6
/// ```
pub fn read_data(path: impl AsRef<Path>) -> Result<ObservedData, InferenceError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(InferenceError::Configuration(format!(
            "data file '{}' does not exist",
            path.display()
        )));
    }
    let file = std::fs::File::open(path).map_err(|e| InferenceError::input_format(path, e))?;
    parse_data(file, path)
}

/// Parse CSV data from `reader`; `origin` is only used in error messages
pub fn parse_data<R: Read>(reader: R, origin: &Path) -> Result<ObservedData, InferenceError> {
    let mut rdr = csv::ReaderBuilder::new()
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(reader);

    let header = rdr
        .headers()
        .map_err(|e| InferenceError::input_format(origin, e))?
        .clone();
    match header.get(0) {
        Some(first) if first.eq_ignore_ascii_case("time") => {}
        _ => {
            return Err(InferenceError::input_format(
                origin,
                "the first column must be 'time'",
            ))
        }
    }
    if header.len() < 2 {
        return Err(InferenceError::input_format(
            origin,
            "no observed moments besides the time column",
        ));
    }

    let mut times = Vec::new();
    let mut trajectories: Vec<ObservedTrajectory> = header
        .iter()
        .skip(1)
        .map(|symbol| ObservedTrajectory {
            symbol: symbol.to_string(),
            values: Vec::new(),
        })
        .collect();

    for (row, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| InferenceError::input_format(origin, e))?;
        // Row numbers count the header as row 1
        let line = row + 2;
        let mut cells = record.iter().map(|cell| {
            cell.parse::<f64>().map_err(|_| {
                InferenceError::input_format(
                    origin,
                    format!("row {}: '{}' is not a number", line, cell),
                )
            })
        });
        match cells.next() {
            Some(time) => times.push(time?),
            None => continue,
        }
        for (trajectory, value) in trajectories.iter_mut().zip(cells) {
            trajectory.values.push(value?);
        }
    }

    if times.is_empty() {
        return Err(InferenceError::input_format(origin, "no observations"));
    }
    ObservedData::new(times, trajectories).map_err(|e| InferenceError::input_format(origin, e))
}

/// Check that observations were made exactly at the simulated time points
pub fn check_times(observed: &ObservedData, times: &[f64]) -> Result<(), InferenceError> {
    let matches = observed.times().len() == times.len()
        && observed
            .times()
            .iter()
            .zip(times)
            .all(|(a, b)| (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0));
    if !matches {
        return Err(InferenceError::Configuration(format!(
            "the observed time points {:?} do not match the paramtime time points {:?}",
            observed.times(),
            times
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_symbols_are_separate_trajectories() {
        let csv = "# replicate measurements\ntime,y_0,y_0,yx1\n0,0,0,0\n1,7.9,8.1,7.6\n";
        let data = parse_data(csv.as_bytes(), Path::new("data.csv")).unwrap();
        assert_eq!(data.times(), &[0.0, 1.0]);
        assert_eq!(data.trajectories().len(), 3);
        assert_eq!(data.trajectories()[0].symbol, "y_0");
        assert_eq!(data.trajectories()[1].values, vec![0.0, 8.1]);
        assert_eq!(data.trajectories()[2].symbol, "yx1");
        assert_eq!(data.n_observations(), 6);
    }

    #[test]
    fn non_numeric_cells_name_the_row() {
        let csv = "time,y_0\n0,1.0\n1,abc\n";
        let err = parse_data(csv.as_bytes(), Path::new("data.csv")).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("data.csv"));
        assert!(message.contains("row 3"));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let csv = "time,y_0\n0,1.0,2.0\n";
        assert!(matches!(
            parse_data(csv.as_bytes(), Path::new("data.csv")),
            Err(InferenceError::InputFormat { .. })
        ));
    }

    #[test]
    fn time_column_is_required() {
        let csv = "t,y_0\n0,1.0\n";
        assert!(parse_data(csv.as_bytes(), Path::new("data.csv")).is_err());
    }

    #[test]
    fn times_must_match_paramtime() {
        let data = parse_data("time,y_0\n0,1\n1,2\n".as_bytes(), Path::new("d.csv")).unwrap();
        assert!(check_times(&data, &[0.0, 1.0]).is_ok());
        assert!(matches!(
            check_times(&data, &[0.0, 2.0]),
            Err(InferenceError::Configuration(_))
        ));
        assert!(check_times(&data, &[0.0]).is_err());
    }
}
