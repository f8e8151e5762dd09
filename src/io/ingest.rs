//! CSV ingest and validation.
//!
//! This module turns delimited text into the in-memory inputs of the engine:
//!
//! - intensity traces (one column per channel, one row per frame)
//! - pre-computed correlator curves (`tau` + `g2` or `g2-1`, optional `countrate`)
//! - multi-angle decay rates (`angle_deg` + `gamma`)
//! - raw camera frames (one flattened frame per row, no header)
//!
//! Design goals:
//! - **Strict schema** for required fields (clear errors + exit code 2)
//! - **Row-level validation** for curve/angle tables (skip bad rows, but report
//!   what happened); trace and frame rows are never skipped because that would
//!   shift the time axis
//! - **Separation of concerns**: no correlation or fitting logic here

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::data::FrameStack;
use crate::domain::{ChannelSet, CorrelationCurve, IntensityTrace};
use crate::error::AppError;
use crate::physics::AngleObservation;

/// Header names accepted for a leading frame-index column (ignored).
const FRAME_COLUMNS: [&str; 4] = ["frame", "frame_index", "im. no.", "index"];

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Traces read from CSV.
#[derive(Debug, Clone)]
pub struct LoadedTraces {
    pub set: ChannelSet,
    pub rows_read: usize,
}

/// Correlator curve read from CSV.
#[derive(Debug, Clone)]
pub struct LoadedCurve {
    pub curve: CorrelationCurve,
    /// Mean of the optional `countrate` column.
    pub mean_countrate: Option<f64>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// How to interpret a correlator table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveInput {
    /// Multiplier turning the `tau` column into seconds (e.g. 1e-3 for ms).
    pub tau_scale: f64,
    /// The value column holds `g2 - 1` rather than `g2`.
    pub minus_one: bool,
}

impl Default for CurveInput {
    fn default() -> Self {
        Self {
            tau_scale: 1.0,
            minus_one: false,
        }
    }
}

/// Load intensity traces: one column per channel, one row per frame.
pub fn load_traces(path: &Path, frame_interval: f64) -> Result<LoadedTraces, AppError> {
    let mut reader = open_csv(path, true)?;
    let headers = read_headers(&mut reader)?;

    let skip_first = headers
        .get(0)
        .map(|h| FRAME_COLUMNS.contains(&normalize_header_name(h).as_str()))
        .unwrap_or(false);
    let names: Vec<String> = headers
        .iter()
        .skip(usize::from(skip_first))
        .enumerate()
        .map(|(i, h)| {
            let h = h.trim().trim_start_matches('\u{feff}');
            if h.is_empty() { format!("ch{i}") } else { h.to_string() }
        })
        .collect();
    if names.is_empty() {
        return Err(AppError::new(2, "Trace CSV has no channel columns."));
    }

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
    let mut rows_read = 0usize;
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let record = result.map_err(|e| AppError::new(2, format!("Trace CSV line {line}: parse error: {e}")))?;
        if record.len() != names.len() + usize::from(skip_first) {
            return Err(AppError::new(
                2,
                format!(
                    "Trace CSV line {line}: expected {} fields, found {}.",
                    names.len() + usize::from(skip_first),
                    record.len()
                ),
            ));
        }
        for (c, field) in record.iter().skip(usize::from(skip_first)).enumerate() {
            let v = parse_f64(field).ok_or_else(|| {
                AppError::new(2, format!("Trace CSV line {line}: invalid intensity '{field}' in column '{}'.", names[c]))
            })?;
            if v < 0.0 {
                return Err(AppError::new(
                    2,
                    format!("Trace CSV line {line}: negative intensity {v} in column '{}'.", names[c]),
                ));
            }
            columns[c].push(v);
        }
    }
    if rows_read == 0 {
        return Err(AppError::new(3, "Trace CSV has no frames."));
    }

    let traces = names
        .into_iter()
        .zip(columns)
        .map(|(id, samples)| IntensityTrace::new(id, samples))
        .collect();
    let set = ChannelSet::new(traces, frame_interval)?;
    Ok(LoadedTraces { set, rows_read })
}

/// Load a correlator export with `tau` and `g2` (or `g2-1`) columns.
pub fn load_correlator(path: &Path, input: CurveInput) -> Result<LoadedCurve, AppError> {
    if !(input.tau_scale.is_finite() && input.tau_scale > 0.0) {
        return Err(AppError::new(2, format!("Invalid tau scale {}.", input.tau_scale)));
    }
    let mut reader = open_csv(path, true)?;
    let headers = read_headers(&mut reader)?;
    let header_map = build_header_map(&headers);

    let tau_col = find_column(&header_map, &["tau", "lag", "lag_time", "time"])
        .ok_or_else(|| AppError::new(2, "Correlator CSV requires a `tau` column."))?;
    let value_names: &[&str] = if input.minus_one {
        &["g2-1", "g2_minus_1", "g2minus1", "g2"]
    } else {
        &["g2"]
    };
    let value_col = find_column(&header_map, value_names).ok_or_else(|| {
        AppError::new(
            2,
            if input.minus_one {
                "Correlator CSV requires a `g2-1` column."
            } else {
                "Correlator CSV requires a `g2` column (use --minus-one for `g2-1` data)."
            },
        )
    })?;
    let countrate_col = find_column(&header_map, &["countrate", "count_rate", "cr"]);

    let offset = if input.minus_one { 1.0 } else { 0.0 };
    let mut tau = Vec::new();
    let mut g2 = Vec::new();
    let mut countrates = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;
        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let t = record.get(tau_col).and_then(parse_f64);
        let v = record.get(value_col).and_then(parse_f64);
        match (t, v) {
            (Some(t), Some(v)) => {
                tau.push(t * input.tau_scale);
                g2.push(v + offset);
            }
            _ => {
                row_errors.push(RowError {
                    line,
                    message: "missing or non-numeric tau/value".to_string(),
                });
                continue;
            }
        }
        // Countrate often only fills the first rows of a correlator export.
        if let Some(c) = countrate_col.and_then(|c| record.get(c)).and_then(parse_f64) {
            countrates.push(c);
        }
    }

    if tau.is_empty() {
        return Err(AppError::new(3, "No valid rows in correlator CSV."));
    }
    let curve = CorrelationCurve::from_pairs(tau, g2)?;
    let mean_countrate =
        (!countrates.is_empty()).then(|| countrates.iter().sum::<f64>() / countrates.len() as f64);

    Ok(LoadedCurve {
        curve,
        mean_countrate,
        row_errors,
        rows_read,
    })
}

/// Load per-angle decay rates with `angle_deg` and `gamma` columns.
pub fn load_angles(path: &Path) -> Result<(Vec<AngleObservation>, Vec<RowError>), AppError> {
    let mut reader = open_csv(path, true)?;
    let headers = read_headers(&mut reader)?;
    let header_map = build_header_map(&headers);

    let angle_col = find_column(&header_map, &["angle_deg", "angle", "theta"])
        .ok_or_else(|| AppError::new(2, "Angle CSV requires an `angle_deg` column."))?;
    let gamma_col = find_column(&header_map, &["gamma", "decay_rate"])
        .ok_or_else(|| AppError::new(2, "Angle CSV requires a `gamma` column."))?;

    let mut observations = Vec::new();
    let mut row_errors = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        let parsed = result.ok().and_then(|record| {
            let angle_deg = record.get(angle_col).and_then(parse_f64)?;
            let gamma = record.get(gamma_col).and_then(parse_f64)?;
            Some(AngleObservation { angle_deg, gamma })
        });
        match parsed {
            Some(obs) => observations.push(obs),
            None => row_errors.push(RowError {
                line,
                message: "missing or non-numeric angle/gamma".to_string(),
            }),
        }
    }
    Ok((observations, row_errors))
}

/// Load camera frames: one row per frame, `width × height` values row-major.
pub fn load_frames(path: &Path, width: usize, height: usize) -> Result<FrameStack, AppError> {
    let mut reader = open_csv(path, false)?;
    let mut frames = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let line = idx + 1;
        let record = result.map_err(|e| AppError::new(2, format!("Frame CSV line {line}: parse error: {e}")))?;
        let frame: Vec<f64> = record
            .iter()
            .map(|f| parse_f64(f).ok_or_else(|| AppError::new(2, format!("Frame CSV line {line}: invalid pixel '{f}'."))))
            .collect::<Result<_, _>>()?;
        frames.push(frame);
    }
    Ok(FrameStack::new(width, height, frames)?)
}

fn open_csv(path: &Path, has_headers: bool) -> Result<csv::Reader<File>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open CSV '{}': {e}", path.display())))?;
    Ok(csv::ReaderBuilder::new()
        .has_headers(has_headers)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(file))
}

fn read_headers(reader: &mut csv::Reader<File>) -> Result<StringRecord, AppError> {
    Ok(reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone())
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Excel and other tools sometimes emit UTF-8 CSVs with a BOM prefix on the
    // first header. If we don't strip it, schema validation will
    // incorrectly report missing columns.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

fn find_column(header_map: &HashMap<String, usize>, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|n| header_map.get(*n).copied())
}

fn parse_f64(s: &str) -> Option<f64> {
    let v = s.trim().parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tmp(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn traces_skip_frame_column_and_bom() {
        let f = write_tmp("\u{feff}frame,a,b\n0,1.0,2.0\n1,3.0,4.0\n2,5.0,6.0\n");
        let loaded = load_traces(f.path(), 1e-3).unwrap();
        assert_eq!(loaded.rows_read, 3);
        assert_eq!(loaded.set.len(), 2);
        assert_eq!(loaded.set.channels()[0].id, "a");
        assert_eq!(loaded.set.channels()[1].samples, vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn traces_reject_bad_rows() {
        let f = write_tmp("a,b\n1.0,2.0\n3.0,x\n");
        let err = load_traces(f.path(), 1e-3).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("line 3"));

        let f = write_tmp("a,b\n1.0,-2.0\n");
        assert!(load_traces(f.path(), 1e-3).is_err());
    }

    #[test]
    fn correlator_minus_one_and_countrate() {
        let f = write_tmp("Tau,g2-1,countrate\n0.001,0.8,100\n0.002,0.5,\n0.003,bad,\n0.004,0.2,300\n");
        let input = CurveInput {
            tau_scale: 1e-3,
            minus_one: true,
        };
        let loaded = load_correlator(f.path(), input).unwrap();
        assert_eq!(loaded.curve.len(), 3);
        assert!((loaded.curve.g2[0] - 1.8).abs() < 1e-15);
        assert!((loaded.curve.tau[2] - 4e-6).abs() < 1e-18);
        assert_eq!(loaded.row_errors.len(), 1);
        assert_eq!(loaded.row_errors[0].line, 4);
        assert_eq!(loaded.mean_countrate, Some(200.0));
    }

    #[test]
    fn correlator_requires_columns() {
        let f = write_tmp("tau,value\n1,2\n");
        assert_eq!(load_correlator(f.path(), CurveInput::default()).unwrap_err().exit_code(), 2);
    }

    #[test]
    fn angles_and_frames_load() {
        let f = write_tmp("angle_deg,gamma\n30,100\n90,oops\n150,900\n");
        let (obs, errors) = load_angles(f.path()).unwrap();
        assert_eq!(obs.len(), 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(obs[1].angle_deg, 150.0);

        let f = write_tmp("1,2,3,4\n5,6,7,8\n");
        let stack = load_frames(f.path(), 2, 2).unwrap();
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.frames[1], vec![5.0, 6.0, 7.0, 8.0]);
    }
}
