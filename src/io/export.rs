//! Export curves and traces to CSV.
//!
//! The exports are meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::domain::{ChannelSet, CorrelationCurve, NormalizedField};
use crate::error::AppError;

/// Write the analysed curve: one row per lag.
///
/// `fitted` holds the best model evaluated at every lag (same target as the
/// fit); undefined field values are left empty with `defined = false`.
pub fn write_curve_csv(
    path: &Path,
    curve: &CorrelationCurve,
    normalized: &NormalizedField,
    fitted: Option<&[f64]>,
) -> Result<(), AppError> {
    let mut file = create(path, "curve CSV")?;

    writeln!(file, "tau,g2,g2minus1,field,defined,fitted")
        .map_err(|e| AppError::new(2, format!("Failed to write curve CSV header: {e}")))?;

    for k in 0..curve.len().min(normalized.len()) {
        let field = normalized.field[k];
        writeln!(
            file,
            "{:.6e},{:.10},{:.10},{},{},{}",
            curve.tau[k],
            curve.g2[k],
            normalized.g2minus1[k],
            field.map(|v| format!("{v:.10}")).unwrap_or_default(),
            field.is_some(),
            fitted
                .and_then(|f| f.get(k))
                .map(|v| format!("{v:.10}"))
                .unwrap_or_default(),
        )
        .map_err(|e| AppError::new(2, format!("Failed to write curve CSV row: {e}")))?;
    }
    file.flush()
        .map_err(|e| AppError::new(2, format!("Failed to write curve CSV: {e}")))?;
    Ok(())
}

/// Write a bare `tau,g2` table (the format `dls fit` reads).
pub fn write_g2_csv(path: &Path, curve: &CorrelationCurve) -> Result<(), AppError> {
    let mut file = create(path, "g2 CSV")?;
    writeln!(file, "tau,g2").map_err(|e| AppError::new(2, format!("Failed to write g2 CSV header: {e}")))?;
    for (t, g) in curve.tau.iter().zip(&curve.g2) {
        writeln!(file, "{t:.6e},{g:.12}").map_err(|e| AppError::new(2, format!("Failed to write g2 CSV row: {e}")))?;
    }
    file.flush()
        .map_err(|e| AppError::new(2, format!("Failed to write g2 CSV: {e}")))?;
    Ok(())
}

/// Write traces with a leading `frame` column (the format `dls correlate` reads).
pub fn write_traces_csv(path: &Path, set: &ChannelSet) -> Result<(), AppError> {
    let mut file = create(path, "trace CSV")?;

    let header: Vec<&str> = set.channels().iter().map(|c| c.id.as_str()).collect();
    writeln!(file, "frame,{}", header.join(","))
        .map_err(|e| AppError::new(2, format!("Failed to write trace CSV header: {e}")))?;

    for t in 0..set.frame_count() {
        let row: Vec<String> = set
            .channels()
            .iter()
            .map(|c| format!("{:.6}", c.samples[t]))
            .collect();
        writeln!(file, "{t},{}", row.join(","))
            .map_err(|e| AppError::new(2, format!("Failed to write trace CSV row: {e}")))?;
    }
    file.flush()
        .map_err(|e| AppError::new(2, format!("Failed to write trace CSV: {e}")))?;
    Ok(())
}

fn create(path: &Path, what: &str) -> Result<BufWriter<File>, AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create {what} '{}': {e}", path.display())))?;
    Ok(BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::normalize;
    use crate::domain::IntensityTrace;
    use crate::io::ingest::{CurveInput, load_correlator, load_traces};

    #[test]
    fn curve_csv_marks_undefined_lags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curve.csv");
        let curve = CorrelationCurve::from_lags(vec![1.5, 1.2, 0.98], 1e-4);
        let normalized = normalize(&curve, 1e-9).unwrap();
        write_curve_csv(&path, &curve, &normalized, Some(&[1.0, 0.6, 0.1])).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "tau,g2,g2minus1,field,defined,fitted");
        assert_eq!(lines.len(), 4);
        assert!(lines[3].contains(",,false,"), "{}", lines[3]);
        assert!(lines[1].ends_with(",true,1.0000000000"));
    }

    #[test]
    fn written_files_load_back() {
        let dir = tempfile::tempdir().unwrap();

        let g2_path = dir.path().join("g2.csv");
        let curve = CorrelationCurve::from_lags(vec![1.8, 1.4, 1.1], 1e-5);
        write_g2_csv(&g2_path, &curve).unwrap();
        let loaded = load_correlator(&g2_path, CurveInput::default()).unwrap();
        assert_eq!(loaded.curve.len(), 3);
        assert!((loaded.curve.g2[1] - 1.4).abs() < 1e-12);

        let trace_path = dir.path().join("traces.csv");
        let set = ChannelSet::new(
            vec![
                IntensityTrace::new("s0", vec![1.0, 2.0]),
                IntensityTrace::new("s1", vec![3.0, 4.0]),
            ],
            1e-3,
        )
        .unwrap();
        write_traces_csv(&trace_path, &set).unwrap();
        let back = load_traces(&trace_path, 1e-3).unwrap();
        assert_eq!(back.set.channels(), set.channels());
    }
}
