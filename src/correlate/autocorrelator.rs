//! Per-channel intensity autocorrelation.
//!
//! For a window of `N` frames with mean intensity `m`:
//!
//! ```text
//! g2[k] = 1/m² · 1/(N-k) · Σ_{t=0}^{N-k-1} I[t]·I[t+k]
//! ```
//!
//! Each lag is divided by its own number of overlapping pairs, so the estimate
//! carries no lag-dependent bias.

use rayon::prelude::*;
use tracing::debug;

use crate::domain::{AnalysisWindow, ChannelCorrelation, ChannelSet, CorrelationCurve, IntensityTrace};
use crate::error::AnalysisError;

/// Time-averaged intensity of `trace` over `window`.
pub fn mean_intensity(trace: &IntensityTrace, window: &AnalysisWindow) -> Result<f64, AnalysisError> {
    window.validate(&trace.id, trace.len())?;
    let samples = &trace.samples[window.start..window.start + window.duration];
    Ok(samples.iter().sum::<f64>() / samples.len() as f64)
}

/// Autocorrelate one channel over `window`.
///
/// Fails with `InvalidWindow` when the window does not fit the trace and with
/// `DegenerateChannel` when the mean intensity is not positive.
pub fn autocorrelate(
    trace: &IntensityTrace,
    window: &AnalysisWindow,
    frame_interval: f64,
) -> Result<ChannelCorrelation, AnalysisError> {
    let mean = mean_intensity(trace, window)?;
    if !(mean.is_finite() && mean > 0.0) {
        return Err(AnalysisError::DegenerateChannel {
            channel: trace.id.clone(),
            mean,
        });
    }

    let samples = &trace.samples[window.start..window.start + window.duration];
    let n = samples.len();
    let norm = mean * mean;

    let g2: Vec<f64> = (0..window.lag_count())
        .map(|k| {
            let pairs = n - k;
            let sum: f64 = samples[..pairs]
                .iter()
                .zip(&samples[k..])
                .map(|(a, b)| a * b)
                .sum();
            sum / pairs as f64 / norm
        })
        .collect();

    Ok(ChannelCorrelation {
        channel: trace.id.clone(),
        curve: CorrelationCurve::from_lags(g2, frame_interval),
        mean_intensity: mean,
    })
}

/// Autocorrelate every channel of `set` in parallel.
///
/// All channels are joined before returning. On failure the error of the
/// first failing channel (in channel order) is reported.
pub fn correlate_channels(
    set: &ChannelSet,
    window: &AnalysisWindow,
) -> Result<Vec<ChannelCorrelation>, AnalysisError> {
    let dt = set.frame_interval();
    let results: Vec<Result<ChannelCorrelation, AnalysisError>> = set
        .channels()
        .par_iter()
        .map(|trace| autocorrelate(trace, window, dt))
        .collect();

    let out: Vec<ChannelCorrelation> = results.into_iter().collect::<Result<_, _>>()?;
    debug!(
        channels = out.len(),
        lags = window.lag_count(),
        "correlated channels"
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(samples: Vec<f64>) -> IntensityTrace {
        IntensityTrace::new("c0", samples)
    }

    #[test]
    fn constant_trace_is_flat() {
        let t = trace(vec![7.5; 64]);
        let corr = autocorrelate(&t, &AnalysisWindow::full(64), 1e-3).unwrap();
        assert_eq!(corr.curve.len(), 64);
        for g in &corr.curve.g2 {
            assert!((g - 1.0).abs() < 1e-12, "g2={g}");
        }
        assert!((corr.mean_intensity - 7.5).abs() < 1e-12);
    }

    #[test]
    fn single_frame_window_is_one() {
        let t = trace(vec![3.0, 9.0, 4.0]);
        let corr = autocorrelate(&t, &AnalysisWindow::new(1, 1), 1.0).unwrap();
        assert_eq!(corr.curve.g2, vec![1.0]);
        assert_eq!(corr.curve.tau, vec![0.0]);
    }

    #[test]
    fn unbiased_normalization_per_lag() {
        // I = [1, 3], m = 2
        // g2[0] = (1 + 9)/2 / 4 = 1.25
        // g2[1] = 3/1 / 4 = 0.75
        let t = trace(vec![1.0, 3.0]);
        let corr = autocorrelate(&t, &AnalysisWindow::full(2), 0.5).unwrap();
        assert!((corr.curve.g2[0] - 1.25).abs() < 1e-15);
        assert!((corr.curve.g2[1] - 0.75).abs() < 1e-15);
        assert_eq!(corr.curve.tau, vec![0.0, 0.5]);
    }

    #[test]
    fn window_selects_samples() {
        let t = trace(vec![100.0, 1.0, 3.0, 100.0]);
        let corr = autocorrelate(&t, &AnalysisWindow::new(1, 2), 1.0).unwrap();
        assert!((corr.curve.g2[0] - 1.25).abs() < 1e-15);
        assert!((corr.mean_intensity - 2.0).abs() < 1e-15);
    }

    #[test]
    fn lag_cap_truncates_curve() {
        let t = trace((1..=20).map(|v| v as f64).collect());
        let window = AnalysisWindow::full(20).with_max_lag(Some(5));
        let corr = autocorrelate(&t, &window, 1.0).unwrap();
        assert_eq!(corr.curve.len(), 5);
    }

    #[test]
    fn invalid_windows_are_rejected() {
        let t = trace(vec![1.0; 10]);
        for window in [AnalysisWindow::new(0, 0), AnalysisWindow::new(5, 6), AnalysisWindow::new(usize::MAX, 2)] {
            let err = autocorrelate(&t, &window, 1.0).unwrap_err();
            assert!(matches!(err, AnalysisError::InvalidWindow { .. }), "{err:?}");
        }
    }

    #[test]
    fn dark_channel_is_degenerate() {
        let t = trace(vec![0.0; 10]);
        let err = autocorrelate(&t, &AnalysisWindow::full(10), 1.0).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::DegenerateChannel {
                channel: "c0".to_string(),
                mean: 0.0
            }
        );
    }

    #[test]
    fn parallel_run_reports_first_failing_channel() {
        let set = ChannelSet::new(
            vec![
                IntensityTrace::new("a", vec![1.0; 8]),
                IntensityTrace::new("b", vec![0.0; 8]),
                IntensityTrace::new("c", vec![-1.0; 8]),
            ],
            1.0,
        )
        .unwrap();
        let err = correlate_channels(&set, &AnalysisWindow::full(8)).unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateChannel { ref channel, .. } if channel == "b"));
    }

    #[test]
    fn parallel_run_keeps_channel_order() {
        let set = ChannelSet::new(
            (0..16)
                .map(|i| IntensityTrace::new(format!("s{i}"), vec![1.0 + i as f64; 32]))
                .collect(),
            2e-3,
        )
        .unwrap();
        let out = correlate_channels(&set, &AnalysisWindow::full(32)).unwrap();
        let ids: Vec<&str> = out.iter().map(|c| c.channel.as_str()).collect();
        let expected: Vec<String> = (0..16).map(|i| format!("s{i}")).collect();
        assert_eq!(ids, expected.iter().map(|s| s.as_str()).collect::<Vec<_>>());
        assert!((out[3].curve.tau[1] - 2e-3).abs() < 1e-18);
    }
}
