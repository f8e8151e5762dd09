//! Ensemble averaging of per-channel correlation curves.
//!
//! Every channel contributes a `(curve, weight)` pair with weight `m_i²`, and
//! the reduction folds those pairs lag by lag:
//!
//! - brute force: `g2_E[k] = M · Σ g2_i[k]·m_i² / (Σ m_i)²`
//! - weighted:    `g2_E[k] = Σ g2_i[k]·m_i² / Σ m_i²`
//!
//! The brute-force form reproduces ensemble intensity statistics for channels of
//! unequal brightness; the weighted form is a proper mean, so identical channel
//! curves reduce to that same curve.

use tracing::debug;

use crate::domain::{AnalysisWindow, ChannelCorrelation, ChannelSet, CorrelationCurve, CountrateWindow, EnsembleMethod};
use crate::error::AnalysisError;

use super::autocorrelator::mean_intensity;

/// Reduce per-channel curves to one ensemble curve.
///
/// The lag times of the first channel are kept.
pub fn ensemble_average(
    channels: &[ChannelCorrelation],
    method: EnsembleMethod,
) -> Result<CorrelationCurve, AnalysisError> {
    let Some(first) = channels.first() else {
        return Err(AnalysisError::EmptyChannelSet);
    };
    let lags = first.curve.len();

    for ch in channels {
        if ch.curve.len() != lags {
            return Err(AnalysisError::InconsistentCurveLength {
                channel: ch.channel.clone(),
                expected: lags,
                found: ch.curve.len(),
            });
        }
        if !(ch.mean_intensity.is_finite() && ch.mean_intensity > 0.0) {
            return Err(AnalysisError::DegenerateChannel {
                channel: ch.channel.clone(),
                mean: ch.mean_intensity,
            });
        }
    }

    let pairs = channels
        .iter()
        .map(|ch| (&ch.curve.g2, ch.mean_intensity * ch.mean_intensity));

    let (weighted_sum, weight_total) = pairs.fold(
        (vec![0.0; lags], 0.0_f64),
        |(mut acc, total), (g2, weight)| {
            for (a, g) in acc.iter_mut().zip(g2) {
                *a += g * weight;
            }
            (acc, total + weight)
        },
    );

    let denominator = match method {
        EnsembleMethod::BruteForce => {
            let mean_sum: f64 = channels.iter().map(|ch| ch.mean_intensity).sum();
            mean_sum * mean_sum / channels.len() as f64
        }
        EnsembleMethod::Weighted => weight_total,
    };

    let g2: Vec<f64> = weighted_sum.into_iter().map(|s| s / denominator).collect();
    debug!(channels = channels.len(), lags, ?method, "ensemble averaged");

    Ok(CorrelationCurve {
        tau: first.curve.tau.clone(),
        g2,
    })
}

/// Which end of the decay-speed distribution to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ExtremeSide {
    Fastest,
    Slowest,
    Both,
}

/// Keep the `fraction` of channels that decorrelate fastest and/or slowest.
///
/// Channels are ranked by `g2[lag]`: a low value means a fast decay. Each side
/// keeps `floor(fraction · M)` channels. With `Both`, the fastest channels come
/// first followed by the slowest ones.
pub fn select_extreme_channels(
    channels: &[ChannelCorrelation],
    lag: usize,
    fraction: f64,
    side: ExtremeSide,
) -> Result<Vec<ChannelCorrelation>, AnalysisError> {
    if channels.is_empty() {
        return Err(AnalysisError::EmptyChannelSet);
    }
    let max_fraction = if side == ExtremeSide::Both { 0.5 } else { 1.0 };
    if !(fraction.is_finite() && fraction > 0.0 && fraction <= max_fraction) {
        return Err(AnalysisError::InvalidConfig(format!(
            "extreme-channel fraction must be in (0, {max_fraction}], got {fraction}"
        )));
    }
    let count = (fraction * channels.len() as f64).floor() as usize;
    if count == 0 {
        return Err(AnalysisError::InvalidConfig(format!(
            "extreme-channel fraction {fraction} of {} channels selects none",
            channels.len()
        )));
    }

    let mut ranked: Vec<(f64, usize)> = Vec::with_capacity(channels.len());
    for (i, ch) in channels.iter().enumerate() {
        let Some(&value) = ch.curve.g2.get(lag) else {
            return Err(AnalysisError::InvalidConfig(format!(
                "ranking lag {lag} is beyond the {} lags of channel '{}'",
                ch.curve.len(),
                ch.channel
            )));
        };
        ranked.push((value, i));
    }
    // Stable order for ties: channel index.
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

    let fastest = ranked.iter().take(count).map(|(_, i)| *i);
    let slowest = ranked.iter().rev().take(count).map(|(_, i)| *i);
    let picked: Vec<usize> = match side {
        ExtremeSide::Fastest => fastest.collect(),
        ExtremeSide::Slowest => slowest.collect(),
        // fraction <= 0.5 keeps the two ends disjoint.
        ExtremeSide::Both => fastest.chain(slowest).collect(),
    };

    debug!(selected = picked.len(), total = channels.len(), ?side, lag, "selected extreme channels");
    Ok(picked.into_iter().map(|i| channels[i].clone()).collect())
}

/// Mean countrate: the average of the mean intensities of `channels`.
///
/// Only the traces behind `channels` count, so a sub-ensemble reports its own
/// countrate. This is computed from the raw traces, independently of any fit.
pub fn mean_countrate(
    set: &ChannelSet,
    channels: &[ChannelCorrelation],
    window: &AnalysisWindow,
    which: CountrateWindow,
) -> Result<f64, AnalysisError> {
    if channels.is_empty() {
        return Err(AnalysisError::EmptyChannelSet);
    }
    let window = match which {
        CountrateWindow::Analysis => *window,
        CountrateWindow::Full => AnalysisWindow::full(set.frame_count()),
    };
    let mut total = 0.0;
    for ch in channels {
        let Some(trace) = set.channels().iter().find(|t| t.id == ch.channel) else {
            return Err(AnalysisError::InvalidConfig(format!(
                "channel '{}' is not part of the trace set",
                ch.channel
            )));
        };
        total += mean_intensity(trace, &window)?;
    }
    Ok(total / channels.len() as f64)
}
