//! Formatted terminal output: run summaries, channel tables and the
//! multi-angle summary.
//!
//! Formatting lives in one place so the correlation and fit code stays free
//! of presentation concerns, and output changes are localized.

use crate::domain::{AnalysisWindow, ChannelCorrelation, FitConfig, FitParameter, FitResult, FitTarget};
use crate::fit::FitSelection;
use crate::physics::DiffusionFit;

/// Dataset facts shown at the top of a run summary.
#[derive(Debug, Clone)]
pub struct DatasetSummary {
    /// Input path or a description of the generator.
    pub source: String,
    /// Channel count; `None` for pre-computed curves.
    pub channels: Option<usize>,
    pub frames: Option<usize>,
    pub window: Option<AnalysisWindow>,
    /// Lags in the ensemble curve.
    pub lags: usize,
    /// Coherence factor `g2(0) - 1`.
    pub beta: f64,
    /// Lags flagged as undefined by the normalizer.
    pub undefined_lags: usize,
    pub mean_countrate: Option<f64>,
    /// Points that entered the fit and their lag-time span.
    pub fit_points: usize,
    pub fit_tau: (f64, f64),
}

/// Format the full run summary (dataset, per-model diagnostics, chosen model).
pub fn format_run_summary(dataset: &DatasetSummary, selection: &FitSelection, config: &FitConfig) -> String {
    let mut out = String::new();

    out.push_str("=== dls - DLS correlation and fit ===\n");
    out.push_str(&format!("Source: {}\n", dataset.source));
    if let (Some(channels), Some(frames)) = (dataset.channels, dataset.frames) {
        out.push_str(&format!("Channels: {channels} | frames={frames}"));
        if let Some(w) = dataset.window {
            out.push_str(&format!(" | window=[{}, {})", w.start, w.start + w.duration));
        }
        out.push_str(&format!(" | ensemble={:?}\n", config.ensemble_method));
    }
    out.push_str(&format!(
        "Curve: lags={} | beta={:.4} | undefined field lags={}\n",
        dataset.lags, dataset.beta, dataset.undefined_lags
    ));
    if let Some(rate) = dataset.mean_countrate {
        out.push_str(&format!("Mean countrate: {rate:.4}\n"));
    }
    let p = &config.physical;
    out.push_str(&format!(
        "Optics: lambda={:.1}nm | angle={:.1}deg | n={:.4} | T={:.2}C | eta={:.4}mPa.s\n",
        p.wavelength_nm, p.scattering_angle_deg, p.refractive_index, p.temperature_c, p.viscosity_mpa_s
    ));
    out.push_str(&format!(
        "Fit: target={} | points={} | tau=[{:.3e}, {:.3e}]s\n",
        target_label(config.target),
        dataset.fit_points,
        dataset.fit_tau.0,
        dataset.fit_tau.1
    ));

    out.push_str("\nModel diagnostics:\n");
    for fit in &selection.fits {
        let chosen = if fit.model == selection.best.model { "*" } else { " " };
        out.push_str(&format!(
            "{chosen} {:<20} SSE={:.4e} RMSE={:.4e} BIC={:.3} evals={}\n",
            fit.display_name, fit.quality.sse, fit.quality.rmse, fit.quality.bic, fit.quality.evaluations
        ));
    }
    for skipped in &selection.skipped {
        out.push_str(&format!("  (skipped {}) {}\n", skipped.model.display_name(), skipped.reason));
    }

    out.push_str("\nChosen model:\n");
    out.push_str(&format_fit(&selection.best));
    out.push('\n');

    out
}

/// Parameters, physical interpretation and warnings of one fit.
pub fn format_fit(fit: &FitResult) -> String {
    let mut out = String::new();
    out.push_str(&format!("- {} ({})\n", fit.display_name, target_label(fit.target)));
    for p in &fit.params {
        out.push_str(&format!("  {}\n", fmt_param(p)));
    }

    let phys = &fit.physical;
    out.push_str(&format!("- q = {:.6e} 1/m\n", phys.scattering_vector));
    out.push_str(&format!("- coherence factor = {:.4}\n", phys.coherence_factor));
    for (i, c) in phys.components.iter().enumerate() {
        out.push_str(&format!(
            "- component {}: A={:.4} Gamma={:.4e} 1/s D={} R={}\n",
            i + 1,
            c.amplitude,
            c.decay_rate,
            c.diffusion_coefficient
                .map(|d| format!("{d:.4e} m^2/s"))
                .unwrap_or_else(|| "n/a".to_string()),
            c.radius_nm
                .map(|r| format!("{r:.2} nm"))
                .unwrap_or_else(|| "n/a".to_string()),
        ));
    }
    if let Some(pdi) = phys.polydispersity {
        out.push_str(&format!("- polydispersity (mu2/Gamma^2) = {pdi:.4}\n"));
    }
    for w in &fit.warnings {
        out.push_str(&format!("! {w}\n"));
    }
    out
}

/// Per-channel table: mean intensity and intercept.
pub fn format_channel_table(channels: &[ChannelCorrelation]) -> String {
    let mut out = String::new();
    out.push_str(format!("{:<16} {:>14} {:>12} {:>8}", "channel", "mean", "g2(0)-1", "lags").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<16} {:-<14} {:-<12} {:-<8}", "", "", "", "").trim_end());
    out.push('\n');
    for ch in channels {
        let intercept = ch.curve.g2.first().map(|g| g - 1.0).unwrap_or(f64::NAN);
        out.push_str(
            format!(
                "{:<16} {:>14.4} {:>12.5} {:>8}",
                truncate(&ch.channel, 16),
                ch.mean_intensity,
                intercept,
                ch.curve.len()
            )
            .trim_end(),
        );
        out.push('\n');
    }
    out
}

/// Summary of a Γ-over-q² regression.
pub fn format_angle_summary(source: &str, fit: &DiffusionFit) -> String {
    let mut out = String::new();
    out.push_str("=== dls - multi-angle diffusion ===\n");
    out.push_str(&format!("Source: {source}\n"));
    out.push_str(&format!("Angles: n={}\n\n", fit.points.len()));

    out.push_str(format!("{:>14} {:>14}", "q^2 (1/m^2)", "Gamma (1/s)").trim_end());
    out.push('\n');
    out.push_str(format!("{:-<14} {:-<14}", "", "").trim_end());
    out.push('\n');
    for (q2, gamma) in &fit.points {
        out.push_str(&format!("{q2:>14.4e} {gamma:>14.4e}\n"));
    }

    out.push_str(&format!("\nD = {:.4e} m^2/s\n", fit.diffusion_coefficient));
    out.push_str(&format!("intercept = {:.4e} 1/s\n", fit.intercept));
    out.push_str(&format!("R^2 = {:.5}\n", fit.r_squared));
    match fit.radius_nm {
        Some(r) => out.push_str(&format!("R_h = {r:.2} nm\n")),
        None => out.push_str("R_h = n/a (non-positive slope)\n"),
    }
    out
}

fn target_label(target: FitTarget) -> &'static str {
    match target {
        FitTarget::Field => "field g1",
        FitTarget::Intensity => "g2 - 1",
    }
}

fn fmt_param(p: &FitParameter) -> String {
    let err = p
        .std_error
        .map(|e| format!(" +/- {e:.3e}"))
        .unwrap_or_else(|| " +/- n/a".to_string());
    format!("{:<7} = {:.6e}{err} [{}]", p.name, p.value, p.unit)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CorrelationCurve;

    #[test]
    fn channel_table_lists_every_channel() {
        let channels = vec![
            ChannelCorrelation {
                channel: "r0c0".to_string(),
                curve: CorrelationCurve::from_lags(vec![1.75, 1.5], 1e-3),
                mean_intensity: 12.5,
            },
            ChannelCorrelation {
                channel: "a-very-long-channel-name".to_string(),
                curve: CorrelationCurve::from_lags(vec![1.5, 1.2], 1e-3),
                mean_intensity: 3.0,
            },
        ];
        let txt = format_channel_table(&channels);
        let lines: Vec<&str> = txt.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].starts_with("r0c0"));
        assert!(lines[2].contains("0.75000"));
        assert!(lines[3].starts_with("a-very-long-cha."));
    }

    #[test]
    fn param_without_error_is_marked() {
        let p = FitParameter {
            name: "Gamma".to_string(),
            value: 500.0,
            std_error: None,
            unit: "1/s".to_string(),
        };
        assert_eq!(fmt_param(&p), "Gamma   = 5.000000e2 +/- n/a [1/s]");
    }

    #[test]
    fn angle_summary_reports_radius() {
        let fit = DiffusionFit {
            diffusion_coefficient: 4.9e-12,
            intercept: 0.0,
            r_squared: 1.0,
            radius_nm: Some(50.0),
            points: vec![(1e14, 490.0), (2e14, 980.0)],
        };
        let txt = format_angle_summary("angles.csv", &fit);
        assert!(txt.contains("Angles: n=2"));
        assert!(txt.contains("R_h = 50.00 nm"));
    }
}
