//! Model selection using BIC with guardrails.
//!
//! The tool fits each enabled model and computes:
//! - SSE / RMSE
//! - BIC = n * ln(SSE/n) + k * ln(n)
//!
//! Selection rules:
//! 1. Exclude underdetermined models: require `n >= k + 5`
//! 2. Exclude models that did not converge from any initial guess
//! 3. Choose the model with minimum BIC
//! 4. If ΔBIC ≤ 2 between the best and a simpler model, pick the simpler model

use tracing::{info, warn};

use crate::domain::{
    DecayComponent, FitConfig, FitParameter, FitQuality, FitResult, FitTarget, FitWarning, ModelKind,
    ModelSpec, PhysicalParams, PhysicalResult, SkippedModel,
};
use crate::error::AnalysisError;
use crate::fit::data::FitData;
use crate::fit::fitter::{ModelFit, fit_model};
use crate::models::predict;
use crate::physics::{diffusion_coefficient, hydrodynamic_radius_nm, scattering_vector, validate_physical};

/// Minimum number of extra observations beyond parameter count.
const MIN_N_BUFFER: usize = 5;

/// Measurement facts that do not come from the fit itself.
#[derive(Debug, Clone, Copy)]
pub struct FitContext {
    /// Coherence factor `g2(0) - 1` of the normalized curve.
    pub beta: f64,
    pub mean_countrate: Option<f64>,
}

/// Output of fitting + selection.
#[derive(Debug, Clone)]
pub struct FitSelection {
    pub best: FitResult,
    /// Fits for all attempted models (after guardrails).
    pub fits: Vec<FitResult>,
    /// Any models that were skipped and why (for diagnostics).
    pub skipped: Vec<SkippedModel>,
}

/// Models attempted for a model spec, in order of increasing complexity.
pub fn models_for_spec(spec: ModelSpec) -> Vec<ModelKind> {
    match spec {
        ModelSpec::Single => vec![ModelKind::SingleExp],
        ModelSpec::Double => vec![ModelKind::DoubleExp],
        ModelSpec::Cumulant2 => vec![ModelKind::Cumulant2],
        ModelSpec::Cumulant3 => vec![ModelKind::Cumulant3],
        ModelSpec::Auto => vec![ModelKind::SingleExp, ModelKind::DoubleExp],
        ModelSpec::All => ModelKind::ALL.to_vec(),
    }
}

/// Fit and select the best model.
///
/// With a single requested model, its failure is the result. With `auto` or
/// `all`, failing models are skipped and only a total failure is an error (the
/// first one encountered is reported).
pub fn fit_and_select(data: &FitData, ctx: &FitContext, config: &FitConfig) -> Result<FitSelection, AnalysisError> {
    validate_physical(&config.physical)?;
    let n = data.len();
    let kinds = models_for_spec(config.model_spec);
    let single_model = kinds.len() == 1;

    let mut fits = Vec::new();
    let mut skipped = Vec::new();
    let mut first_error = None;

    for kind in kinds {
        let k = kind.param_count();
        let outcome = if n < k + MIN_N_BUFFER {
            Err(AnalysisError::InsufficientData(format!(
                "{}: n={n} < k+{MIN_N_BUFFER}={}",
                kind.display_name(),
                k + MIN_N_BUFFER
            )))
        } else {
            fit_model(kind, config.target, data, &config.initial_guesses, config.max_iterations)
        };

        match outcome {
            Ok(fit) => fits.push(to_fit_result(fit, &data.warnings, ctx, &config.physical)),
            Err(err) if single_model => return Err(err),
            Err(err) => {
                warn!(model = ?kind, error = %err, "model skipped");
                skipped.push(SkippedModel {
                    model: kind,
                    reason: err.to_string(),
                });
                first_error.get_or_insert(err);
            }
        }
    }

    if fits.is_empty() {
        return Err(first_error.unwrap_or_else(|| {
            AnalysisError::InsufficientData("no model could be fitted".to_string())
        }));
    }

    let best = select_by_bic(&fits);
    info!(model = %best.display_name, bic = best.quality.bic, "selected model");

    Ok(FitSelection { best, fits, skipped })
}

/// Attach names, diagnostics and physical interpretation to a raw fit.
pub fn to_fit_result(fit: ModelFit, data_warnings: &[FitWarning], ctx: &FitContext, physical: &PhysicalParams) -> FitResult {
    let k = fit.model.param_count();
    let bic = bic(fit.n, fit.sse, k);

    let params: Vec<FitParameter> = fit
        .model
        .param_names()
        .iter()
        .zip(fit.model.param_units())
        .enumerate()
        .map(|(j, (name, unit))| FitParameter {
            name: (*name).to_string(),
            value: fit.params[j],
            std_error: fit.std_errors.get(j).copied().flatten(),
            unit: (*unit).to_string(),
        })
        .collect();

    let mut warnings: Vec<FitWarning> = data_warnings.to_vec();
    warnings.extend(fit.warnings.iter().cloned());

    let q = scattering_vector(physical);
    let modes: Vec<(f64, f64)> = match fit.model {
        ModelKind::DoubleExp => [(fit.params[0], fit.params[1]), (fit.params[2], fit.params[3])]
            .into_iter()
            .filter(|(a, _)| *a != 0.0)
            .collect(),
        _ => vec![(fit.params[0], fit.params[1])],
    };

    let mut components = Vec::with_capacity(modes.len());
    for (i, (amplitude, gamma)) in modes.iter().copied().enumerate() {
        let (diffusion, radius) = if gamma > 0.0 {
            let d = diffusion_coefficient(gamma, q);
            (Some(d), hydrodynamic_radius_nm(d, physical))
        } else {
            warn!(model = ?fit.model, component = i, gamma, "non-positive decay rate");
            warnings.push(FitWarning::NegativeDecayRate { component: i });
            (None, None)
        };
        components.push(DecayComponent {
            amplitude,
            decay_rate: gamma,
            diffusion_coefficient: diffusion,
            radius_nm: radius,
        });
    }

    let polydispersity = match fit.model {
        ModelKind::Cumulant2 | ModelKind::Cumulant3 if fit.params[1] > 0.0 => {
            Some(fit.params[2] / (fit.params[1] * fit.params[1]))
        }
        _ => None,
    };

    let coherence_factor = match fit.target {
        FitTarget::Field => ctx.beta,
        FitTarget::Intensity => modes.iter().map(|(a, _)| a).sum(),
    };

    FitResult {
        model: fit.model,
        display_name: fit.model.display_name().to_string(),
        target: fit.target,
        params,
        quality: FitQuality {
            sse: fit.sse,
            rmse: fit.rmse,
            bic,
            n: fit.n,
            evaluations: fit.evaluations,
            termination: fit.termination,
            attempt: fit.attempt,
        },
        physical: PhysicalResult {
            scattering_vector: q,
            components,
            coherence_factor,
            mean_countrate: ctx.mean_countrate,
            polydispersity,
        },
        warnings,
    }
}

fn bic(n: usize, sse: f64, k: usize) -> f64 {
    let n_f = n as f64;
    // Floor keeps exact (noiseless) fits finite.
    let sse_per = (sse / n_f).max(1e-300);
    n_f * sse_per.ln() + (k as f64) * n_f.ln()
}

fn select_by_bic(fits: &[FitResult]) -> FitResult {
    let mut best = &fits[0];
    for f in &fits[1..] {
        if f.quality.bic < best.quality.bic {
            best = f;
        }
    }

    let best_bic = best.quality.bic;

    // Prefer simplicity if within 2 BIC points.
    for kind in ModelKind::ALL {
        if let Some(f) = fits.iter().find(|f| f.model == kind) {
            if f.quality.bic <= best_bic + 2.0 {
                return f.clone();
            }
        }
    }

    best.clone()
}

/// Evaluate a fitted model on lag times `tau`.
pub fn fitted_curve(fit: &FitResult, tau: &[f64]) -> Vec<f64> {
    let params = fit.values();
    tau.iter().map(|&t| predict(fit.model, fit.target, t, &params)).collect()
}
