//! Levenberg–Marquardt nonlinear least squares.
//!
//! Minimizes `Σ (f(x_i; p) - y_i)²` for a small parameter vector `p` with the
//! MINPACK-style trust-region solver of the `levenberg-marquardt` crate. Columns
//! of the Jacobian are scaled internally, so parameters of very different
//! magnitude (amplitudes ~1, decay rates ~1e5 1/s, second cumulants ~1e8 1/s²)
//! all move.
//!
//! The model and its analytic Jacobian are plain closures; `CurveProblem`
//! adapts them to the crate's `LeastSquaresProblem` trait.

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};

use crate::domain::Termination;

/// Tolerances and iteration bound.
#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    /// Patience of the solver: at most `max_iterations · (params + 1)` model
    /// evaluations.
    pub max_iterations: usize,
    /// Relative cost reduction that counts as converged.
    pub ftol: f64,
    /// Relative parameter step that counts as converged.
    pub xtol: f64,
    /// Cosine between residuals and any Jacobian column that counts as converged.
    pub gtol: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            ftol: 1e-14,
            xtol: 1e-14,
            gtol: 1e-12,
        }
    }
}

/// A converged solve.
#[derive(Debug, Clone)]
pub struct LmOutcome {
    pub params: Vec<f64>,
    pub sse: f64,
    pub evaluations: usize,
    pub termination: Termination,
}

/// Why a solve failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LmFailure {
    /// The evaluation budget ran out before any convergence test passed.
    LostPatience { evaluations: usize },
    /// The starting point already produces non-finite residuals.
    NonFiniteStart,
    /// Residuals or Jacobian turned non-finite during the solve.
    Numerical { evaluations: usize },
}

impl LmFailure {
    pub fn evaluations(&self) -> usize {
        match self {
            LmFailure::LostPatience { evaluations } | LmFailure::Numerical { evaluations } => *evaluations,
            LmFailure::NonFiniteStart => 0,
        }
    }
}

/// Curve-fit problem over borrowed data and model closures.
struct CurveProblem<'a, F, J> {
    x: &'a [f64],
    y: &'a [f64],
    params: DVector<f64>,
    model: &'a F,
    jacobian: &'a J,
}

impl<F, J> LeastSquaresProblem<f64, Dyn, Dyn> for CurveProblem<'_, F, J>
where
    F: Fn(f64, &[f64]) -> f64,
    J: Fn(f64, &[f64], &mut [f64]),
{
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, p: &DVector<f64>) {
        self.params.copy_from(p);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        residuals(self.x, self.y, self.params.as_slice(), self.model)
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let jac = jacobian_matrix(self.x, self.params.as_slice(), self.params.len(), self.jacobian);
        jac.iter().all(|v| v.is_finite()).then_some(jac)
    }
}

/// Run Levenberg–Marquardt.
///
/// - `model(x, p)` returns the prediction at `x`
/// - `jacobian(x, p, row)` fills `∂f/∂p_j` into `row`
///
/// A solve that stops because no further reduction is possible at machine
/// precision counts as converged.
pub fn levenberg_marquardt<F, J>(
    x: &[f64],
    y: &[f64],
    initial: &[f64],
    opts: &LmOptions,
    model: F,
    jacobian: J,
) -> Result<LmOutcome, LmFailure>
where
    F: Fn(f64, &[f64]) -> f64,
    J: Fn(f64, &[f64], &mut [f64]),
{
    if residuals(x, y, initial, &model).is_none() {
        return Err(LmFailure::NonFiniteStart);
    }

    let problem = CurveProblem {
        x,
        y,
        params: DVector::from_column_slice(initial),
        model: &model,
        jacobian: &jacobian,
    };
    let solver = LevenbergMarquardt::new()
        .with_ftol(opts.ftol)
        .with_xtol(opts.xtol)
        .with_gtol(opts.gtol)
        .with_patience(opts.max_iterations.max(1));
    let (problem, report) = solver.minimize(problem);
    let evaluations = report.number_of_evaluations;

    let termination = match report.termination {
        TerminationReason::ResidualsZero => Termination::Cost,
        TerminationReason::Converged { ftol: true, .. } => Termination::Cost,
        TerminationReason::Converged { .. } => Termination::Step,
        TerminationReason::Orthogonal => Termination::Gradient,
        TerminationReason::NoImprovementPossible(_) => Termination::Step,
        TerminationReason::LostPatience => return Err(LmFailure::LostPatience { evaluations }),
        _ => return Err(LmFailure::Numerical { evaluations }),
    };

    let params: Vec<f64> = problem.params.iter().copied().collect();
    let Some(r) = residuals(x, y, &params, &model) else {
        return Err(LmFailure::Numerical { evaluations });
    };
    Ok(LmOutcome {
        params,
        sse: r.norm_squared(),
        evaluations,
        termination,
    })
}

/// Per-parameter standard errors from `s²·(JᵀJ)⁻¹`, with `s² = SSE / (n - m)`.
///
/// `JᵀJ` is inverted in correlation form (unit diagonal) so parameters of very
/// different scale do not make it look singular. Returns `None` for every
/// parameter when it is numerically singular or when there are no residual
/// degrees of freedom.
pub fn standard_errors<J>(x: &[f64], params: &[f64], sse: f64, jacobian: J) -> Vec<Option<f64>>
where
    J: Fn(f64, &[f64], &mut [f64]),
{
    let m = params.len();
    let n = x.len();
    if n <= m {
        return vec![None; m];
    }

    let jac = jacobian_matrix(x, params, m, &jacobian);
    let jtj = jac.transpose() * &jac;

    let scale: Vec<f64> = (0..m).map(|j| jtj[(j, j)].sqrt()).collect();
    if scale.iter().any(|s| !(s.is_finite() && *s > 0.0)) {
        return vec![None; m];
    }
    let corr = DMatrix::from_fn(m, m, |i, j| jtj[(i, j)] / (scale[i] * scale[j]));

    let svd = corr.clone().svd(false, false);
    let s_max = svd.singular_values.max();
    let s_min = svd.singular_values.min();
    if !(s_max.is_finite() && s_max > 0.0) || s_min <= s_max * 1e-14 {
        return vec![None; m];
    }

    let Some(inv) = corr.try_inverse() else {
        return vec![None; m];
    };
    let s2 = sse / (n - m) as f64;
    (0..m)
        .map(|j| {
            let var = s2 * inv[(j, j)] / (scale[j] * scale[j]);
            (var.is_finite() && var >= 0.0).then(|| var.sqrt())
        })
        .collect()
}

fn residuals<F>(x: &[f64], y: &[f64], p: &[f64], model: &F) -> Option<DVector<f64>>
where
    F: Fn(f64, &[f64]) -> f64,
{
    let r = DVector::from_iterator(x.len(), x.iter().zip(y).map(|(&xi, &yi)| model(xi, p) - yi));
    r.iter().all(|v| v.is_finite()).then_some(r)
}

fn jacobian_matrix<J>(x: &[f64], p: &[f64], m: usize, jacobian: &J) -> DMatrix<f64>
where
    J: Fn(f64, &[f64], &mut [f64]),
{
    let mut jac = DMatrix::<f64>::zeros(x.len(), m);
    let mut row = vec![0.0; m];
    for (i, &xi) in x.iter().enumerate() {
        jacobian(xi, p, &mut row);
        for j in 0..m {
            jac[(i, j)] = row[j];
        }
    }
    jac
}
