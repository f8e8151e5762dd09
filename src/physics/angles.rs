//! Multi-angle analysis: diffusion coefficient from the slope of Γ over q².
//!
//! For pure translational diffusion `Γ = D·q²`, so a straight line through
//! the `(q², Γ)` pairs of several angles gives `D` as its slope. A non-zero
//! intercept hints at non-diffusive contributions.

use serde::{Deserialize, Serialize};

use crate::domain::PhysicalParams;
use crate::error::AnalysisError;
use crate::math::fit_line;
use crate::physics::stokes_einstein::{hydrodynamic_radius_nm, scattering_vector};

/// One fitted decay rate at one scattering angle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleObservation {
    pub angle_deg: f64,
    /// Field decay rate (1/s).
    pub gamma: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffusionFit {
    /// Slope of Γ over q² (m²/s).
    pub diffusion_coefficient: f64,
    /// Γ at q² = 0 (1/s).
    pub intercept: f64,
    pub r_squared: f64,
    pub radius_nm: Option<f64>,
    /// `(q², Γ)` pairs used in the regression, in input order.
    pub points: Vec<(f64, f64)>,
}

/// Regress Γ on q² across angles.
///
/// `params` supplies wavelength, refractive index, viscosity and temperature;
/// its angle is ignored in favour of each observation's own.
pub fn fit_diffusion(
    observations: &[AngleObservation],
    params: &PhysicalParams,
) -> Result<DiffusionFit, AnalysisError> {
    if observations.len() < 2 {
        return Err(AnalysisError::InsufficientData(format!(
            "multi-angle fit needs at least 2 angles, got {}",
            observations.len()
        )));
    }

    let mut points = Vec::with_capacity(observations.len());
    for obs in observations {
        if !(obs.angle_deg.is_finite() && obs.angle_deg > 0.0 && obs.angle_deg <= 180.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "scattering angle out of range: {}",
                obs.angle_deg
            )));
        }
        if !obs.gamma.is_finite() {
            return Err(AnalysisError::InvalidConfig(format!(
                "non-finite decay rate at {}°",
                obs.angle_deg
            )));
        }
        let at_angle = PhysicalParams {
            scattering_angle_deg: obs.angle_deg,
            ..*params
        };
        let q = scattering_vector(&at_angle);
        points.push((q * q, obs.gamma));
    }

    let q2: Vec<f64> = points.iter().map(|p| p.0).collect();
    let gamma: Vec<f64> = points.iter().map(|p| p.1).collect();
    let line = fit_line(&q2, &gamma).ok_or_else(|| {
        AnalysisError::InsufficientData("multi-angle fit needs at least 2 distinct angles".to_string())
    })?;

    Ok(DiffusionFit {
        diffusion_coefficient: line.slope,
        intercept: line.intercept,
        r_squared: line.r_squared,
        radius_nm: hydrodynamic_radius_nm(line.slope, params),
        points,
    })
}
