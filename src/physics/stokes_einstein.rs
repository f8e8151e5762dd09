//! Stokes–Einstein propagation from decay rates to particle size.
//!
//! ```text
//! q = 4π·n/λ · sin(θ/2)
//! D = Γ / q²
//! R = k_B·T / (6π·η·D)
//! ```
//!
//! Inputs use lab units (`nm`, degrees, `mPa·s`, °C); everything is converted to
//! SI before use.

use std::f64::consts::PI;

use crate::domain::PhysicalParams;
use crate::error::AnalysisError;

/// Boltzmann constant (J/K).
pub const K_B: f64 = 1.380649e-23;

const KELVIN_OFFSET: f64 = 273.15;

/// Reject parameter sets that make the propagation meaningless.
pub fn validate_physical(params: &PhysicalParams) -> Result<(), AnalysisError> {
    let checks = [
        ("wavelength", params.wavelength_nm, params.wavelength_nm > 0.0),
        (
            "scattering angle",
            params.scattering_angle_deg,
            params.scattering_angle_deg > 0.0 && params.scattering_angle_deg <= 180.0,
        ),
        ("viscosity", params.viscosity_mpa_s, params.viscosity_mpa_s > 0.0),
        (
            "temperature",
            params.temperature_c,
            params.temperature_c + KELVIN_OFFSET > 0.0,
        ),
        ("refractive index", params.refractive_index, params.refractive_index > 0.0),
    ];
    for (name, value, ok) in checks {
        if !(value.is_finite() && ok) {
            return Err(AnalysisError::InvalidConfig(format!("{name} out of range: {value}")));
        }
    }
    Ok(())
}

/// Scattering vector magnitude `q` in 1/m.
pub fn scattering_vector(params: &PhysicalParams) -> f64 {
    let wavelength_m = params.wavelength_nm * 1e-9;
    let theta = params.scattering_angle_deg.to_radians();
    4.0 * PI * params.refractive_index / wavelength_m * (theta / 2.0).sin()
}

/// Translational diffusion coefficient (m²/s) for decay rate `gamma` (1/s).
pub fn diffusion_coefficient(gamma: f64, q: f64) -> f64 {
    gamma / (q * q)
}

/// Hydrodynamic radius in nm, or `None` for a non-positive diffusion coefficient.
pub fn hydrodynamic_radius_nm(diffusion: f64, params: &PhysicalParams) -> Option<f64> {
    if !(diffusion.is_finite() && diffusion > 0.0) {
        return None;
    }
    let temperature_k = params.temperature_c + KELVIN_OFFSET;
    let eta = params.viscosity_mpa_s * 1e-3;
    Some(K_B * temperature_k / (6.0 * PI * eta * diffusion) * 1e9)
}

/// Field decay rate (1/s) expected for spheres of `radius_nm`.
pub fn decay_rate_for_radius(radius_nm: f64, params: &PhysicalParams) -> f64 {
    let temperature_k = params.temperature_c + KELVIN_OFFSET;
    let eta = params.viscosity_mpa_s * 1e-3;
    let diffusion = K_B * temperature_k / (6.0 * PI * eta * radius_nm * 1e-9);
    let q = scattering_vector(params);
    diffusion * q * q
}
