//! Synthetic measurements for demos and tests.
//!
//! Speckle traces are built from a complex Gaussian field per channel that
//! evolves as an Ornstein–Uhlenbeck process:
//!
//! ```text
//! E[t+1] = ρ·E[t] + sqrt(1 - ρ²)·ξ[t],   ρ = exp(-Γ·dt)
//! ```
//!
//! so `|g1(τ)| = exp(-Γτ)`. The detected intensity is `s·(|E|² + c)` where the
//! incoherent background `c = 1/√β - 1` sets the coherence factor and `s` is a
//! per-channel brightness. Gaussian detector noise is added last.
//!
//! Every channel draws from its own `StdRng` seeded from `(seed, channel)`, so
//! output is reproducible and independent of thread scheduling.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::{LogNormal, Normal};
use rayon::prelude::*;
use tracing::info;

use crate::domain::{ChannelSet, CorrelationCurve, IntensityTrace};
use crate::error::AnalysisError;

/// Parameters of a simulated multi-speckle measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeckleSimulation {
    pub channels: usize,
    pub frames: usize,
    /// Seconds between frames.
    pub frame_interval: f64,
    /// Field decay rate Γ (1/s).
    pub decay_rate: f64,
    /// Coherence factor in (0, 1].
    pub beta: f64,
    /// Log-normal σ of per-channel brightness (0 = identical channels).
    pub brightness_spread: f64,
    /// Mean intensity of a channel of unit brightness.
    pub mean_intensity: f64,
    /// Detector noise σ relative to the channel mean.
    pub noise_level: f64,
    pub seed: u64,
}

impl Default for SpeckleSimulation {
    fn default() -> Self {
        Self {
            channels: 64,
            frames: 10_000,
            frame_interval: 1e-4,
            decay_rate: 500.0,
            beta: 0.8,
            brightness_spread: 0.0,
            mean_intensity: 100.0,
            noise_level: 0.0,
            seed: 42,
        }
    }
}

impl SpeckleSimulation {
    fn validate(&self) -> Result<(), AnalysisError> {
        if self.channels == 0 {
            return Err(AnalysisError::InvalidConfig("channel count must be > 0".to_string()));
        }
        if self.frames < 2 {
            return Err(AnalysisError::InvalidConfig("need at least 2 frames".to_string()));
        }
        if !(self.beta.is_finite() && self.beta > 0.0 && self.beta <= 1.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "coherence factor must be in (0, 1], got {}",
                self.beta
            )));
        }
        let positive = [
            ("frame interval", self.frame_interval),
            ("decay rate", self.decay_rate),
            ("mean intensity", self.mean_intensity),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(AnalysisError::InvalidConfig(format!("{name} must be > 0, got {value}")));
            }
        }
        for (name, value) in [("brightness spread", self.brightness_spread), ("noise level", self.noise_level)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(AnalysisError::InvalidConfig(format!("{name} must be >= 0, got {value}")));
            }
        }
        Ok(())
    }
}

/// Simulate intensity traces for every channel.
pub fn simulate_speckles(sim: &SpeckleSimulation) -> Result<ChannelSet, AnalysisError> {
    sim.validate()?;
    let rho = (-sim.decay_rate * sim.frame_interval).exp();
    let innovation = (1.0 - rho * rho).sqrt();
    let background = 1.0 / sim.beta.sqrt() - 1.0;

    // Unit-variance complex Gaussian: each quadrature has variance 1/2.
    let quadrature = Normal::new(0.0, std::f64::consts::FRAC_1_SQRT_2)
        .map_err(|e| AnalysisError::InvalidConfig(format!("noise distribution error: {e}")))?;
    let detector = Normal::new(0.0, 1.0)
        .map_err(|e| AnalysisError::InvalidConfig(format!("noise distribution error: {e}")))?;
    let brightness = LogNormal::new(0.0, sim.brightness_spread)
        .map_err(|e| AnalysisError::InvalidConfig(format!("brightness distribution error: {e}")))?;

    let traces: Vec<IntensityTrace> = (0..sim.channels)
        .into_par_iter()
        .map(|ch| {
            let mut rng = StdRng::seed_from_u64(channel_seed(sim.seed, ch));
            let scale = sim.mean_intensity * brightness.sample(&mut rng);
            let mean = scale * (1.0 + background);

            let mut re = quadrature.sample(&mut rng);
            let mut im = quadrature.sample(&mut rng);
            let mut samples = Vec::with_capacity(sim.frames);
            for _ in 0..sim.frames {
                let clean = scale * (re * re + im * im + background);
                let noisy = clean + sim.noise_level * mean * detector.sample(&mut rng);
                samples.push(noisy.max(0.0));

                re = rho * re + innovation * quadrature.sample(&mut rng);
                im = rho * im + innovation * quadrature.sample(&mut rng);
            }
            IntensityTrace::new(format!("s{ch}"), samples)
        })
        .collect();

    info!(
        channels = sim.channels,
        frames = sim.frames,
        decay_rate = sim.decay_rate,
        beta = sim.beta,
        "simulated speckle traces"
    );
    ChannelSet::new(traces, sim.frame_interval)
}

/// Noisy intensity correlation `g2 = 1 + β·(Σ Aᵢ·exp(-Γᵢτ))² + ε`.
///
/// `components` are `(amplitude, decay rate)` pairs of the field correlation;
/// `ε` is Gaussian with standard deviation `noise_sigma`.
pub fn synthetic_g2_curve(
    tau: &[f64],
    beta: f64,
    components: &[(f64, f64)],
    noise_sigma: f64,
    seed: u64,
) -> Result<CorrelationCurve, AnalysisError> {
    let noise = Normal::new(0.0, noise_sigma)
        .map_err(|e| AnalysisError::InvalidConfig(format!("noise distribution error: {e}")))?;
    let mut rng = StdRng::seed_from_u64(seed);
    let g2 = tau
        .iter()
        .map(|&t| {
            let g1: f64 = components.iter().map(|(a, g)| a * (-g * t).exp()).sum();
            1.0 + beta * g1 * g1 + noise.sample(&mut rng)
        })
        .collect();
    CorrelationCurve::from_pairs(tau.to_vec(), g2)
}

fn channel_seed(seed: u64, channel: usize) -> u64 {
    seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(channel as u64)
}
