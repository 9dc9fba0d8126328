//! Proximal operators of regularization penalties.
//!
//! The reconstruction loop sees a regularizer only through the [`Regularizer`]
//! trait: a proximal step, which is a self-contained sub-solve with its own
//! iteration budget and tolerance, and the value of the penalty, which enters
//! the objective. Implementations provided here:
//!
//! + `NoRegularizer`: identity
//!
//! + `FgpTv`: total variation
//!
//! + `Llt`: higher-order smoothness

mod differences;
mod fgp_tv;
mod llt;

pub use fgp_tv::FgpTv;
pub use llt::Llt;

/// `prox_{λR}(v) = argmin_u ½‖u − v‖² + λ R(u)`
pub trait Regularizer: Send + Sync + std::fmt::Debug {

    /// Approximate `prox_{strength·R}(volume)`, stopping after
    /// `max_iterations` or when the sub-solve's relative change drops below
    /// `tolerance`. Must return `volume` unchanged when `strength` is zero.
    fn proximal(&self, volume: ArrayView3<f32>, strength: f32, max_iterations: usize, tolerance: f32) -> Volume;

    /// `R(volume)`, without the strength factor
    fn penalty(&self, volume: ArrayView3<f32>) -> f32;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoRegularizer;

impl Regularizer for NoRegularizer {
    fn proximal(&self, volume: ArrayView3<f32>, _: f32, _: usize, _: f32) -> Volume { volume.to_owned() }
    fn penalty(&self, _: ArrayView3<f32>) -> f32 { 0.0 }
}

/// A regularizer together with the parameters of its use in a reconstruction
#[derive(Debug, Clone)]
pub struct Regularization {
    pub operator  : Arc<dyn Regularizer>,
    pub strength  : f32,
    pub iterations: usize,
    pub tolerance : f32,
}

impl Regularization {

    pub fn new(operator: impl Regularizer + 'static, strength: f32, iterations: usize, tolerance: f32) -> Self {
        Self { operator: Arc::new(operator), strength, iterations, tolerance }
    }

    /// `None` when the configuration switches regularization off
    pub fn from_config(config: &RegularizerConfig) -> Option<Self> {
        let RegularizerConfig { kind, strength, iterations, tolerance, epsilon, tau } = *config;
        let operator: Arc<dyn Regularizer> = match kind {
            RegularizerKind::None  => return None,
            RegularizerKind::FgpTv => Arc::new(FgpTv),
            RegularizerKind::Llt   => Arc::new(Llt { epsilon, tau }),
        };
        Some(Self { operator, strength, iterations, tolerance })
    }

    /// Zero strength disables the proximal step entirely
    pub fn is_active(&self) -> bool { self.strength > 0.0 }

    /// Proximal step with strength scaled by `scale` (`1/L` for FISTA, `1/ρ`
    /// for ADMM)
    pub fn apply(&self, volume: ArrayView3<f32>, scale: f32) -> Volume {
        self.operator.proximal(volume, self.strength * scale, self.iterations, self.tolerance)
    }

    /// `λ R(volume)`
    pub fn penalty(&self, volume: ArrayView3<f32>) -> f32 {
        if self.is_active() { self.strength * self.operator.penalty(volume) } else { 0.0 }
    }
}


// ----- Imports ------------------------------------------------------------------------------------------
use std::sync::Arc;

use ndarray::ArrayView3;

use crate::{Volume, config::{RegularizerConfig, RegularizerKind}};
