//! Ring-artifact suppression.
//!
//! A miscalibrated detector pixel adds the same offset to every projection
//! angle, which reconstructs as a ring. The offsets `r` (one per detector
//! pixel) are estimated jointly with the volume by minimizing
//!
//! `½‖√W (A x − b + α r)‖² + λ R(x) + λ_R ‖r‖₁`
//!
//! The solver carries `r` alongside every volume it holds (accepted iterate,
//! extrapolated point, candidate), so each objective value belongs to one
//! consistent `(x, r)` pair. `RingCorrection` only knows how to apply, step
//! and penalize a given set of offsets.

/// Per-detector offsets, indexed (row, column)
pub type Offsets = Array2<f32>;

#[derive(Debug, Clone)]
pub struct RingCorrection {
    strength: f32,
    alpha: f32,
    shape: (usize, usize),
}

impl RingCorrection {

    /// `None` when ring removal is switched off
    pub fn new(ring: &Ring, geometry: &Geometry) -> Option<Self> {
        if ring.strength <= 0.0 { return None }
        Some(Self {
            strength: ring.strength,
            alpha: ring.alpha,
            shape: (geometry.detectors_v(), geometry.detectors_h()),
        })
    }

    pub fn zeros(&self) -> Offsets { Offsets::zeros(self.shape) }

    /// Lipschitz constant of the offset block of the data-term gradient:
    /// `α² max_detector Σ_angles w`. Added to that of the volume block, it
    /// bounds the constant of the joint problem.
    pub fn lipschitz(&self, weights: ArrayView3<f32>) -> f32 {
        let per_detector = weights.sum_axis(Axis(1));
        let largest = per_detector.iter().copied().fold(0.0, f32::max);
        self.alpha * self.alpha * largest
    }

    /// `b − α r`, with the offsets broadcast across angles
    pub fn corrected(&self, sinogram: ArrayView3<f32>, offsets: &Offsets) -> Sinogram {
        let mut out = sinogram.to_owned();
        for (mut plane, offsets) in out.outer_iter_mut().zip(offsets.outer_iter()) {
            for mut row in plane.outer_iter_mut() {
                row.scaled_add(-self.alpha, &offsets);
            }
        }
        out
    }

    /// Proximal-gradient step from `offsets`: the gradient `α Σ_angles
    /// residual`, then soft thresholding by `step λ_R`. `residual` is the
    /// weighted residual `w (A y − b + α offsets)`.
    pub fn step(&self, offsets: &Offsets, residual: ArrayView3<f32>, step: f32) -> Offsets {
        let gradient = residual.sum_axis(Axis(1));
        let (scale, threshold) = (step * self.alpha, step * self.strength);
        Zip::from(offsets).and(&gradient)
            .map_collect(|&r, &g| soft_threshold(r - scale * g, threshold))
    }

    /// `λ_R ‖r‖₁`
    pub fn penalty(&self, offsets: &Offsets) -> f32 {
        self.strength * offsets.iter().map(|r| r.abs()).sum::<f32>()
    }
}

/// `sign(v) · max(|v| − λ, 0)`
pub fn soft_threshold(v: f32, lambda: f32) -> f32 {
    v.signum() * (v.abs() - lambda).max(0.0)
}


// ----- Imports ------------------------------------------------------------------------------------------
use ndarray::{Array2, ArrayView3, Axis, Zip};

use crate::{Geometry, Ring, Sinogram};
