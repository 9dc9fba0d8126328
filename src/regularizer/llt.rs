//! Second-order smoothness (Lysaker, Lundervold & Tai).
//!
//! Penalizes the smoothed magnitude of the Laplacian,
//! `R(u) = Σ √((Δu)² + ε²) − ε`, so that, unlike total variation, linear
//! ramps are not turned into staircases. The proximal sub-problem is solved by
//! explicit gradient descent.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Llt {
    /// Smoothing of `|Δu|` near zero
    pub epsilon: f32,
    /// Descent step. When absent, the largest step guaranteed to decrease
    /// the energy is used.
    pub tau: Option<f32>,
}

impl Default for Llt {
    fn default() -> Self { Self { epsilon: 1e-2, tau: None } }
}

impl Llt {
    /// `1 / (1 + λ ‖Δ‖² / ε)`: the inverse Lipschitz constant of the
    /// gradient of the sub-problem's energy.
    fn stable_step(&self, strength: f32, n_axes: usize) -> f32 {
        let laplacian_norm = 4.0 * n_axes as f32;
        1.0 / (1.0 + strength * laplacian_norm * laplacian_norm / self.epsilon)
    }

    /// `φ'(s) = s / √(s² + ε²)`
    fn flux(&self, laplacian: &Array3<f32>) -> Array3<f32> {
        let e2 = self.epsilon * self.epsilon;
        laplacian.mapv(|s| s / (s * s + e2).sqrt())
    }
}

impl Regularizer for Llt {

    fn proximal(&self, f: ArrayView3<f32>, strength: f32, max_iterations: usize, tolerance: f32) -> Volume {
        let axes = active_axes(f.shape());
        if strength <= 0.0 || axes.is_empty() { return f.to_owned() }

        let tau = self.tau.unwrap_or_else(|| self.stable_step(strength, axes.len()));
        let mut u = f.to_owned();

        for _ in 0..max_iterations {
            // ∇E = (u − f) + λ Δ φ'(Δu); Δ is symmetric and φ' odd, so the
            // sign of Δ cancels
            let flux = self.flux(&negative_laplacian(u.view(), &axes));
            let smoothing = negative_laplacian(flux.view(), &axes);
            let mut u_new = u.clone();
            Zip::from(&mut u_new).and(&u).and(&f).and(&smoothing)
                .for_each(|n, &u, &f, &s| *n = u - tau * ((u - f) + strength * s));

            let change = relative_change(u_new.view(), u.view());
            u = u_new;
            if change < tolerance { break }
        }
        u
    }

    fn penalty(&self, u: ArrayView3<f32>) -> f32 {
        let axes = active_axes(u.shape());
        let e = self.epsilon;
        negative_laplacian(u, &axes).iter()
            .map(|&s| ((s * s + e * e).sqrt() - e) as f64)
            .sum::<f64>() as f32
    }
}


// ----- Imports ------------------------------------------------------------------------------------------
use ndarray::{Array3, ArrayView3, Zip};

use crate::{Volume, image::relative_change};
use super::{Regularizer, differences::{active_axes, negative_laplacian}};
