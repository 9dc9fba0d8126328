//! Lipschitz constant of the gradient of the weighted least-squares data term.
//!
//! The gradient of `½‖√W (A x − b)‖²` is `A* W (A x − b)`, whose Lipschitz
//! constant is the largest eigenvalue of `A* W A`. It is estimated by power
//! iteration from a random start:
//!
//! 1. forward project,
//!
//! 2. weight by `√w` twice,
//!
//! 3. back project,
//!
//! 4. normalize by the Euclidean norm `s`, which is the current estimate.
//!
//! A parallel beam decouples detector rows, so a single slice, with the
//! weights of the first detector row, gives the estimate in a fraction of the
//! time. Divergent beams need the whole volume.

/// Power iterations on a single slice of a parallel-beam geometry
pub const PARALLEL_ITERATIONS: usize = 5;
/// Power iterations on the whole volume of a divergent-beam geometry
pub const CONE_ITERATIONS: usize = 8;

/// Estimate the largest eigenvalue of `A* W A`.
///
/// Every projector buffer is released before returning, whether or not the
/// estimation succeeds.
pub fn estimate<P: Projector + ?Sized>(projector: &P, geometry: &Geometry, weights: &Weights, seed: u64) -> Result<f32> {
    let expected = geometry.sinogram_shape();
    if weights.shape() != &expected[..] {
        return Err(Error::config(format!(
            "weights shape {:?} does not match sinogram shape {:?}", weights.shape(), expected
        )));
    }
    if !weights.iter().all(|&w| w.is_finite() && w >= 0.0) {
        return Err(Error::config("weights must be finite and non-negative"));
    }

    let (geometry, weights, iterations) = match geometry.single_slice() {
        Some(slice) => (slice, weights.slice(s![0..1, .., ..]), PARALLEL_ITERATIONS),
        None        => (geometry.clone(), weights.view(), CONE_ITERATIONS),
    };
    let sqrt_w = weights.mapv(f32::sqrt);

    let mut rng = StdRng::seed_from_u64(seed);
    let mut x = Volume::from_shape_simple_fn(geometry.volume_shape(), || rng.gen::<f32>());
    let mut s = 0.0;

    for iteration in 0..iterations {
        let mut p = project(projector, x.view(), &geometry)?;
        p *= &sqrt_w;
        p *= &sqrt_w;
        x = back_project(projector, p.view(), &geometry)?;
        s = norm(&x);
        if !(s.is_finite() && s > 0.0) {
            return Err(Error::degenerate(format!("power iteration {iteration} produced norm {s}")));
        }
        x /= s;
        debug!(iteration, estimate = s, "power method");
    }
    Ok(s)
}


// ----- Imports ------------------------------------------------------------------------------------------
use ndarray::s;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::debug;

use crate::{
    Error, Result, Geometry, Volume, Weights,
    image::norm,
    projector::{Projector, project, back_project},
};
