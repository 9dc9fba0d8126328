//! SIRT (simultaneous iterative reconstruction technique), used to give the
//! proximal algorithms a better starting point than zeros.
//!
//! `x ← x + C ⊙ A*(R ⊙ (b − A x))`, with `R = 1 / (A 1)` the inverse row
//! sums and `C = 1 / (A* 1)` the inverse column sums of the system matrix.
//! Rays and voxels with vanishing sums are left alone.

pub fn reconstruct<P: Projector + ?Sized>(
    projector    : &P,
    geometry     : &Geometry,
    sinogram     : ArrayView3<f32>,
    iterations   : usize,
    nonnegativity: bool,
) -> Result<Volume> {
    let invert = |x: f32| if x > 0.0 { 1.0 / x } else { 0.0 };

    let row_sums = project     (projector, Volume  ::ones(geometry.volume_shape  ()).view(), geometry)?.mapv(invert);
    let col_sums = back_project(projector, Sinogram::ones(geometry.sinogram_shape()).view(), geometry)?.mapv(invert);

    let mut x = Volume::zeros(geometry.volume_shape());
    for iteration in 0..iterations {
        let mut residual = project(projector, x.view(), geometry)?;
        Zip::from(&mut residual).and(&sinogram).and(&row_sums)
            .for_each(|r, &b, &w| *r = w * (b - *r));
        let update = back_project(projector, residual.view(), geometry)?;
        Zip::from(&mut x).and(&update).and(&col_sums)
            .for_each(|x, &u, &c| *x += c * u);
        if nonnegativity { clip_negative(&mut x) }
        if !all_finite(&x) {
            return Err(Error::degenerate(format!("non-finite SIRT iterate at iteration {iteration}")));
        }
    }
    debug!(iterations, "SIRT warm start");
    Ok(x)
}


// ----- Imports ------------------------------------------------------------------------------------------
use ndarray::{ArrayView3, Zip};
use tracing::debug;

use crate::{
    Error, Result, Geometry, Sinogram, Volume,
    image::{all_finite, clip_negative},
    projector::{Projector, project, back_project},
};
