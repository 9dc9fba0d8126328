//! FISTA: proximal gradient descent with Nesterov momentum (Beck & Teboulle,
//! 2009), for
//!
//! `min_x ½‖√W (A x − b)‖² + λ R(x)`
//!
//! `A` is linear, so the projection of the extrapolated point `y` is the
//! same combination of the projections of the iterates that `y` is of the
//! iterates themselves. Keeping those projections around, each iteration
//! needs exactly one back projection (of the residual at `y`) and one forward
//! projection (of the new candidate).
//!
//! With ring correction the unknowns are the pair `(x, r)` of volume and
//! detector offsets (see [`crate::ring`]). Both blocks take their proximal
//! step with the Lipschitz constant of the joint problem, every iterate
//! carries its own offsets, and the objective includes `λ_R ‖r‖₁`.
//!
//! With `Acceleration::Monotone` a candidate which increases the objective
//! is rejected and the momentum restarted from the accepted iterate
//! (function-value adaptive restart, O'Donoghue & Candès, 2015). The
//! objective trace is then non-increasing, and convergence on strongly convex
//! problems becomes linear rather than polynomial.

pub(crate) struct Fista<'r, P: Projector + ?Sized> {
    projector: &'r P,
    geometry: &'r Geometry,
    sinogram: &'r Sinogram,
    weights: &'r Weights,
    regularization: Option<&'r Regularization>,
    ring: Option<RingState>,
    nonnegativity: bool,
    acceleration: Acceleration,
    lipschitz: f32,

    t: f32,
    /// Accepted iterate, its projection and its objective
    x: Volume,
    ax: Sinogram,
    objective: f32,
    /// Extrapolated point and its projection
    y: Volume,
    ay: Sinogram,
}

/// Ring offsets at the accepted iterate and at the extrapolated point
struct RingState {
    correction: RingCorrection,
    r: Offsets,
    ry: Offsets,
}

impl<'r, P: Projector + ?Sized> Fista<'r, P> {

    /// `lipschitz` bounds the volume block; the offset block's constant is
    /// added here when ring correction is on.
    pub(crate) fn new(projector: &'r P, parameters: &'r Parameters, lipschitz: f32, x0: Volume) -> Result<Self> {
        let options = parameters.options();
        let geometry = parameters.geometry();
        let weights = parameters.weights();
        let ring = RingCorrection::new(&options.ring, geometry).map(|correction| {
            let r = correction.zeros();
            RingState { ry: r.clone(), r, correction }
        });
        let lipschitz = lipschitz + ring.as_ref().map_or(0.0, |ring| ring.correction.lipschitz(weights.view()));
        let ax = project(projector, x0.view(), geometry)?;
        let mut fista = Self {
            projector,
            geometry,
            sinogram: parameters.sinogram(),
            weights,
            regularization: parameters.active_regularization(),
            ring,
            nonnegativity: options.nonnegativity,
            acceleration: options.acceleration,
            lipschitz,
            t: 1.0,
            y: x0.clone(),
            ay: ax.clone(),
            x: x0,
            ax,
            objective: 0.0,
        };
        let offsets = fista.ring.as_ref().map(|ring| &ring.r);
        fista.objective = fista.evaluate(fista.ax.view(), fista.x.view(), offsets);
        Ok(fista)
    }

    /// Measured sinogram, with `offsets` removed
    fn data(&self, offsets: Option<&Offsets>) -> Cow<'r, Sinogram> {
        match (&self.ring, offsets) {
            (Some(ring), Some(offsets)) => Cow::Owned(ring.correction.corrected(self.sinogram.view(), offsets)),
            _                           => Cow::Borrowed(self.sinogram),
        }
    }

    /// Data term plus weighted penalties, at the pair `(x, offsets)`
    fn evaluate(&self, projection: ArrayView3<f32>, x: ArrayView3<f32>, offsets: Option<&Offsets>) -> f32 {
        let data = self.data(offsets);
        let penalty = self.regularization.map_or(0.0, |r| r.penalty(x));
        let ring_penalty = match (&self.ring, offsets) {
            (Some(ring), Some(offsets)) => ring.correction.penalty(offsets),
            _                           => 0.0,
        };
        data_fidelity(projection, data.view(), self.weights.view()) + penalty + ring_penalty
    }
}

impl<P: Projector + ?Sized> Solver for Fista<'_, P> {

    fn step(&mut self, iteration: usize) -> Result<Step> {
        let l = self.lipschitz;

        // -------- Gradient step at the extrapolated point ---------------------
        let data = self.data(self.ring.as_ref().map(|ring| &ring.ry));
        let residual = weighted_residual(self.ay.view(), data.view(), self.weights.view());
        let rz = self.ring.as_ref().map(|ring| ring.correction.step(&ring.ry, residual.view(), 1.0 / l));
        let gradient = back_project(self.projector, residual.view(), self.geometry)?;
        let mut z = Zip::from(&self.y).and(&gradient).map_collect(|&y, &g| y - g / l);

        // -------- Proximal step and constraints --------------------------------
        if let Some(regularization) = self.regularization {
            z = regularization.apply(z.view(), 1.0 / l);
        }
        if !all_finite(&z) {
            return Err(Error::degenerate(format!("non-finite voxels in candidate of iteration {iteration}")));
        }
        if self.nonnegativity { clip_negative(&mut z) }

        let az = project(self.projector, z.view(), self.geometry)?;
        let objective = self.evaluate(az.view(), z.view(), rz.as_ref());
        if !objective.is_finite() {
            return Err(Error::degenerate(format!("objective of candidate in iteration {iteration} is {objective}")));
        }
        let change = relative_change(z.view(), self.x.view());

        // -------- Momentum -----------------------------------------------------
        let accept = match self.acceleration {
            Acceleration::Standard => true,
            Acceleration::Monotone => objective <= self.objective,
        };
        if accept {
            let t_next = (1.0 + (1.0 + 4.0 * self.t * self.t).sqrt()) / 2.0;
            let beta = (self.t - 1.0) / t_next;
            // y = z + β (z − x)
            self.y = extrapolate(z.view(), self.x.view(), beta);
            self.ay = extrapolate(az.view(), self.ax.view(), beta);
            self.x = z;
            self.ax = az;
            if let (Some(ring), Some(rz)) = (self.ring.as_mut(), rz) {
                ring.ry = extrapolate(rz.view(), ring.r.view(), beta);
                ring.r = rz;
            }
            self.objective = objective;
            self.t = t_next;
        } else {
            trace!(iteration, rejected = objective, kept = self.objective, "restarting momentum");
            self.y = self.x.clone();
            self.ay = self.ax.clone();
            if let Some(ring) = self.ring.as_mut() { ring.ry = ring.r.clone() }
            self.t = 1.0;
        }

        Ok(Step { objective: self.objective, change })
    }

    fn estimate(&self) -> ArrayView3<'_, f32> { self.x.view() }

    fn into_estimate(self) -> Volume { self.x }
}


// ----- Imports ------------------------------------------------------------------------------------------
use std::borrow::Cow;

use ndarray::{ArrayView3, Zip};
use tracing::trace;

use crate::{
    Error, Result, Geometry, Sinogram, Volume, Weights, Parameters, Acceleration, Regularization,
    image::{all_finite, clip_negative, data_fidelity, extrapolate, relative_change, weighted_residual},
    projector::{Projector, project, back_project},
    recon::{Solver, Step},
    ring::{Offsets, RingCorrection},
};
