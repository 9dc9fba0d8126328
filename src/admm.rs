//! ADMM: alternating direction method of multipliers, splitting
//! `min ½‖√W (A x − b)‖² + λ R(z)` subject to `x = z`.
//!
//! Per iteration
//!
//! + `x ← argmin ½‖√W (A x − b)‖² + ρ/2 ‖x − z + u‖²`, approximately, by a
//!   few conjugate-gradient iterations on the normal equations
//!   `(A*WA + ρI) x = A*W b + ρ (z − u)`, warm-started at the current `x`
//!
//! + `z ← prox_{(λ/ρ) R}(x + u)`
//!
//! + `u ← u + x − z`
//!
//! with nonnegativity, when requested, imposed on both `x` and `z`.

pub(crate) struct Admm<'r, P: Projector + ?Sized> {
    projector: &'r P,
    geometry: &'r Geometry,
    sinogram: &'r Sinogram,
    weights: &'r Weights,
    regularization: Option<&'r Regularization>,
    nonnegativity: bool,
    rho: f32,
    inner_iterations: usize,
    /// `A* W b`, which never changes
    data_term: Volume,

    x: Volume,
    z: Volume,
    u: Volume,
}

impl<'r, P: Projector + ?Sized> Admm<'r, P> {

    pub(crate) fn new(projector: &'r P, parameters: &'r Parameters, rho: f32, inner_iterations: usize, x0: Volume) -> Result<Self> {
        let geometry = parameters.geometry();
        let weighted = parameters.sinogram() * parameters.weights();
        let data_term = back_project(projector, weighted.view(), geometry)?;
        Ok(Self {
            projector,
            geometry,
            sinogram: parameters.sinogram(),
            weights: parameters.weights(),
            regularization: parameters.active_regularization(),
            nonnegativity: parameters.options().nonnegativity,
            rho,
            inner_iterations,
            data_term,
            z: x0.clone(),
            u: Volume::zeros(x0.raw_dim()),
            x: x0,
        })
    }

    /// `(A*WA + ρI) v`
    fn normal_operator(&self, v: &Volume) -> Result<Volume> {
        let mut p = project(self.projector, v.view(), self.geometry)?;
        p *= self.weights;
        let mut out = back_project(self.projector, p.view(), self.geometry)?;
        out.scaled_add(self.rho, v);
        Ok(out)
    }

    /// Conjugate gradients on the normal equations, starting from `self.x`
    fn solve_x(&self) -> Result<Volume> {
        let rho = self.rho;
        let rhs = Zip::from(&self.data_term).and(&self.z).and(&self.u)
            .map_collect(|&d, &z, &u| d + rho * (z - u));

        let mut x = self.x.clone();
        let mut r = rhs - self.normal_operator(&x)?;
        let mut p = r.clone();
        let mut rr = dot(&r, &r);
        for _ in 0..self.inner_iterations {
            if rr == 0.0 { break }
            let mp = self.normal_operator(&p)?;
            let pmp = dot(&p, &mp);
            if !(pmp > 0.0) {
                return Err(Error::degenerate(format!("conjugate gradient curvature {pmp}")));
            }
            let alpha = (rr / pmp) as f32;
            x.scaled_add( alpha, &p);
            r.scaled_add(-alpha, &mp);
            let rr_next = dot(&r, &r);
            let beta = (rr_next / rr) as f32;
            Zip::from(&mut p).and(&r).for_each(|p, &r| *p = r + beta * *p);
            rr = rr_next;
        }
        Ok(x)
    }
}

impl<P: Projector + ?Sized> Solver for Admm<'_, P> {

    fn step(&mut self, iteration: usize) -> Result<Step> {

        // -------- x-update: least squares, pulled towards z − u ---------------
        let mut x = self.solve_x()?;
        if !all_finite(&x) {
            return Err(Error::degenerate(format!("non-finite voxels in x-update of iteration {iteration}")));
        }
        if self.nonnegativity { clip_negative(&mut x) }

        // -------- z-update: proximal step on x + u -----------------------------
        let v = &x + &self.u;
        let mut z = match self.regularization {
            Some(regularization) => regularization.apply(v.view(), 1.0 / self.rho),
            None => v,
        };
        if self.nonnegativity { clip_negative(&mut z) }

        // -------- Dual update ---------------------------------------------------
        Zip::from(&mut self.u).and(&x).and(&z).for_each(|u, &x, &z| *u += x - z);

        let change = relative_change(x.view(), self.x.view());
        self.x = x;
        self.z = z;

        let projection = project(self.projector, self.x.view(), self.geometry)?;
        let penalty = self.regularization.map_or(0.0, |r| r.penalty(self.x.view()));
        let objective = data_fidelity(projection.view(), self.sinogram.view(), self.weights.view()) + penalty;
        Ok(Step { objective, change })
    }

    fn estimate(&self) -> ArrayView3<'_, f32> { self.x.view() }

    fn into_estimate(self) -> Volume { self.x }
}

fn dot(a: &Volume, b: &Volume) -> f64 {
    Zip::from(a).and(b).fold(0.0, |acc, &a, &b| acc + a as f64 * b as f64)
}


// ----- Imports ------------------------------------------------------------------------------------------
use ndarray::{ArrayView3, Zip};

use crate::{
    Error, Result, Geometry, Sinogram, Volume, Weights, Parameters, Regularization,
    image::{all_finite, clip_negative, data_fidelity, relative_change},
    projector::{Projector, project, back_project},
    recon::{Solver, Step},
};
