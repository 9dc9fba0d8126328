//! Isotropic total variation, by fast gradient projection on the dual
//! problem (Beck & Teboulle, 2009).
//!
//! The proximal point is `u = f − λ Dᵀp`, where the dual field `p` (one
//! component per active axis) is constrained to `|p| ≤ 1` voxel by voxel.
//! Projected gradient ascent on `p`, accelerated with the same momentum
//! sequence as FISTA, converges to the optimum.

#[derive(Debug, Clone, Copy, Default)]
pub struct FgpTv;

impl Regularizer for FgpTv {

    fn proximal(&self, f: ArrayView3<f32>, strength: f32, max_iterations: usize, tolerance: f32) -> Volume {
        let axes = active_axes(f.shape());
        if strength <= 0.0 || axes.is_empty() { return f.to_owned() }

        // ‖D‖² ≤ 4 per axis
        let step = 1.0 / (4.0 * axes.len() as f32 * strength);
        let zeros = || axes.iter().map(|_| Array3::<f32>::zeros(f.raw_dim())).collect::<Vec<_>>();

        let mut p = zeros();
        let mut r = zeros();
        let mut t = 1.0_f32;
        let mut u = f.to_owned();

        for iteration in 0..max_iterations {
            let u_new = primal(f, &r, &axes, strength);

            let mut p_new: Vec<Array3<f32>> = r.iter().zip(&axes)
                .map(|(r, &axis)| r + &(forward(u_new.view(), axis) * step))
                .collect();
            project_unit_ball(&mut p_new);

            let t_new = (1.0 + (1.0 + 4.0 * t * t).sqrt()) / 2.0;
            let beta = (t - 1.0) / t_new;
            for ((r, p_new), p) in r.iter_mut().zip(&p_new).zip(&p) {
                Zip::from(r).and(p_new).and(p).for_each(|r, &n, &o| *r = n + beta * (n - o));
            }

            // The first primal iterate is `f` itself
            let change = if iteration == 0 { f32::INFINITY } else { relative_change(u_new.view(), u.view()) };
            p = p_new;
            t = t_new;
            u = u_new;
            if change < tolerance { break }
        }
        primal(f, &p, &axes, strength)
    }

    fn penalty(&self, u: ArrayView3<f32>) -> f32 {
        let axes = active_axes(u.shape());
        let mut squares = Array3::<f32>::zeros(u.raw_dim());
        for &axis in &axes {
            Zip::from(&mut squares).and(&forward(u, axis)).for_each(|s, &d| *s += d * d);
        }
        squares.iter().map(|&s| s.sqrt() as f64).sum::<f64>() as f32
    }
}

/// `f − λ Dᵀp`
fn primal(f: ArrayView3<f32>, p: &[Array3<f32>], axes: &[Axis], strength: f32) -> Volume {
    let mut dtp = Array3::zeros(f.raw_dim());
    for (p, &axis) in p.iter().zip(axes) {
        add_adjoint(p.view(), axis, &mut dtp);
    }
    Zip::from(&mut dtp).and(&f).for_each(|d, &f| *d = f - strength * *d);
    dtp
}

/// `p ← p / max(1, |p|)`, with `|·|` taken across components at each voxel
fn project_unit_ball(p: &mut [Array3<f32>]) {
    let Some(first) = p.first() else { return };
    let mut magnitude = Array3::<f32>::zeros(first.raw_dim());
    for component in p.iter() {
        Zip::from(&mut magnitude).and(component).for_each(|m, &c| *m += c * c);
    }
    magnitude.mapv_inplace(|m| m.sqrt().max(1.0));
    for component in p.iter_mut() {
        *component /= &magnitude;
    }
}


// ----- Imports ------------------------------------------------------------------------------------------
use ndarray::{Array3, ArrayView3, Axis, Zip};

use crate::{Volume, image::relative_change};
use super::{Regularizer, differences::{active_axes, add_adjoint, forward}};
