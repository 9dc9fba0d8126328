//! Elementwise helpers on volumes and sinograms.
//!
//! Reductions accumulate in `f64`: a 64³ volume has enough elements for `f32`
//! sums to lose the digits the convergence test relies on.

use ndarray::{Array, ArrayBase, ArrayView, Data, Dimension, Zip, ArrayView3, Array3};

/// Euclidean norm
pub fn norm<S, D>(a: &ArrayBase<S, D>) -> f32
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    a.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt() as f32
}

/// `‖a − b‖`
pub fn distance(a: ArrayView3<f32>, b: ArrayView3<f32>) -> f32 {
    let mut sum = 0.0_f64;
    Zip::from(&a).and(&b).for_each(|&a, &b| { let d = (a - b) as f64; sum += d * d; });
    sum.sqrt() as f32
}

/// `‖new − old‖ / ‖new‖`, with no change at all between two all-zero arrays
/// counting as zero rather than `NaN`.
pub fn relative_change(new: ArrayView3<f32>, old: ArrayView3<f32>) -> f32 {
    let diff = distance(new.view(), old.view());
    let size = norm(&new);
    if size > 0.0      { diff / size }
    else if diff == 0.0 { 0.0 }
    else                { f32::INFINITY }
}

pub fn all_finite<S, D>(a: &ArrayBase<S, D>) -> bool
where
    S: Data<Elem = f32>,
    D: Dimension,
{
    a.iter().all(|x| x.is_finite())
}

/// Nonnegativity projection
pub fn clip_negative(a: &mut Array3<f32>) {
    a.mapv_inplace(|x| x.max(0.0));
}

/// `w ⊙ (projection − data)`
pub fn weighted_residual(projection: ArrayView3<f32>, data: ArrayView3<f32>, weights: ArrayView3<f32>) -> Array3<f32> {
    Zip::from(&projection).and(&data).and(&weights)
        .map_collect(|&p, &d, &w| w * (p - d))
}

/// `½ Σ w (projection − data)²`: the weighted least-squares data term.
pub fn data_fidelity(projection: ArrayView3<f32>, data: ArrayView3<f32>, weights: ArrayView3<f32>) -> f32 {
    let mut sum = 0.0_f64;
    Zip::from(&projection).and(&data).and(&weights).for_each(|&p, &d, &w| {
        let r = (p - d) as f64;
        sum += w as f64 * r * r;
    });
    (0.5 * sum) as f32
}

/// `x + β (x − x_prev)`, for volumes and ring offsets alike
pub fn extrapolate<D: Dimension>(x: ArrayView<f32, D>, x_prev: ArrayView<f32, D>, beta: f32) -> Array<f32, D> {
    Zip::from(&x).and(&x_prev).map_collect(|&x, &p| x + beta * (x - p))
}
