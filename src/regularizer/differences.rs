//! Forward differences with a zero last element, and their adjoint.

/// Axes along which the volume has more than one voxel. Differences along
/// the others vanish identically.
pub(super) fn active_axes(shape: &[usize]) -> Vec<Axis> {
    shape.iter().enumerate().filter(|(_, &n)| n > 1).map(|(a, _)| Axis(a)).collect()
}

/// `d[i] = u[i+1] − u[i]`, `d[n−1] = 0`
pub(super) fn forward(u: ArrayView3<f32>, axis: Axis) -> Array3<f32> {
    let n = u.len_of(axis);
    let mut d = Array3::zeros(u.raw_dim());
    if n > 1 {
        let head = u.slice_axis(axis, Slice::from(..n - 1));
        let tail = u.slice_axis(axis, Slice::from(1..));
        Zip::from(d.slice_axis_mut(axis, Slice::from(..n - 1)))
            .and(&tail)
            .and(&head)
            .for_each(|d, &t, &h| *d = t - h);
    }
    d
}

/// `out += Dᵀ p`, where `D` is `forward` along `axis`
pub(super) fn add_adjoint(p: ArrayView3<f32>, axis: Axis, out: &mut Array3<f32>) {
    let n = p.len_of(axis);
    if n < 2 { return }
    let head = p.slice_axis(axis, Slice::from(..n - 1));
    out.slice_axis_mut(axis, Slice::from(..n - 1)).zip_mut_with(&head, |o, &p| *o -= p);
    out.slice_axis_mut(axis, Slice::from(1..    )).zip_mut_with(&head, |o, &p| *o += p);
}

/// `Σ_a D_aᵀ D_a u`: minus the discrete Laplacian, with reflecting boundaries.
pub(super) fn negative_laplacian(u: ArrayView3<f32>, axes: &[Axis]) -> Array3<f32> {
    let mut out = Array3::zeros(u.raw_dim());
    for &axis in axes {
        add_adjoint(forward(u, axis).view(), axis, &mut out);
    }
    out
}


// ----- Imports ------------------------------------------------------------------------------------------
use ndarray::{Array3, ArrayView3, Axis, Slice, Zip};
