//! Figures of merit: residual error of a reconstruction against a known
//! reference image, optionally restricted to a region of interest.

/// Set of voxel indices over which residual errors are measured
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Roi(Vec<[usize; 3]>);

impl Roi {

    pub fn new(indices: Vec<[usize; 3]>) -> Self { Self(indices) }

    /// Voxels where `mask` is true
    pub fn from_mask(mask: ArrayView3<bool>) -> Self {
        Self(mask.indexed_iter()
             .filter_map(|((s, r, c), &inside)| inside.then_some([s, r, c]))
             .collect())
    }

    /// Voxels where the reference image is strictly positive: the support of
    /// the object.
    pub fn positive(reference: ArrayView3<f32>) -> Self {
        Self::from_mask(reference.map(|&x| x > 0.0).view())
    }

    /// Voxels whose centre lies strictly inside a cylinder parallel to the
    /// slice axis. `centre` is (row, column), in voxel units.
    pub fn cylinder(shape: Shape, centre: (f32, f32), radius: f32) -> Self {
        let (cr, cc) = centre;
        let mask = Array3::from_shape_fn(shape, |(_, r, c)| {
            let (y, x) = (r as f32 - cr, c as f32 - cc);
            y*y + x*x < radius * radius
        });
        Self::from_mask(mask.view())
    }

    pub fn indices(&self) -> &[[usize; 3]] { &self.0 }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Whether every index is inside a volume of the given shape
    pub fn fits(&self, shape: Shape) -> bool {
        self.0.iter().all(|i| i.iter().zip(shape).all(|(&i, n)| i < n))
    }
}

/// Root-mean-square difference between `volume` and `reference`, over `roi`
/// when given, over every voxel otherwise.
pub fn rmse(volume: ArrayView3<f32>, reference: ArrayView3<f32>, roi: Option<&Roi>) -> f32 {
    let square = |a: f32, b: f32| { let d = (a - b) as f64; d * d };
    let (sum, n) = match roi {
        Some(roi) => (
            roi.indices().iter().map(|&i| square(volume[i], reference[i])).sum::<f64>(),
            roi.len(),
        ),
        None => (
            volume.iter().zip(reference.iter()).map(|(&a, &b)| square(a, b)).sum::<f64>(),
            volume.len(),
        ),
    };
    if n == 0 { return 0.0 }
    (sum / n as f64).sqrt() as f32
}


// ----- Imports ------------------------------------------------------------------------------------------
use ndarray::{Array3, ArrayView3};

use crate::Shape;
