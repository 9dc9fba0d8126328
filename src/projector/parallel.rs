//! Pixel-driven parallel-beam projector.
//!
//! Each pixel centre is projected onto the detector and its value is shared
//! between the two nearest detector bins by linear interpolation. The back
//! projection gathers with exactly the same weights, so it is the exact
//! transpose of the forward projection: the property the gradient step and
//! the power method rely on. Detector rows are independent, and are processed
//! in parallel.

/// Reference parallel-beam projector working in host memory. Reentrant.
#[derive(Debug)]
pub struct ParallelProjector {
    pool: BufferPool,
    /// Detector bin width in units of the voxel width
    detector_spacing: f32,
}

impl Default for ParallelProjector {
    fn default() -> Self { Self::new() }
}

impl ParallelProjector {

    pub fn new() -> Self { Self { pool: BufferPool::default(), detector_spacing: 1.0 } }

    pub fn with_detector_spacing(detector_spacing: f32) -> Self {
        Self { detector_spacing, ..Self::new() }
    }

    pub fn pool(&self) -> &BufferPool { &self.pool }

    /// Precomputed per-angle projection of the pixel grid onto the detector.
    fn footprint(&self, geometry: &Geometry) -> Result<Footprint, OperatorError> {
        if !matches!(geometry.beam(), Beam::Parallel) {
            return Err(OperatorError::Unsupported("ParallelProjector needs a parallel beam".into()));
        }
        if !(self.detector_spacing.is_finite() && self.detector_spacing > 0.0) {
            return Err(OperatorError::Unsupported(format!("detector spacing {}", self.detector_spacing)));
        }
        let directions = geometry.angles().iter()
            .map(|&a| { let a = radian_(a); (a.cos() / self.detector_spacing, a.sin() / self.detector_spacing) })
            .collect();
        Ok(Footprint {
            directions,
            grid_centre: (geometry.object_size() as f32 - 1.0) / 2.0,
            detector_centre: (geometry.detectors_h() as f32 - 1.0) / 2.0,
            n_detectors: geometry.detectors_h(),
        })
    }
}

struct Footprint {
    directions: Vec<(f32, f32)>,
    grid_centre: f32,
    detector_centre: f32,
    n_detectors: usize,
}

impl Footprint {
    /// Detector bins hit by pixel `(row, col)` at angle `a`, with their
    /// interpolation weights. Bins falling off the detector are `None`.
    #[inline]
    fn bins(&self, a: usize, row: usize, col: usize) -> [Option<(usize, f32)>; 2] {
        let (cos, sin) = self.directions[a];
        let x = col as f32 - self.grid_centre;
        let y = self.grid_centre - row as f32;
        let u = x * cos + y * sin + self.detector_centre;
        let lower = u.floor();
        let frac = u - lower;
        let bin = |i: f32, w: f32| {
            (i >= 0.0 && (i as usize) < self.n_detectors && w > 0.0).then_some((i as usize, w))
        };
        [bin(lower, 1.0 - frac), bin(lower + 1.0, frac)]
    }
}

impl Projector for ParallelProjector {

    fn forward(&self, volume: ArrayView3<f32>, geometry: &Geometry) -> Result<Acquired<Sinogram>, OperatorError> {
        check_input("forward projection", geometry.volume_shape(), volume.shape())?;
        let footprint = self.footprint(geometry)?;
        let mut sinogram = Sinogram::zeros(geometry.sinogram_shape());

        Zip::from(sinogram.outer_iter_mut())
            .and(volume.outer_iter())
            .par_for_each(|mut sino_slice, image| {
                for a in 0..footprint.directions.len() {
                    let mut bins = sino_slice.row_mut(a);
                    for ((row, col), &value) in image.indexed_iter() {
                        if value == 0.0 { continue }
                        for (i, w) in footprint.bins(a, row, col).into_iter().flatten() {
                            bins[i] += w * value;
                        }
                    }
                }
            });

        Ok(self.pool.acquire(sinogram))
    }

    fn backward(&self, sinogram: ArrayView3<f32>, geometry: &Geometry) -> Result<Acquired<Volume>, OperatorError> {
        check_input("back projection", geometry.sinogram_shape(), sinogram.shape())?;
        let footprint = self.footprint(geometry)?;
        let mut volume = Volume::zeros(geometry.volume_shape());

        Zip::from(volume.outer_iter_mut())
            .and(sinogram.outer_iter())
            .par_for_each(|mut image, sino_slice| {
                for ((row, col), voxel) in image.indexed_iter_mut() {
                    let mut sum = 0.0;
                    for a in 0..footprint.directions.len() {
                        for (i, w) in footprint.bins(a, row, col).into_iter().flatten() {
                            sum += w * sino_slice[[a, i]];
                        }
                    }
                    *voxel = sum;
                }
            });

        Ok(self.pool.acquire(volume))
    }

    fn release(&self, id: BufferId) { self.pool.release(id) }
}


// ----- Imports ------------------------------------------------------------------------------------------
use ndarray::{ArrayView3, Zip};

use units::radian_;

use crate::{Beam, Geometry, Sinogram, Volume};
use super::{Acquired, BufferId, BufferPool, OperatorError, Projector, check_input};
