//! Projection by an explicit, dense system matrix.
//!
//! Row `i` of the matrix is sinogram element `i` and column `j` is voxel `j`,
//! both in standard (row-major) order. Only practical for toy problems, where
//! it makes the exact least-squares solution available for comparison.

#[derive(Debug)]
pub struct MatrixProjector {
    matrix: Array2<f32>,
    pool: BufferPool,
}

impl MatrixProjector {

    pub fn new(matrix: Array2<f32>) -> Self { Self { matrix, pool: BufferPool::default() } }

    pub fn matrix(&self) -> &Array2<f32> { &self.matrix }

    pub fn pool(&self) -> &BufferPool { &self.pool }

    fn check_geometry(&self, geometry: &Geometry) -> Result<(), OperatorError> {
        let rows: usize = geometry.sinogram_shape().iter().product();
        let cols: usize = geometry.volume_shape  ().iter().product();
        if self.matrix.dim() == (rows, cols) { return Ok(()) }
        Err(OperatorError::Unsupported(format!(
            "system matrix is {:?}, geometry needs ({rows}, {cols})", self.matrix.dim()
        )))
    }
}

impl Projector for MatrixProjector {

    fn forward(&self, volume: ArrayView3<f32>, geometry: &Geometry) -> Result<Acquired<Sinogram>, OperatorError> {
        check_input("forward projection", geometry.volume_shape(), volume.shape())?;
        self.check_geometry(geometry)?;
        let x: Array1<f32> = volume.iter().copied().collect();
        let y = self.matrix.dot(&x);
        let sinogram = y.into_shape(geometry.sinogram_shape()).map_err(|e| OperatorError::Failed {
            operation: "forward projection",
            message: e.to_string(),
        })?;
        Ok(self.pool.acquire(sinogram))
    }

    fn backward(&self, sinogram: ArrayView3<f32>, geometry: &Geometry) -> Result<Acquired<Volume>, OperatorError> {
        check_input("back projection", geometry.sinogram_shape(), sinogram.shape())?;
        self.check_geometry(geometry)?;
        let y: Array1<f32> = sinogram.iter().copied().collect();
        let x = self.matrix.t().dot(&y);
        let volume = x.into_shape(geometry.volume_shape()).map_err(|e| OperatorError::Failed {
            operation: "back projection",
            message: e.to_string(),
        })?;
        Ok(self.pool.acquire(volume))
    }

    fn release(&self, id: BufferId) { self.pool.release(id) }
}


// ----- Imports ------------------------------------------------------------------------------------------
use ndarray::{Array1, Array2, ArrayView3};

use crate::{Geometry, Sinogram, Volume};
use super::{Acquired, BufferId, BufferPool, OperatorError, Projector, check_input};
