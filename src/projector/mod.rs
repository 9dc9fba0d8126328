//! The boundary between the reconstruction algorithms and whatever actually
//! computes forward and back projections.
//!
//! A `Projector` is typically a GPU library: every call allocates a buffer on
//! the device which stays alive until it is explicitly released. The pool of
//! device memory is shared between runs, so a leaked buffer is a real problem
//! for the *next* reconstruction. The algorithms therefore never call the
//! `Projector` methods directly, but go through
//!
//! + `project`
//!
//! + `back_project`
//!
//! which wrap each result in a `Lease`, releasing the buffer when the lease
//! goes out of scope, whichever way that happens.
//!
//! Two reference implementations are provided: `ParallelProjector` and
//! `MatrixProjector`. Neither is meant to compete with a real projection
//! library; they exist so that the algorithms can be exercised without one.

mod parallel;
mod matrix;

pub use parallel::ParallelProjector;
pub use matrix::MatrixProjector;

/// Identifies a buffer owned by a `Projector`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

/// Result of a projector call: the data together with the handle of the
/// projector-side buffer that holds it.
#[derive(Debug)]
pub struct Acquired<T> {
    pub id: BufferId,
    pub data: T,
}

/// Forward projection `A` and its adjoint `A*`.
///
/// Implementations may be called from several threads only if they say so:
/// the reconstruction itself is single-threaded and places no such demand.
pub trait Projector {

    /// Volume → sinogram
    fn forward(&self, volume: ArrayView3<f32>, geometry: &Geometry) -> Result<Acquired<Sinogram>, OperatorError>;

    /// Sinogram → volume. Must be the adjoint of `forward`.
    fn backward(&self, sinogram: ArrayView3<f32>, geometry: &Geometry) -> Result<Acquired<Volume>, OperatorError>;

    /// Give a buffer back to the projector.
    fn release(&self, id: BufferId);
}

impl<P: Projector + ?Sized> Projector for &P {
    fn forward(&self, volume: ArrayView3<f32>, geometry: &Geometry) -> Result<Acquired<Sinogram>, OperatorError> {
        (**self).forward(volume, geometry)
    }
    fn backward(&self, sinogram: ArrayView3<f32>, geometry: &Geometry) -> Result<Acquired<Volume>, OperatorError> {
        (**self).backward(sinogram, geometry)
    }
    fn release(&self, id: BufferId) { (**self).release(id) }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum OperatorError {
    #[error("{operation} returned shape {actual:?}, expected {expected:?}")]
    Shape { operation: &'static str, expected: Shape, actual: Vec<usize> },

    #[error("{operation} failed: {message}")]
    Failed { operation: &'static str, message: String },

    #[error("projector does not support this geometry: {0}")]
    Unsupported(String),
}

// ----- Scoped buffers ----------------------------------------------------------------------------------

/// Releases a projector buffer when dropped, whichever way the scope holding
/// it is left.
pub struct Lease<'p, P: Projector + ?Sized> {
    projector: &'p P,
    id: BufferId,
}

impl<'p, P: Projector + ?Sized> Lease<'p, P> {
    /// Split `acquired` into its data and a lease on its buffer.
    pub fn new<T>(projector: &'p P, acquired: Acquired<T>) -> (Self, T) {
        let Acquired { id, data } = acquired;
        (Self { projector, id }, data)
    }
}

impl<P: Projector + ?Sized> Drop for Lease<'_, P> {
    fn drop(&mut self) {
        self.projector.release(self.id);
    }
}

/// Forward project `volume`, checking the result against `geometry`.
pub fn project<P: Projector + ?Sized>(projector: &P, volume: ArrayView3<f32>, geometry: &Geometry) -> Result<Sinogram, OperatorError> {
    let (_lease, sinogram) = Lease::new(projector, projector.forward(volume, geometry)?);
    check_shape("forward projection", geometry.sinogram_shape(), sinogram.shape())?;
    Ok(sinogram)
}

/// Back project `sinogram`, checking the result against `geometry`.
pub fn back_project<P: Projector + ?Sized>(projector: &P, sinogram: ArrayView3<f32>, geometry: &Geometry) -> Result<Volume, OperatorError> {
    let (_lease, volume) = Lease::new(projector, projector.backward(sinogram, geometry)?);
    check_shape("back projection", geometry.volume_shape(), volume.shape())?;
    Ok(volume)
}

fn check_shape(operation: &'static str, expected: Shape, actual: &[usize]) -> Result<(), OperatorError> {
    if actual == &expected[..] { Ok(()) }
    else { Err(OperatorError::Shape { operation, expected, actual: actual.to_vec() }) }
}

/// Shape check for projector inputs, for use by implementations.
pub(crate) fn check_input(operation: &'static str, expected: Shape, actual: &[usize]) -> Result<(), OperatorError> {
    if actual == &expected[..] { Ok(()) }
    else {
        Err(OperatorError::Failed {
            operation,
            message: format!("input has shape {actual:?}, geometry requires {expected:?}"),
        })
    }
}

// ----- Buffer bookkeeping for the in-process projectors ------------------------------------------------

/// Hands out buffer ids and counts how many are outstanding. The bundled
/// projectors keep their data in host memory, so releasing only updates the
/// count; it is there so that tests can verify that nothing leaks.
#[derive(Debug, Default)]
pub struct BufferPool {
    next: AtomicU64,
    live: AtomicUsize,
}

impl BufferPool {
    pub fn acquire<T>(&self, data: T) -> Acquired<T> {
        let id = BufferId(self.next.fetch_add(1, Ordering::Relaxed));
        self.live.fetch_add(1, Ordering::SeqCst);
        Acquired { id, data }
    }

    pub fn release(&self, _id: BufferId) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    /// Number of buffers handed out and not yet released
    pub fn outstanding(&self) -> usize { self.live.load(Ordering::SeqCst) }

    /// Total number of buffers ever handed out
    pub fn issued(&self) -> u64 { self.next.load(Ordering::Relaxed) }
}


// ----- Imports ------------------------------------------------------------------------------------------
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use ndarray::ArrayView3;

use crate::{Geometry, Shape, Sinogram, Volume};
