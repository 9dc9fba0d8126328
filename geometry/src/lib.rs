//! Acquisition geometry of a tomographic scan.
//!
//! A [`Geometry`] fixes the shapes of everything else in a reconstruction:
//! the sinogram is `[detectors_v, n_angles, detectors_h]` and the volume is
//! `[slices, N, N]`. It is immutable once constructed, so the shapes cannot
//! drift while a reconstruction is running.

mod angles;

pub use angles::{uniform_angles, half_turn};

use units::{Angle, Length, radian_, mm_};

/// Shape of a 3-dimensional array, outermost axis first.
pub type Shape = [usize; 3];

/// How the rays of a single projection relate to each other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Beam {
    /// All rays of one projection are parallel. Detector rows see disjoint
    /// slices of the object, so the system decouples slice by slice.
    Parallel,
    /// Divergent (cone) beam from a point source. Detector rows mix slices.
    Cone {
        source_origin  : Length,
        origin_detector: Length,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Geometry {
    detectors_h: usize,
    detectors_v: usize,
    angles     : Vec<Angle>,
    object_size: usize,
    beam       : Beam,
}

impl Geometry {

    /// Parallel-beam geometry. The volume has one slice per detector row.
    pub fn parallel(
        detectors_h: usize,
        detectors_v: usize,
        angles     : Vec<Angle>,
        object_size: usize,
    ) -> Result<Self, GeometryError> {
        Self::new(detectors_h, detectors_v, angles, object_size, Beam::Parallel)
    }

    /// Cone-beam geometry. The volume is a cube of `object_size` voxels.
    pub fn cone(
        detectors_h    : usize,
        detectors_v    : usize,
        angles         : Vec<Angle>,
        object_size    : usize,
        source_origin  : Length,
        origin_detector: Length,
    ) -> Result<Self, GeometryError> {
        for (name, distance) in [("source-origin", source_origin), ("origin-detector", origin_detector)] {
            let d = mm_(distance);
            if !(d.is_finite() && d > 0.0) {
                return Err(GeometryError::Distance(name, d));
            }
        }
        Self::new(detectors_h, detectors_v, angles, object_size, Beam::Cone { source_origin, origin_detector })
    }

    fn new(
        detectors_h: usize,
        detectors_v: usize,
        angles     : Vec<Angle>,
        object_size: usize,
        beam       : Beam,
    ) -> Result<Self, GeometryError> {
        if detectors_h == 0 { return Err(GeometryError::Empty("horizontal detector count")) }
        if detectors_v == 0 { return Err(GeometryError::Empty("vertical detector count")) }
        if object_size == 0 { return Err(GeometryError::Empty("object size")) }
        if angles.is_empty() { return Err(GeometryError::Empty("angle list")) }
        if let Some((index, &angle)) = angles.iter().enumerate().find(|(_, a)| !radian_(**a).is_finite()) {
            return Err(GeometryError::Angle { index, value: radian_(angle) })
        }
        Ok(Self { detectors_h, detectors_v, angles, object_size, beam })
    }

    pub fn detectors_h(&self) -> usize   { self.detectors_h }
    pub fn detectors_v(&self) -> usize   { self.detectors_v }
    pub fn object_size(&self) -> usize   { self.object_size }
    pub fn angles     (&self) -> &[Angle] { &self.angles }
    pub fn n_angles   (&self) -> usize   { self.angles.len() }
    pub fn beam       (&self) -> Beam    { self.beam }

    /// Can the forward/back projections be computed one detector row at a
    /// time?
    pub fn is_separable(&self) -> bool { matches!(self.beam, Beam::Parallel) }

    /// `[detectors_v, n_angles, detectors_h]`
    pub fn sinogram_shape(&self) -> Shape {
        [self.detectors_v, self.angles.len(), self.detectors_h]
    }

    /// `[slices, N, N]`
    pub fn volume_shape(&self) -> Shape {
        let n = self.object_size;
        match self.beam {
            Beam::Parallel  => [self.detectors_v, n, n],
            Beam::Cone {..} => [n, n, n],
        }
    }

    /// The same geometry reduced to a single detector row (and hence a single
    /// volume slice). Only meaningful for separable geometries: `None` for
    /// cone beams.
    pub fn single_slice(&self) -> Option<Self> {
        match self.beam {
            Beam::Parallel  => Some(Self { detectors_v: 1, ..self.clone() }),
            Beam::Cone {..} => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("{0} must be non-zero")]
    Empty(&'static str),
    #[error("angle {index} is not finite: {value}")]
    Angle { index: usize, value: f32 },
    #[error("{0} distance must be positive and finite, got {1} mm")]
    Distance(&'static str, f32),
}
