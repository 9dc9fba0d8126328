pub use geometry::{Beam, Geometry, GeometryError, Shape, uniform_angles, half_turn};

pub use units::todo::{Intensityf32, Weightf32, Attenuationf32};

/// Reconstructed object, indexed (slice, row, column)
pub type Volume   = ndarray::Array3<Attenuationf32>;
/// Projection data, indexed (detector row, angle, detector column)
pub type Sinogram = ndarray::Array3<Intensityf32>;
/// Per-measurement statistical weights: same shape as the `Sinogram`
pub type Weights  = ndarray::Array3<Weightf32>;

pub use crate::error::{Error, Result};
pub use crate::parameters::{Parameters, ParametersBuilder};
pub use crate::config::{Options, Lipschitz, Method, Acceleration, WarmStart, Ring, RegularizerConfig, RegularizerKind};
pub use crate::projector::{Projector, OperatorError, ParallelProjector, MatrixProjector};
pub use crate::regularizer::{Regularizer, Regularization};
pub use crate::recon::{Reconstructor, Diagnostics, Termination, IterationReport, CancelToken};
pub use crate::fom::Roi;
