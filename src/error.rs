//! Failure taxonomy of a reconstruction.

use thiserror::Error;

use crate::{GeometryError, projector::OperatorError, recon::Diagnostics};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid parameter. Raised before any projector call.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Forward or back projection failed, or returned the wrong shape.
    #[error(transparent)]
    Operator(#[from] OperatorError),

    /// Zero or non-finite norm, or non-finite values in an iterate.
    #[error("numerical degeneracy: {0}")]
    NumericalDegeneracy(String),

    /// Terminal failure inside the iteration loop. Carries the progress made
    /// up to the failure; the iterate itself is discarded.
    #[error("reconstruction aborted at iteration {iteration}: {source}")]
    Reconstruction {
        iteration: usize,
        last_objective: Option<f32>,
        diagnostics: Box<Diagnostics>,
        #[source]
        source: Box<Error>,
    },

    /// A `CancelToken` was triggered.
    #[error("reconstruction cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn config(message: impl Into<String>) -> Self { Self::Configuration(message.into()) }
    pub(crate) fn degenerate(message: impl Into<String>) -> Self { Self::NumericalDegeneracy(message.into()) }

    /// The innermost cause, looking through `Reconstruction` wrappers.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Reconstruction { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<GeometryError> for Error {
    fn from(e: GeometryError) -> Self { Self::Configuration(e.to_string()) }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self { Self::Configuration(e.to_string()) }
}
