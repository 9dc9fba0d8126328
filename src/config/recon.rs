//! Reconstruction options, as read from a TOML configuration file
//!
//! Every field is optional in the file; missing ones take the defaults shown
//! below. Unknown fields are rejected, so that a misspelt option cannot be
//! silently ignored.
//!
//! ```toml
//! iterations = 40
//! lipschitz = 2.5e4          # omit to estimate with the power method
//! tolerance = 1e-8
//! nonnegativity = true
//! acceleration = "monotone"  # default; or "standard"
//! seed = 42
//!
//! warm_start = { iterations = 20 }
//!
//! method = { kind = "admm", rho = 2000.0, inner_iterations = 3 }
//!
//! [regularizer]
//! kind = "fgp-tv"            # "none", "fgp-tv" or "llt"
//! strength = 0.003
//! iterations = 250
//! tolerance = 1e-4
//!
//! [ring]
//! strength = 0.0             # > 0 switches ring removal on
//! alpha = 1.0
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::{Error, Result};

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Options {

    /// Maximum number of outer iterations
    #[serde(default = "default_iterations")]
    pub iterations: usize,

    /// Step-size scale of the gradient step
    #[serde(default)]
    pub lipschitz: Lipschitz,

    /// Stop when the relative change of the iterate falls below this. Zero
    /// disables early stopping.
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,

    /// Clip negative voxels after every iteration
    #[serde(default)]
    pub nonnegativity: bool,

    /// Start from a SIRT reconstruction rather than from zeros
    #[serde(default)]
    pub warm_start: Option<WarmStart>,

    #[serde(default)]
    pub method: Method,

    #[serde(default)]
    pub acceleration: Acceleration,

    #[serde(default)]
    pub regularizer: RegularizerConfig,

    #[serde(default)]
    pub ring: Ring,

    /// Seed of the random start vector of the power method
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            iterations   : default_iterations(),
            lipschitz    : Lipschitz::default(),
            tolerance    : default_tolerance(),
            nonnegativity: false,
            warm_start   : None,
            method       : Method::default(),
            acceleration : Acceleration::default(),
            regularizer  : RegularizerConfig::default(),
            ring         : Ring::default(),
            seed         : default_seed(),
        }
    }
}

/// Lipschitz constant of the gradient of the data term
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(from = "Option<f32>")]
pub enum Lipschitz {
    /// Estimate with the power method before the first iteration
    #[default]
    Compute,
    /// Supplied by the user, or estimated by an earlier run
    Known(f32),
}

impl From<Option<f32>> for Lipschitz {
    fn from(value: Option<f32>) -> Self { value.map_or(Self::Compute, Self::Known) }
}

impl Lipschitz {
    pub fn known(self) -> Option<f32> {
        match self { Self::Known(l) => Some(l), Self::Compute => None }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WarmStart {
    /// Number of SIRT iterations
    #[serde(default = "default_sirt_iterations")]
    pub iterations: usize,
}

impl Default for WarmStart {
    fn default() -> Self { Self { iterations: default_sirt_iterations() } }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Default)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Method {
    /// Proximal gradient with momentum
    #[default]
    Fista,
    /// Alternating direction method of multipliers
    Admm {
        /// Augmented-Lagrangian penalty
        rho: f32,
        /// Conjugate-gradient iterations per x-update
        #[serde(default = "default_inner_iterations")]
        inner_iterations: usize,
    },
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Acceleration {
    /// Beck-Teboulle FISTA. The objective may oscillate.
    Standard,
    /// Never accept a step which increases the objective; restart the
    /// momentum instead
    #[default]
    Monotone,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RegularizerKind {
    #[default]
    None,
    /// Total variation, fast gradient projection
    FgpTv,
    /// Higher-order (Laplacian) smoothness
    Llt,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RegularizerConfig {

    #[serde(default)]
    pub kind: RegularizerKind,

    /// Regularization parameter λ. Zero switches the proximal step off.
    #[serde(default)]
    pub strength: f32,

    /// Iteration budget of each proximal sub-solve
    #[serde(default = "default_regularizer_iterations")]
    pub iterations: usize,

    /// Relative-change tolerance of each proximal sub-solve
    #[serde(default = "default_regularizer_tolerance")]
    pub tolerance: f32,

    /// Smoothing of |Δu| (LLT only)
    #[serde(default = "default_epsilon")]
    pub epsilon: f32,

    /// Time step (LLT only). Chosen for stability when absent.
    #[serde(default)]
    pub tau: Option<f32>,
}

impl Default for RegularizerConfig {
    fn default() -> Self {
        Self {
            kind      : RegularizerKind::None,
            strength  : 0.0,
            iterations: default_regularizer_iterations(),
            tolerance : default_regularizer_tolerance(),
            epsilon   : default_epsilon(),
            tau       : None,
        }
    }
}

/// L1 ring-artifact removal
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Ring {
    /// Soft-threshold of the detector offsets. Zero disables ring removal.
    #[serde(default)]
    pub strength: f32,
    /// Scale of the offsets subtracted from the data; larger values can
    /// speed up convergence, at the expense of stability.
    #[serde(default = "default_ring_alpha")]
    pub alpha: f32,
}

impl Default for Ring {
    fn default() -> Self { Self { strength: 0.0, alpha: default_ring_alpha() } }
}

fn default_iterations            () -> usize { 40 }
fn default_tolerance             () -> f32   { 1e-8 }
fn default_seed                  () -> u64   { 0x5eed }
fn default_sirt_iterations       () -> usize { 20 }
fn default_inner_iterations      () -> usize { 3 }
fn default_regularizer_iterations() -> usize { 25 }
fn default_regularizer_tolerance () -> f32   { 1e-4 }
fn default_epsilon               () -> f32   { 1e-2 }
fn default_ring_alpha            () -> f32   { 1.0 }

pub fn read_config_file(path: impl AsRef<Path>) -> Result<Options> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("couldn't read config file `{}`: {e}", path.display())))?;
    Ok(toml::from_str(&text)?)
}
