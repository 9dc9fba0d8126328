//! The validated input of a reconstruction.
//!
//! Everything is checked once, in `ParametersBuilder::build`, before any
//! projector is touched. After that the only thing that may change is the
//! Lipschitz constant, which is cached after its first estimation.

#[derive(Debug, Clone)]
pub struct Parameters {
    geometry: Geometry,
    sinogram: Sinogram,
    weights: Weights,
    ideal: Option<Volume>,
    roi: Option<Roi>,
    regularization: Option<Regularization>,
    options: Options,
}

impl Parameters {

    pub fn builder() -> ParametersBuilder { ParametersBuilder::default() }

    pub fn geometry      (&self) -> &Geometry               { &self.geometry }
    pub fn sinogram      (&self) -> &Sinogram               { &self.sinogram }
    pub fn weights       (&self) -> &Weights                { &self.weights }
    pub fn ideal         (&self) -> Option<&Volume>         { self.ideal.as_ref() }
    pub fn roi           (&self) -> Option<&Roi>            { self.roi.as_ref() }
    pub fn regularization(&self) -> Option<&Regularization> { self.regularization.as_ref() }
    pub fn options       (&self) -> &Options                { &self.options }

    pub fn lipschitz(&self) -> Lipschitz { self.options.lipschitz }

    /// Remember an estimated Lipschitz constant, so that later runs with the
    /// same parameters skip the estimation.
    pub fn cache_lipschitz(&mut self, value: f32) -> Result<()> {
        check_lipschitz(value)?;
        self.options.lipschitz = Lipschitz::Known(value);
        Ok(())
    }

    /// The regularization in effect: `None` when absent or of zero strength.
    pub(crate) fn active_regularization(&self) -> Option<&Regularization> {
        self.regularization.as_ref().filter(|r| r.is_active())
    }
}

/// Collects the inputs of a reconstruction. Only geometry and sinogram are
/// required.
#[derive(Debug, Default)]
pub struct ParametersBuilder {
    geometry: Option<Geometry>,
    sinogram: Option<Sinogram>,
    weights: Option<Weights>,
    ideal: Option<Volume>,
    roi: Option<Roi>,
    regularization: Option<Regularization>,
    options: Options,
}

impl ParametersBuilder {

    pub fn geometry(mut self, geometry: Geometry) -> Self { self.geometry = Some(geometry); self }
    pub fn sinogram(mut self, sinogram: Sinogram) -> Self { self.sinogram = Some(sinogram); self }
    /// Defaults to all ones
    pub fn weights (mut self, weights : Weights ) -> Self { self.weights  = Some(weights ); self }
    /// Reference image against which residual errors are reported
    pub fn ideal   (mut self, ideal   : Volume  ) -> Self { self.ideal    = Some(ideal   ); self }
    /// Restricts residual errors to a subset of voxels. Needs `ideal`.
    pub fn roi     (mut self, roi     : Roi     ) -> Self { self.roi      = Some(roi     ); self }
    pub fn options (mut self, options : Options ) -> Self { self.options  = options;       self }

    /// Use this regularizer instead of the one described by
    /// `options.regularizer`.
    pub fn regularization(mut self, regularization: Regularization) -> Self {
        self.regularization = Some(regularization);
        self
    }

    pub fn build(self) -> Result<Parameters> {
        let Self { geometry, sinogram, weights, ideal, roi, regularization, options } = self;

        let geometry = geometry.ok_or_else(|| Error::config("missing geometry"))?;
        let sinogram = sinogram.ok_or_else(|| Error::config("missing sinogram"))?;

        let expected = geometry.sinogram_shape();
        if sinogram.shape() != &expected[..] {
            return Err(Error::config(format!(
                "sinogram shape {:?} does not match geometry {:?}", sinogram.shape(), expected
            )));
        }
        if !all_finite(&sinogram) {
            return Err(Error::config("sinogram contains non-finite values"));
        }

        let weights = match weights {
            None => Weights::ones(expected),
            Some(w) => {
                if w.shape() != sinogram.shape() {
                    return Err(Error::config(format!(
                        "weights shape {:?} does not match sinogram shape {:?}", w.shape(), sinogram.shape()
                    )));
                }
                if !w.iter().all(|&x| x.is_finite() && x >= 0.0) {
                    return Err(Error::config("weights must be finite and non-negative"));
                }
                w
            }
        };

        let volume_shape = geometry.volume_shape();
        if let Some(ideal) = &ideal {
            if ideal.shape() != &volume_shape[..] {
                return Err(Error::config(format!(
                    "reference image shape {:?} does not match volume {:?}", ideal.shape(), volume_shape
                )));
            }
        }
        if let Some(roi) = &roi {
            if ideal.is_none()         { return Err(Error::config("region of interest given without a reference image")) }
            if roi.is_empty()          { return Err(Error::config("empty region of interest")) }
            if !roi.fits(volume_shape) { return Err(Error::config(format!("region of interest exceeds volume {volume_shape:?}"))) }
        }

        validate(&options)?;
        let regularization = match regularization {
            Some(r) => { validate_regularization(r.strength, r.iterations, r.tolerance)?; Some(r) }
            None => Regularization::from_config(&options.regularizer),
        };

        Ok(Parameters { geometry, sinogram, weights, ideal, roi, regularization, options })
    }
}

fn check_lipschitz(value: f32) -> Result<()> {
    if value.is_finite() && value > 0.0 { Ok(()) }
    else { Err(Error::config(format!("Lipschitz constant must be positive and finite, got {value}"))) }
}

fn validate_regularization(strength: f32, iterations: usize, tolerance: f32) -> Result<()> {
    if !(strength.is_finite() && strength >= 0.0) {
        return Err(Error::config(format!("regularization strength must be non-negative, got {strength}")));
    }
    if iterations == 0 { return Err(Error::config("regularizer needs at least one iteration")) }
    if !(tolerance >= 0.0) { return Err(Error::config(format!("regularizer tolerance {tolerance}"))) }
    Ok(())
}

fn validate(options: &Options) -> Result<()> {
    let Options { iterations, lipschitz, tolerance, warm_start, method, regularizer, ring, .. } = options;
    if *iterations == 0 { return Err(Error::config("iteration count must be positive")) }
    if let Some(l) = lipschitz.known() { check_lipschitz(l)? }
    if !(*tolerance >= 0.0) { return Err(Error::config(format!("tolerance must be non-negative, got {tolerance}"))) }
    if let Some(WarmStart { iterations: 0 }) = warm_start {
        return Err(Error::config("warm start needs at least one iteration"));
    }
    validate_regularization(regularizer.strength, regularizer.iterations, regularizer.tolerance)?;
    if regularizer.kind == RegularizerKind::Llt {
        if !(regularizer.epsilon > 0.0) { return Err(Error::config("LLT epsilon must be positive")) }
        if let Some(tau) = regularizer.tau {
            if !(tau > 0.0 && tau.is_finite()) { return Err(Error::config(format!("LLT time step {tau}"))) }
        }
    }
    if !(ring.strength.is_finite() && ring.strength >= 0.0) {
        return Err(Error::config(format!("ring strength must be non-negative, got {}", ring.strength)));
    }
    if !ring.alpha.is_finite() { return Err(Error::config("ring alpha must be finite")) }
    if let Method::Admm { rho, inner_iterations } = *method {
        if !(rho.is_finite() && rho > 0.0) { return Err(Error::config(format!("ADMM rho must be positive, got {rho}"))) }
        if inner_iterations == 0 { return Err(Error::config("ADMM needs at least one inner iteration")) }
        if ring.strength > 0.0 { return Err(Error::config("ring correction is not available with ADMM")) }
    }
    Ok(())
}


// ----- Imports ------------------------------------------------------------------------------------------
use crate::{
    Error, Result,
    Geometry, Sinogram, Volume, Weights,
    Options, Lipschitz, Method, RegularizerKind, WarmStart,
    Regularization, Roi,
    image::all_finite,
};
