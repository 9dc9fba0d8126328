//! The reconstruction driver: Lipschitz constant, starting volume, iteration
//! loop and bookkeeping, shared by all the proximal-splitting solvers.
//!
//! ```no_run
//! # use tomoprox::*;
//! # fn demo(geometry: Geometry, sinogram: Sinogram) -> Result<()> {
//! let projector = ParallelProjector::new();
//! let mut parameters = Parameters::builder()
//!     .geometry(geometry)
//!     .sinogram(sinogram)
//!     .build()?;
//! let (volume, diagnostics) = Reconstructor::new(&projector).run(&mut parameters)?;
//! # Ok(()) }
//! ```

/// Shared flag with which another thread can stop a running reconstruction.
/// Checked once at the start of every iteration.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self { Self::default() }
    pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst) }
    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

/// Why the iteration loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum Termination {
    /// Relative change fell below the tolerance
    Converged { iteration: usize },
    MaxIterations,
}

/// Record of a run, returned alongside the volume or attached to the error
/// which ended the run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub lipschitz: f32,
    /// Whether `lipschitz` was estimated in this run
    pub lipschitz_estimated: bool,
    /// One value per completed iteration
    pub objective: Vec<f32>,
    /// RMSE against the reference image, one value per completed iteration.
    /// Empty when no reference was supplied.
    pub residual_error: Vec<f32>,
    /// Number of completed iterations
    pub iterations: usize,
    pub termination: Option<Termination>,
}

/// What the progress observer sees after every iteration
#[derive(Debug)]
pub struct IterationReport<'a> {
    /// Starting at 1
    pub iteration: usize,
    pub objective: f32,
    pub change: f32,
    pub residual_error: Option<f32>,
    pub estimate: ArrayView3<'a, f32>,
}

type Observer<'p> = Box<dyn FnMut(&IterationReport<'_>) + 'p>;

pub struct Reconstructor<'p, P: Projector + ?Sized> {
    projector: &'p P,
    cancel: Option<CancelToken>,
    observer: Option<Observer<'p>>,
}

impl<'p, P: Projector + ?Sized> Reconstructor<'p, P> {

    pub fn new(projector: &'p P) -> Self { Self { projector, cancel: None, observer: None } }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Call `observer` after every completed iteration.
    pub fn on_iteration(mut self, observer: impl FnMut(&IterationReport<'_>) + 'p) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Reconstruct the volume described by `parameters`.
    ///
    /// `parameters` is only modified to cache an estimated Lipschitz
    /// constant. Errors raised before the first iteration (estimation, warm
    /// start) are returned as they are; errors in the loop are wrapped in
    /// `Error::Reconstruction`.
    pub fn run(&mut self, parameters: &mut Parameters) -> Result<(Volume, Diagnostics)> {
        let options = parameters.options().clone();

        // -------- Step size ---------------------------------------------------
        let (lipschitz, estimated) = match parameters.lipschitz() {
            Lipschitz::Known(l) => (l, false),
            Lipschitz::Compute => {
                let l = lipschitz::estimate(self.projector, parameters.geometry(), parameters.weights(), options.seed)?;
                parameters.cache_lipschitz(l)?;
                (l, true)
            }
        };
        info!(lipschitz, estimated, method = ?options.method, iterations = options.iterations, "starting reconstruction");

        // -------- Starting point ----------------------------------------------
        let parameters: &Parameters = parameters;
        let geometry = parameters.geometry();
        let x0 = match options.warm_start {
            Some(WarmStart { iterations }) => sirt::reconstruct(
                self.projector, geometry, parameters.sinogram().view(), iterations, options.nonnegativity,
            )?,
            None => Volume::zeros(geometry.volume_shape()),
        };

        let mut progress = Progress {
            diagnostics: Diagnostics { lipschitz, lipschitz_estimated: estimated, ..Diagnostics::default() },
            observer: self.observer.as_deref_mut(),
            reference: parameters.ideal().map(|ideal| (ideal, parameters.roi())),
            tolerance: options.tolerance,
        };

        // -------- Iterate -----------------------------------------------------
        let cancel = self.cancel.as_ref();
        let result = match options.method {
            Method::Fista => {
                let solver = Fista::new(self.projector, parameters, lipschitz, x0).map_err(|e| progress.fail(0, e))?;
                drive(solver, &mut progress, cancel, options.iterations)
            }
            Method::Admm { rho, inner_iterations } => {
                let solver = Admm::new(self.projector, parameters, rho, inner_iterations, x0).map_err(|e| progress.fail(0, e))?;
                drive(solver, &mut progress, cancel, options.iterations)
            }
        };

        let (volume, termination) = result?;
        let mut diagnostics = progress.diagnostics;
        diagnostics.termination = Some(termination);
        info!(?termination, iterations = diagnostics.iterations, objective = ?diagnostics.objective.last(), "reconstruction finished");
        Ok((volume, diagnostics))
    }
}

// ----- The iteration loop ------------------------------------------------------------------------------

/// One proximal-splitting algorithm
pub(crate) trait Solver {
    /// Perform one iteration
    fn step(&mut self, iteration: usize) -> Result<Step>;
    /// Current iterate, as seen by observers
    fn estimate(&self) -> ArrayView3<'_, f32>;
    fn into_estimate(self) -> Volume;
}

/// Outcome of one iteration
#[derive(Debug, Clone, Copy)]
pub(crate) struct Step {
    pub objective: f32,
    /// Relative change of the candidate with respect to the previous iterate
    pub change: f32,
}

fn drive<S: Solver>(mut solver: S, progress: &mut Progress<'_, '_>, cancel: Option<&CancelToken>, max_iterations: usize) -> Result<(Volume, Termination)> {
    for iteration in 1..=max_iterations {
        if cancel.map_or(false, CancelToken::is_cancelled) {
            return Err(progress.fail(iteration, Error::Cancelled));
        }
        let step = solver.step(iteration).map_err(|e| progress.fail(iteration, e))?;
        let converged = progress.record(iteration, solver.estimate(), step).map_err(|e| progress.fail(iteration, e))?;
        if converged {
            return Ok((solver.into_estimate(), Termination::Converged { iteration }));
        }
    }
    Ok((solver.into_estimate(), Termination::MaxIterations))
}

/// Bookkeeping of a run: diagnostics, residual errors and observer
struct Progress<'a, 'o> {
    diagnostics: Diagnostics,
    observer: Option<&'a mut (dyn FnMut(&IterationReport<'_>) + 'o)>,
    reference: Option<(&'a Volume, Option<&'a Roi>)>,
    tolerance: f32,
}

impl Progress<'_, '_> {

    /// Record a completed iteration. Returns whether the run has converged.
    fn record(&mut self, iteration: usize, estimate: ArrayView3<f32>, step: Step) -> Result<bool> {
        let Step { objective, change } = step;
        if !objective.is_finite() {
            return Err(Error::degenerate(format!("objective is {objective}")));
        }
        let residual_error = self.reference.map(|(ideal, roi)| rmse(estimate, ideal.view(), roi));

        self.diagnostics.objective.push(objective);
        self.diagnostics.residual_error.extend(residual_error);
        self.diagnostics.iterations = iteration;
        debug!(iteration, objective, change, ?residual_error, "iteration");

        if let Some(observer) = self.observer.as_deref_mut() {
            observer(&IterationReport { iteration, objective, change, residual_error, estimate });
        }
        Ok(change < self.tolerance)
    }

    /// Wrap `source` with the progress made so far.
    fn fail(&self, iteration: usize, source: Error) -> Error {
        let last_objective = self.diagnostics.objective.last().copied();
        warn!(iteration, ?last_objective, %source, "reconstruction aborted");
        Error::Reconstruction {
            iteration,
            last_objective,
            diagnostics: Box::new(self.diagnostics.clone()),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};
    use pretty_assertions::assert_eq;
    use crate::{Geometry, Options, uniform_angles, half_turn, projector::MatrixProjector};

    /// Solver which halves its estimate, and fails on request
    struct Halving { x: Volume, fail_at: Option<usize> }

    impl Solver for Halving {
        fn step(&mut self, iteration: usize) -> Result<Step> {
            if Some(iteration) == self.fail_at { return Err(Error::degenerate("NaN")) }
            self.x /= 2.0;
            Ok(Step { objective: self.x.sum(), change: 1.0 / iteration as f32 })
        }
        fn estimate(&self) -> ArrayView3<'_, f32> { self.x.view() }
        fn into_estimate(self) -> Volume { self.x }
    }

    fn progress<'a>(tolerance: f32, reference: Option<(&'a Volume, Option<&'a Roi>)>) -> Progress<'a, 'static> {
        Progress { diagnostics: Diagnostics::default(), observer: None, reference, tolerance }
    }

    #[test]
    fn runs_to_maximum() {
        let mut p = progress(0.0, None);
        let solver = Halving { x: Volume::from_elem((1, 2, 2), 8.0), fail_at: None };
        let (x, termination) = drive(solver, &mut p, None, 3).unwrap();
        assert_eq!(termination, Termination::MaxIterations);
        assert_eq!(x, Volume::from_elem((1, 2, 2), 1.0));
        assert_eq!(p.diagnostics.objective, vec![16.0, 8.0, 4.0]);
        assert_eq!(p.diagnostics.iterations, 3);
        assert!(p.diagnostics.residual_error.is_empty());
    }

    #[test]
    fn stops_when_converged() {
        let mut p = progress(0.3, None);
        let solver = Halving { x: Volume::ones((1, 1, 1)), fail_at: None };
        let (_, termination) = drive(solver, &mut p, None, 10).unwrap();
        // changes 1, 1/2, 1/3, 1/4 < 0.3
        assert_eq!(termination, Termination::Converged { iteration: 4 });
    }

    #[test]
    fn failure_carries_progress() {
        let reference = Volume::zeros((1, 1, 2));
        let mut p = progress(0.0, Some((&reference, None)));
        let solver = Halving { x: Volume::from_elem((1, 1, 2), 4.0), fail_at: Some(3) };
        match drive(solver, &mut p, None, 10) {
            Err(Error::Reconstruction { iteration, last_objective, diagnostics, source }) => {
                assert_eq!(iteration, 3);
                assert_eq!(last_objective, Some(2.0));
                assert_eq!(diagnostics.iterations, 2);
                assert_eq!(diagnostics.residual_error, vec![2.0, 1.0]);
                assert!(matches!(*source, Error::NumericalDegeneracy(_)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn cancellation_is_checked_before_each_iteration() {
        let token = CancelToken::new();
        token.cancel();
        let mut p = progress(0.0, None);
        let solver = Halving { x: Volume::ones((1, 1, 1)), fail_at: None };
        let e = drive(solver, &mut p, Some(&token), 10).unwrap_err();
        assert!(matches!(e.root_cause(), Error::Cancelled));
        assert!(p.diagnostics.objective.is_empty());
    }

    #[test]
    fn non_finite_objective_aborts() {
        let mut p = progress(0.0, None);
        let solver = Halving { x: Volume::from_elem((1, 1, 1), f32::INFINITY), fail_at: None };
        let e = drive(solver, &mut p, None, 10).unwrap_err();
        assert!(matches!(e, Error::Reconstruction { iteration: 1, last_objective: None, .. }));
    }

    #[test]
    fn observer_sees_every_iteration() {
        let g = Geometry::parallel(4, 1, uniform_angles(1, half_turn()), 2).unwrap();
        let p = MatrixProjector::new(Array2::eye(4));
        let b = Array3::from_elem(g.sinogram_shape(), 1.0);
        let options = Options { iterations: 5, tolerance: 0.0, lipschitz: Lipschitz::Known(1.0), ..Options::default() };
        let mut parameters = Parameters::builder().geometry(g).sinogram(b).options(options).build().unwrap();

        let mut seen = vec![];
        let (x, diagnostics) = Reconstructor::new(&p)
            .on_iteration(|r| seen.push((r.iteration, r.objective)))
            .run(&mut parameters)
            .unwrap();
        assert_eq!(seen.iter().map(|(i, _)| *i).collect::<Vec<_>>(), vec![1, 2, 3, 4, 5]);
        assert_eq!(seen.iter().map(|(_, o)| *o).collect::<Vec<_>>(), diagnostics.objective);
        // Identity operator with step 1/L = 1: exact after one iteration
        assert_eq!(x, Volume::ones(x.raw_dim()));
        assert!(!diagnostics.lipschitz_estimated);
        assert_eq!(diagnostics.termination, Some(Termination::MaxIterations));
    }

    #[test]
    fn estimated_lipschitz_is_cached() {
        let g = Geometry::parallel(4, 1, uniform_angles(1, half_turn()), 2).unwrap();
        let p = MatrixProjector::new(Array2::eye(4) * 3.0);
        let b = Array3::from_elem(g.sinogram_shape(), 3.0);
        let mut parameters = Parameters::builder().geometry(g).sinogram(b).build().unwrap();

        let (_, first) = Reconstructor::new(&p).run(&mut parameters).unwrap();
        assert!(first.lipschitz_estimated);
        assert_eq!(parameters.lipschitz(), Lipschitz::Known(first.lipschitz));

        let issued = p.pool().issued();
        let (_, second) = Reconstructor::new(&p).run(&mut parameters).unwrap();
        assert!(!second.lipschitz_estimated);
        assert_eq!(second.lipschitz, first.lipschitz);
        assert_eq!(p.pool().outstanding(), 0);
        assert!(p.pool().issued() > issued);
    }

    #[test]
    fn diagnostics_serialize_to_toml() {
        let diagnostics = Diagnostics {
            lipschitz: 2.0,
            lipschitz_estimated: true,
            objective: vec![3.0, 1.5],
            residual_error: vec![],
            iterations: 2,
            termination: Some(Termination::Converged { iteration: 2 }),
        };
        let text = toml::to_string(&diagnostics).unwrap();
        assert!(text.contains("lipschitz_estimated = true"));
        assert!(text.contains("reason = \"converged\""));
    }
}

// ----- Imports ------------------------------------------------------------------------------------------
use std::sync::{Arc, atomic::{AtomicBool, Ordering}};

use ndarray::ArrayView3;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    Error, Result, Volume, Parameters, Lipschitz, Method, WarmStart,
    lipschitz, sirt,
    admm::Admm,
    fista::Fista,
    fom::{Roi, rmse},
    projector::Projector,
};
