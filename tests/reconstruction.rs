use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::{DMatrix, DVector};
use ndarray::{s, Array2, Array3, ArrayView3};
use pretty_assertions::assert_eq;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rstest::rstest;

use tomoprox::{
    Acceleration, CancelToken, Error, Geometry, Lipschitz, MatrixProjector, Method, Options,
    ParallelProjector, Parameters, Projector, Reconstructor, Roi, Sinogram, Termination, Volume,
    WarmStart, Weights, fom::rmse, half_turn, uniform_angles,
    projector::{Acquired, BufferId, OperatorError},
};

// ----- A small overdetermined problem with a known least-squares solution --------------------------------

/// 512 measurements of an 8×8 image through a random system matrix
struct Random {
    projector: MatrixProjector,
    geometry: Geometry,
    sinogram: Sinogram,
    /// Largest eigenvalue of AᵀA
    lambda_max: f64,
    least_squares: DVector<f64>,
}

fn random_problem(seed: u64) -> Random {
    let geometry = Geometry::parallel(16, 1, uniform_angles(32, half_turn()), 8).unwrap();
    let mut rng = StdRng::seed_from_u64(seed);
    let a = Array2::from_shape_fn((512, 64), |_| rng.gen_range(-1.0_f32..1.0));
    let truth: Vec<f32> = (0..64).map(|_| rng.gen_range(0.0_f32..2.0)).collect();
    let truth = ndarray::Array1::from(truth);
    let b = a.dot(&truth);

    let a64 = DMatrix::<f64>::from_fn(512, 64, |i, j| a[[i, j]] as f64);
    let b64 = DVector::<f64>::from_iterator(512, b.iter().map(|&x| x as f64));
    let lambda_max = (a64.transpose() * &a64).symmetric_eigen().eigenvalues.max();
    let least_squares = a64.svd(true, true).solve(&b64, 1e-12).unwrap();

    Random {
        projector: MatrixProjector::new(a),
        sinogram: b.into_shape(geometry.sinogram_shape()).unwrap(),
        geometry,
        lambda_max,
        least_squares,
    }
}

fn relative_error(x: &Volume, reference: &DVector<f64>) -> f64 {
    let diff: f64 = x.iter().zip(reference.iter()).map(|(&x, &r)| (x as f64 - r).powi(2)).sum();
    diff.sqrt() / reference.norm()
}

#[test]
fn monotone_fista_finds_least_squares_solution() {
    let problem = random_problem(42);
    let options = Options {
        iterations: 200,
        tolerance: 0.0,
        acceleration: Acceleration::Monotone,
        lipschitz: Lipschitz::Known((problem.lambda_max * 1.001) as f32),
        ..Options::default()
    };
    let mut parameters = Parameters::builder()
        .geometry(problem.geometry.clone())
        .sinogram(problem.sinogram.clone())
        .options(options)
        .build().unwrap();

    let (x, diagnostics) = Reconstructor::new(&problem.projector).run(&mut parameters).unwrap();

    let error = relative_error(&x, &problem.least_squares);
    assert!(error <= 1e-3, "relative error {error}");
    assert_eq!(diagnostics.termination, Some(Termination::MaxIterations));
    assert_eq!(diagnostics.iterations, 200);
    assert_eq!(diagnostics.objective.len(), 200);
    assert!(!diagnostics.lipschitz_estimated);
    for pair in diagnostics.objective.windows(2) {
        assert!(pair[1] <= pair[0], "objective increased: {} -> {}", pair[0], pair[1]);
    }
    assert_eq!(problem.projector.pool().outstanding(), 0);
}

#[test]
fn default_options_never_increase_the_objective() {
    let problem = random_problem(42);
    let options = Options { iterations: 200, tolerance: 0.0, ..Options::default() };
    let mut parameters = Parameters::builder()
        .geometry(problem.geometry.clone())
        .sinogram(problem.sinogram.clone())
        .options(options)
        .build().unwrap();

    let (x, diagnostics) = Reconstructor::new(&problem.projector).run(&mut parameters).unwrap();

    assert!(diagnostics.lipschitz_estimated);
    assert_eq!(diagnostics.objective.len(), 200);
    for (k, pair) in diagnostics.objective.windows(2).enumerate() {
        assert!(pair[1] <= pair[0], "objective increased after iteration {}: {} -> {}", k + 1, pair[0], pair[1]);
    }
    let error = relative_error(&x, &problem.least_squares);
    assert!(error <= 1e-3, "relative error {error}");
}

#[test]
fn admm_finds_least_squares_solution() {
    let problem = random_problem(7);
    let options = Options {
        iterations: 50,
        tolerance: 0.0,
        lipschitz: Lipschitz::Known(problem.lambda_max as f32),
        method: Method::Admm { rho: 10.0, inner_iterations: 5 },
        ..Options::default()
    };
    let mut parameters = Parameters::builder()
        .geometry(problem.geometry.clone())
        .sinogram(problem.sinogram.clone())
        .options(options)
        .build().unwrap();

    let (x, diagnostics) = Reconstructor::new(&problem.projector).run(&mut parameters).unwrap();

    let error = relative_error(&x, &problem.least_squares);
    assert!(error <= 1e-3, "relative error {error}");
    assert_eq!(diagnostics.iterations, 50);
    assert_eq!(problem.projector.pool().outstanding(), 0);
}

#[test]
fn estimated_lipschitz_constant_is_cached() {
    let problem = random_problem(3);
    let options = Options { iterations: 3, tolerance: 0.0, ..Options::default() };
    let mut parameters = Parameters::builder()
        .geometry(problem.geometry.clone())
        .sinogram(problem.sinogram.clone())
        .options(options)
        .build().unwrap();

    let (_, first) = Reconstructor::new(&problem.projector).run(&mut parameters).unwrap();
    assert!(first.lipschitz_estimated);
    assert_eq!(parameters.lipschitz(), Lipschitz::Known(first.lipschitz));
    // The power method approaches the largest eigenvalue from below
    let estimate = first.lipschitz as f64;
    assert!(estimate <= problem.lambda_max * 1.0001, "{estimate} vs {}", problem.lambda_max);
    assert!(estimate >= problem.lambda_max * 0.5 , "{estimate} vs {}", problem.lambda_max);

    let issued = problem.projector.pool().issued();
    let (_, second) = Reconstructor::new(&problem.projector).run(&mut parameters).unwrap();
    assert!(!second.lipschitz_estimated);
    assert_eq!(second.lipschitz, first.lipschitz);
    // One forward projection of x0, then one forward and one back per iteration
    assert_eq!(problem.projector.pool().issued() - issued, 1 + 2 * 3);
}

// ----- Larger scans with the parallel-beam projector ---------------------------------------------------

fn disc_scan(size: usize, n_angles: usize) -> (Geometry, Volume, Sinogram, ParallelProjector) {
    let geometry = Geometry::parallel(size, 1, uniform_angles(n_angles, half_turn()), size).unwrap();
    let projector = ParallelProjector::new();
    let c = (size as f32 - 1.0) / 2.0;
    let phantom = Array3::from_shape_fn(geometry.volume_shape(), |(_, r, col)| {
        let (y, x) = (r as f32 - c, col as f32 - c);
        if x*x + y*y < (0.3 * size as f32).powi(2) { 1.0 } else { 0.0 }
    });
    let sinogram = tomoprox::projector::project(&projector, phantom.view(), &geometry).unwrap();
    (geometry, phantom, sinogram, projector)
}

#[test]
fn zero_sinogram_gives_zero_volume() {
    let geometry = Geometry::parallel(64, 64, uniform_angles(180, half_turn()), 64).unwrap();
    let projector = ParallelProjector::new();
    let sinogram = Sinogram::zeros(geometry.sinogram_shape());
    let options = Options { iterations: 10, ..Options::default() };
    let mut parameters = Parameters::builder().geometry(geometry).sinogram(sinogram).options(options).build().unwrap();

    let (x, diagnostics) = Reconstructor::new(&projector).run(&mut parameters).unwrap();

    assert_eq!(x.shape(), &[64, 64, 64]);
    assert!(x.iter().all(|&v| v == 0.0));
    assert!(diagnostics.objective.iter().all(|&f| f == 0.0));
    assert_eq!(diagnostics.termination, Some(Termination::Converged { iteration: 1 }));
    assert_eq!(projector.pool().outstanding(), 0);
}

#[test]
fn weights_of_the_wrong_shape_are_rejected_before_any_projection() {
    let geometry = Geometry::parallel(64, 64, uniform_angles(180, half_turn()), 64).unwrap();
    let projector = ParallelProjector::new();
    let result = Parameters::builder()
        .geometry(geometry.clone())
        .sinogram(Sinogram::zeros(geometry.sinogram_shape()))
        .weights(Weights::ones((64, 180, 63)))
        .build();
    assert!(matches!(result, Err(Error::Configuration(_))), "{result:?}");
    assert_eq!(projector.pool().issued(), 0);
}

#[test]
fn residual_errors_respect_the_region_of_interest() {
    let (geometry, phantom, sinogram, projector) = disc_scan(24, 30);
    let roi = Roi::cylinder(geometry.volume_shape(), (11.5, 11.5), 6.0);
    let options = Options { iterations: 8, tolerance: 0.0, nonnegativity: true, ..Options::default() };

    let run = |roi: Option<Roi>| {
        let mut builder = Parameters::builder()
            .geometry(geometry.clone())
            .sinogram(sinogram.clone())
            .ideal(phantom.clone())
            .options(options.clone());
        if let Some(roi) = roi { builder = builder.roi(roi) }
        let mut parameters = builder.build().unwrap();
        Reconstructor::new(&projector).run(&mut parameters).unwrap()
    };

    let (x_roi  , d_roi  ) = run(Some(roi.clone()));
    let (x_whole, d_whole) = run(None);
    assert_eq!(x_roi, x_whole);
    assert_eq!(d_roi  .residual_error.len(), 8);
    assert_eq!(d_whole.residual_error.len(), 8);
    assert_eq!(d_roi  .residual_error.last().copied(), Some(rmse(x_roi  .view(), phantom.view(), Some(&roi))));
    assert_eq!(d_whole.residual_error.last().copied(), Some(rmse(x_whole.view(), phantom.view(), None)));
    assert_eq!(d_roi.objective, d_whole.objective);
}

#[rstest(/**/ method,
         case(Method::Fista),
         case(Method::Admm { rho: 50.0, inner_iterations: 3 }),
)]
fn nonnegativity_holds_at_every_checkpoint(method: Method) {
    let (geometry, _, mut sinogram, projector) = disc_scan(20, 24);
    // Dark stripe which pulls unconstrained solutions below zero
    sinogram.slice_mut(s![.., .., 2..5]).fill(-3.0);
    let options = Options {
        iterations: 12,
        tolerance: 0.0,
        nonnegativity: true,
        method,
        warm_start: Some(WarmStart { iterations: 3 }),
        ..Options::default()
    };
    let mut parameters = Parameters::builder().geometry(geometry).sinogram(sinogram).options(options).build().unwrap();

    let mut checkpoints = 0;
    let result = Reconstructor::new(&projector)
        .on_iteration(|report| {
            checkpoints += 1;
            assert_eq!(report.iteration, checkpoints);
            let min = report.estimate.iter().copied().fold(f32::INFINITY, f32::min);
            assert!(min >= 0.0, "negative voxel {min} at iteration {}", report.iteration);
        })
        .run(&mut parameters);

    let (x, diagnostics) = result.unwrap();
    assert_eq!(checkpoints, 12);
    assert_eq!(diagnostics.iterations, 12);
    assert!(x.iter().all(|&v| v >= 0.0));
    assert_eq!(projector.pool().outstanding(), 0);
}

#[test]
fn cancellation_stops_at_the_next_iteration() {
    let (geometry, _, sinogram, projector) = disc_scan(16, 20);
    let options = Options { iterations: 50, tolerance: 0.0, ..Options::default() };
    let mut parameters = Parameters::builder().geometry(geometry).sinogram(sinogram).options(options).build().unwrap();

    let token = CancelToken::new();
    let trigger = token.clone();
    let result = Reconstructor::new(&projector)
        .with_cancel(token)
        .on_iteration(move |report| if report.iteration == 3 { trigger.cancel() })
        .run(&mut parameters);

    match result {
        Err(Error::Reconstruction { iteration, diagnostics, source, .. }) => {
            assert_eq!(iteration, 4);
            assert_eq!(diagnostics.iterations, 3);
            assert!(matches!(*source, Error::Cancelled));
        }
        other => panic!("expected cancellation, got {other:?}"),
    }
    assert_eq!(projector.pool().outstanding(), 0);
}

// ----- Misbehaving projectors --------------------------------------------------------------------------

/// Wraps a projector, sabotaging forward projections from the `from`-th call
/// onwards (counting from 1).
struct Sabotaged<P> {
    inner: P,
    forward_calls: AtomicUsize,
    from: usize,
    fault: Fault,
}

#[derive(Clone, Copy)]
enum Fault { Nan, Fail }

impl<P: Projector> Sabotaged<P> {
    fn new(inner: P, from: usize, fault: Fault) -> Self {
        Self { inner, forward_calls: AtomicUsize::new(0), from, fault }
    }
}

impl<P: Projector> Projector for Sabotaged<P> {
    fn forward(&self, volume: ArrayView3<f32>, geometry: &Geometry) -> Result<Acquired<Sinogram>, OperatorError> {
        let call = self.forward_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call < self.from { return self.inner.forward(volume, geometry) }
        match self.fault {
            Fault::Fail => Err(OperatorError::Failed { operation: "forward projection", message: "device lost".into() }),
            Fault::Nan  => {
                let mut acquired = self.inner.forward(volume, geometry)?;
                acquired.data.fill(f32::NAN);
                Ok(acquired)
            }
        }
    }
    fn backward(&self, sinogram: ArrayView3<f32>, geometry: &Geometry) -> Result<Acquired<Volume>, OperatorError> {
        self.inner.backward(sinogram, geometry)
    }
    fn release(&self, id: BufferId) { self.inner.release(id) }
}

fn known_lipschitz_parameters(problem: &Random, acceleration: Acceleration) -> Parameters {
    let options = Options {
        iterations: 10,
        tolerance: 0.0,
        acceleration,
        lipschitz: Lipschitz::Known(problem.lambda_max as f32 * 1.01),
        ..Options::default()
    };
    Parameters::builder()
        .geometry(problem.geometry.clone())
        .sinogram(problem.sinogram.clone())
        .options(options)
        .build().unwrap()
}

#[rstest(/**/ acceleration,
         case(Acceleration::Standard),
         case(Acceleration::Monotone),
)]
fn nan_projection_aborts_with_progress(acceleration: Acceleration) {
    let problem = random_problem(11);
    let mut parameters = known_lipschitz_parameters(&problem, acceleration);
    // Call 1 projects the starting volume; call n + 1 belongs to iteration n
    let projector = Sabotaged::new(problem.projector, 3, Fault::Nan);

    let result = Reconstructor::new(&projector).run(&mut parameters);

    match result {
        Err(e @ Error::Reconstruction { .. }) => {
            assert!(matches!(e.root_cause(), Error::NumericalDegeneracy(_)), "{e}");
            let Error::Reconstruction { iteration, last_objective, diagnostics, .. } = e else { unreachable!() };
            assert_eq!(iteration, 2);
            assert_eq!(diagnostics.objective.len(), 1);
            assert_eq!(last_objective, diagnostics.objective.last().copied());
        }
        other => panic!("expected a reconstruction error, got {other:?}"),
    }
    assert_eq!(projector.inner.pool().outstanding(), 0);
}

#[test]
fn operator_failure_releases_every_buffer() {
    let problem = random_problem(5);
    let mut parameters = known_lipschitz_parameters(&problem, Acceleration::Standard);
    let projector = Sabotaged::new(problem.projector, 5, Fault::Fail);

    let result = Reconstructor::new(&projector).run(&mut parameters);

    match result {
        Err(e @ Error::Reconstruction { iteration: 4, .. }) =>
            assert!(matches!(e.root_cause(), Error::Operator(OperatorError::Failed { .. })), "{e}"),
        other => panic!("expected failure in iteration 4, got {other:?}"),
    }
    assert_eq!(projector.inner.pool().outstanding(), 0);
    assert!(projector.inner.pool().issued() > 0);
}

#[test]
fn failure_while_projecting_the_start_is_reported_at_iteration_zero() {
    let problem = random_problem(5);
    let mut parameters = known_lipschitz_parameters(&problem, Acceleration::Standard);
    let projector = Sabotaged::new(problem.projector, 1, Fault::Fail);

    let result = Reconstructor::new(&projector).run(&mut parameters);

    assert!(matches!(result, Err(Error::Reconstruction { iteration: 0, last_objective: None, .. })), "{result:?}");
    assert_eq!(projector.inner.pool().outstanding(), 0);
}
