//! Simulate a parallel-beam scan of a disc phantom and reconstruct it.

mod cli;
mod phantom;

use cli::Cli;

fn main() -> Result<(), Box<dyn Error>> {
    let args = Cli::parse();
    tomoprox::logging::init_tracing();

    rayon::ThreadPoolBuilder::new().num_threads(args.threads).build_global()?;

    // --- Options: file, then command line --------------------------------------------
    let mut options = match &args.config {
        Some(path) => read_config_file(path)?,
        None       => Options::default(),
    };
    args.override_options(&mut options);

    let mut now = Instant::now();
    let mut report_time = |message: &str| {
        println!("{}: {} ms", message, group_digits(now.elapsed().as_millis()));
        now = Instant::now();
    };

    // --- Simulate the acquisition ----------------------------------------------------
    let angles = uniform_angles(args.angles, half_turn());
    let geometry = Geometry::parallel(args.size, args.slices, angles, args.size)?;
    let projector = ParallelProjector::new();
    let phantom = phantom::discs(geometry.volume_shape());
    let mut sinogram = project(&projector, phantom.view(), &geometry)?;
    if args.noise > 0.0 {
        let noise = Normal::new(0.0, args.noise)?;
        let mut rng = StdRng::seed_from_u64(args.seed);
        sinogram.mapv_inplace(|b| b + noise.sample(&mut rng));
    }
    report_time("Simulated acquisition");

    let roi = Roi::positive(phantom.view());
    let mut parameters = Parameters::builder()
        .geometry(geometry)
        .sinogram(sinogram)
        .ideal(phantom)
        .roi(roi)
        .options(options)
        .build()?;

    // --- Reconstruct -----------------------------------------------------------------
    let progress = ProgressBar::new(parameters.options().iterations as u64);
    progress.set_style(ProgressStyle::default_bar()
                       .template("[{elapsed_precise}] {wide_bar} {pos}/{len} {msg}")?);
    let (volume, diagnostics) = Reconstructor::new(&projector)
        .on_iteration(|report| {
            progress.set_position(report.iteration as u64);
            progress.set_message(match report.residual_error {
                Some(rmse) => format!("objective {:.4e}  rmse {:.4}", report.objective, rmse),
                None       => format!("objective {:.4e}", report.objective),
            });
        })
        .run(&mut parameters)?;
    progress.finish();
    report_time("Reconstructed");

    // --- Summary ---------------------------------------------------------------------
    let (min, max) = volume.iter().fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &x| (lo.min(x), hi.max(x)));
    println!("Lipschitz constant: {:.4e} ({})", diagnostics.lipschitz,
             if diagnostics.lipschitz_estimated { "estimated" } else { "supplied" });
    println!("Stopped after {} iterations: {:?}", diagnostics.iterations, diagnostics.termination);
    println!("Voxel range: [{min:.3}, {max:.3}]");
    println!("RMSE every 10 iterations: {}",
             diagnostics.residual_error.iter().step_by(10).map(|e| format!("{e:.4}")).join(" "));

    if let Some(path) = &args.diagnostics {
        fs::write(path, toml::to_string(&diagnostics)?)?;
        println!("Wrote diagnostics to {}", path.display());
    }
    Ok(())
}

/// Group numeric digits to facilitate reading long numbers
fn group_digits<F: std::fmt::Display>(n: F) -> String {
    separate(n, Locale::English)
}

// ----- Imports ------------------------------------------------------------------------------------------
use std::error::Error;
use std::fs;
use std::time::Instant;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use itertools::Itertools;
use numsep::{separate, Locale};
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, Normal};

use tomoprox::{
    Geometry, Options, Parameters, ParallelProjector, Reconstructor, Roi,
    config::read_config_file,
    projector::project,
    uniform_angles, half_turn,
};
