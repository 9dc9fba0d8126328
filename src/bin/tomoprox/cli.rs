// ----------------------------------- CLI -----------------------------------
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "tomoprox", about = "Reconstruct a simulated parallel-beam scan of a disc phantom")]
pub struct Cli {

    /// Reconstruction options (TOML). Command-line flags take precedence.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Maximum number of iterations [default: from config, or 40]
    #[arg(short, long)]
    pub iterations: Option<usize>,

    /// Phantom size: N x N voxels per slice
    #[arg(short = 'n', long, default_value = "64")]
    pub size: usize,

    /// Number of slices (detector rows)
    #[arg(long, default_value = "1")]
    pub slices: usize,

    /// Number of projection angles over half a turn
    #[arg(short, long, default_value = "90")]
    pub angles: usize,

    /// Standard deviation of Gaussian noise added to the sinogram
    #[arg(long, default_value = "0")]
    pub noise: f32,

    /// Seed of the noise generator
    #[arg(long, default_value = "1")]
    pub seed: u64,

    /// Clip negative voxels
    #[arg(long)]
    pub nonnegativity: bool,

    /// Write diagnostics (TOML) to this file
    #[arg(short, long)]
    pub diagnostics: Option<PathBuf>,

    /// Maximum number of rayon threads
    #[arg(short = 'j', long, default_value = "4")]
    pub threads: usize,
}
// --------------------------------------------------------------------------------

impl Cli {
    /// Apply the command-line overrides to options read from a file.
    pub fn override_options(&self, options: &mut tomoprox::Options) {
        if let Some(iterations) = self.iterations { options.iterations = iterations }
        if self.nonnegativity { options.nonnegativity = true }
    }
}
