pub mod recon;

pub use recon::{
    Options, Lipschitz, Method, Acceleration, WarmStart, Ring, RegularizerConfig, RegularizerKind,
    read_config_file,
};
