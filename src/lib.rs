mod exports;
pub use exports::*;

pub mod error;
pub mod config;
pub mod parameters;
pub mod projector;
pub mod lipschitz;
pub mod regularizer;
pub mod ring;
pub mod sirt;
pub mod fista;
pub mod admm;
pub mod recon;
pub mod fom;
pub mod image;
pub mod logging;
