//! Installation of the global `tracing` subscriber.
//!
//! The library only emits events; binaries decide whether and how they are
//! shown. The filter comes from `RUST_LOG`, defaulting to `info`.

static INITIALISED: OnceLock<()> = OnceLock::new();

/// Install a formatting subscriber. Later calls do nothing, and neither does
/// the first if some other subscriber has already been set globally.
pub fn init_tracing() {
    INITIALISED.get_or_init(|| {
        let ansi = std::io::stderr().is_terminal();
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_ansi(ansi);
        let _ = Registry::default().with(filter).with(fmt_layer).try_init();
    });
}


// ----- Imports ------------------------------------------------------------------------------------------
use std::io::IsTerminal;
use std::sync::OnceLock;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};
