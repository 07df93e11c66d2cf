//! Logging shim.
//!
//! Built with `--features tracing`, the crate logs through the `tracing`
//! macros. Without the feature every macro below swallows its arguments and
//! nothing is compiled in.

/// Installs a global subscriber with thread names and uptime timestamps.
///
/// The filter comes from `RUST_LOG`, falling back to `strand=trace`. Calling
/// this twice is harmless; the second install is ignored.
#[cfg(feature = "tracing")]
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("strand=trace"));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .try_init();
}

/// No-op without the `tracing` feature.
#[cfg(not(feature = "tracing"))]
pub const fn init_tracing() {}

#[cfg(feature = "tracing")]
pub(crate) use tracing::{debug, error, info, trace, warn};

#[cfg(not(feature = "tracing"))]
macro_rules! discard {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub(crate) use discard as debug;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as error;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as info;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as trace;
#[cfg(not(feature = "tracing"))]
pub(crate) use discard as warn;
