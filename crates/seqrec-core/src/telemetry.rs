//! Progress reporting shared by the seqrec crates.
//!
//! With the `telemetry` feature, messages are emitted as `tracing` events
//! and filtering is left to the subscriber. Without it, progress goes to
//! stderr only when the caller asked for verbose output; warnings always do.

use std::fmt::Arguments;

#[cfg(feature = "telemetry")]
pub fn progress(_verbose: bool, args: Arguments<'_>) {
    tracing::info!("{}", args);
}

#[cfg(not(feature = "telemetry"))]
pub fn progress(verbose: bool, args: Arguments<'_>) {
    if verbose {
        eprintln!("{args}");
    }
}

#[cfg(feature = "telemetry")]
pub fn warning(args: Arguments<'_>) {
    tracing::warn!("{}", args);
}

#[cfg(not(feature = "telemetry"))]
pub fn warning(args: Arguments<'_>) {
    eprintln!("warning: {args}");
}

/// `progress!(verbose, "Iteration {}", i)`
#[macro_export]
macro_rules! progress {
    ($verbose:expr, $($arg:tt)+) => {
        $crate::telemetry::progress($verbose, format_args!($($arg)+))
    };
}

/// `warning!("Policy did not converge within {} iterations", n)`
#[macro_export]
macro_rules! warning {
    ($($arg:tt)+) => {
        $crate::telemetry::warning(format_args!($($arg)+))
    };
}
