//! Tracing setup for the `wayfinder` binary
//!
//! `RUST_LOG` wins when set. Otherwise the default filter shows wayfinder
//! crates at info (debug with `--verbose`) and everything else at warn.

use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Default filter directive for the given verbosity
#[must_use]
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "wayfinder=debug,wayfinder_core=debug,wayfinder_persistence=debug,wayfinder_engine=debug,info"
    } else {
        "wayfinder=info,wayfinder_core=info,wayfinder_persistence=info,wayfinder_engine=info,warn"
    }
}

/// Install the global subscriber
///
/// `json` switches to one JSON object per line for log shipping.
///
/// # Errors
/// A global subscriber is already installed
pub fn init_tracing(verbose: bool, json: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbose)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .try_init()?;
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(verbose)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .compact(),
            )
            .try_init()?;
    }
    Ok(())
}
