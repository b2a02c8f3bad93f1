//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout only carries command output. `RUST_LOG`
//! takes precedence over the `--verbose` default.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    })
}

/// Install the global subscriber. Call once, at startup.
pub fn init(verbose: bool, format: LogFormat) {
    let registry = tracing_subscriber::registry().with(filter(verbose));

    match format {
        LogFormat::Text => registry
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
    }
}
