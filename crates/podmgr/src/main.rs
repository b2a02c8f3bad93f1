//! `podmgr` binary.
//!
//! Run `podmgr --help` for usage information.

// CLI binaries legitimately need println! for user output
#![allow(clippy::disallowed_macros)]

use std::process::ExitCode;

use clap::Parser;
use podmgr::cli::{self, Cli};
use podmgr::{telemetry, PodmgrError};

#[tokio::main]
async fn main() -> ExitCode {
    // clap exits with 2 on usage errors; this tool reports every failure as 1.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    telemetry::init(cli.verbose, cli.log_format);

    match cli::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if e
                .downcast_ref::<PodmgrError>()
                .is_some_and(PodmgrError::is_retryable)
            {
                eprintln!("This failure is transient; re-running the command is safe.");
            }
            ExitCode::FAILURE
        }
    }
}
