//! Worker process for `SubprocVecEnv`.
//!
//! Reads one environment bootstrap line from stdin, then serves protocol
//! commands on stdin/stdout until told to close. Logs go to stderr.

use std::process::ExitCode;

use clap::Parser;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(version, about = "Serve one atc-gym environment over stdin/stdout", long_about = None)]
struct Cli {
    /// Maximum level of the log lines written to stderr.
    #[arg(long, default_value_t = Level::WARN)]
    log_level: Level,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(cli.log_level)
        .with_target(false)
        .init();

    if let Err(e) = atc_gym::register_builtin() {
        tracing::error!("failed to register environments: {e}");
        return ExitCode::FAILURE;
    }
    match atc_gym::vector::run_stdio() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(pid = std::process::id(), "worker terminated: {e}");
            ExitCode::FAILURE
        }
    }
}
