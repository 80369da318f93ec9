//! `mediacloud` command-line tool
//!
//! Runs catalog migrations (`import`, `regenerate`, `unlink`) against a
//! catalog database and lets a second invocation observe (`status`) or stop
//! (`cancel`) a running batch. Logs go to stderr; progress lines and
//! summaries go to stdout.

mod cli;
mod commands;

use clap::Parser;
use cli::Args;
use core_runtime::logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let logging = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::from_verbosity(args.verbosity))
        .with_spans(args.verbosity > 1);
    if let Err(e) = init_logging(logging) {
        eprintln!("warning: logging disabled: {}", e);
    }

    match commands::execute(args).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
