//! intake - debounce, aggregate and dispatch customer messages.

use clap::Parser;
use std::process::ExitCode;

use intake::cli::Commands;
use intake::logging;

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging; the guard flushes the file appender on exit
    let _guard = match logging::init() {
        Ok((guard, _log_dir)) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let args = Commands::parse();

    match args.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
