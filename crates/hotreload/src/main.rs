//! Hotreload CLI - live reload development server.
//!
//! Provides commands for:
//! - `serve`: Serve a directory and reload browsers on file changes

mod commands;
mod error;
mod output;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::ServeArgs;
use error::CliError;
use output::Output;

/// Hotreload - live reload development server.
#[derive(Parser)]
#[command(name = "hotreload", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a directory with live reload.
    Serve(ServeArgs),
}

fn main() {
    let cli = Cli::parse();
    let output = Output::new();

    let verbose = matches!(&cli.command, Commands::Serve(args) if args.verbose);
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, std::env::var("RUST_LOG").ok()))
        .init();

    let result = match cli.command {
        Commands::Serve(args) => run_async(args.execute()),
    };

    if let Err(err) = result {
        output.error(&format!("Error: {err}"));
        std::process::exit(1);
    }
}

/// Log filter: `info` with --verbose, otherwise `RUST_LOG`, falling back to `warn`.
fn log_filter(verbose: bool, rust_log: Option<String>) -> EnvFilter {
    if verbose {
        return EnvFilter::new("info");
    }
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("warn"))
}

/// Run a command future on a fresh multi-threaded runtime.
fn run_async(
    command: impl std::future::Future<Output = Result<(), CliError>>,
) -> Result<(), CliError> {
    tokio::runtime::Runtime::new()?.block_on(command)
}
