//! Unified hoptun CLI.
//!
//! - `hoptun run` - Build the hop chain and serve the configured forwards
//! - `hoptun check` - Validate a config and print the resolved hop chain

use std::process::ExitCode;

use clap::{Parser, Subcommand};

/// hoptun unified CLI.
#[derive(Parser)]
#[command(
    name = "hoptun",
    version,
    about = "Multi-hop SSH tunnels through a chain of jump hosts",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the tunnel and serve forwards until interrupted.
    #[command(name = "run", alias = "up")]
    Run(Box<hoptun_ssh::cli::RunArgs>),

    /// Validate the configuration without connecting.
    #[command(name = "check")]
    Check(Box<hoptun_ssh::cli::CheckArgs>),
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => hoptun_ssh::cli::run(*args).await,
        Commands::Check(args) => hoptun_ssh::cli::check(*args).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
