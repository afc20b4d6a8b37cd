//! CLI parser and command dispatch.

mod hash;
mod probe;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use self::serve::ServeArgs;

#[derive(Parser)]
#[command(name = "upload-gate")]
#[command(about = "Admission-controlled CSV upload service")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Also write logs to this file (appended, no colors)
    #[arg(long, global = true, env = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the upload server
    Serve(ServeArgs),

    /// Print a bcrypt hash for use as BASIC_AUTH_PASSWORD
    HashPassword {
        /// Plain-text password to hash
        password: String,
        /// bcrypt cost factor
        #[arg(long, default_value_t = upload_gate::auth::DEFAULT_HASH_COST)]
        cost: u32,
    },

    /// Query a running server's /health endpoint
    CheckHealth {
        /// Base URL of the server
        #[arg(long, default_value = "http://127.0.0.1:3000")]
        url: String,
    },
}

/// Dispatch the parsed command line.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => serve::cmd_serve(&args.into_settings()).await,
        Commands::HashPassword { password, cost } => hash::cmd_hash_password(&password, cost),
        Commands::CheckHealth { url } => probe::cmd_check_health(&url).await,
    }
}
