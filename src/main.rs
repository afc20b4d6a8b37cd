//! upload-gate - admission-controlled CSV upload service.
//!
//! Accepts CSV uploads under a bounded concurrency limit, sheds load when
//! the host is busy, and reports resource and dependency health.

mod cli;
mod logging;

use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    let cli = cli::Cli::parse();
    logging::init(cli.verbose, cli.log_file.as_deref())?;

    cli::run(cli).await
}
