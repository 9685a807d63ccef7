//! SiteWatch CLI — watch web pages for content changes.
//!
//! Runs the fetch/diff pipeline as a long-lived process and manages the
//! watch-list, history, and digest subscriptions.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
