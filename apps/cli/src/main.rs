//! wikimig CLI: migrate a markdown documentation tree to MediaWiki pages.
//!
//! Normalizes converter output, assigns categories, builds the cross-link
//! graph, scores every page and writes a publishable-or-not report.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    let code = commands::run(cli).await?;
    std::process::exit(code);
}
