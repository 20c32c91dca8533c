//! ProfessorAgent CLI: run academic assistant jobs from the terminal.
//!
//! Submits a multi-step job (retrieval, generation, literature search) and
//! follows it to completion, or runs the index and literature search alone.

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
