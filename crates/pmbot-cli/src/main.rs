//! `pmbot` binary: parses configuration, installs logging and runs the bot.

mod bootstrap_helpers;
mod cli_args;
mod startup;

use anyhow::Result;
use clap::Parser;

use crate::bootstrap_helpers::init_tracing;
use crate::cli_args::Cli;
use crate::startup::run_bot;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    run_bot(cli).await
}
