mod cli;
mod commands;
mod config;

use clap::Parser;
use cli::Cli;
use std::io::IsTerminal;
use stowage_logger::{LevelFilter, Logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let _log = Logger::builder()
        .name(env!("CARGO_BIN_NAME"))
        .level(level)
        .ansi(std::io::stderr().is_terminal())
        .init()?;

    commands::run(cli).await
}
