use clap::Parser;
use tracing::Level;

mod cli;
mod commands;
mod config;
mod define;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    commands::run_command(cli)
}
