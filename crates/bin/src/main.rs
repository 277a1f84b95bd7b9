//! Command line front end of the sysdata record library.

mod cli;
mod commands;
mod files;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::{
    cli::{Cli, Commands},
    output::OutputFormat,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&cli.log))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let format = OutputFormat::from_flag(cli.json);
    match &cli.command {
        Commands::Leafs(args) => commands::leafs::run(args, format),
        Commands::Pull(args) => commands::pull::run(args, format),
        Commands::Push(args) => commands::push::run(args, format),
        Commands::Compare(args) => commands::compare::run(args, format),
    }
}
