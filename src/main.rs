mod cli;
mod commands;
mod config;
mod progress;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::TierctlConfig;
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    let config = TierctlConfig::load()?;

    match cli.command {
        Command::Validate => commands::validate::run(&ctx, &config, cli.policy.as_deref()),
        Command::Diff => commands::diff::run(&ctx, &config, cli.policy.as_deref()),
        Command::Apply(args) => commands::apply::run(&ctx, &config, cli.policy.as_deref(), &args),
        Command::Status => commands::status::run(&ctx, &config),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "tierctl", &mut io::stdout());
            Ok(())
        }
    }
}
