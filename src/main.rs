mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod server;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::StratusConfig;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    /// `--config` override
    pub config_path: Option<PathBuf>,
}

impl Context {
    /// Load the config file this invocation points at
    pub fn config(&self) -> Result<StratusConfig> {
        StratusConfig::load(self.config_path.as_deref())
    }
}

fn main() -> Result<ExitCode> {
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
        config_path: cli.config,
    };
    log::trace!("verbosity {}", ctx.verbose);

    match cli.command {
        Command::Deploy(args) => commands::deploy::run(&ctx, args),
        Command::Destroy { yes } => commands::destroy::run(&ctx, yes),
        Command::Plan(args) => commands::plan::run(&ctx, args),
        Command::State(cmd) => commands::state::run(&ctx, cmd),
        Command::Serve { bind } => commands::serve::run(&ctx, bind),
        Command::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "stratus", &mut io::stdout());
            Ok(ExitCode::SUCCESS)
        }
    }
}
