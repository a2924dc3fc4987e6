mod cli;
mod commands;
mod config;
mod engine;
mod paths;
mod ui;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub quiet: bool,
    pub api: Option<String>,
    pub token: Option<String>,
}

fn main() -> ExitCode {
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
        quiet: cli.quiet,
        api: cli.api,
        token: cli.token,
    };

    match run(&ctx, &cli.command) {
        Ok(code) => code,
        Err(e) => {
            report_error(&ctx, &e);
            ExitCode::FAILURE
        }
    }
}

fn run(ctx: &Context, command: &Command) -> Result<ExitCode> {
    match command {
        Command::Apply(args) => commands::apply::run(ctx, args),
        Command::Kinds => commands::kinds::run(ctx).map(|()| ExitCode::SUCCESS),
    }
}

fn report_error(ctx: &Context, e: &anyhow::Error) {
    ui::error(&format!("{e:#}"));
    let category = e
        .chain()
        .find_map(|cause| cause.downcast_ref::<reconcile::Error>())
        .map(reconcile::Error::category);
    if let Some(category) = category
        && !ctx.quiet
    {
        ui::dim(&format!("{category}: {}", category.advice()));
    }
}
