use clap::Parser;
use csmauth::cli::Cli;
use csmauth::{commands, config, logger};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let app_config = match config::init_config(cli.config.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = logger::setup_logger(app_config.logging(), cli.verbose) {
        eprintln!("Warning: Failed to initialize logger: {e}");
    }

    match commands::run(cli, app_config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
