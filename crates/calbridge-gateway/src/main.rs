//! calbridge CLI entry point.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

use calbridge_gateway::cli::{Cli, Command, ConfigAction};
use calbridge_gateway::{Gateway, GatewayResult, GatewaySettings, commands, secret};

/// Exit status when no envelope could be produced (bad settings, client
/// config or credentials file).
const EXIT_FATAL: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings_path = cli
        .config
        .clone()
        .unwrap_or_else(GatewaySettings::default_path);
    let settings = match cli.config {
        Some(ref path) => GatewaySettings::load_from(path),
        None => GatewaySettings::load(),
    };
    let settings = match settings {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_FATAL);
        }
    };

    let tracing_config = match settings.tracing_config(cli.debug) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::from(EXIT_FATAL);
        }
    };
    if let Err(e) = calbridge_core::init_tracing(tracing_config) {
        eprintln!("error: failed to initialize logging: {e}");
        return ExitCode::from(EXIT_FATAL);
    }

    match run(cli.command, &settings, &settings_path).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// Returns whether the operation succeeded.
async fn run(
    command: Command,
    settings: &GatewaySettings,
    settings_path: &Path,
) -> GatewayResult<bool> {
    if let Command::Config { ref action } = command {
        match action {
            ConfigAction::Path => commands::config::path(settings_path)?,
            ConfigAction::Dump => commands::config::dump(settings, settings_path)?,
        }
        return Ok(true);
    }
    let Some((kind, args)) = command.provider() else {
        return Ok(true);
    };

    let client_config = secret::read_client_config(&args.client_config)?;
    let gateway = Gateway::new(kind, &client_config, settings)?;
    debug!(provider = %kind, "gateway ready");

    let outcome = commands::provider::execute(&gateway, args.operation).await?;
    println!("{}", serde_json::to_string_pretty(&outcome.output)?);
    Ok(outcome.success)
}
