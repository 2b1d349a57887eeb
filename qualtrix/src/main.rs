mod config;
mod logging;
mod metrics;

use clap::{Args, Parser, Subcommand};
use config::{Config, ConfigError};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use survey_client::{SurveyClient, UpstreamError};

#[derive(Parser)]
#[command(version, about = "Intake gateway for the survey platform")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Serve the API and the admin listener
    Run(ConfigArgs),
    /// Load and validate the configuration, then exit
    CheckConfig(ConfigArgs),
}

#[derive(Args)]
struct ConfigArgs {
    /// YAML configuration file. Read from the environment when omitted.
    #[arg(long)]
    config_file: Option<PathBuf>,
}

impl ConfigArgs {
    fn load(&self) -> Result<Config, ConfigError> {
        match &self.config_file {
            Some(path) => Config::from_file(path),
            None => Config::from_env(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
enum StartupError {
    #[error(transparent)]
    Metrics(#[from] metrics::MetricsError),
    #[error("could not build upstream client: {0}")]
    Client(#[from] UpstreamError),
    #[error("could not start runtime: {0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Intake(#[from] intake::IntakeError),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        CliCommand::CheckConfig(args) => match args.load() {
            Ok(_) => {
                println!("configuration ok");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("invalid configuration: {e}");
                ExitCode::FAILURE
            }
        },
        CliCommand::Run(args) => {
            let config = match args.load() {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("invalid configuration: {e}");
                    return ExitCode::FAILURE;
                }
            };

            // Sentry has to be initialized before the runtime starts its threads.
            let _sentry = match logging::init(&config.logging) {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("{e}");
                    return ExitCode::FAILURE;
                }
            };

            match run(config) {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    tracing::error!(error = %e, "qualtrix exited with an error");
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn run(config: Config) -> Result<(), StartupError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        metrics::init(config.metrics.as_ref())?;

        let client = SurveyClient::new(&config.upstream)?;
        tracing::info!(base_url = %config.upstream.base_url, "starting qualtrix");
        intake::run(config.intake, Arc::new(client)).await?;
        Ok(())
    })
}
