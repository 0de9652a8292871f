use sedprep::{
    cigale::CigaleRunner,
    conf::{load_dotenv, AppConfig, DEFAULT_CONFIG_FILE},
    pipeline::run_fitting,
    utils::o11y::logging::{as_error, build_subscriber, log_error},
};

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};

/// Run CIGALE on a prepared destination directory and organize its output.
#[derive(Parser)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Accept a galaxy_data.txt without a manifest (e.g. one built by hand)
    #[arg(long)]
    allow_unverified: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    load_dotenv();

    let args = Cli::parse();

    let subscriber = build_subscriber().expect("failed to build subscriber");
    tracing::subscriber::set_global_default(subscriber).expect("failed to install subscriber");

    let config_path = args.config.unwrap_or_else(|| {
        warn!("no config file provided, using {}", DEFAULT_CONFIG_FILE);
        PathBuf::from(DEFAULT_CONFIG_FILE)
    });
    let Ok(config) =
        AppConfig::from_path(&config_path).inspect_err(as_error!("could not load configuration"))
    else {
        return ExitCode::FAILURE;
    };
    let runner = CigaleRunner::from_config(&config.cigale);

    match run_fitting(&config, &runner, !args.allow_unverified).await {
        Ok(outcome) => {
            info!(
                output_dir = %outcome.output_dir.display(),
                "CIGALE run finished"
            );
            if let Some(pdfs) = &outcome.probability_files {
                info!(
                    files = pdfs.files,
                    parameters = %pdfs.parameters.join(", "),
                    "posterior parameters with probability files"
                );
            }
            ExitCode::SUCCESS
        }
        Err(error) => {
            log_error!(error, "CIGALE run failed");
            ExitCode::FAILURE
        }
    }
}
