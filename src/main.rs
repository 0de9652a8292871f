use sedprep::{
    cigale::CigaleRunner,
    conf::{load_dotenv, AppConfig, DEFAULT_CONFIG_FILE},
    pipeline::run_all,
    utils::o11y::logging::{as_error, build_subscriber, log_error},
};

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};

/// Prepare the CIGALE input from the catalogs, run the fit and organize its
/// output.
#[derive(Parser)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Use the galaxy_data.txt and ini files already in the destination
    /// directory instead of generating them (e.g. hand-built far-infrared
    /// photometry)
    #[arg(long)]
    skip_inputs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file before anything else
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

    match run_all(&config, &runner, args.skip_inputs).await {
        Ok(outcome) => {
            info!(
                output_dir = %outcome.output_dir.display(),
                "results of this run are in the output directory"
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
            log_error!(error, "pipeline failed");
            ExitCode::FAILURE
        }
    }
}
