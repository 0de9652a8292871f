use sedprep::{
    cigale::CigaleRunner,
    conf::{load_dotenv, AppConfig, DEFAULT_CONFIG_FILE},
    pipeline::{prepare_inputs, write_input_files},
    utils::o11y::logging::{as_error, build_subscriber, log_error},
};

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{info, warn};

/// Generate galaxy_data.txt and the CIGALE configuration files.
#[derive(Parser)]
struct Cli {
    /// Path to the configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Only write the files, without running `pcigale genconf`
    #[arg(long)]
    no_genconf: bool,
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

    let result = if args.no_genconf {
        prepare_inputs(&config)
    } else {
        let runner = CigaleRunner::from_config(&config.cigale);
        write_input_files(&config, &runner).await
    };
    match result {
        Ok(manifest) => {
            info!(
                rows = manifest.rows,
                north = manifest.north_rows,
                south = manifest.south_rows,
                destination = %config.destination.display(),
                "input files successfully generated"
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            log_error!(error, "could not generate input files");
            ExitCode::FAILURE
        }
    }
}
