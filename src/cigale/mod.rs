//! Collaboration with the external CIGALE SED fitting tool: initial
//! configuration files, process invocation and output organization.
mod ini;
mod output;
mod runner;

pub use ini::{create_ini_files, ini_contents, sed_modules, INI_FILE, INI_SPEC_FILE};
pub use output::{
    bayes_parameters, find_output_dir, handle_pdf_fits, load_results, organize_pdf_fits,
    organize_sed_output, probability_files, OrganizeSummary, PdfSummary, BAYES_PREFIX,
    BEST_SED_DIR, OUTPUT_DIR, PDF_FITS_DIR, RESULTS_FILE,
};
pub use runner::CigaleRunner;

use crate::catalog::CatalogError;

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

#[derive(thiserror::Error, Debug)]
pub enum CigaleError {
    #[error("working directory {0} does not exist")]
    MissingDirectory(PathBuf),
    #[error("failed to start `{command}`")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for `{command}`")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("`{command}` failed with {status}")]
    Failed { command: String, status: ExitStatus },
    #[error("`{command}` timed out after {timeout:?}")]
    TimedOut { command: String, timeout: Duration },
    #[error("failed to write {0}")]
    Io(PathBuf, #[source] std::io::Error),
}

#[derive(thiserror::Error, Debug)]
pub enum OutputError {
    #[error("no CIGALE output directory found in {0}")]
    NoOutputDirectory(PathBuf),
    #[error("failed to access {0}")]
    Io(PathBuf, #[source] std::io::Error),
    #[error("failed to read results table {0}")]
    Results(PathBuf, #[source] CatalogError),
    #[error("invalid progress bar template")]
    ProgressTemplate(#[from] indicatif::style::TemplateError),
}
