//! Post-processing of a finished CIGALE run's output directory.
use crate::catalog::Table;
use crate::cigale::OutputError;
use crate::photometry::known_filter_labels;

use chrono::NaiveDateTime;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

pub const OUTPUT_DIR: &str = "out";
pub const RESULTS_FILE: &str = "results.fits";
pub const BEST_SED_DIR: &str = "best_SED_models";
pub const PDF_FITS_DIR: &str = "PDF_fits";
pub const BAYES_PREFIX: &str = "bayes.";

const ARCHIVED_OUTPUT_SUFFIX: &str = "_out";
const ARCHIVED_OUTPUT_FORMAT: &str = "%Y%m%d_%H%M%S";

fn archive_timestamp(name: &str) -> Option<NaiveDateTime> {
    let stamp = name.strip_suffix(ARCHIVED_OUTPUT_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, ARCHIVED_OUTPUT_FORMAT).ok()
}

fn read_dir_entries(directory: &Path) -> Result<Vec<fs::DirEntry>, OutputError> {
    let io_error = |e| OutputError::Io(directory.to_path_buf(), e);
    fs::read_dir(directory)
        .map_err(io_error)?
        .map(|entry| entry.map_err(io_error))
        .collect()
}

/// Output directory of the latest run under `destination`.
///
/// CIGALE writes into `out/` and renames a previous `out/` to
/// `YYYYMMDD_HHMMSS_out`, so `out/` wins when present; otherwise the newest
/// archived directory is used.
#[instrument(err)]
pub fn find_output_dir(destination: &Path) -> Result<PathBuf, OutputError> {
    let current = destination.join(OUTPUT_DIR);
    if current.is_dir() {
        return Ok(current);
    }

    let mut latest: Option<(NaiveDateTime, PathBuf)> = None;
    for entry in read_dir_entries(destination)? {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        let Some(timestamp) = archive_timestamp(&name) else {
            continue;
        };
        if latest
            .as_ref()
            .map_or(true, |(newest, _)| timestamp > *newest)
        {
            latest = Some((timestamp, path));
        }
    }
    match latest {
        Some((timestamp, path)) => {
            debug!(%timestamp, path = %path.display(), "using archived output directory");
            Ok(path)
        }
        None => Err(OutputError::NoOutputDirectory(destination.to_path_buf())),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizeSummary {
    pub moved: usize,
    pub removed: usize,
}

/// Probability files handled, and the posterior parameters the results
/// table reports for every galaxy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfSummary {
    pub files: usize,
    pub parameters: Vec<String>,
}

enum SedFileAction {
    Remove,
    Move,
    Keep,
}

fn sed_file_action(name: &str) -> SedFileAction {
    if name.contains("best_model") {
        if name.ends_with(".fits") {
            SedFileAction::Remove
        } else {
            SedFileAction::Move
        }
    } else if name.contains("_SFH") {
        SedFileAction::Remove
    } else {
        SedFileAction::Keep
    }
}

/// Tidies the output of `pcigale-plots sed`: best-model plots go into
/// `best_SED_models/`, best-model FITS tables and star formation histories
/// are deleted.
#[instrument(err)]
pub fn organize_sed_output(out_dir: &Path) -> Result<OrganizeSummary, OutputError> {
    let best_dir = out_dir.join(BEST_SED_DIR);
    fs::create_dir_all(&best_dir).map_err(|e| OutputError::Io(best_dir.clone(), e))?;

    let mut summary = OrganizeSummary::default();
    for entry in read_dir_entries(out_dir)? {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        match sed_file_action(&name) {
            SedFileAction::Remove => {
                fs::remove_file(&path).map_err(|e| OutputError::Io(path.clone(), e))?;
                summary.removed += 1;
            }
            SedFileAction::Move => {
                let target = best_dir.join(&name);
                fs::rename(&path, &target).map_err(|e| OutputError::Io(path.clone(), e))?;
                summary.moved += 1;
            }
            SedFileAction::Keep => {}
        }
    }
    info!(
        moved = summary.moved,
        removed = summary.removed,
        "organized SED output"
    );
    Ok(summary)
}

/// Posterior parameters of a results table: `bayes` columns that are
/// neither uncertainties nor band fluxes.
pub fn bayes_parameters<S: AsRef<str>>(columns: &[S]) -> Vec<String> {
    let bands = known_filter_labels();
    columns
        .iter()
        .map(|column| column.as_ref())
        .filter(|column| column.contains("bayes"))
        .filter(|column| !column.contains("_err"))
        .filter(|column| {
            let name = column.strip_prefix(BAYES_PREFIX).unwrap_or(*column);
            !bands.contains(&name)
        })
        .map(str::to_string)
        .collect()
}

#[instrument(err)]
pub fn load_results(out_dir: &Path) -> Result<Table, OutputError> {
    let path = out_dir.join(RESULTS_FILE);
    Table::from_path(&path).map_err(|e| OutputError::Results(path, e))
}

/// Probability distribution files CIGALE saved for `galaxy_id`, named
/// `{id}_{parameter}.fits`.
pub fn probability_files(out_dir: &Path, galaxy_id: &str) -> Result<Vec<PathBuf>, OutputError> {
    let prefix = format!("{}_", galaxy_id);
    let mut files: Vec<PathBuf> = read_dir_entries(out_dir)?
        .into_iter()
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with(&prefix) && name.ends_with(".fits")
        })
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}

/// Deletes a galaxy's probability files, or moves them into `PDF_fits/`.
/// Returns the number of files handled.
pub fn handle_pdf_fits(
    out_dir: &Path,
    galaxy_id: &str,
    delete: bool,
) -> Result<usize, OutputError> {
    let files = probability_files(out_dir, galaxy_id)?;
    if files.is_empty() {
        debug!(galaxy_id, "no probability files");
        return Ok(0);
    }
    let pdf_dir = out_dir.join(PDF_FITS_DIR);
    if !delete {
        fs::create_dir_all(&pdf_dir).map_err(|e| OutputError::Io(pdf_dir.clone(), e))?;
    }
    for path in &files {
        if delete {
            fs::remove_file(path).map_err(|e| OutputError::Io(path.clone(), e))?;
        } else {
            let Some(name) = path.file_name() else {
                continue;
            };
            fs::rename(path, pdf_dir.join(name)).map_err(|e| OutputError::Io(path.clone(), e))?;
        }
    }
    Ok(files.len())
}

/// Handles the probability files of every galaxy in `results.fits`.
#[instrument(err)]
pub fn organize_pdf_fits(out_dir: &Path, delete: bool) -> Result<PdfSummary, OutputError> {
    let results = load_results(out_dir)?;
    let ids = results
        .string_column("id")
        .map_err(|e| OutputError::Results(out_dir.join(RESULTS_FILE), e))?;
    let parameters = bayes_parameters(results.column_names());

    let progress_bar = ProgressBar::new(ids.len() as u64)
        .with_message("Organizing probability files")
        .with_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} {msg} {wide_bar} [{elapsed_precise}] {human_pos}/{human_len} ({eta})")?,
        );

    let mut handled = 0;
    for id in &ids {
        let id = id.trim();
        handled += handle_pdf_fits(out_dir, id, delete)?;
        progress_bar.inc(1);
    }
    progress_bar.finish();

    if handled == 0 && !ids.is_empty() {
        warn!(galaxies = ids.len(), "no probability files found for any galaxy");
    }
    info!(
        galaxies = ids.len(),
        files = handled,
        parameters = parameters.len(),
        delete,
        "organized probability files"
    );
    Ok(PdfSummary {
        files: handled,
        parameters,
    })
}
