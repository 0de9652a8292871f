//! End-to-end stages: catalogs to `galaxy_data.txt`, then the CIGALE run and
//! the organization of its output.
//!
//! Every stage takes the destination directory from the configuration; no
//! stage changes the process working directory.
use crate::catalog::Table;
use crate::cigale::{
    create_ini_files, find_output_dir, organize_pdf_fits, organize_sed_output, CigaleError,
    CigaleRunner, OrganizeSummary, OutputError, PdfSummary,
};
use crate::conf::{AppConfig, SedConfigError};
use crate::photometry::{
    assemble, verify_galaxy_data, write_galaxy_data, Manifest, SourceCatalogs, TableError,
    WriterError, GALAXY_DATA_FILE,
};

use std::path::PathBuf;
use tracing::{info, instrument};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("invalid configuration")]
    Configuration(#[from] SedConfigError),
    #[error("failed to load catalogs")]
    Loading(#[source] TableError),
    #[error("failed to filter catalog rows")]
    Filtering(#[source] TableError),
    #[error("failed to calibrate photometry")]
    Calibration(#[source] TableError),
    #[error("failed to write CIGALE input")]
    Serialization(#[from] WriterError),
    #[error("failed to configure CIGALE")]
    CigaleConfiguration(#[source] CigaleError),
    #[error("CIGALE invocation failed")]
    ExternalInvocation(#[source] CigaleError),
    #[error("failed to organize CIGALE output")]
    Output(#[from] OutputError),
}

fn load_table(path: PathBuf) -> Result<Table, PipelineError> {
    Table::from_path(&path).map_err(|e| PipelineError::Loading(TableError::from(e)))
}

/// Reads the main, photometry and extinction catalogs and aligns them.
#[instrument(skip_all, err)]
pub fn load_catalogs(config: &AppConfig) -> Result<SourceCatalogs, PipelineError> {
    let redshift_source = config.columns.redshift_source()?;

    let main = load_table(config.catalogs.main_path())?;
    let ids = main
        .string_column(&config.columns.id)
        .map_err(|e| PipelineError::Loading(e.into()))?;
    let redshifts = redshift_source
        .resolve(&main)
        .map_err(|e| PipelineError::Loading(e.into()))?;
    let photometry = load_table(config.catalogs.photometry_path())?;
    let extinction = load_table(config.catalogs.extinction_path())?;

    let catalogs = SourceCatalogs::new(ids, redshifts, photometry, extinction)
        .map_err(PipelineError::Loading)?;
    info!(nrows = catalogs.len(), "loaded catalogs");
    Ok(catalogs)
}

/// Writes `galaxy_data.txt`, its manifest and the initial ini files into the
/// destination directory.
#[instrument(skip_all, fields(destination = %config.destination.display()), err)]
pub fn prepare_inputs(config: &AppConfig) -> Result<Manifest, PipelineError> {
    let catalogs = load_catalogs(config)?;
    let filtered = catalogs
        .filter_rows(config.columns.photometry_flag.as_deref())
        .map_err(PipelineError::Filtering)?;
    let table =
        assemble(&filtered, &config.assembly_options()).map_err(PipelineError::Calibration)?;
    let manifest = write_galaxy_data(&config.destination, &table)?;
    create_ini_files(&config.destination, &config.cigale)
        .map_err(PipelineError::CigaleConfiguration)?;
    Ok(manifest)
}

/// Runs `pcigale genconf` on the prepared destination.
pub async fn configure_cigale(
    config: &AppConfig,
    runner: &CigaleRunner,
) -> Result<(), PipelineError> {
    runner
        .genconf(&config.destination)
        .await
        .map_err(PipelineError::CigaleConfiguration)
}

/// Input preparation followed by `pcigale genconf`.
pub async fn write_input_files(
    config: &AppConfig,
    runner: &CigaleRunner,
) -> Result<Manifest, PipelineError> {
    let manifest = prepare_inputs(config)?;
    configure_cigale(config, runner).await?;
    info!(rows = manifest.rows, "input files generated");
    Ok(manifest)
}

#[derive(Debug, Clone, PartialEq)]
pub struct FitOutcome {
    pub output_dir: PathBuf,
    pub sed_output: Option<OrganizeSummary>,
    pub probability_files: Option<PdfSummary>,
}

/// Runs the fit and organizes its output.
///
/// With `require_manifest`, an input file that was not completely written by
/// [`prepare_inputs`] is rejected before CIGALE starts. Without it, any
/// existing `galaxy_data.txt` is accepted, e.g. one built by hand with
/// far-infrared bands.
#[instrument(skip_all, fields(destination = %config.destination.display()), err)]
pub async fn run_fitting(
    config: &AppConfig,
    runner: &CigaleRunner,
    require_manifest: bool,
) -> Result<FitOutcome, PipelineError> {
    let destination = &config.destination;
    if require_manifest {
        verify_galaxy_data(destination)?;
    } else {
        let data_path = destination.join(GALAXY_DATA_FILE);
        if !data_path.is_file() {
            return Err(WriterError::Incomplete {
                path: data_path,
                reason: "file not found".to_string(),
            }
            .into());
        }
    }

    info!("executing CIGALE");
    runner
        .run(destination)
        .await
        .map_err(PipelineError::ExternalInvocation)?;
    let output_dir = find_output_dir(destination)?;

    let sed_output = if config.cigale.sed_plots {
        info!("generating SED plots");
        runner
            .sed_plots(destination)
            .await
            .map_err(PipelineError::ExternalInvocation)?;
        Some(organize_sed_output(&output_dir)?)
    } else {
        None
    };

    let probability_files = if config.cigale.create_pdfs {
        Some(organize_pdf_fits(
            &output_dir,
            config.cigale.delete_pdf_fits,
        )?)
    } else {
        None
    };

    info!(output_dir = %output_dir.display(), "CIGALE run finished");
    Ok(FitOutcome {
        output_dir,
        sed_output,
        probability_files,
    })
}

/// The whole pipeline. With `skip_inputs` the destination must already hold
/// a configured `galaxy_data.txt`.
pub async fn run_all(
    config: &AppConfig,
    runner: &CigaleRunner,
    skip_inputs: bool,
) -> Result<FitOutcome, PipelineError> {
    if skip_inputs {
        info!("skipping input generation, using existing galaxy_data.txt");
    } else {
        write_input_files(config, runner).await?;
    }
    run_fitting(config, runner, !skip_inputs).await
}
