use crate::photometry::{
    AssemblyOptions, CalibrationOptions, ClipBoundary, ClipPolicy, ErrorKind, ExtinctionKind,
    RedshiftSource,
};

use config::{Config, File, FileFormat};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

#[derive(thiserror::Error, Debug)]
pub enum SedConfigError {
    #[error("failed to load config")]
    InvalidConfigError(#[from] config::ConfigError),
    #[error("failed to read config file {0}")]
    ReadError(PathBuf, #[source] std::io::Error),
    #[error("could not find config file {0}")]
    ConfigFileNotFound(PathBuf),
    #[error("missing key in config: {0}")]
    MissingKeyError(String),
    #[error("conflicting keys in config: only one of {0} and {1} may be set")]
    ConflictingKeys(String, String),
    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },
    #[error("environment variable expansion error")]
    EnvExpansionError(#[from] ExpandError),
}

#[derive(thiserror::Error, Debug)]
pub enum ExpandError {
    #[error("Missing environment variable '{var_name}' for placeholder '{placeholder}'")]
    MissingVariable {
        var_name: String,
        placeholder: String,
    },
}

/// Loads environment variables from a .env file if it exists.
/// This function should be called early in the application startup,
/// typically before any configuration loading.
///
/// The function looks for .env files in this order:
/// 1. .env in the current working directory
/// 2. .env in the parent directory
/// 3. If none found, continues without error (env vars may be set by system)
pub fn load_dotenv() {
    if Path::new(".env").exists() {
        match dotenvy::dotenv() {
            Ok(_) => info!("Loaded environment variables from .env file"),
            Err(e) => warn!("Found .env file but failed to load it: {}", e),
        }
        return;
    }

    if Path::new("../.env").exists() {
        match dotenvy::from_path("../.env") {
            Ok(_) => info!("Loaded environment variables from ../.env file"),
            Err(e) => warn!("Found ../.env file but failed to load it: {}", e),
        }
        return;
    }

    debug!("No .env file found, using system environment variables only");
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\$\{([^}:]+)(?::-(.*?))?\}").expect("placeholder regex is valid")
    })
}

/// Expands environment variable placeholders in a string.
/// Supports both ${VAR_NAME} and ${VAR_NAME:-default_value} syntax.
///
/// Examples:
/// - "${SEDPREP_CATALOGS}" -> reads from SEDPREP_CATALOGS env var
/// - "${SEDPREP_CATALOGS:-/data}" -> reads from SEDPREP_CATALOGS, falls back to "/data"
pub fn expand_env_vars(input: &str) -> Result<String, ExpandError> {
    let mut result = input.to_string();
    let mut replacements: HashMap<String, String> = HashMap::new();

    for capture in placeholder_regex().captures_iter(input) {
        let full_match = &capture[0];
        let var_name = &capture[1];
        let default_value = capture.get(2).map(|m| m.as_str());

        if replacements.contains_key(full_match) {
            continue;
        }

        let env_value = match env::var(var_name) {
            Ok(value) => {
                debug!("Expanded environment variable: {}", var_name);
                value
            }
            Err(_) => match default_value {
                Some(default) => {
                    warn!(
                        "Environment variable {} not found, using default value",
                        var_name
                    );
                    default.to_string()
                }
                None => {
                    return Err(ExpandError::MissingVariable {
                        var_name: var_name.to_string(),
                        placeholder: full_match.to_string(),
                    });
                }
            },
        };

        result = result.replace(full_match, &env_value);
        replacements.insert(full_match.to_string(), env_value);
    }

    Ok(result)
}

fn file_format(path: &Path) -> FileFormat {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("toml") => FileFormat::Toml,
        Some("json") => FileFormat::Json,
        _ => FileFormat::Yaml,
    }
}

/// Reads a config file, expanding environment placeholders before parsing.
#[instrument(err)]
pub fn load_config(path: &Path) -> Result<Config, SedConfigError> {
    if !path.exists() {
        return Err(SedConfigError::ConfigFileNotFound(path.to_path_buf()));
    }

    let file_content = std::fs::read_to_string(path)
        .map_err(|e| SedConfigError::ReadError(path.to_path_buf(), e))?;
    let expanded_content = expand_env_vars(&file_content)?;

    let conf = Config::builder()
        .add_source(File::from_str(&expanded_content, file_format(path)))
        .build()?;

    Ok(conf)
}

/// Location of the three input catalogs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub directory: PathBuf,
    pub main: String,
    pub photometry: String,
    pub extinction: String,
}

impl CatalogConfig {
    pub fn main_path(&self) -> PathBuf {
        self.directory.join(&self.main)
    }

    pub fn photometry_path(&self) -> PathBuf {
        self.directory.join(&self.photometry)
    }

    pub fn extinction_path(&self) -> PathBuf {
        self.directory.join(&self.extinction)
    }
}

fn default_declination_columns() -> Vec<String> {
    vec!["DEC_MOMENT".to_string(), "DEC".to_string()]
}

/// Catalog column names. Per-band columns are `<prefix><BAND>`, e.g.
/// `FLUX_IVAR_W1` for an error prefix of `FLUX_IVAR_`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub id: String,
    #[serde(default)]
    pub redshift: Option<String>,
    #[serde(default)]
    pub recession_velocity: Option<String>,
    pub flux_prefix: String,
    pub flux_err_prefix: String,
    pub extinction_prefix: String,
    /// Boolean photometry catalog column; rows where it is false are dropped.
    #[serde(default)]
    pub photometry_flag: Option<String>,
    /// Declination column candidates, tried in order.
    #[serde(default = "default_declination_columns")]
    pub declination: Vec<String>,
}

impl ColumnConfig {
    pub fn redshift_source(&self) -> Result<RedshiftSource, SedConfigError> {
        match (&self.redshift, &self.recession_velocity) {
            (Some(column), None) => Ok(RedshiftSource::Column(column.clone())),
            (None, Some(column)) => Ok(RedshiftSource::RecessionVelocity(column.clone())),
            (Some(_), Some(_)) => Err(SedConfigError::ConflictingKeys(
                "columns.redshift".to_string(),
                "columns.recession_velocity".to_string(),
            )),
            (None, None) => Err(SedConfigError::MissingKeyError(
                "columns.redshift or columns.recession_velocity".to_string(),
            )),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_clip_sigma() -> f64 {
    4.0
}

fn default_north_dec_threshold() -> f64 {
    32.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_true")]
    pub nanomaggies_to_mjy: bool,
    #[serde(default = "default_true")]
    pub ivar_to_err: bool,
    #[serde(default = "default_true")]
    pub transmission_to_extinction: bool,
    #[serde(default = "default_clip_sigma")]
    pub clip_sigma: f64,
    #[serde(default)]
    pub clip_boundary: ClipBoundary,
    #[serde(default = "default_north_dec_threshold")]
    pub north_dec_threshold: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            nanomaggies_to_mjy: true,
            ivar_to_err: true,
            transmission_to_extinction: true,
            clip_sigma: default_clip_sigma(),
            clip_boundary: ClipBoundary::default(),
            north_dec_threshold: default_north_dec_threshold(),
        }
    }
}

impl CalibrationConfig {
    pub fn options(&self) -> CalibrationOptions {
        CalibrationOptions {
            convert_flux: self.nanomaggies_to_mjy,
            error_kind: if self.ivar_to_err {
                ErrorKind::InverseVariance
            } else {
                ErrorKind::Sigma
            },
            extinction_kind: if self.transmission_to_extinction {
                ExtinctionKind::Transmission
            } else {
                ExtinctionKind::Magnitudes
            },
            clip: ClipPolicy {
                n_sigma: self.clip_sigma,
                boundary: self.clip_boundary,
            },
        }
    }
}

/// Settings for the external CIGALE executables and its run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CigaleConfig {
    pub executable: String,
    pub plots_executable: String,
    pub sfh_module: String,
    pub dust_module: String,
    pub ncores: u32,
    pub create_pdfs: bool,
    pub delete_pdf_fits: bool,
    pub sed_plots: bool,
    pub timeout_secs: Option<u64>,
}

impl Default for CigaleConfig {
    fn default() -> Self {
        CigaleConfig {
            executable: "pcigale".to_string(),
            plots_executable: "pcigale-plots".to_string(),
            sfh_module: "sfhdelayed".to_string(),
            dust_module: "dl2014".to_string(),
            ncores: 1,
            create_pdfs: false,
            delete_pdf_fits: false,
            sed_plots: false,
            timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub catalogs: CatalogConfig,
    pub columns: ColumnConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    /// Directory receiving galaxy_data.txt, the .ini files and CIGALE's output.
    pub destination: PathBuf,
    #[serde(default)]
    pub cigale: CigaleConfig,
}

impl AppConfig {
    pub fn from_default_path() -> Result<Self, SedConfigError> {
        Self::from_path(Path::new(DEFAULT_CONFIG_FILE))
    }

    pub fn from_test_config() -> Result<Self, SedConfigError> {
        Self::from_path(Path::new(crate::utils::testing::TEST_CONFIG_FILE))
    }

    #[instrument(err)]
    pub fn from_path(path: &Path) -> Result<Self, SedConfigError> {
        let config = load_config(path)?;
        let app_config: AppConfig = config.try_deserialize()?;
        app_config.validate()
    }

    pub fn assembly_options(&self) -> AssemblyOptions {
        AssemblyOptions {
            flux_prefix: self.columns.flux_prefix.clone(),
            error_prefix: self.columns.flux_err_prefix.clone(),
            extinction_prefix: self.columns.extinction_prefix.clone(),
            declination_columns: self.columns.declination.clone(),
            north_dec_threshold: self.calibration.north_dec_threshold,
            calibration: self.calibration.options(),
        }
    }

    /// Checks values serde cannot and applies the settings implied by others.
    pub fn validate(mut self) -> Result<Self, SedConfigError> {
        self.columns.redshift_source()?;

        if self.columns.declination.is_empty() {
            return Err(SedConfigError::InvalidValue {
                key: "columns.declination".to_string(),
                reason: "at least one column name is required".to_string(),
            });
        }
        let clip_sigma = self.calibration.clip_sigma;
        if clip_sigma.is_nan() || clip_sigma <= 0.0 {
            return Err(SedConfigError::InvalidValue {
                key: "calibration.clip_sigma".to_string(),
                reason: format!("must be positive, got {}", self.calibration.clip_sigma),
            });
        }
        if self.cigale.ncores == 0 {
            return Err(SedConfigError::InvalidValue {
                key: "cigale.ncores".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        // probability distributions are only saved by a single worker
        if self.cigale.create_pdfs && self.cigale.ncores != 1 {
            info!(
                ncores = self.cigale.ncores,
                "create_pdfs is set, forcing ncores = 1"
            );
            self.cigale.ncores = 1;
        }

        Ok(self)
    }
}
