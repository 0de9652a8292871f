use crate::cigale::CigaleError;
use crate::conf::CigaleConfig;
use crate::photometry::GALAXY_DATA_FILE;

use std::fs;
use std::path::Path;
use tracing::{info, instrument};

pub const INI_FILE: &str = "pcigale.ini";
pub const INI_SPEC_FILE: &str = "pcigale.ini.spec";

const INI_SPEC: &str = "\
data_file = string()
parameters_file = string()
sed_modules = cigale_string_list()
analysis_method = string()
cores = integer(min=1)
";

/// Module chain of the fit, with the configured star formation history and
/// dust emission modules in their slots.
pub fn sed_modules(config: &CigaleConfig) -> Vec<&str> {
    vec![
        config.sfh_module.as_str(),
        "bc03",
        "nebular",
        "dustatt_modified_CF00",
        config.dust_module.as_str(),
        "skirtor2016",
        "redshifting",
    ]
}

pub fn ini_contents(config: &CigaleConfig) -> String {
    format!(
        "data_file = {}\nparameters_file = \nsed_modules = {}\nanalysis_method = pdf_analysis\ncores = {}\n",
        GALAXY_DATA_FILE,
        sed_modules(config).join(", "),
        config.ncores
    )
}

/// Writes the initial `pcigale.ini` and `pcigale.ini.spec` that
/// `pcigale genconf` expands.
#[instrument(skip(config), err)]
pub fn create_ini_files(directory: &Path, config: &CigaleConfig) -> Result<(), CigaleError> {
    fs::create_dir_all(directory).map_err(|e| CigaleError::Io(directory.to_path_buf(), e))?;
    let files = [
        (INI_FILE, ini_contents(config)),
        (INI_SPEC_FILE, INI_SPEC.to_string()),
    ];
    for (name, contents) in files {
        let path = directory.join(name);
        fs::write(&path, contents).map_err(|e| CigaleError::Io(path.clone(), e))?;
    }
    info!(
        directory = %directory.display(),
        ncores = config.ncores,
        "wrote CIGALE ini files"
    );
    Ok(())
}
