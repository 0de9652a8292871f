// Utilities for unit and integration tests
use crate::conf::{AppConfig, CalibrationConfig, CatalogConfig, CigaleConfig, ColumnConfig};
use crate::photometry::ClipBoundary;
use fitsio::tables::{ColumnDataType, ColumnDescription, ConcreteColumnDescription};
use fitsio::FitsFile;
use std::fs;
use std::path::{Path, PathBuf};

pub const TEST_CONFIG_FILE: &str = "tests/config.test.yaml";

/// A column for [`write_bintable`].
pub enum FitsTestColumn<'a> {
    Str(&'a str, Vec<&'a str>),
    Double(&'a str, Vec<f64>),
    Float(&'a str, Vec<f32>),
    Long(&'a str, Vec<i64>),
}

impl FitsTestColumn<'_> {
    fn name(&self) -> &str {
        match self {
            FitsTestColumn::Str(name, _)
            | FitsTestColumn::Double(name, _)
            | FitsTestColumn::Float(name, _)
            | FitsTestColumn::Long(name, _) => name,
        }
    }

    fn description(&self) -> fitsio::errors::Result<ConcreteColumnDescription> {
        let mut description = ColumnDescription::new(self.name());
        match self {
            FitsTestColumn::Str(_, values) => {
                let width = values.iter().map(|value| value.len()).max().unwrap_or(1).max(1);
                description
                    .with_type(ColumnDataType::String)
                    .that_repeats(width)
                    .create()
            }
            FitsTestColumn::Double(..) => description.with_type(ColumnDataType::Double).create(),
            FitsTestColumn::Float(..) => description.with_type(ColumnDataType::Float).create(),
            FitsTestColumn::Long(..) => description.with_type(ColumnDataType::Long).create(),
        }
    }
}

/// Writes a FITS file at `path` with an empty primary HDU followed by a
/// single binary table holding `columns`.
pub fn write_bintable(path: &Path, columns: &[FitsTestColumn]) -> fitsio::errors::Result<()> {
    let mut fptr = FitsFile::create(path).open()?;
    let descriptions = columns
        .iter()
        .map(|column| column.description())
        .collect::<Result<Vec<_>, _>>()?;
    let hdu = fptr.create_table("DATA".to_string(), &descriptions)?;
    for column in columns {
        match column {
            FitsTestColumn::Str(name, values) => {
                let values: Vec<String> = values.iter().map(|value| value.to_string()).collect();
                hdu.write_col(&mut fptr, *name, &values)?;
            }
            FitsTestColumn::Double(name, values) => {
                hdu.write_col(&mut fptr, *name, values)?;
            }
            FitsTestColumn::Float(name, values) => {
                hdu.write_col(&mut fptr, *name, values)?;
            }
            FitsTestColumn::Long(name, values) => {
                hdu.write_col(&mut fptr, *name, values)?;
            }
        }
    }
    Ok(())
}

/// Writes a CSV catalog with the given header and rows.
pub fn write_csv(path: &Path, header: &[&str], rows: &[Vec<String>]) -> std::io::Result<()> {
    let mut content = header.join(",");
    content.push('\n');
    for row in rows {
        content.push_str(&row.join(","));
        content.push('\n');
    }
    fs::write(path, content)
}

/// One synthetic galaxy for [`write_synthetic_catalogs`]. Fluxes are given
/// per band in the order of [`crate::photometry::ALL_BANDS`], as
/// `(flux, error)` in the catalog's raw units.
pub struct SyntheticGalaxy {
    pub id: String,
    pub redshift: f64,
    pub dec: f64,
    pub photometry: [(f64, f64); 9],
}

/// Writes `main.csv`, `phot.csv` and `ext.csv` under `directory`, using the
/// column names of [`test_app_config`]. Extinctions are 0 mag.
pub fn write_synthetic_catalogs(
    directory: &Path,
    galaxies: &[SyntheticGalaxy],
) -> std::io::Result<()> {
    use crate::photometry::ALL_BANDS;

    write_csv(
        &directory.join("main.csv"),
        &["VFID", "Z"],
        &galaxies
            .iter()
            .map(|galaxy| vec![galaxy.id.clone(), galaxy.redshift.to_string()])
            .collect::<Vec<_>>(),
    )?;

    let mut phot_header = vec!["DEC".to_string()];
    for band in ALL_BANDS {
        phot_header.push(format!("FLUX_{}", band.as_str()));
        phot_header.push(format!("FLUX_ERR_{}", band.as_str()));
    }
    let phot_header: Vec<&str> = phot_header.iter().map(String::as_str).collect();
    let phot_rows: Vec<Vec<String>> = galaxies
        .iter()
        .map(|galaxy| {
            let mut row = vec![galaxy.dec.to_string()];
            for (flux, error) in galaxy.photometry {
                row.push(flux.to_string());
                row.push(error.to_string());
            }
            row
        })
        .collect();
    write_csv(&directory.join("phot.csv"), &phot_header, &phot_rows)?;

    let ext_header: Vec<String> = ALL_BANDS
        .iter()
        .map(|band| format!("A_{}", band.as_str()))
        .collect();
    let ext_header: Vec<&str> = ext_header.iter().map(String::as_str).collect();
    let ext_rows: Vec<Vec<String>> = galaxies
        .iter()
        .map(|_| vec!["0".to_string(); ALL_BANDS.len()])
        .collect();
    write_csv(&directory.join("ext.csv"), &ext_header, &ext_rows)
}

/// A configuration matching [`write_synthetic_catalogs`]: fluxes in mJy,
/// plain errors, extinctions in magnitudes.
pub fn test_app_config(catalog_dir: &Path, destination: &Path) -> AppConfig {
    AppConfig {
        catalogs: CatalogConfig {
            directory: PathBuf::from(catalog_dir),
            main: "main.csv".to_string(),
            photometry: "phot.csv".to_string(),
            extinction: "ext.csv".to_string(),
        },
        columns: ColumnConfig {
            id: "VFID".to_string(),
            redshift: Some("Z".to_string()),
            recession_velocity: None,
            flux_prefix: "FLUX_".to_string(),
            flux_err_prefix: "FLUX_ERR_".to_string(),
            extinction_prefix: "A_".to_string(),
            photometry_flag: None,
            declination: vec!["DEC_MOMENT".to_string(), "DEC".to_string()],
        },
        calibration: CalibrationConfig {
            nanomaggies_to_mjy: false,
            ivar_to_err: false,
            transmission_to_extinction: false,
            clip_sigma: 4.0,
            clip_boundary: ClipBoundary::Exclusive,
            north_dec_threshold: 32.0,
        },
        destination: PathBuf::from(destination),
        cigale: CigaleConfig::default(),
    }
}
