//! Row filtering and assembly of calibrated galaxy records.
use crate::catalog::{CatalogError, ColumnLookup, Table};
use crate::photometry::{
    calibrate_band, BandReport, Band, CalibratedBand, CalibrationError, CalibrationOptions,
    Hemisphere, Measurement, RawBand, ALL_BANDS,
};

use ndarray::Array1;
use tracing::{debug, info, instrument, warn};

pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

#[derive(thiserror::Error, Debug)]
pub enum TableError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("catalog {catalog} has {found} rows, expected {expected} to match the main catalog")]
    Misaligned {
        catalog: String,
        expected: usize,
        found: usize,
    },
    #[error("no declination column in catalog {catalog} (tried {})", .tried.join(", "))]
    MissingDeclination { catalog: String, tried: Vec<String> },
    #[error("failed to calibrate band {band}")]
    Calibration {
        band: Band,
        #[source]
        source: CalibrationError,
    },
}

/// Where a galaxy's redshift comes from in the main catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedshiftSource {
    Column(String),
    /// Recession velocity in km/s.
    RecessionVelocity(String),
}

pub fn velocity_to_redshift(velocity: f64) -> f64 {
    velocity / SPEED_OF_LIGHT_KM_S
}

impl RedshiftSource {
    pub fn resolve(&self, main: &Table) -> Result<Array1<f64>, CatalogError> {
        match self {
            RedshiftSource::Column(name) => main.float_column(name),
            RedshiftSource::RecessionVelocity(name) => {
                Ok(main.float_column(name)?.mapv(velocity_to_redshift))
            }
        }
    }
}

/// The three input catalogs, row-aligned by position.
#[derive(Debug, Clone)]
pub struct SourceCatalogs {
    pub ids: Vec<String>,
    pub redshifts: Array1<f64>,
    pub photometry: Table,
    pub extinction: Table,
}

impl SourceCatalogs {
    pub fn new(
        ids: Vec<String>,
        redshifts: Array1<f64>,
        photometry: Table,
        extinction: Table,
    ) -> Result<Self, TableError> {
        let expected = ids.len();
        if redshifts.len() != expected {
            return Err(TableError::Misaligned {
                catalog: "redshift column".to_string(),
                expected,
                found: redshifts.len(),
            });
        }
        for table in [&photometry, &extinction] {
            if table.nrows() != expected {
                return Err(TableError::Misaligned {
                    catalog: table.name().to_string(),
                    expected,
                    found: table.nrows(),
                });
            }
        }
        Ok(SourceCatalogs {
            ids,
            redshifts,
            photometry,
            extinction,
        })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Keeps rows with a finite, positive redshift and, when `photometry_flag`
    /// names a column, a true flag. Order is preserved and an empty result is
    /// not an error.
    #[instrument(skip(self), fields(nrows = self.len()), err)]
    pub fn filter_rows(&self, photometry_flag: Option<&str>) -> Result<Self, TableError> {
        let mut mask: Vec<bool> = self
            .redshifts
            .iter()
            .map(|z| z.is_finite() && *z > 0.0)
            .collect();
        if let Some(flag) = photometry_flag {
            let flags = self.photometry.bool_column(flag)?;
            mask.iter_mut()
                .zip(flags)
                .for_each(|(keep, flag)| *keep &= flag);
        }

        let ids = self
            .ids
            .iter()
            .zip(&mask)
            .filter(|(_, keep)| **keep)
            .map(|(id, _)| id.clone())
            .collect::<Vec<_>>();
        let redshifts = self
            .redshifts
            .iter()
            .zip(&mask)
            .filter(|(_, keep)| **keep)
            .map(|(z, _)| *z)
            .collect::<Array1<f64>>();
        let filtered = SourceCatalogs {
            ids,
            redshifts,
            photometry: self.photometry.select_rows(&mask),
            extinction: self.extinction.select_rows(&mask),
        };
        info!(
            kept = filtered.len(),
            dropped = self.len() - filtered.len(),
            "filtered catalog rows"
        );
        Ok(filtered)
    }
}

#[derive(Debug, Clone)]
pub struct AssemblyOptions {
    pub flux_prefix: String,
    pub error_prefix: String,
    pub extinction_prefix: String,
    /// Declination column candidates, tried in order.
    pub declination_columns: Vec<String>,
    pub north_dec_threshold: f64,
    pub calibration: CalibrationOptions,
}

/// One calibrated galaxy.
#[derive(Debug, Clone, PartialEq)]
pub struct GalaxyRecord {
    pub id: String,
    pub redshift: f64,
    pub hemisphere: Hemisphere,
    /// Indexed by [`Band::index`].
    pub photometry: [Option<Measurement>; 9],
}

impl GalaxyRecord {
    pub fn measurement(&self, band: Band) -> Option<Measurement> {
        self.photometry[band.index()]
    }
}

#[derive(Debug, Clone, Default)]
pub struct GalaxyTable {
    pub records: Vec<GalaxyRecord>,
    pub reports: Vec<BandReport>,
}

impl GalaxyTable {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn in_hemisphere(&self, hemisphere: Hemisphere) -> impl Iterator<Item = &GalaxyRecord> {
        self.records
            .iter()
            .filter(move |record| record.hemisphere == hemisphere)
    }

    pub fn count(&self, hemisphere: Hemisphere) -> usize {
        self.in_hemisphere(hemisphere).count()
    }
}

fn declination(photometry: &Table, candidates: &[String]) -> Result<Array1<f64>, TableError> {
    match photometry.lookup(candidates) {
        ColumnLookup::Found(name) => {
            if candidates.first().map(String::as_str) != Some(name) {
                info!(
                    column = name,
                    catalog = photometry.name(),
                    "using fallback declination column"
                );
            } else {
                debug!(column = name, "using declination column");
            }
            Ok(photometry.float_column(name)?)
        }
        ColumnLookup::NotFound(tried) => Err(TableError::MissingDeclination {
            catalog: photometry.name().to_string(),
            tried,
        }),
    }
}

fn calibrate(
    catalogs: &SourceCatalogs,
    band: Band,
    options: &AssemblyOptions,
) -> Result<CalibratedBand, TableError> {
    let flux_column = format!("{}{}", options.flux_prefix, band);
    if !catalogs.photometry.has_column(&flux_column) {
        warn!(
            %band,
            column = %flux_column,
            catalog = catalogs.photometry.name(),
            "flux column absent, band is missing for every galaxy"
        );
        return Ok(CalibratedBand::absent(band, catalogs.len()));
    }
    let flux = catalogs.photometry.float_column(&flux_column)?;
    let error = catalogs
        .photometry
        .float_column(&format!("{}{}", options.error_prefix, band))?;
    let extinction = catalogs
        .extinction
        .float_column(&format!("{}{}", options.extinction_prefix, band))?;

    let raw = RawBand {
        flux: flux.view(),
        error: error.view(),
        extinction: extinction.view(),
    };
    calibrate_band(band, raw, &options.calibration)
        .map_err(|source| TableError::Calibration { band, source })
}

/// Calibrates every band and builds one record per galaxy, tagged with its
/// hemisphere.
#[instrument(skip_all, fields(nrows = catalogs.len()), err)]
pub fn assemble(
    catalogs: &SourceCatalogs,
    options: &AssemblyOptions,
) -> Result<GalaxyTable, TableError> {
    let declinations = declination(&catalogs.photometry, &options.declination_columns)?;

    let mut bands = Vec::with_capacity(ALL_BANDS.len());
    for band in ALL_BANDS {
        let calibrated = calibrate(catalogs, band, options)?;
        info!(
            %band,
            observed = calibrated.report.observed,
            missing = calibrated.report.missing,
            ill_posed = calibrated.report.ill_posed,
            clipped = calibrated.report.clipped,
            "band calibrated"
        );
        bands.push(calibrated);
    }

    let records = (0..catalogs.len())
        .map(|row| GalaxyRecord {
            id: catalogs.ids[row].clone(),
            redshift: catalogs.redshifts[row],
            hemisphere: Hemisphere::from_declination(
                declinations[row],
                options.north_dec_threshold,
            ),
            photometry: std::array::from_fn(|index| bands[index].measurement(row)),
        })
        .collect();

    Ok(GalaxyTable {
        records,
        reports: bands.into_iter().map(|band| band.report).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Column;
    use crate::photometry::{ClipPolicy, ErrorKind, ExtinctionKind};
    use ndarray::array;

    fn options() -> AssemblyOptions {
        AssemblyOptions {
            flux_prefix: "FLUX_".to_string(),
            error_prefix: "ERR_".to_string(),
            extinction_prefix: "A_".to_string(),
            declination_columns: vec!["DEC_MOMENT".to_string(), "DEC".to_string()],
            north_dec_threshold: 32.0,
            calibration: CalibrationOptions {
                convert_flux: false,
                error_kind: ErrorKind::Sigma,
                extinction_kind: ExtinctionKind::Magnitudes,
                clip: ClipPolicy::default(),
            },
        }
    }

    fn catalogs(redshifts: Array1<f64>, dec: Array1<f64>) -> SourceCatalogs {
        let n = redshifts.len();
        let ids = (0..n).map(|i| format!("G{}", i)).collect();
        let photometry = Table::new("phot.csv")
            .with_column("DEC", Column::Float(dec))
            .unwrap()
            .with_column("FLUX_W1", Column::Float(Array1::from_elem(n, 2.0)))
            .unwrap()
            .with_column("ERR_W1", Column::Float(Array1::from_elem(n, 1.0)))
            .unwrap()
            .with_column("photFlag", Column::Bool((0..n).map(|i| i != 1).collect()))
            .unwrap();
        let extinction = Table::new("ext.csv")
            .with_column("A_W1", Column::Float(Array1::zeros(n)))
            .unwrap();
        SourceCatalogs::new(ids, redshifts, photometry, extinction).unwrap()
    }

    #[test]
    fn test_velocity_to_redshift() {
        assert!((velocity_to_redshift(2997.92458) - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_redshift_source_resolve() {
        let main = Table::new("main")
            .with_column("Vcosmic", Column::Float(array![SPEED_OF_LIGHT_KM_S / 10.0]))
            .unwrap();
        let z = RedshiftSource::RecessionVelocity("Vcosmic".to_string())
            .resolve(&main)
            .unwrap();
        assert!((z[0] - 0.1).abs() < 1e-12);
        assert!(matches!(
            RedshiftSource::Column("Z".to_string()).resolve(&main),
            Err(CatalogError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_misaligned_catalogs() {
        let photometry = Table::new("phot")
            .with_column("DEC", Column::Float(array![1.0]))
            .unwrap();
        let result = SourceCatalogs::new(
            vec!["a".into(), "b".into()],
            array![0.1, 0.2],
            photometry,
            Table::new("ext"),
        );
        assert!(matches!(result, Err(TableError::Misaligned { found: 1, .. })));
    }

    #[test]
    fn test_filter_rows_keeps_order() {
        let source = catalogs(array![0.1, 0.0, 0.3, -0.1, f64::NAN, 0.2], Array1::zeros(6));
        let filtered = source.filter_rows(None).unwrap();
        assert_eq!(filtered.ids, vec!["G0", "G2", "G5"]);
        assert_eq!(filtered.redshifts, array![0.1, 0.3, 0.2]);
        assert_eq!(filtered.photometry.nrows(), 3);
        assert_eq!(filtered.extinction.nrows(), 3);
    }

    #[test]
    fn test_filter_rows_photometry_flag() {
        let source = catalogs(array![0.1, 0.2, 0.3], Array1::zeros(3));
        let filtered = source.filter_rows(Some("photFlag")).unwrap();
        assert_eq!(filtered.ids, vec!["G0", "G2"]);
    }

    #[test]
    fn test_filter_rows_empty_result() {
        let source = catalogs(array![0.0, -1.0], Array1::zeros(2));
        let filtered = source.filter_rows(None).unwrap();
        assert!(filtered.is_empty());
        let table = assemble(&filtered, &options()).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_assemble_hemispheres_and_absent_bands() {
        let source = catalogs(array![0.1, 0.2], array![40.0, 10.0]);
        let table = assemble(&source, &options()).unwrap();
        assert_eq!(table.count(Hemisphere::North), 1);
        assert_eq!(table.count(Hemisphere::South), 1);

        let north = &table.records[0];
        assert_eq!(north.hemisphere, Hemisphere::North);
        assert_eq!(
            north.measurement(Band::W1),
            Some(Measurement {
                flux: 2.0,
                error: 1.0
            })
        );
        assert_eq!(north.measurement(Band::G), None);
        assert_eq!(table.reports.len(), ALL_BANDS.len());
        assert!(!table.reports[Band::G.index()].column_present);
    }

    #[test]
    fn test_missing_declination() {
        let mut opts = options();
        opts.declination_columns = vec!["DEC_MOMENT".to_string()];
        let source = catalogs(array![0.1], array![40.0]);
        match assemble(&source, &opts) {
            Err(TableError::MissingDeclination { catalog, tried }) => {
                assert_eq!(catalog, "phot.csv");
                assert_eq!(tried, vec!["DEC_MOMENT"]);
            }
            other => panic!("expected missing declination, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_error_column_is_fatal() {
        let photometry = Table::new("phot.csv")
            .with_column("DEC", Column::Float(array![1.0]))
            .unwrap()
            .with_column("FLUX_G", Column::Float(array![1.0]))
            .unwrap();
        let extinction = Table::new("ext.csv")
            .with_column("A_G", Column::Float(array![0.0]))
            .unwrap();
        let source =
            SourceCatalogs::new(vec!["a".into()], array![0.1], photometry, extinction).unwrap();
        match assemble(&source, &options()) {
            Err(TableError::Catalog(CatalogError::MissingColumn { column, catalog })) => {
                assert_eq!(column, "ERR_G");
                assert_eq!(catalog, "phot.csv");
            }
            other => panic!("expected missing column, got {:?}", other),
        }
    }
}
