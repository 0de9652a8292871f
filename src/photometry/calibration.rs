//! Per-band flux calibration.
//!
//! Raw catalog fluxes go through five steps, each a pure function over whole
//! columns: unit conversion, error derivation, Milky Way extinction
//! correction, the relative error floor, and negative-outlier clipping.
//! A missing measurement is NaN in both the flux and the error column, and
//! stays NaN through every later step.
use crate::photometry::Band;

use ndarray::{Array1, ArrayView1, Zip};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Converts nanomaggies to millijansky.
pub const NANOMAGGIES_TO_MJY: f64 = 3.631e-3;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("inverse variance {0} cannot be converted to an error")]
    IllPosedInverseVariance(f64),
    #[error("error {0} is negative or not finite")]
    IllPosedSigma(f64),
    #[error("extinction {0} does not give a finite correction")]
    IllPosedExtinction(f64),
    #[error("band {band} has {flux_len} fluxes but {other_len} {other} values")]
    LengthMismatch {
        band: Band,
        flux_len: usize,
        other: &'static str,
        other_len: usize,
    },
}

/// How the error column of a catalog is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Sigma,
    InverseVariance,
}

/// How the extinction column of a catalog is expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtinctionKind {
    Magnitudes,
    /// Transmitted fraction, converted with `-2.5 * log10(t)`.
    Transmission,
}

/// Whether a negative flux exactly `n_sigma` errors below zero is kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipBoundary {
    /// keep `|flux| < n_sigma * error`
    #[default]
    Exclusive,
    /// keep `|flux| <= n_sigma * error`
    Inclusive,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipPolicy {
    pub n_sigma: f64,
    pub boundary: ClipBoundary,
}

impl Default for ClipPolicy {
    fn default() -> Self {
        ClipPolicy {
            n_sigma: 4.0,
            boundary: ClipBoundary::Exclusive,
        }
    }
}

impl ClipPolicy {
    /// Non-negative fluxes are always kept; a negative one only when zero is
    /// within `n_sigma` errors of it.
    pub fn keeps(&self, flux: f64, error: f64) -> bool {
        if flux >= 0.0 {
            return true;
        }
        let limit = self.n_sigma * error;
        match self.boundary {
            ClipBoundary::Exclusive => flux.abs() < limit,
            ClipBoundary::Inclusive => flux.abs() <= limit,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationOptions {
    pub convert_flux: bool,
    pub error_kind: ErrorKind,
    pub extinction_kind: ExtinctionKind,
    pub clip: ClipPolicy,
}

impl Default for CalibrationOptions {
    fn default() -> Self {
        CalibrationOptions {
            convert_flux: true,
            error_kind: ErrorKind::InverseVariance,
            extinction_kind: ExtinctionKind::Transmission,
            clip: ClipPolicy::default(),
        }
    }
}

impl CalibrationOptions {
    pub fn conversion_factor(&self) -> f64 {
        if self.convert_flux {
            NANOMAGGIES_TO_MJY
        } else {
            1.0
        }
    }
}

/// A calibrated flux and its 1-sigma error, in mJy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Measurement {
    pub flux: f64,
    pub error: f64,
}

/// Row counts for one band, logged and kept in the run manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BandReport {
    pub band: Band,
    pub column_present: bool,
    pub observed: usize,
    pub missing: usize,
    pub ill_posed: usize,
    pub floored: usize,
    pub clipped: usize,
}

impl BandReport {
    fn new(band: Band, column_present: bool) -> Self {
        BandReport {
            band,
            column_present,
            observed: 0,
            missing: 0,
            ill_posed: 0,
            floored: 0,
            clipped: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CalibratedBand {
    pub band: Band,
    pub flux: Array1<f64>,
    pub error: Array1<f64>,
    pub report: BandReport,
}

impl CalibratedBand {
    /// A band the photometry catalog has no column for.
    pub fn absent(band: Band, nrows: usize) -> Self {
        let mut report = BandReport::new(band, false);
        report.missing = nrows;
        CalibratedBand {
            band,
            flux: Array1::from_elem(nrows, f64::NAN),
            error: Array1::from_elem(nrows, f64::NAN),
            report,
        }
    }

    pub fn measurement(&self, row: usize) -> Option<Measurement> {
        let flux = self.flux[row];
        let error = self.error[row];
        if flux.is_nan() || error.is_nan() {
            None
        } else {
            Some(Measurement { flux, error })
        }
    }

    pub fn len(&self) -> usize {
        self.flux.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flux.is_empty()
    }
}

/// Raw columns of one band for the rows being calibrated.
#[derive(Debug, Clone, Copy)]
pub struct RawBand<'a> {
    pub flux: ArrayView1<'a, f64>,
    pub error: ArrayView1<'a, f64>,
    pub extinction: ArrayView1<'a, f64>,
}

/// Rows without photometry: both flux and error are zero. Non-finite raw
/// values are treated the same way.
pub fn missing_mask(flux: ArrayView1<f64>, error: ArrayView1<f64>) -> Array1<bool> {
    Zip::from(flux)
        .and(error)
        .map_collect(|&flux, &error| {
            (flux == 0.0 && error == 0.0) || !flux.is_finite() || !error.is_finite()
        })
}

pub fn convert_flux(flux: ArrayView1<f64>, missing: &Array1<bool>, factor: f64) -> Array1<f64> {
    Zip::from(flux)
        .and(missing)
        .map_collect(|&flux, &missing| if missing { f64::NAN } else { flux * factor })
}

pub fn inverse_variance_to_error(ivar: f64) -> Result<f64, CalibrationError> {
    if ivar > 0.0 && ivar.is_finite() {
        Ok((1.0 / ivar).sqrt())
    } else {
        Err(CalibrationError::IllPosedInverseVariance(ivar))
    }
}

pub fn checked_sigma(sigma: f64) -> Result<f64, CalibrationError> {
    if sigma >= 0.0 && sigma.is_finite() {
        Ok(sigma)
    } else {
        Err(CalibrationError::IllPosedSigma(sigma))
    }
}

/// 1-sigma errors in the converted unit. Missing rows are `Ok(NaN)`.
pub fn derive_errors(
    error: ArrayView1<f64>,
    missing: &Array1<bool>,
    factor: f64,
    kind: ErrorKind,
) -> Array1<Result<f64, CalibrationError>> {
    Zip::from(error).and(missing).map_collect(|&error, &missing| {
        if missing {
            return Ok(f64::NAN);
        }
        match kind {
            ErrorKind::Sigma => checked_sigma(error).map(|e| e * factor),
            ErrorKind::InverseVariance => inverse_variance_to_error(error).map(|e| e * factor),
        }
    })
}

pub fn extinction_magnitudes(value: f64, kind: ExtinctionKind) -> f64 {
    match kind {
        ExtinctionKind::Magnitudes => value,
        ExtinctionKind::Transmission => -2.5 * value.log10(),
    }
}

/// Linear factor undoing `value` of extinction.
pub fn extinction_scale(value: f64, kind: ExtinctionKind) -> Result<f64, CalibrationError> {
    let scale = 10f64.powf(extinction_magnitudes(value, kind) / 2.5);
    if scale.is_finite() {
        Ok(scale)
    } else {
        Err(CalibrationError::IllPosedExtinction(value))
    }
}

pub fn apply_extinction(values: ArrayView1<f64>, scales: ArrayView1<f64>) -> Array1<f64> {
    Zip::from(values)
        .and(scales)
        .map_collect(|&value, &scale| value * scale)
}

/// Raises each error to at least `floor * |flux|`. Never lowers an error.
pub fn apply_error_floor(
    flux: ArrayView1<f64>,
    error: ArrayView1<f64>,
    floor: f64,
) -> Array1<f64> {
    Zip::from(flux).and(error).map_collect(|&flux, &error| {
        if error.is_nan() || flux.is_nan() {
            error
        } else {
            error.max(floor * flux.abs())
        }
    })
}

/// Replaces both values with NaN wherever `policy` rejects the flux.
pub fn clip_negative_outliers(
    flux: ArrayView1<f64>,
    error: ArrayView1<f64>,
    policy: &ClipPolicy,
) -> (Array1<f64>, Array1<f64>) {
    let keep = Zip::from(flux).and(error).map_collect(|&flux, &error| {
        flux.is_nan() || error.is_nan() || policy.keeps(flux, error)
    });
    let clip = |values: ArrayView1<f64>| {
        Zip::from(values)
            .and(&keep)
            .map_collect(|&value, &keep| if keep { value } else { f64::NAN })
    };
    (clip(flux), clip(error))
}

fn check_len(band: Band, raw: &RawBand) -> Result<(), CalibrationError> {
    let flux_len = raw.flux.len();
    for (other, other_len) in [("error", raw.error.len()), ("extinction", raw.extinction.len())] {
        if other_len != flux_len {
            return Err(CalibrationError::LengthMismatch {
                band,
                flux_len,
                other,
                other_len,
            });
        }
    }
    Ok(())
}

/// Runs every calibration step over one band's columns.
///
/// Rows whose inverse variance or extinction cannot be turned into a finite
/// value are not fatal: each is logged and then treated as missing.
pub fn calibrate_band(
    band: Band,
    raw: RawBand,
    options: &CalibrationOptions,
) -> Result<CalibratedBand, CalibrationError> {
    check_len(band, &raw)?;
    let factor = options.conversion_factor();
    let mut report = BandReport::new(band, true);

    let mut missing = missing_mask(raw.flux, raw.error);
    report.missing = missing.iter().filter(|m| **m).count();

    let flux = convert_flux(raw.flux, &missing, factor);

    let mut ill_posed = Array1::from_elem(flux.len(), false);
    let errors = derive_errors(raw.error, &missing, factor, options.error_kind);
    let error = Zip::from(&errors)
        .and(&mut ill_posed)
        .map_collect(|result, ill_posed| match result {
            Ok(error) => *error,
            Err(_) => {
                *ill_posed = true;
                f64::NAN
            }
        });

    let scales = Zip::from(raw.extinction)
        .and(&missing)
        .and(&mut ill_posed)
        .map_collect(|&value, &missing, ill_posed| {
            if missing || *ill_posed {
                return f64::NAN;
            }
            match extinction_scale(value, options.extinction_kind) {
                Ok(scale) => scale,
                Err(_) => {
                    *ill_posed = true;
                    f64::NAN
                }
            }
        });

    for (row, result) in errors.iter().enumerate() {
        if let Err(error) = result {
            debug!(%band, row, %error, "ill-posed error, treating row as missing");
        }
    }
    for (row, (&value, &bad)) in raw.extinction.iter().zip(ill_posed.iter()).enumerate() {
        if bad && errors[row].is_ok() {
            let error = CalibrationError::IllPosedExtinction(value);
            debug!(%band, row, %error, "ill-posed extinction, treating row as missing");
        }
    }
    report.ill_posed = ill_posed.iter().filter(|bad| **bad).count();
    if report.ill_posed > 0 {
        warn!(
            %band,
            rows = report.ill_posed,
            "rows with ill-posed calibration inputs treated as missing"
        );
    }
    Zip::from(&mut missing)
        .and(&ill_posed)
        .for_each(|missing, &bad| *missing |= bad);

    let flux = apply_extinction(flux.view(), scales.view());
    let error = apply_extinction(error.view(), scales.view());

    let floored_error = apply_error_floor(flux.view(), error.view(), band.error_floor());
    report.floored = Zip::from(&floored_error)
        .and(&error)
        .fold(0, |count, &after, &before| count + usize::from(after > before));

    let (flux, error) = clip_negative_outliers(flux.view(), floored_error.view(), &options.clip);
    report.clipped = Zip::from(&flux)
        .and(&missing)
        .fold(0, |count, &flux, &missing| {
            count + usize::from(flux.is_nan() && !missing)
        });
    report.observed = flux.iter().filter(|flux| !flux.is_nan()).count();

    debug!(
        %band,
        observed = report.observed,
        missing = report.missing,
        floored = report.floored,
        clipped = report.clipped,
        "calibrated band"
    );

    Ok(CalibratedBand {
        band,
        flux,
        error,
        report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn identity_options() -> CalibrationOptions {
        CalibrationOptions {
            convert_flux: false,
            error_kind: ErrorKind::Sigma,
            extinction_kind: ExtinctionKind::Magnitudes,
            clip: ClipPolicy::default(),
        }
    }

    #[test]
    fn test_missing_mask() {
        let flux = array![0.0, 0.0, 1.0, f64::NAN];
        let error = array![0.0, 1.0, 0.0, 1.0];
        assert_eq!(
            missing_mask(flux.view(), error.view()),
            array![true, false, false, true]
        );
    }

    #[test]
    fn test_convert_flux() {
        let flux = array![1000.0, 0.0];
        let missing = array![false, true];
        let converted = convert_flux(flux.view(), &missing, NANOMAGGIES_TO_MJY);
        assert!((converted[0] - 3.631).abs() < 1e-12);
        assert!(converted[1].is_nan());
    }

    #[test]
    fn test_inverse_variance_to_error() {
        assert_eq!(inverse_variance_to_error(4.0).unwrap(), 0.5);
        assert_eq!(
            inverse_variance_to_error(0.0),
            Err(CalibrationError::IllPosedInverseVariance(0.0))
        );
        assert!(inverse_variance_to_error(-1.0).is_err());
    }

    #[test]
    fn test_negative_sigma_is_ill_posed() {
        assert_eq!(checked_sigma(0.25).unwrap(), 0.25);
        assert_eq!(
            checked_sigma(-0.5),
            Err(CalibrationError::IllPosedSigma(-0.5))
        );
        assert!(checked_sigma(f64::INFINITY).is_err());

        let flux = array![0.0, 1.0, 2.0];
        let error = array![-0.5, -0.1, 0.5];
        let extinction = array![0.0, 0.0, 0.0];
        let raw = RawBand {
            flux: flux.view(),
            error: error.view(),
            extinction: extinction.view(),
        };
        let calibrated = calibrate_band(Band::W1, raw, &identity_options()).unwrap();
        assert_eq!(calibrated.measurement(0), None);
        assert_eq!(calibrated.measurement(1), None);
        assert_eq!(
            calibrated.measurement(2),
            Some(Measurement {
                flux: 2.0,
                error: 0.5
            })
        );
        assert_eq!(calibrated.report.ill_posed, 2);
        assert_eq!(calibrated.report.missing, 0);
        assert_eq!(calibrated.report.observed, 1);
        assert!(calibrated.error.iter().all(|e| e.is_nan() || *e >= 0.0));
    }

    #[test]
    fn test_extinction_scale() {
        assert_eq!(extinction_scale(0.0, ExtinctionKind::Magnitudes).unwrap(), 1.0);
        assert!((extinction_scale(2.5, ExtinctionKind::Magnitudes).unwrap() - 10.0).abs() < 1e-12);
        // a transmission of 10% is 2.5 mag of extinction
        assert!((extinction_scale(0.1, ExtinctionKind::Transmission).unwrap() - 10.0).abs() < 1e-9);
        assert!(extinction_scale(0.0, ExtinctionKind::Transmission).is_err());
    }

    #[test]
    fn test_error_floor() {
        let flux = array![10.0, 10.0, -10.0];
        let error = array![0.5, 2.0, 0.1];
        let floored = apply_error_floor(flux.view(), error.view(), 0.13);
        assert!((floored[0] - 1.3).abs() < 1e-12);
        assert_eq!(floored[1], 2.0);
        assert!((floored[2] - 1.3).abs() < 1e-12);
    }

    #[test]
    fn test_clip_boundary() {
        let flux = array![-0.004, -0.002, -0.01, 5.0];
        let error = array![0.001, 0.001, 0.001, 0.001];

        let exclusive = ClipPolicy::default();
        let (clipped, errors) = clip_negative_outliers(flux.view(), error.view(), &exclusive);
        assert!(clipped[0].is_nan() && errors[0].is_nan());
        assert_eq!(clipped[1], -0.002);
        assert!(clipped[2].is_nan());
        assert_eq!(clipped[3], 5.0);

        let inclusive = ClipPolicy {
            n_sigma: 4.0,
            boundary: ClipBoundary::Inclusive,
        };
        let (clipped, _) = clip_negative_outliers(flux.view(), error.view(), &inclusive);
        assert_eq!(clipped[0], -0.004);
    }

    #[test]
    fn test_calibrate_band_identity() {
        let flux = array![1.0, 0.0, -0.002];
        let error = array![0.5, 0.0, 0.001];
        let extinction = array![0.0, 0.0, 0.0];
        let raw = RawBand {
            flux: flux.view(),
            error: error.view(),
            extinction: extinction.view(),
        };
        let calibrated = calibrate_band(Band::W1, raw, &identity_options()).unwrap();
        assert_eq!(
            calibrated.measurement(0),
            Some(Measurement {
                flux: 1.0,
                error: 0.5
            })
        );
        assert_eq!(calibrated.measurement(1), None);
        assert_eq!(
            calibrated.measurement(2),
            Some(Measurement {
                flux: -0.002,
                error: 0.001
            })
        );
        assert_eq!(calibrated.report.missing, 1);
        assert_eq!(calibrated.report.observed, 2);
    }

    #[test]
    fn test_calibrate_band_ivar_and_transmission() {
        // 100 nanomaggies with ivar 4 (sigma 0.5 nmgy) behind 2.5 mag of dust
        let flux = array![100.0];
        let ivar = array![4.0];
        let transmission = array![0.1];
        let raw = RawBand {
            flux: flux.view(),
            error: ivar.view(),
            extinction: transmission.view(),
        };
        let calibrated = calibrate_band(Band::G, raw, &CalibrationOptions::default()).unwrap();
        let measurement = calibrated.measurement(0).unwrap();
        assert!((measurement.flux - 3.631).abs() < 1e-9);
        // 0.5 nmgy -> 0.018155 mJy, below the 10% floor of 0.3631
        assert!((measurement.error - 0.3631).abs() < 1e-9);
        assert_eq!(calibrated.report.floored, 1);
    }

    #[test]
    fn test_zero_ivar_is_missing_not_infinite() {
        let flux = array![100.0, 100.0];
        let ivar = array![0.0, 1.0];
        let transmission = array![1.0, 1.0];
        let raw = RawBand {
            flux: flux.view(),
            error: ivar.view(),
            extinction: transmission.view(),
        };
        let calibrated = calibrate_band(Band::R, raw, &CalibrationOptions::default()).unwrap();
        assert_eq!(calibrated.measurement(0), None);
        assert!(calibrated.measurement(1).is_some());
        assert_eq!(calibrated.report.ill_posed, 1);
        assert!(calibrated.flux.iter().all(|f| !f.is_infinite()));
        assert!(calibrated.error.iter().all(|e| !e.is_infinite()));
    }

    #[test]
    fn test_zero_transmission_is_missing() {
        let flux = array![1.0];
        let error = array![0.1];
        let transmission = array![0.0];
        let raw = RawBand {
            flux: flux.view(),
            error: error.view(),
            extinction: transmission.view(),
        };
        let options = CalibrationOptions {
            extinction_kind: ExtinctionKind::Transmission,
            ..identity_options()
        };
        let calibrated = calibrate_band(Band::W2, raw, &options).unwrap();
        assert_eq!(calibrated.measurement(0), None);
        assert_eq!(calibrated.report.ill_posed, 1);
    }

    #[test]
    fn test_length_mismatch() {
        let flux = array![1.0, 2.0];
        let error = array![0.1];
        let raw = RawBand {
            flux: flux.view(),
            error: error.view(),
            extinction: flux.view(),
        };
        assert!(matches!(
            calibrate_band(Band::W3, raw, &identity_options()),
            Err(CalibrationError::LengthMismatch { other: "error", .. })
        ));
    }

    #[test]
    fn test_absent_band() {
        let band = CalibratedBand::absent(Band::Z, 3);
        assert_eq!(band.len(), 3);
        assert!((0..3).all(|row| band.measurement(row).is_none()));
        assert!(!band.report.column_present);
    }
}
