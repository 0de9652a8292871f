//! Photometry calibration pipeline: band catalog, per-band calibration,
//! galaxy table assembly and the CIGALE input file writer.
mod bands;
mod calibration;
mod table;
mod writer;

pub use bands::{
    filter_columns, known_filter_labels, Band, FilterColumn, Hemisphere, ALL_BANDS,
    GRZ_ERROR_FLOOR, HERSCHEL_LABELS, UV_IR_ERROR_FLOOR,
};
pub use calibration::{
    apply_error_floor, apply_extinction, calibrate_band, checked_sigma, clip_negative_outliers,
    convert_flux, derive_errors, extinction_magnitudes, extinction_scale,
    inverse_variance_to_error, missing_mask, BandReport, CalibratedBand, CalibrationError,
    CalibrationOptions, ClipBoundary, ClipPolicy, ErrorKind, ExtinctionKind, Measurement, RawBand,
    NANOMAGGIES_TO_MJY,
};
pub use table::{
    assemble, velocity_to_redshift, AssemblyOptions, GalaxyRecord, GalaxyTable, RedshiftSource,
    SourceCatalogs, TableError, SPEED_OF_LIGHT_KM_S,
};
pub use writer::{
    check_ids, data_row, format_redshift, header_line, verify_galaxy_data, write_galaxy_data,
    write_table, Manifest, WriterError, GALAXY_DATA_FILE, MANIFEST_FILE, MISSING_TOKEN,
};
