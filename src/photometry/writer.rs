//! Serialization of the assembled table into CIGALE's input file.
//!
//! `galaxy_data.txt` is whitespace delimited: a `# id redshift` header
//! followed by one `label label_err` pair per [`FilterColumn`], then one row
//! per galaxy with north galaxies first. The file is written to a temporary
//! path and renamed into place, and the JSON manifest written after it is the
//! marker of a complete run.
use crate::photometry::{
    filter_columns, BandReport, FilterColumn, GalaxyRecord, GalaxyTable, Hemisphere,
};

use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, instrument};

pub const GALAXY_DATA_FILE: &str = "galaxy_data.txt";
pub const MANIFEST_FILE: &str = "galaxy_data.json";
pub const MISSING_TOKEN: &str = "nan";

#[derive(thiserror::Error, Debug)]
pub enum WriterError {
    #[error("failed to write {0}")]
    Io(PathBuf, #[source] io::Error),
    #[error("failed to move temporary file into {0}")]
    Persist(PathBuf, #[source] tempfile::PersistError),
    #[error("failed to serialize manifest")]
    Manifest(#[from] serde_json::Error),
    #[error("{path} is incomplete: {reason}")]
    Incomplete { path: PathBuf, reason: String },
    #[error("galaxy id {id:?} in row {row} is empty or contains whitespace")]
    InvalidId { row: usize, id: String },
}

/// Summary written next to `galaxy_data.txt` once it is complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub created_at: String,
    pub data_file: String,
    pub rows: usize,
    pub north_rows: usize,
    pub south_rows: usize,
    pub labels: Vec<String>,
    pub bands: Vec<BandReport>,
}

pub fn header_line(columns: &[FilterColumn]) -> String {
    let mut fields = vec!["#".to_string(), "id".to_string(), "redshift".to_string()];
    for column in columns {
        fields.push(column.label.to_string());
        fields.push(format!("{}_err", column.label));
    }
    fields.join(" ")
}

/// Rounds to 4 decimals, keeping a trailing `.0` on whole numbers.
pub fn format_redshift(redshift: f64) -> String {
    let rounded = (redshift * 1e4).round() / 1e4;
    if rounded.is_finite() && rounded.fract() == 0.0 {
        format!("{:.1}", rounded)
    } else {
        format!("{}", rounded)
    }
}

fn format_pair(record: &GalaxyRecord, column: &FilterColumn) -> String {
    let measurement = column
        .applies_to(record.hemisphere)
        .then(|| record.measurement(column.band))
        .flatten();
    match measurement {
        Some(measurement) => format!("{:.4} {:.4}", measurement.flux, measurement.error),
        None => format!("{} {}", MISSING_TOKEN, MISSING_TOKEN),
    }
}

pub fn data_row(record: &GalaxyRecord, columns: &[FilterColumn]) -> String {
    let mut fields = vec![record.id.clone(), format_redshift(record.redshift)];
    fields.extend(columns.iter().map(|column| format_pair(record, column)));
    fields.join(" ")
}

/// Ids are whitespace-delimited fields, so they must be non-empty and
/// free of whitespace. `row` counts records from 1.
pub fn check_ids(table: &GalaxyTable) -> Result<(), WriterError> {
    match table
        .records
        .iter()
        .position(|record| record.id.is_empty() || record.id.contains(char::is_whitespace))
    {
        Some(index) => Err(WriterError::InvalidId {
            row: index + 1,
            id: table.records[index].id.clone(),
        }),
        None => Ok(()),
    }
}

/// Writes the header and every row, north galaxies first. Returns the number
/// of north and south rows written.
pub fn write_table<W: Write>(
    writer: &mut W,
    table: &GalaxyTable,
    columns: &[FilterColumn],
) -> io::Result<(usize, usize)> {
    writeln!(writer, "{}", header_line(columns))?;
    let mut counts = [0usize; 2];
    for (count, hemisphere) in counts.iter_mut().zip([Hemisphere::North, Hemisphere::South]) {
        for record in table.in_hemisphere(hemisphere) {
            writeln!(writer, "{}", data_row(record, columns))?;
            *count += 1;
        }
    }
    Ok((counts[0], counts[1]))
}

fn persist_atomically(
    directory: &Path,
    path: &Path,
    write: impl FnOnce(&mut BufWriter<&mut fs::File>) -> io::Result<()>,
) -> Result<(), WriterError> {
    let io_error = |e| WriterError::Io(path.to_path_buf(), e);
    let mut temp = NamedTempFile::new_in(directory).map_err(io_error)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        write(&mut writer).map_err(io_error)?;
        writer.flush().map_err(io_error)?;
    }
    temp.as_file().sync_all().map_err(io_error)?;
    temp.persist(path)
        .map_err(|e| WriterError::Persist(path.to_path_buf(), e))?;
    Ok(())
}

/// Writes `galaxy_data.txt` and its manifest under `directory`.
#[instrument(skip(table), fields(rows = table.len()), err)]
pub fn write_galaxy_data(directory: &Path, table: &GalaxyTable) -> Result<Manifest, WriterError> {
    fs::create_dir_all(directory).map_err(|e| WriterError::Io(directory.to_path_buf(), e))?;

    // a stale manifest would vouch for the file being replaced
    let manifest_path = directory.join(MANIFEST_FILE);
    if manifest_path.exists() {
        fs::remove_file(&manifest_path).map_err(|e| WriterError::Io(manifest_path.clone(), e))?;
    }
    check_ids(table)?;

    let columns = filter_columns();
    let data_path = directory.join(GALAXY_DATA_FILE);
    let mut counts = (0, 0);
    persist_atomically(directory, &data_path, |writer| {
        counts = write_table(writer, table, &columns)?;
        Ok(())
    })?;
    let (north_rows, south_rows) = counts;

    let manifest = Manifest {
        created_at: chrono::Utc::now().to_rfc3339(),
        data_file: GALAXY_DATA_FILE.to_string(),
        rows: north_rows + south_rows,
        north_rows,
        south_rows,
        labels: columns.iter().map(|column| column.label.to_string()).collect(),
        bands: table.reports.clone(),
    };
    let json = serde_json::to_vec_pretty(&manifest)?;
    persist_atomically(directory, &manifest_path, |writer| writer.write_all(&json))?;

    info!(
        path = %data_path.display(),
        north_rows,
        south_rows,
        "wrote galaxy data"
    );
    Ok(manifest)
}

/// Checks that `galaxy_data.txt` under `directory` was completely written:
/// the manifest exists, the row count matches it, and every row has as many
/// fields as the header.
#[instrument(err)]
pub fn verify_galaxy_data(directory: &Path) -> Result<Manifest, WriterError> {
    let data_path = directory.join(GALAXY_DATA_FILE);
    let manifest_path = directory.join(MANIFEST_FILE);
    let incomplete = |reason: String| WriterError::Incomplete {
        path: data_path.clone(),
        reason,
    };

    let manifest_file = match fs::File::open(&manifest_path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(incomplete(format!("{} not found", MANIFEST_FILE)));
        }
        Err(e) => return Err(WriterError::Io(manifest_path, e)),
    };
    let manifest: Manifest = serde_json::from_reader(BufReader::new(manifest_file))?;

    let data_file =
        fs::File::open(&data_path).map_err(|e| WriterError::Io(data_path.clone(), e))?;
    let mut lines = BufReader::new(data_file).lines();
    let header = match lines.next() {
        Some(line) => line.map_err(|e| WriterError::Io(data_path.clone(), e))?,
        None => return Err(incomplete("file is empty".to_string())),
    };
    // "#" is a field of its own in the header
    let expected_fields = header.split_whitespace().count().saturating_sub(1);

    let mut rows = 0;
    for line in lines {
        let line = line.map_err(|e| WriterError::Io(data_path.clone(), e))?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        rows += 1;
        let fields = line.split_whitespace().count();
        if fields != expected_fields {
            return Err(incomplete(format!(
                "row {} has {} fields, header has {}",
                rows, fields, expected_fields
            )));
        }
    }
    if rows != manifest.rows {
        return Err(incomplete(format!(
            "{} rows written, manifest records {}",
            rows, manifest.rows
        )));
    }
    Ok(manifest)
}
