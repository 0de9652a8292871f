//! In-memory catalogs.
//!
//! A [`Table`] is a set of equally long, named columns read from a FITS
//! binary table or a CSV file. Column lookups are explicit: a missing column
//! is a [`CatalogError::MissingColumn`] naming both the column and the
//! catalog, and schema variants are resolved with [`Table::lookup`].
use crate::utils::fits::{read_bintable_file, FitsColumnData, FitsError};

use ndarray::Array1;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

#[derive(thiserror::Error, Debug)]
pub enum CatalogError {
    #[error("failed to parse FITS catalog {0}")]
    Fits(PathBuf, #[source] FitsError),
    #[error("failed to parse CSV catalog {0}")]
    Csv(PathBuf, #[source] csv::Error),
    #[error("unsupported catalog format for {0} (expected .fits, .fit, .fits.gz or .csv)")]
    UnsupportedFormat(PathBuf),
    #[error("column {column} not found in catalog {catalog}")]
    MissingColumn { column: String, catalog: String },
    #[error("column {column} in catalog {catalog} is not numeric")]
    NotNumeric { column: String, catalog: String },
    #[error("column {column} has {found} rows but catalog {catalog} has {expected}")]
    RowCountMismatch {
        column: String,
        catalog: String,
        expected: usize,
        found: usize,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Float(Array1<f64>),
    Int(Array1<i64>),
    Str(Vec<String>),
    Bool(Vec<bool>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Float(values) => values.len(),
            Column::Int(values) => values.len(),
            Column::Str(values) => values.len(),
            Column::Bool(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric view of the column; integers are widened to f64.
    pub fn to_f64(&self) -> Option<Array1<f64>> {
        match self {
            Column::Float(values) => Some(values.clone()),
            Column::Int(values) => Some(values.mapv(|value| value as f64)),
            Column::Str(_) | Column::Bool(_) => None,
        }
    }

    /// Text rendering of every cell, used for identifiers.
    pub fn to_strings(&self) -> Vec<String> {
        match self {
            Column::Float(values) => values.iter().map(|value| value.to_string()).collect(),
            Column::Int(values) => values.iter().map(|value| value.to_string()).collect(),
            Column::Str(values) => values.clone(),
            Column::Bool(values) => values.iter().map(|value| value.to_string()).collect(),
        }
    }

    /// Keeps the rows where `mask` is true, preserving order.
    pub fn select(&self, mask: &[bool]) -> Column {
        fn keep<T: Clone>(values: impl Iterator<Item = T>, mask: &[bool]) -> Vec<T> {
            values
                .zip(mask)
                .filter(|(_, keep)| **keep)
                .map(|(value, _)| value)
                .collect()
        }
        match self {
            Column::Float(values) => Column::Float(Array1::from(keep(values.iter().copied(), mask))),
            Column::Int(values) => Column::Int(Array1::from(keep(values.iter().copied(), mask))),
            Column::Str(values) => Column::Str(keep(values.iter().cloned(), mask)),
            Column::Bool(values) => Column::Bool(keep(values.iter().copied(), mask)),
        }
    }
}

impl From<FitsColumnData> for Column {
    fn from(data: FitsColumnData) -> Self {
        match data {
            FitsColumnData::Float(values) => Column::Float(Array1::from(values)),
            FitsColumnData::Int(values) => Column::Int(Array1::from(values)),
            FitsColumnData::Str(values) => Column::Str(values),
            FitsColumnData::Bool(values) => Column::Bool(values),
        }
    }
}

/// Outcome of a schema lookup over several candidate column names.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnLookup<'a> {
    Found(&'a str),
    NotFound(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    names: Vec<String>,
    columns: HashMap<String, Column>,
    // cells as written in a text catalog, for columns that came from one
    raw_text: HashMap<String, Vec<String>>,
    nrows: usize,
}

enum CatalogFormat {
    Fits,
    Csv,
}

fn catalog_format(path: &Path) -> Option<CatalogFormat> {
    let file_name = path.file_name()?.to_str()?.to_ascii_lowercase();
    let file_name = file_name.strip_suffix(".gz").unwrap_or(&file_name);
    if file_name.ends_with(".fits") || file_name.ends_with(".fit") {
        Some(CatalogFormat::Fits)
    } else if file_name.ends_with(".csv") {
        Some(CatalogFormat::Csv)
    } else {
        None
    }
}

/// Infers the narrowest column type that fits every cell: integers, then
/// floats (empty cells and `nan` become NaN), then strings.
fn infer_column(cells: Vec<String>) -> Column {
    let is_blank = |cell: &str| cell.is_empty() || cell.eq_ignore_ascii_case("nan");

    if cells.iter().all(|cell| !cell.is_empty()) {
        let ints: Result<Vec<i64>, _> = cells.iter().map(|cell| cell.parse::<i64>()).collect();
        if let Ok(ints) = ints {
            return Column::Int(Array1::from(ints));
        }
    }
    let floats: Result<Vec<f64>, _> = cells
        .iter()
        .map(|cell| {
            if is_blank(cell) {
                Ok(f64::NAN)
            } else {
                cell.parse::<f64>()
            }
        })
        .collect();
    match floats {
        Ok(floats) => Column::Float(Array1::from(floats)),
        Err(_) => Column::Str(cells),
    }
}

impl Table {
    pub fn new(name: &str) -> Self {
        Table {
            name: name.to_string(),
            names: Vec::new(),
            columns: HashMap::new(),
            raw_text: HashMap::new(),
            nrows: 0,
        }
    }

    /// Adds (or replaces) a column. The first column fixes the row count.
    pub fn push_column(&mut self, name: &str, column: Column) -> Result<(), CatalogError> {
        if self.names.is_empty() {
            self.nrows = column.len();
        } else if column.len() != self.nrows {
            return Err(CatalogError::RowCountMismatch {
                column: name.to_string(),
                catalog: self.name.clone(),
                expected: self.nrows,
                found: column.len(),
            });
        }
        self.raw_text.remove(name);
        if self.columns.insert(name.to_string(), column).is_none() {
            self.names.push(name.to_string());
        }
        Ok(())
    }

    pub fn with_column(mut self, name: &str, column: Column) -> Result<Self, CatalogError> {
        self.push_column(name, column)?;
        Ok(self)
    }

    /// Reads a catalog, choosing the reader from the file extension.
    #[instrument(err)]
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let table = match catalog_format(path) {
            Some(CatalogFormat::Fits) => Self::from_fits(path)?,
            Some(CatalogFormat::Csv) => Self::from_csv(path)?,
            None => return Err(CatalogError::UnsupportedFormat(path.to_path_buf())),
        };
        debug!(
            catalog = %table.name,
            nrows = table.nrows,
            ncols = table.names.len(),
            "loaded catalog"
        );
        Ok(table)
    }

    fn display_name(path: &Path) -> String {
        path.file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string())
    }

    fn from_fits(path: &Path) -> Result<Self, CatalogError> {
        let bintable =
            read_bintable_file(path).map_err(|e| CatalogError::Fits(path.to_path_buf(), e))?;
        let mut table = Table::new(&Self::display_name(path));
        for column in bintable.columns {
            table.push_column(&column.name, Column::from(column.data))?;
        }
        // a table whose columns were all skipped still has rows
        if table.names.is_empty() {
            table.nrows = bintable.nrows;
        }
        Ok(table)
    }

    fn from_csv(path: &Path) -> Result<Self, CatalogError> {
        let csv_error = |e| CatalogError::Csv(path.to_path_buf(), e);
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_path(path)
            .map_err(csv_error)?;

        let headers: Vec<String> = reader
            .headers()
            .map_err(csv_error)?
            .iter()
            .map(|header| header.to_string())
            .collect();
        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record.map_err(csv_error)?;
            for (index, cell) in record.iter().enumerate() {
                if let Some(column) = cells.get_mut(index) {
                    column.push(cell.to_string());
                }
            }
        }

        let mut table = Table::new(&Self::display_name(path));
        for (name, column) in headers.iter().zip(cells) {
            table.push_column(name, infer_column(column.clone()))?;
            table.raw_text.insert(name.clone(), column);
        }
        Ok(table)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nrows(&self) -> usize {
        self.nrows
    }

    pub fn is_empty(&self) -> bool {
        self.nrows == 0
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, CatalogError> {
        self.columns
            .get(name)
            .ok_or_else(|| CatalogError::MissingColumn {
                column: name.to_string(),
                catalog: self.name.clone(),
            })
    }

    pub fn float_column(&self, name: &str) -> Result<Array1<f64>, CatalogError> {
        self.column(name)?
            .to_f64()
            .ok_or_else(|| CatalogError::NotNumeric {
                column: name.to_string(),
                catalog: self.name.clone(),
            })
    }

    /// Truth values of a flag column. Numbers are true when non-zero, text
    /// when it reads `T`, `true` or `1`.
    pub fn bool_column(&self, name: &str) -> Result<Vec<bool>, CatalogError> {
        let flags = match self.column(name)? {
            Column::Bool(values) => values.clone(),
            Column::Int(values) => values.iter().map(|value| *value != 0).collect(),
            Column::Float(values) => values
                .iter()
                .map(|value| !value.is_nan() && *value != 0.0)
                .collect(),
            Column::Str(values) => values
                .iter()
                .map(|value| matches!(value.to_ascii_lowercase().as_str(), "t" | "true" | "1"))
                .collect(),
        };
        Ok(flags)
    }

    /// Cells as text. CSV columns return the cells as written, so an
    /// identifier such as `00123` keeps its leading zeros.
    pub fn string_column(&self, name: &str) -> Result<Vec<String>, CatalogError> {
        match self.raw_text.get(name) {
            Some(cells) => Ok(cells.clone()),
            None => Ok(self.column(name)?.to_strings()),
        }
    }

    /// Returns the first candidate present in the table.
    pub fn lookup<'a, S: AsRef<str>>(&self, candidates: &'a [S]) -> ColumnLookup<'a> {
        match candidates
            .iter()
            .map(|candidate| candidate.as_ref())
            .find(|candidate| self.has_column(candidate))
        {
            Some(found) => ColumnLookup::Found(found),
            None => ColumnLookup::NotFound(
                candidates
                    .iter()
                    .map(|candidate| candidate.as_ref().to_string())
                    .collect(),
            ),
        }
    }

    /// Keeps the rows where `mask` is true, preserving order.
    pub fn select_rows(&self, mask: &[bool]) -> Table {
        let columns: HashMap<String, Column> = self
            .columns
            .iter()
            .map(|(name, column)| (name.clone(), column.select(mask)))
            .collect();
        let raw_text = self
            .raw_text
            .iter()
            .map(|(name, cells)| {
                let kept = cells
                    .iter()
                    .zip(mask)
                    .filter(|(_, keep)| **keep)
                    .map(|(cell, _)| cell.clone())
                    .collect();
                (name.clone(), kept)
            })
            .collect();
        Table {
            name: self.name.clone(),
            names: self.names.clone(),
            columns,
            raw_text,
            nrows: mask.iter().take(self.nrows).filter(|keep| **keep).count(),
        }
    }
}
