use fitsio::hdu::{FitsHdu, HduInfo};
use fitsio::FitsFile;
use std::path::Path;
use tracing::{debug, instrument};

#[derive(thiserror::Error, Debug)]
pub enum FitsError {
    #[error("failed to read FITS file")]
    Fitsio(#[from] fitsio::errors::Error),
    #[error("HDU 1 is not a table")]
    NoBinaryTable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FitsColumnData {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Str(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct FitsColumn {
    pub name: String,
    pub data: FitsColumnData,
}

#[derive(Debug, Clone)]
pub struct BinTable {
    pub nrows: usize,
    pub columns: Vec<FitsColumn>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ColumnKind {
    Logical,
    Integer,
    Real,
    Chars,
    // bits, complex and variable-length descriptors
    Skipped,
}

/// Classifies a column from its TFORM code, e.g. `1D`, `20A` or `K`.
fn column_kind(tform: &str) -> ColumnKind {
    match tform
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .chars()
        .next()
    {
        Some('L') => ColumnKind::Logical,
        Some('B' | 'I' | 'J' | 'K') => ColumnKind::Integer,
        Some('E' | 'D') => ColumnKind::Real,
        Some('A') => ColumnKind::Chars,
        _ => ColumnKind::Skipped,
    }
}

fn read_column(
    hdu: &FitsHdu,
    fptr: &mut FitsFile,
    index: usize,
    name: &str,
    kind: ColumnKind,
) -> Result<Option<FitsColumnData>, FitsError> {
    let data = match kind {
        // cfitsio reads logicals into numbers as 1/0
        ColumnKind::Logical => {
            let values: Vec<i32> = hdu.read_col(fptr, name)?;
            FitsColumnData::Bool(values.iter().map(|value| *value != 0).collect())
        }
        ColumnKind::Integer => {
            // scaled integers are physical values, not counts
            let scaled = hdu
                .read_key::<f64>(fptr, &format!("TSCAL{}", index + 1))
                .is_ok();
            if scaled {
                FitsColumnData::Float(hdu.read_col(fptr, name)?)
            } else {
                FitsColumnData::Int(hdu.read_col(fptr, name)?)
            }
        }
        ColumnKind::Real => FitsColumnData::Float(hdu.read_col(fptr, name)?),
        ColumnKind::Chars => FitsColumnData::Str(hdu.read_col(fptr, name)?),
        ColumnKind::Skipped => return Ok(None),
    };
    Ok(Some(data))
}

/// Reads every scalar column of the table in HDU 1. cfitsio takes care of
/// gzip compression, TSCAL/TZERO and trailing blanks in text cells.
///
/// Vector-valued numeric columns and bit/complex/descriptor columns are
/// skipped; every other column is returned in file order.
#[instrument(err)]
pub fn read_bintable_file(path: &Path) -> Result<BinTable, FitsError> {
    let mut fptr = FitsFile::open(path)?;
    let hdu = fptr.hdu(1)?;
    let (layout, nrows): (Vec<(String, usize)>, usize) = match &hdu.info {
        HduInfo::TableInfo {
            column_descriptions,
            num_rows,
        } => (
            column_descriptions
                .iter()
                .map(|description| (description.name.clone(), description.data_type.repeat))
                .collect(),
            *num_rows,
        ),
        _ => return Err(FitsError::NoBinaryTable),
    };

    let mut columns = Vec::with_capacity(layout.len());
    for (index, (name, repeat)) in layout.into_iter().enumerate() {
        let tform: String = hdu.read_key(&mut fptr, &format!("TFORM{}", index + 1))?;
        let kind = column_kind(&tform);
        if repeat > 1 && kind != ColumnKind::Chars {
            debug!(column = %name, %tform, "skipping vector column");
            continue;
        }
        match read_column(&hdu, &mut fptr, index, &name, kind)? {
            Some(data) => columns.push(FitsColumn { name, data }),
            None => debug!(column = %name, %tform, "skipping non-scalar column"),
        }
    }
    Ok(BinTable { nrows, columns })
}
