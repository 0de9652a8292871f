use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum relative error for the optical grz bands.
pub const GRZ_ERROR_FLOOR: f64 = 0.10;
/// Minimum relative error for the UV and infrared bands.
pub const UV_IR_ERROR_FLOOR: f64 = 0.13;

/// Far-infrared labels that may appear in a hand-built input file and in
/// CIGALE's results, but are never produced by the calibration pipeline.
pub const HERSCHEL_LABELS: [&str; 3] = ["PACS-blue", "PACS-green", "PACS-red"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Band {
    #[serde(rename = "FUV")]
    Fuv,
    #[serde(rename = "NUV")]
    Nuv,
    G,
    R,
    Z,
    W1,
    W2,
    W3,
    W4,
}

/// Every band, in the column order of the CIGALE input file.
pub const ALL_BANDS: [Band; 9] = [
    Band::Fuv,
    Band::Nuv,
    Band::G,
    Band::R,
    Band::Z,
    Band::W1,
    Band::W2,
    Band::W3,
    Band::W4,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hemisphere {
    North,
    South,
}

impl Hemisphere {
    /// North is strictly above the threshold, everything else is south.
    pub fn from_declination(dec: f64, threshold: f64) -> Self {
        if dec > threshold {
            Hemisphere::North
        } else {
            Hemisphere::South
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Hemisphere::North => "north",
            Hemisphere::South => "south",
        }
    }
}

impl fmt::Display for Hemisphere {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Band {
    /// Catalog suffix, e.g. `FLUX_` + `W1`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Band::Fuv => "FUV",
            Band::Nuv => "NUV",
            Band::G => "G",
            Band::R => "R",
            Band::Z => "Z",
            Band::W1 => "W1",
            Band::W2 => "W2",
            Band::W3 => "W3",
            Band::W4 => "W4",
        }
    }

    /// Position in [`ALL_BANDS`].
    pub fn index(&self) -> usize {
        *self as usize
    }

    pub fn error_floor(&self) -> f64 {
        match self {
            Band::G | Band::R | Band::Z => GRZ_ERROR_FLOOR,
            _ => UV_IR_ERROR_FLOOR,
        }
    }

    /// CIGALE filter name for this band in the given hemisphere's survey.
    /// BASS (north) has no z-band coverage in this catalog.
    pub fn label(&self, hemisphere: Hemisphere) -> Option<&'static str> {
        match (self, hemisphere) {
            (Band::Fuv, _) => Some("FUV"),
            (Band::Nuv, _) => Some("NUV"),
            (Band::G, Hemisphere::North) => Some("BASS-g"),
            (Band::G, Hemisphere::South) => Some("decamDR1-g"),
            (Band::R, Hemisphere::North) => Some("BASS-r"),
            (Band::R, Hemisphere::South) => Some("decamDR1-r"),
            (Band::Z, Hemisphere::North) => None,
            (Band::Z, Hemisphere::South) => Some("decamDR1-z"),
            (Band::W1, _) => Some("WISE1"),
            (Band::W2, _) => Some("WISE2"),
            (Band::W3, _) => Some("WISE3"),
            (Band::W4, _) => Some("WISE4"),
        }
    }
}

impl fmt::Display for Band {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `label label_err` pair of the input file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterColumn {
    pub band: Band,
    pub label: &'static str,
}

impl FilterColumn {
    /// Whether galaxies of `hemisphere` report a value in this column.
    pub fn applies_to(&self, hemisphere: Hemisphere) -> bool {
        self.band.label(hemisphere) == Some(self.label)
    }
}

/// Header columns in file order. A band whose label is the same in both
/// hemispheres gets one column; otherwise the north column comes first,
/// then the south one, skipping whichever hemisphere lacks the band.
pub fn filter_columns() -> Vec<FilterColumn> {
    let mut columns = Vec::new();
    for band in ALL_BANDS {
        match (band.label(Hemisphere::North), band.label(Hemisphere::South)) {
            (Some(north), Some(south)) if north == south => {
                columns.push(FilterColumn { band, label: north })
            }
            (north, south) => {
                for label in [north, south].into_iter().flatten() {
                    columns.push(FilterColumn { band, label });
                }
            }
        }
    }
    columns
}

/// Every filter label CIGALE may report a flux for.
pub fn known_filter_labels() -> Vec<&'static str> {
    let mut labels: Vec<&'static str> = filter_columns()
        .into_iter()
        .map(|column| column.label)
        .collect();
    labels.extend(HERSCHEL_LABELS);
    labels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_columns_order() {
        let labels: Vec<&str> = filter_columns().iter().map(|c| c.label).collect();
        assert_eq!(
            labels,
            vec![
                "FUV",
                "NUV",
                "BASS-g",
                "decamDR1-g",
                "BASS-r",
                "decamDR1-r",
                "decamDR1-z",
                "WISE1",
                "WISE2",
                "WISE3",
                "WISE4",
            ]
        );
    }

    #[test]
    fn test_applies_to() {
        let columns = filter_columns();
        let bass_g = columns.iter().find(|c| c.label == "BASS-g").unwrap();
        assert!(bass_g.applies_to(Hemisphere::North));
        assert!(!bass_g.applies_to(Hemisphere::South));

        let z = columns.iter().find(|c| c.band == Band::Z).unwrap();
        assert!(!z.applies_to(Hemisphere::North));
        assert!(z.applies_to(Hemisphere::South));

        let wise1 = columns.iter().find(|c| c.band == Band::W1).unwrap();
        assert!(wise1.applies_to(Hemisphere::North));
        assert!(wise1.applies_to(Hemisphere::South));
    }

    #[test]
    fn test_hemisphere_threshold() {
        assert_eq!(Hemisphere::from_declination(40.0, 32.0), Hemisphere::North);
        assert_eq!(Hemisphere::from_declination(32.0, 32.0), Hemisphere::South);
        assert_eq!(Hemisphere::from_declination(10.0, 32.0), Hemisphere::South);
        assert_eq!(Hemisphere::from_declination(f64::NAN, 32.0), Hemisphere::South);
    }

    #[test]
    fn test_error_floors() {
        assert_eq!(Band::G.error_floor(), 0.10);
        assert_eq!(Band::Z.error_floor(), 0.10);
        assert_eq!(Band::Fuv.error_floor(), 0.13);
        assert_eq!(Band::W4.error_floor(), 0.13);
    }

    #[test]
    fn test_band_index_matches_order() {
        for (index, band) in ALL_BANDS.iter().enumerate() {
            assert_eq!(band.index(), index);
        }
    }
}
