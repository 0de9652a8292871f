use sedprep::catalog::CatalogError;
use sedprep::cigale::{INI_FILE, INI_SPEC_FILE};
use sedprep::photometry::{
    verify_galaxy_data, Band, TableError, WriterError, GALAXY_DATA_FILE, MANIFEST_FILE,
};
use sedprep::pipeline::{prepare_inputs, PipelineError};
use sedprep::utils::testing::{test_app_config, write_synthetic_catalogs, SyntheticGalaxy};

use std::fs;

fn galaxies() -> Vec<SyntheticGalaxy> {
    let mut north = [(1.0, 0.2); 9];
    north[Band::W1.index()] = (-0.002, 0.001);
    north[Band::W2.index()] = (-0.01, 0.001);
    north[Band::W3.index()] = (0.0, 0.0);
    vec![
        SyntheticGalaxy {
            id: "VFID0002".to_string(),
            redshift: 0.02,
            dec: 10.0,
            photometry: [(2.0, 0.5); 9],
        },
        SyntheticGalaxy {
            id: "VFID0001".to_string(),
            redshift: 0.01,
            dec: 40.0,
            photometry: north,
        },
        SyntheticGalaxy {
            id: "VFID0003".to_string(),
            redshift: 0.0,
            dec: 40.0,
            photometry: [(3.0, 0.5); 9],
        },
    ]
}

fn read_rows(text: &str) -> Vec<Vec<&str>> {
    text.lines()
        .skip(1)
        .map(|line| line.split(' ').collect())
        .collect()
}

#[test]
fn test_prepare_inputs() {
    let catalog_dir = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    write_synthetic_catalogs(catalog_dir.path(), &galaxies()).unwrap();
    let config = test_app_config(catalog_dir.path(), destination.path());

    let manifest = prepare_inputs(&config).unwrap();
    assert_eq!(manifest.rows, 2);
    assert_eq!(manifest.north_rows, 1);
    assert_eq!(manifest.south_rows, 1);

    let text = fs::read_to_string(destination.path().join(GALAXY_DATA_FILE)).unwrap();
    let header = text.lines().next().unwrap();
    assert_eq!(
        header,
        "# id redshift FUV FUV_err NUV NUV_err BASS-g BASS-g_err decamDR1-g decamDR1-g_err \
         BASS-r BASS-r_err decamDR1-r decamDR1-r_err decamDR1-z decamDR1-z_err \
         WISE1 WISE1_err WISE2 WISE2_err WISE3 WISE3_err WISE4 WISE4_err"
    );

    let rows = read_rows(&text);
    assert_eq!(rows.len(), 2);

    // north rows come first, the zero-redshift galaxy is gone
    let north = &rows[0];
    assert_eq!(&north[..4], &["VFID0001", "0.01", "1.0000", "0.2000"]);
    assert_eq!(&north[6..10], &["1.0000", "0.2000", "nan", "nan"]);
    assert_eq!(&north[10..14], &["1.0000", "0.2000", "nan", "nan"]);
    assert_eq!(&north[14..16], &["nan", "nan"]);
    // a small negative flux survives, a 10 sigma one does not
    assert_eq!(&north[16..18], &["-0.0020", "0.0010"]);
    assert_eq!(&north[18..20], &["nan", "nan"]);
    // 0/0 is a missing measurement
    assert_eq!(&north[20..22], &["nan", "nan"]);
    assert_eq!(&north[22..24], &["1.0000", "0.2000"]);

    let south = &rows[1];
    assert_eq!(&south[..2], &["VFID0002", "0.02"]);
    assert_eq!(&south[6..10], &["nan", "nan", "2.0000", "0.5000"]);
    assert_eq!(&south[10..14], &["nan", "nan", "2.0000", "0.5000"]);
    assert_eq!(&south[14..16], &["2.0000", "0.5000"]);

    let w2 = manifest
        .bands
        .iter()
        .find(|report| report.band == Band::W2)
        .unwrap();
    assert_eq!(w2.clipped, 1);
    assert_eq!(w2.observed, 1);
    let w3 = manifest
        .bands
        .iter()
        .find(|report| report.band == Band::W3)
        .unwrap();
    assert_eq!(w3.missing, 1);

    let verified = verify_galaxy_data(destination.path()).unwrap();
    assert_eq!(verified, manifest);

    let ini = fs::read_to_string(destination.path().join(INI_FILE)).unwrap();
    assert!(ini.contains("data_file = galaxy_data.txt"));
    assert!(destination.path().join(INI_SPEC_FILE).is_file());
}

#[test]
fn test_prepare_inputs_creates_destination() {
    let catalog_dir = tempfile::tempdir().unwrap();
    let root = tempfile::tempdir().unwrap();
    let destination = root.path().join("runs").join("vf");
    write_synthetic_catalogs(catalog_dir.path(), &galaxies()).unwrap();
    let config = test_app_config(catalog_dir.path(), &destination);

    prepare_inputs(&config).unwrap();
    assert!(destination.join(GALAXY_DATA_FILE).is_file());
    assert!(destination.join(MANIFEST_FILE).is_file());
}

#[test]
fn test_missing_redshift_column() {
    let catalog_dir = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    write_synthetic_catalogs(catalog_dir.path(), &galaxies()).unwrap();
    let mut config = test_app_config(catalog_dir.path(), destination.path());
    config.columns.redshift = Some("REDSHIFT".to_string());

    match prepare_inputs(&config) {
        Err(PipelineError::Loading(TableError::Catalog(CatalogError::MissingColumn {
            column,
            catalog,
        }))) => {
            assert_eq!(column, "REDSHIFT");
            assert_eq!(catalog, "main.csv");
        }
        other => panic!("expected a missing column error, got {:?}", other),
    }
    assert!(!destination.path().join(GALAXY_DATA_FILE).exists());
}

#[test]
fn test_missing_catalog_file() {
    let catalog_dir = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    let config = test_app_config(catalog_dir.path(), destination.path());
    assert!(matches!(
        prepare_inputs(&config),
        Err(PipelineError::Loading(_))
    ));
}

#[test]
fn test_no_surviving_rows() {
    let catalog_dir = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    let galaxies: Vec<SyntheticGalaxy> = galaxies()
        .into_iter()
        .map(|galaxy| SyntheticGalaxy {
            redshift: -1.0,
            ..galaxy
        })
        .collect();
    write_synthetic_catalogs(catalog_dir.path(), &galaxies).unwrap();
    let config = test_app_config(catalog_dir.path(), destination.path());

    let manifest = prepare_inputs(&config).unwrap();
    assert_eq!(manifest.rows, 0);
    let text = fs::read_to_string(destination.path().join(GALAXY_DATA_FILE)).unwrap();
    assert_eq!(text.lines().count(), 1);
}

#[test]
fn test_truncated_data_fails_verification() {
    let catalog_dir = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    write_synthetic_catalogs(catalog_dir.path(), &galaxies()).unwrap();
    let config = test_app_config(catalog_dir.path(), destination.path());
    prepare_inputs(&config).unwrap();

    let data_path = destination.path().join(GALAXY_DATA_FILE);
    let text = fs::read_to_string(&data_path).unwrap();
    let truncated: Vec<&str> = text.lines().take(2).collect();
    fs::write(&data_path, truncated.join("\n")).unwrap();

    assert!(matches!(
        verify_galaxy_data(destination.path()),
        Err(WriterError::Incomplete { .. })
    ));
}

#[test]
fn test_zero_padded_ids_are_kept() {
    let catalog_dir = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    let galaxies: Vec<SyntheticGalaxy> = galaxies()
        .into_iter()
        .zip(["00123", "00042", "00007"])
        .map(|(galaxy, id)| SyntheticGalaxy {
            id: id.to_string(),
            ..galaxy
        })
        .collect();
    write_synthetic_catalogs(catalog_dir.path(), &galaxies).unwrap();
    let config = test_app_config(catalog_dir.path(), destination.path());

    prepare_inputs(&config).unwrap();
    let text = fs::read_to_string(destination.path().join(GALAXY_DATA_FILE)).unwrap();
    let ids: Vec<&str> = read_rows(&text).iter().map(|row| row[0]).collect();
    assert_eq!(ids, vec!["00042", "00123"]);
}

#[test]
fn test_id_with_whitespace_fails_serialization() {
    let catalog_dir = tempfile::tempdir().unwrap();
    let destination = tempfile::tempdir().unwrap();
    let mut galaxies = galaxies();
    galaxies[1].id = "NGC 1234".to_string();
    write_synthetic_catalogs(catalog_dir.path(), &galaxies).unwrap();
    let config = test_app_config(catalog_dir.path(), destination.path());

    match prepare_inputs(&config) {
        Err(PipelineError::Serialization(WriterError::InvalidId { row, id })) => {
            assert_eq!(row, 2);
            assert_eq!(id, "NGC 1234");
        }
        other => panic!("expected an invalid id error, got {:?}", other),
    }
    assert!(!destination.path().join(GALAXY_DATA_FILE).exists());
    assert!(!destination.path().join(MANIFEST_FILE).exists());
}
