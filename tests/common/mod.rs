//! Shared test utilities and fixture generators

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use hearth::pipeline::config::{
    DerivedFeature, DerivedKind, Formula, LevelRange, NeighborConfig, PresenceGroup, Term,
};
use hearth::pipeline::{save_dataset, PipelineConfig};
use polars::prelude::*;
use tempfile::TempDir;

pub const NEIGHBORHOODS: [&str; 4] = ["NAmes", "CollgCr", "OldTown", "Edwards"];

/// Rows where the garage is absent (GarageType missing)
pub fn garage_absent(i: usize) -> bool {
    i % 5 == 2
}

/// Rows where lot frontage is missing and left to nearest-neighbour imputation
pub fn frontage_missing(i: usize) -> bool {
    i % 7 == 3
}

/// Create a housing-like DataFrame with known structure
///
/// This DataFrame includes:
/// - `Id`: row identifier
/// - `LotArea`, `GrLivArea`: continuous areas
/// - `LotFrontage`: continuous with gaps (deferred to nearest neighbours)
/// - `Neighborhood`: nominal, with one rare value ("Blmngtn") on row 0
/// - `OverallQual`: numeric 1-10 rating
/// - `ExterQual`: text quality rating
/// - `GarageType`/`GarageFinish`/`GarageArea`: a presence group, absent every fifth row
/// - `YearBuilt`, `YrSold`: sources of the derived `HouseAge`
/// - `SalePrice`: positive target
pub fn housing_frame(rows: usize) -> DataFrame {
    let mut id = Vec::with_capacity(rows);
    let mut lot_area = Vec::with_capacity(rows);
    let mut frontage = Vec::with_capacity(rows);
    let mut living = Vec::with_capacity(rows);
    let mut neighborhood = Vec::with_capacity(rows);
    let mut quality = Vec::with_capacity(rows);
    let mut exter = Vec::with_capacity(rows);
    let mut garage_type = Vec::with_capacity(rows);
    let mut garage_finish = Vec::with_capacity(rows);
    let mut garage_area = Vec::with_capacity(rows);
    let mut year_built = Vec::with_capacity(rows);
    let mut year_sold = Vec::with_capacity(rows);
    let mut price = Vec::with_capacity(rows);

    for i in 0..rows {
        let area = 900.0 + ((i * 97) % 1500) as f64 + 0.25;
        let qual = 3 + (i % 7) as i64;

        id.push(i as i64 + 1);
        lot_area.push(7000.0 + ((i * 373) % 5000) as f64 + 0.5);
        frontage.push(if frontage_missing(i) {
            None
        } else {
            Some(50.0 + ((i * 13) % 40) as f64 + 0.5)
        });
        living.push(area);
        neighborhood.push(if i == 0 { "Blmngtn" } else { NEIGHBORHOODS[i % 4] });
        quality.push(qual);
        exter.push(["TA", "Gd", "TA", "Ex", "Fa"][i % 5]);
        if garage_absent(i) {
            garage_type.push(None);
            garage_finish.push(None);
            garage_area.push(None);
        } else {
            garage_type.push(Some(["Attchd", "Detchd"][i % 2]));
            garage_finish.push(Some(["Unf", "RFn", "Fin"][i % 3]));
            garage_area.push(Some(200.0 + ((i * 31) % 400) as f64 + 0.5));
        }
        year_built.push(1950 + ((i * 7) % 60) as i64);
        year_sold.push(2006 + (i % 5) as i64);
        price.push(50_000.0 + 80.0 * area + 10_000.0 * qual as f64 + ((i * 1231) % 9000) as f64);
    }

    df! {
        "Id" => id,
        "LotArea" => lot_area,
        "LotFrontage" => frontage,
        "GrLivArea" => living,
        "Neighborhood" => neighborhood,
        "OverallQual" => quality,
        "ExterQual" => exter,
        "GarageType" => garage_type,
        "GarageFinish" => garage_finish,
        "GarageArea" => garage_area,
        "YearBuilt" => year_built,
        "YrSold" => year_sold,
        "SalePrice" => price,
    }
    .unwrap()
}

/// The housing frame without its target column, as new rows arrive at prediction time
pub fn housing_rows_without_target(rows: usize) -> DataFrame {
    housing_frame(rows).drop("SalePrice").unwrap()
}

/// One unlabeled row with every column filled in
pub fn single_row(neighborhood: &str, living_area: f64) -> DataFrame {
    df! {
        "Id" => [999i64],
        "LotArea" => [9000.5f64],
        "LotFrontage" => [Some(70.5f64)],
        "GrLivArea" => [living_area],
        "Neighborhood" => [neighborhood],
        "OverallQual" => [6i64],
        "ExterQual" => ["Gd"],
        "GarageType" => [Some("Attchd")],
        "GarageFinish" => [Some("RFn")],
        "GarageArea" => [Some(420.5f64)],
        "YearBuilt" => [1990i64],
        "YrSold" => [2008i64],
    }
    .unwrap()
}

/// One unlabeled row where every feature is missing
pub fn all_missing_row() -> DataFrame {
    df! {
        "Id" => [1000i64],
        "LotArea" => [None::<f64>],
        "LotFrontage" => [None::<f64>],
        "GrLivArea" => [None::<f64>],
        "Neighborhood" => [None::<&str>],
        "OverallQual" => [None::<i64>],
        "ExterQual" => [None::<&str>],
        "GarageType" => [None::<&str>],
        "GarageFinish" => [None::<&str>],
        "GarageArea" => [None::<f64>],
        "YearBuilt" => [None::<i64>],
        "YrSold" => [None::<i64>],
    }
    .unwrap()
}

/// Configuration matching [`housing_frame`]
pub fn housing_config() -> PipelineConfig {
    let quality: Vec<String> = ["None", "Po", "Fa", "TA", "Gd", "Ex"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut ordinal_levels = BTreeMap::new();
    ordinal_levels.insert("ExterQual".to_string(), quality);
    ordinal_levels.insert(
        "GarageFinish".to_string(),
        vec!["None".into(), "Unf".into(), "RFn".into(), "Fin".into()],
    );

    let mut config = PipelineConfig::default();
    config.target = "SalePrice".to_string();
    config.id_columns = vec!["Id".to_string()];
    config.schema.ordinal_levels = ordinal_levels;
    config
        .schema
        .numeric_ordinals
        .insert("OverallQual".to_string(), LevelRange { min: 1, max: 10 });
    config.imputation.presence_groups = vec![PresenceGroup {
        presence: "GarageType".to_string(),
        members: vec!["GarageFinish".to_string(), "GarageArea".to_string()],
    }];
    config.imputation.deferred = Some(NeighborConfig {
        column: "LotFrontage".to_string(),
        k: 3,
        predictors: vec![
            "LotArea".to_string(),
            "GrLivArea".to_string(),
            "Neighborhood".to_string(),
            "OverallQual".to_string(),
        ],
    });
    config.engineering.features = vec![
        DerivedFeature {
            name: "HouseAge".to_string(),
            kind: DerivedKind::Continuous,
            formula: Formula::Age {
                year: "YearBuilt".to_string(),
                reference: "YrSold".to_string(),
            },
        },
        DerivedFeature {
            name: "TotalArea".to_string(),
            kind: DerivedKind::Continuous,
            formula: Formula::WeightedSum {
                terms: vec![
                    Term {
                        column: "GrLivArea".to_string(),
                        weight: 1.0,
                    },
                    Term {
                        column: "GarageArea".to_string(),
                        weight: 1.0,
                    },
                ],
            },
        },
    ];
    config
}

/// Create a temporary directory for test outputs
pub fn create_temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temp directory")
}

/// Write a DataFrame to a CSV file in the given directory
pub fn write_csv(df: &DataFrame, dir: &TempDir, name: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut df = df.clone();
    save_dataset(&mut df, &path).expect("Failed to write CSV");
    path
}

/// Assert two floating-point values are within tolerance
pub fn assert_close(actual: f64, expected: f64, tolerance: f64) {
    assert!(
        (actual - expected).abs() <= tolerance,
        "Expected {} to be within {} of {}",
        actual,
        tolerance,
        expected
    );
}
