//! Tests for IQR clipping of continuous features

use hearth::pipeline::outliers::ClipBounds;
use hearth::pipeline::{FittedPipeline, Transformed};

#[path = "common/mod.rs"]
mod common;

use common::*;

fn column_of(out: &Transformed, name: &str) -> Vec<f64> {
    let j = out
        .matrix
        .names()
        .iter()
        .position(|n| n == name)
        .unwrap_or_else(|| panic!("{} not in output", name));
    out.matrix.column(j)
}

#[test]
fn test_iqr_bounds() {
    let bounds = ClipBounds::from_values("GrLivArea", &[0.0, 10.0, 30.0, 50.0, 90.0], 1.5).unwrap();
    assert_close(bounds.q1, 10.0, 1e-12);
    assert_close(bounds.q3, 50.0, 1e-12);
    assert_close(bounds.lower, -50.0, 1e-12);
    assert_close(bounds.upper, 110.0, 1e-12);

    assert_eq!(bounds.clip(500.0), 110.0);
    assert_eq!(bounds.clip(-80.0), -50.0);
    assert_eq!(bounds.clip(42.0), 42.0);
}

#[test]
fn test_empty_column_has_no_bounds() {
    assert!(ClipBounds::from_values("x", &[], 1.5).is_none());
}

#[test]
fn test_only_continuous_columns_are_clipped() {
    let fitted = FittedPipeline::fit(housing_config(), &housing_frame(40)).unwrap();
    let outliers = fitted.outliers();

    for name in ["LotArea", "LotFrontage", "GrLivArea", "GarageArea", "HouseAge", "TotalArea"] {
        assert!(outliers.get(name).is_some(), "{} should have bounds", name);
    }
    for name in ["YrSold", "OverallQual", "ExterQual", "Neighborhood_NAmes"] {
        assert!(outliers.get(name).is_none(), "{} should not be clipped", name);
    }
}

#[test]
fn test_extreme_value_clipped_to_fitted_bound() {
    let mut config = housing_config();
    // keep every feature so the clipped column is visible in the output
    config.filter.correlation_threshold = 1.0;
    let fitted = FittedPipeline::fit(config, &housing_frame(40)).unwrap();
    let upper = fitted.outliers().get("GrLivArea").unwrap().upper;

    let extreme = fitted.transform(&single_row("NAmes", 1.0e7)).unwrap();
    let at_bound = fitted.transform(&single_row("NAmes", upper)).unwrap();

    let a = column_of(&extreme, "GrLivArea");
    let b = column_of(&at_bound, "GrLivArea");
    assert_close(a[0], b[0], 1e-9);
    assert!(a[0].is_finite());
}

#[test]
fn test_clipping_can_be_disabled() {
    let mut config = housing_config();
    config.clipping.enabled = false;
    let fitted = FittedPipeline::fit(config, &housing_frame(40)).unwrap();
    assert!(fitted.outliers().bounds.is_empty());
}
