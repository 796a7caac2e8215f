//! Integration tests for the full preprocessing pipeline

use hearth::pipeline::*;
use polars::prelude::*;

#[path = "common/mod.rs"]
mod common;

use common::*;

#[test]
fn test_fit_transform_produces_dense_matrix() {
    let df = housing_frame(40);
    let (fitted, out) = FittedPipeline::fit_transform(housing_config(), &df).unwrap();

    assert_eq!(out.matrix.nrows(), 40);
    assert_eq!(out.matrix.names(), fitted.output_names());
    assert!(out.matrix.ncols() > 0);
    for i in 0..out.matrix.nrows() {
        assert!(
            out.matrix.row(i).iter().all(|v| v.is_finite()),
            "Row {} contains a missing or non-finite value",
            i
        );
    }
    assert_eq!(out.target.as_ref().map(Vec::len), Some(40));

    // Identifier and target never become features
    assert!(!out.matrix.names().iter().any(|n| n == "Id" || n == "SalePrice"));
    // Derived features enter the schema
    assert!(fitted.feature_schema().contains("HouseAge"));
    assert!(fitted.feature_schema().contains("TotalArea"));
}

#[test]
fn test_fit_is_deterministic() {
    let df = housing_frame(40);
    let first = FittedPipeline::fit(housing_config(), &df).unwrap();
    let second = FittedPipeline::fit(housing_config(), &df).unwrap();
    assert_eq!(first, second);

    let a = first.transform(&df).unwrap();
    let b = second.transform(&df).unwrap();
    for i in 0..a.matrix.nrows() {
        assert_eq!(a.matrix.row(i), b.matrix.row(i));
    }
}

#[test]
fn test_transform_does_not_touch_fitted_state() {
    let train = housing_frame(30);
    let fitted = FittedPipeline::fit(housing_config(), &train).unwrap();
    let before = serde_json::to_string(&fitted).unwrap();

    let holdout = housing_frame(40).slice(30, 10);
    fitted.transform(&holdout).unwrap();
    fitted.transform(&all_missing_row()).unwrap();

    assert_eq!(serde_json::to_string(&fitted).unwrap(), before);
}

#[test]
fn test_rows_are_transformed_independently() {
    let df = housing_frame(40);
    let fitted = FittedPipeline::fit(housing_config(), &df).unwrap();
    let batch = fitted.transform(&df).unwrap();

    for row in [0usize, 3, 17] {
        let alone = fitted.transform(&df.slice(row as i64, 1)).unwrap();
        let expected = batch.matrix.row(row);
        for (a, b) in alone.matrix.row(0).iter().zip(&expected) {
            assert_close(*a, *b, 1e-9);
        }
    }
}

#[test]
fn test_target_round_trip() {
    let df = housing_frame(40);
    let (fitted, out) = FittedPipeline::fit_transform(housing_config(), &df).unwrap();
    let prices: Vec<f64> = df
        .column("SalePrice")
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect();

    let restored = fitted.inverse_transform_target(&out.target.unwrap());
    for (r, p) in restored.iter().zip(&prices) {
        assert_close(*r, *p, 1e-6 * p);
    }
}

#[test]
fn test_unlabeled_rows_have_no_target() {
    let fitted = FittedPipeline::fit(housing_config(), &housing_frame(40)).unwrap();
    let out = fitted.transform(&housing_rows_without_target(5)).unwrap();
    assert_eq!(out.matrix.nrows(), 5);
    assert!(out.target.is_none());
}

#[test]
fn test_partly_labeled_rows_have_no_target() {
    let fitted = FittedPipeline::fit(housing_config(), &housing_frame(40)).unwrap();
    let mut rows = housing_frame(3);
    rows.with_column(Column::new(
        "SalePrice".into(),
        vec![Some(150_000.0f64), None, Some(180_000.0)],
    ))
    .unwrap();

    let out = fitted.transform(&rows).unwrap();
    assert_eq!(out.matrix.nrows(), 3);
    assert!(out.target.is_none());
}

#[test]
fn test_fit_ignores_rows_outside_the_fit_set() {
    let df = housing_frame(40);
    let clean = FittedPipeline::fit(housing_config(), &df.slice(0, 30)).unwrap();

    // Rows 30..40 get extreme areas, an unseen neighbourhood and inflated prices
    let mut tail = df.slice(30, 10);
    let prices: Vec<f64> = tail
        .column("SalePrice")
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .map(|p| p * 10.0)
        .collect();
    tail.with_column(Column::new("GrLivArea".into(), vec![1.0e7f64; 10]))
        .unwrap();
    tail.with_column(Column::new("Neighborhood".into(), vec!["Veenker"; 10]))
        .unwrap();
    tail.with_column(Column::new("SalePrice".into(), prices))
        .unwrap();
    let perturbed = df.slice(0, 30).vstack(&tail).unwrap();
    assert_eq!(perturbed.height(), 40);

    let refit = FittedPipeline::fit(housing_config(), &perturbed.slice(0, 30)).unwrap();
    assert_eq!(clean, refit);

    // Row selection on the table, as cross-validation folds use it
    let table = Table::from_frame(&perturbed, &housing_config().na_tokens).unwrap();
    let rows: Vec<usize> = (0..30).collect();
    let from_table = FittedPipeline::fit_table(housing_config(), &table.select_rows(&rows)).unwrap();
    assert_eq!(clean, from_table);

    let holdout = df.slice(30, 10);
    let a = clean.transform(&holdout).unwrap();
    let b = from_table.transform(&holdout).unwrap();
    for i in 0..a.matrix.nrows() {
        assert_eq!(a.matrix.row(i), b.matrix.row(i));
    }
}

#[test]
fn test_schema_stable_under_column_reordering() {
    let df = housing_frame(40);
    let fitted = FittedPipeline::fit(housing_config(), &df).unwrap();

    let rows = housing_rows_without_target(10);
    let mut names: Vec<String> = rows
        .get_column_names()
        .iter()
        .map(|s| s.to_string())
        .collect();
    names.reverse();
    let reordered = rows.select(names).unwrap();

    let a = fitted.transform(&rows).unwrap();
    let b = fitted.transform(&reordered).unwrap();
    assert_eq!(a.matrix.names(), b.matrix.names());
    assert_eq!(a.matrix.names(), fitted.output_names());
    for i in 0..a.matrix.nrows() {
        assert_eq!(a.matrix.row(i), b.matrix.row(i));
    }
}

#[test]
fn test_all_missing_row_is_filled() {
    let fitted = FittedPipeline::fit(housing_config(), &housing_frame(40)).unwrap();
    let out = fitted.transform(&all_missing_row()).unwrap();

    assert_eq!(out.matrix.nrows(), 1);
    assert_eq!(out.matrix.ncols(), fitted.output_names().len());
    assert!(out.matrix.row(0).iter().all(|v| v.is_finite()));
}

#[test]
fn test_unknown_column_rejected() {
    let fitted = FittedPipeline::fit(housing_config(), &housing_frame(40)).unwrap();
    let mut rows = housing_rows_without_target(3);
    rows.with_column(Column::new("PoolArea".into(), vec![0.0f64; 3]))
        .unwrap();

    let err = fitted.transform(&rows).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Schema(SchemaError::UnknownColumn(ref name)) if name == "PoolArea"
    ));
}

#[test]
fn test_missing_feature_column_rejected() {
    let fitted = FittedPipeline::fit(housing_config(), &housing_frame(40)).unwrap();
    let rows = housing_rows_without_target(3).drop("ExterQual").unwrap();

    let err = fitted.transform(&rows).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Schema(SchemaError::MissingColumn(ref name)) if name == "ExterQual"
    ));
}

#[test]
fn test_configured_drop_column_is_accepted_later() {
    let mut config = housing_config();
    config.drop_columns = vec!["LotArea".to_string()];
    config.imputation.deferred = None;

    let fitted = FittedPipeline::fit(config, &housing_frame(40)).unwrap();
    assert!(!fitted.output_names().iter().any(|n| n == "LotArea"));
    // Rows still carrying the dropped column conform
    assert!(fitted.transform(&housing_rows_without_target(4)).is_ok());
}

#[test]
fn test_invalid_config_rejected_before_fit() {
    let mut config = housing_config();
    config.imputation.missing_threshold = 1.5;

    let err = FittedPipeline::fit(config, &housing_frame(40)).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidConfig(_)));
}

#[test]
fn test_missing_target_rejected() {
    let err = FittedPipeline::fit(housing_config(), &housing_rows_without_target(10)).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Schema(SchemaError::MissingColumn(ref name)) if name == "SalePrice"
    ));
}

#[test]
fn test_pipeline_state_machine() {
    let df = housing_frame(40);
    let mut pipeline = Pipeline::new(housing_config());
    assert_eq!(pipeline.state(), PipelineState::Unfit);
    assert!(matches!(pipeline.transform(&df), Err(PipelineError::NotFitted)));
    assert!(matches!(
        pipeline.inverse_transform_target(&[1.0]),
        Err(PipelineError::NotFitted)
    ));

    pipeline.fit(&df).unwrap();
    assert_eq!(pipeline.state(), PipelineState::Fit);
    assert!(matches!(pipeline.fit(&df), Err(PipelineError::AlreadyFitted)));

    let out = pipeline.transform(&df).unwrap();
    assert_eq!(out.matrix.nrows(), 40);
    assert_eq!(pipeline.state(), PipelineState::Fit);
}

#[test]
fn test_concurrent_transforms_share_fitted_state() {
    let df = housing_frame(40);
    let fitted = FittedPipeline::fit(housing_config(), &df).unwrap();
    let expected = fitted.transform(&df).unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| fitted.transform(&df).unwrap()))
            .collect();
        for handle in handles {
            let out = handle.join().unwrap();
            assert_eq!(out.matrix.row(5), expected.matrix.row(5));
        }
    });
}

