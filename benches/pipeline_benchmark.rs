//! Benchmarks for fitting and applying the preprocessing pipeline
//!
//! Run with: cargo bench --bench pipeline_benchmark

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use polars::prelude::*;
use rand::prelude::*;
use rand::SeedableRng;

use hearth::pipeline::correlation::select_uncorrelated;
use hearth::pipeline::config::NeighborConfig;
use hearth::pipeline::{Feature, FittedPipeline, PipelineConfig};

const NEIGHBORHOODS: [&str; 6] = ["NAmes", "CollgCr", "OldTown", "Edwards", "Somerst", "Gilbert"];
const QUALITY: [&str; 4] = ["Fa", "TA", "Gd", "Ex"];

/// Generate a housing-like frame with gaps, skew and a rare category
fn generate_housing_frame(n_rows: usize, seed: u64) -> DataFrame {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);

    let mut lot_area = Vec::with_capacity(n_rows);
    let mut frontage = Vec::with_capacity(n_rows);
    let mut living = Vec::with_capacity(n_rows);
    let mut neighborhood = Vec::with_capacity(n_rows);
    let mut exter_qual = Vec::with_capacity(n_rows);
    let mut garage_type = Vec::with_capacity(n_rows);
    let mut garage_area = Vec::with_capacity(n_rows);
    let mut year_built = Vec::with_capacity(n_rows);
    let mut yr_sold = Vec::with_capacity(n_rows);
    let mut price = Vec::with_capacity(n_rows);

    for i in 0..n_rows {
        // Skewed lot sizes
        let lot = 2000.0 + rng.gen::<f64>().powi(3) * 40_000.0;
        let area = 600.0 + rng.gen::<f64>() * 2400.0;
        let built = rng.gen_range(1900..2010);
        let sold = rng.gen_range(2006..2011);
        let has_garage = rng.gen::<f64>() > 0.1;
        let quality = rng.gen_range(0..QUALITY.len());

        lot_area.push(lot);
        frontage.push(if rng.gen::<f64>() < 0.15 {
            None
        } else {
            Some(lot.sqrt() * 0.6 + rng.gen::<f64>() * 5.0)
        });
        living.push(area);
        neighborhood.push(if i % 97 == 0 {
            "Blueste"
        } else {
            NEIGHBORHOODS[rng.gen_range(0..NEIGHBORHOODS.len())]
        });
        exter_qual.push(QUALITY[quality]);
        garage_type.push(has_garage.then_some("Attchd"));
        garage_area.push(has_garage.then(|| 200.0 + rng.gen::<f64>() * 600.0));
        year_built.push(built);
        yr_sold.push(sold.max(built));
        price.push(30_000.0 + area * 80.0 + quality as f64 * 15_000.0 + rng.gen::<f64>() * 20_000.0);
    }

    df! {
        "LotArea" => lot_area,
        "LotFrontage" => frontage,
        "GrLivArea" => living,
        "Neighborhood" => neighborhood,
        "ExterQual" => exter_qual,
        "GarageType" => garage_type,
        "GarageArea" => garage_area,
        "YearBuilt" => year_built,
        "YrSold" => yr_sold,
        "SalePrice" => price,
    }
    .expect("Failed to create DataFrame")
}

fn benchmark_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.schema.ordinal_levels.insert(
        "ExterQual".to_string(),
        ["Po", "Fa", "TA", "Gd", "Ex"].iter().map(|s| s.to_string()).collect(),
    );
    config.imputation.deferred = Some(NeighborConfig {
        column: "LotFrontage".to_string(),
        k: 5,
        predictors: vec!["LotArea".to_string(), "Neighborhood".to_string()],
    });
    config
}

/// Benchmark a full fit for varying row counts
fn benchmark_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_fit");
    group.sample_size(10);

    for n_rows in [500, 1_500, 5_000] {
        let df = generate_housing_frame(n_rows, 42);
        let config = benchmark_config();

        group.throughput(Throughput::Elements(n_rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n_rows), &df, |b, df| {
            b.iter(|| FittedPipeline::fit(black_box(config.clone()), black_box(df)).unwrap());
        });
    }

    group.finish();
}

/// Benchmark applying a fitted pipeline to new rows
fn benchmark_transform(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_transform");
    group.sample_size(20);

    let fitted = FittedPipeline::fit(benchmark_config(), &generate_housing_frame(1_500, 42)).unwrap();

    for n_rows in [100, 1_000, 5_000] {
        let df = generate_housing_frame(n_rows, 7);

        group.throughput(Throughput::Elements(n_rows as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n_rows), &df, |b, df| {
            b.iter(|| fitted.transform(black_box(df)).unwrap());
        });
    }

    group.finish();
}

/// Benchmark the correlation filter for varying feature counts
fn benchmark_correlation_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlation_filter");
    group.sample_size(20);

    let n_rows = 2_000;
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);

    for n_features in [25, 100, 250] {
        let mut features: Vec<Feature> = Vec::with_capacity(n_features);
        for j in 0..n_features {
            // Every fourth feature is a noisy copy of an earlier one
            let values: Vec<f64> = if j % 4 == 3 {
                features[j - 3]
                    .values
                    .iter()
                    .map(|v| v + rng.gen::<f64>() * 0.1)
                    .collect()
            } else {
                (0..n_rows).map(|_| rng.gen::<f64>()).collect()
            };
            let name = format!("feature_{}", j);
            features.push(Feature::new(name.clone(), name, values));
        }

        group.throughput(Throughput::Elements(((n_features * (n_features - 1)) / 2) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n_features), &features, |b, features| {
            b.iter(|| select_uncorrelated(black_box(features), black_box(0.9)));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_fit,
    benchmark_transform,
    benchmark_correlation_filter
);
criterion_main!(benches);
