//! Hearth: housing data preprocessing CLI
//!
//! Fits the preprocessing pipeline on a training file, applies a saved
//! pipeline to new rows, and cross-validates an elastic-net model over it.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use tracing_subscriber::EnvFilter;

use hearth::cli::{confirm_overwrite, Cli, Commands, CvArgs, FitArgs, TransformArgs};
use hearth::model::{grid_search, parameter_grid, ElasticNetParams, KFold};
use hearth::pipeline::{
    dataset_stats, load_dataset, save_dataset, FittedPipeline, Pipeline, Table, Transformed,
};
use hearth::report::{export_fit_report, render_grid_results, FitReport, PreprocessSummary};
use hearth::utils::{
    create_spinner, finish_with_success, finish_with_warning, print_banner, print_completion,
    print_config, print_count, print_info, print_step_header, print_step_time, print_success,
    print_warning,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    print_banner(env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Fit(args) => run_fit(args, cli.no_confirm),
        Commands::Transform(args) => run_transform(args, cli.no_confirm),
        Commands::Cv(args) => run_cv(args),
    }
}

fn run_fit(args: &FitArgs, no_confirm: bool) -> Result<()> {
    let config = args.pipeline.build_config()?;
    let output_path = args.output_path();
    let state_path = args.state_path();
    print_config(&args.input, Some(output_path.as_path()), &config);

    for path in [&output_path, &state_path] {
        if !confirm_overwrite(path, no_confirm)? {
            println!("Cancelled by user.");
            return Ok(());
        }
    }

    // Step 1: Load
    print_step_header(1, "Load Dataset");
    let step_start = Instant::now();
    let df = load_with_stats(&args.input)?;
    let mut summary = PreprocessSummary::new(df.width());
    summary.load_time = step_start.elapsed();
    print_step_time(summary.load_time);

    // Step 2: Fit
    print_step_header(2, "Fit Pipeline");
    let step_start = Instant::now();
    let spinner = create_spinner("Fitting imputation, encoding and filters...");
    let mut pipeline = Pipeline::new(config);
    let fitted = pipeline.fit(&df).context("Failed to fit pipeline")?;
    finish_with_success(&spinner, "Pipeline fitted");
    summary.fit_time = step_start.elapsed();
    summary.record_fit(fitted);

    print_count(
        "column(s) dropped for missing values",
        summary.dropped_missing.len(),
        Some(&format!(
            "(threshold: {:.0}%)",
            fitted.config().imputation.missing_threshold * 100.0
        )),
    );
    print_count(
        "near-zero-variance feature(s)",
        summary.dropped_variance.len(),
        None,
    );
    print_count(
        "correlated feature(s)",
        summary.dropped_correlation.len(),
        Some(&format!(
            "(threshold: {:.2})",
            fitted.config().filter.correlation_threshold
        )),
    );
    print_step_time(summary.fit_time);

    // Step 3: Transform the fit set through the frozen state
    print_step_header(3, "Transform Training Rows");
    let step_start = Instant::now();
    let transformed = transform_with_spinner(fitted, &df)?;
    summary.transform_time = step_start.elapsed();
    summary.unseen_warnings = transformed.warnings.len();
    print_step_time(summary.transform_time);

    // Step 4: Save
    print_step_header(4, "Save Outputs");
    let step_start = Instant::now();
    write_matrix(&transformed, &fitted.config().target, &output_path)?;
    fitted
        .save(&state_path)
        .with_context(|| format!("Failed to save fitted pipeline to {}", state_path.display()))?;
    print_success(&format!("Fitted pipeline saved to {}", state_path.display()));
    summary.save_time = step_start.elapsed();

    if args.report {
        let report_path = args.report_path();
        let report = FitReport::build(
            fitted,
            &summary,
            &args.input.display().to_string(),
            Some(output_path.display().to_string().as_str()),
        )
        .with_warnings(transformed.warnings.clone());
        export_fit_report(&report, &report_path)?;
        print_success(&format!("Fit report saved to {}", report_path.display()));
    }
    print_step_time(summary.save_time);

    summary.display();
    print_completion();
    Ok(())
}

fn run_transform(args: &TransformArgs, no_confirm: bool) -> Result<()> {
    let output_path = args.output_path();
    let fitted = FittedPipeline::load(&args.state)
        .with_context(|| format!("Failed to load fitted pipeline {}", args.state.display()))?;
    print_config(&args.input, Some(output_path.as_path()), fitted.config());

    if !confirm_overwrite(&output_path, no_confirm)? {
        println!("Cancelled by user.");
        return Ok(());
    }

    print_step_header(1, "Load Dataset");
    let step_start = Instant::now();
    let df = load_with_stats(&args.input)?;
    print_step_time(step_start.elapsed());

    print_step_header(2, "Transform");
    let step_start = Instant::now();
    let pipeline = Pipeline::from_fitted(fitted);
    let spinner = create_spinner("Applying fitted pipeline...");
    let transformed = pipeline.transform(&df).context("Failed to transform dataset")?;
    report_warnings(&spinner, &transformed);
    print_step_time(step_start.elapsed());

    print_step_header(3, "Save Outputs");
    let target = pipeline
        .fitted()
        .map(|f| f.config().target.clone())
        .unwrap_or_default();
    write_matrix(&transformed, &target, &output_path)?;

    print_completion();
    Ok(())
}

fn run_cv(args: &CvArgs) -> Result<()> {
    let config = args.pipeline.build_config()?;
    print_config(&args.input, args.report.as_deref(), &config);

    print_step_header(1, "Load Dataset");
    let df = load_with_stats(&args.input)?;
    let table = Table::from_frame(&df, &config.na_tokens).context("Failed to read dataset")?;

    print_step_header(2, "Cross-Validation");
    let folds = KFold {
        n_splits: args.folds,
        seed: args.seed,
        shuffle: true,
    }
    .split(table.height())
    .context("Failed to assign folds")?;
    let candidates = parameter_grid(ElasticNetParams::default(), &args.alpha, &args.l1_ratio);
    print_info(&format!(
        "{} candidate(s) x {} fold(s)",
        candidates.len(),
        folds.len()
    ));

    let step_start = Instant::now();
    let spinner = create_spinner("Fitting fold pipelines and models...");
    let results = grid_search(&config, &table, &folds, &candidates)
        .context("Cross-validation failed")?;
    finish_with_success(&spinner, "Grid search complete");
    print_step_time(step_start.elapsed());

    println!();
    for line in render_grid_results(&results).lines() {
        println!("    {}", line);
    }

    if let Some(best) = results.first() {
        println!();
        println!(
            "    {} alpha={} l1_ratio={} (log RMSE {:.4})",
            style("Best:").green().bold(),
            best.params.alpha,
            best.params.l1_ratio,
            best.report.mean_rmse_log
        );
    }

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&results)
            .context("Failed to serialize cross-validation results")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write results to {}", path.display()))?;
        print_success(&format!("Results saved to {}", path.display()));
    }

    print_completion();
    Ok(())
}

fn load_with_stats(path: &Path) -> Result<polars::prelude::DataFrame> {
    let spinner = create_spinner(&format!("Loading {}...", path.display()));
    let df = load_dataset(path)?;
    finish_with_success(&spinner, "Dataset loaded");

    let stats = dataset_stats(&df);
    println!("\n    {} Dataset Statistics:", style("✧").cyan());
    println!("      Rows: {}", stats.rows);
    println!("      Columns: {}", stats.columns);
    println!("      Estimated memory: {:.2} MB", stats.memory_mb);
    Ok(df)
}

fn transform_with_spinner(
    fitted: &FittedPipeline,
    df: &polars::prelude::DataFrame,
) -> Result<Transformed> {
    let spinner = create_spinner("Applying fitted state...");
    let transformed = fitted.transform(df).context("Failed to transform dataset")?;
    report_warnings(&spinner, &transformed);
    Ok(transformed)
}

fn report_warnings(spinner: &indicatif::ProgressBar, transformed: &Transformed) {
    if transformed.warnings.is_empty() {
        finish_with_success(spinner, "Transform complete");
        return;
    }
    finish_with_warning(
        spinner,
        &format!(
            "Transform complete with {} warning(s)",
            transformed.warnings.len()
        ),
    );
    for warning in &transformed.warnings {
        print_warning(&warning.to_string());
    }
}

fn write_matrix(transformed: &Transformed, target: &str, path: &Path) -> Result<()> {
    let target_column = transformed
        .target
        .as_deref()
        .map(|values| (target, values));
    let mut frame = transformed
        .matrix
        .to_frame(target_column)
        .context("Failed to build output frame")?;
    save_dataset(&mut frame, path)?;
    print_success(&format!(
        "Wrote {} x {} matrix to {}",
        transformed.matrix.nrows(),
        transformed.matrix.ncols(),
        path.display()
    ));
    Ok(())
}

