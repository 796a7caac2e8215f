//! Preprocessing summary table for the terminal

use std::time::Duration;

use comfy_table::{presets::UTF8_FULL_CONDENSED, Attribute, Cell, Color, Table};
use console::style;

use crate::model::GridResult;
use crate::pipeline::filter::DropReason;
use crate::pipeline::FittedPipeline;

/// Counts and timings of one fit run
#[derive(Debug, Default, Clone)]
pub struct PreprocessSummary {
    pub initial_columns: usize,
    pub encoded_features: usize,
    pub final_features: usize,
    pub dropped_missing: Vec<String>,
    pub dropped_variance: Vec<String>,
    pub dropped_correlation: Vec<String>,
    pub unseen_warnings: usize,
    pub load_time: Duration,
    pub fit_time: Duration,
    pub transform_time: Duration,
    pub save_time: Duration,
}

impl PreprocessSummary {
    pub fn new(initial_columns: usize) -> Self {
        Self {
            initial_columns,
            ..Default::default()
        }
    }

    /// Fill the drop lists and feature counts from a fitted pipeline.
    pub fn record_fit(&mut self, fitted: &FittedPipeline) {
        let filter = fitted.filter();
        self.dropped_missing = fitted.imputation().dropped_names();
        self.dropped_variance =
            filter.dropped_names(|r| !matches!(r, DropReason::Correlated { .. }));
        self.dropped_correlation =
            filter.dropped_names(|r| matches!(r, DropReason::Correlated { .. }));
        self.encoded_features = filter.kept.len() + filter.dropped.len();
        self.final_features = filter.kept.len();
    }

    pub fn total_time(&self) -> Duration {
        self.load_time + self.fit_time + self.transform_time + self.save_time
    }

    pub fn render(&self) -> String {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL_CONDENSED);
        table.set_header(vec![
            Cell::new("Metric").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
        ]);

        let drop_cell = |count: usize| {
            Cell::new(count).fg(if count == 0 { Color::White } else { Color::Red })
        };

        table.add_row(vec![Cell::new("Input Columns"), Cell::new(self.initial_columns)]);
        table.add_row(vec![
            Cell::new("Dropped (Missing)"),
            drop_cell(self.dropped_missing.len()),
        ]);
        table.add_row(vec![
            Cell::new("Encoded Features"),
            Cell::new(self.encoded_features),
        ]);
        table.add_row(vec![
            Cell::new("Dropped (Low Variance)"),
            drop_cell(self.dropped_variance.len()),
        ]);
        table.add_row(vec![
            Cell::new("Dropped (Correlation)"),
            drop_cell(self.dropped_correlation.len()),
        ]);
        table.add_row(vec![
            Cell::new("Final Features"),
            Cell::new(self.final_features)
                .fg(Color::Green)
                .add_attribute(Attribute::Bold),
        ]);
        if self.unseen_warnings > 0 {
            table.add_row(vec![
                Cell::new("Unseen Categories"),
                Cell::new(self.unseen_warnings).fg(Color::Yellow),
            ]);
        }
        table.add_row(vec![
            Cell::new("Total Time"),
            Cell::new(format!("{:.2}s", self.total_time().as_secs_f64())),
        ]);

        table.to_string()
    }

    pub fn display(&self) {
        println!();
        println!("    {}", style("PREPROCESSING SUMMARY").white().bold());
        println!("    {}", style("─".repeat(50)).dim());
        println!();

        for line in self.render().lines() {
            println!("    {}", line);
        }

        let groups = [
            ("High Missing Values", &self.dropped_missing),
            ("Low Variance", &self.dropped_variance),
            ("High Correlation", &self.dropped_correlation),
        ];
        if groups.iter().all(|(_, names)| names.is_empty()) {
            return;
        }

        println!();
        println!("    {}", style("DROPPED COLUMNS").white().bold());
        println!("    {}", style("─".repeat(50)).dim());
        for (title, names) in groups {
            if names.is_empty() {
                continue;
            }
            println!();
            println!(
                "      {} {}:",
                style(title).yellow(),
                style(format!("({})", names.len())).dim()
            );
            for name in names {
                println!("        {} {}", style("•").dim(), name);
            }
        }
    }
}

/// Ranked cross-validation table, best candidate first.
pub fn render_grid_results(results: &[GridResult]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL_CONDENSED);
    table.set_header(vec![
        Cell::new("Rank").add_attribute(Attribute::Bold),
        Cell::new("Alpha").add_attribute(Attribute::Bold),
        Cell::new("L1 Ratio").add_attribute(Attribute::Bold),
        Cell::new("RMSE (log)").add_attribute(Attribute::Bold),
        Cell::new("Std").add_attribute(Attribute::Bold),
        Cell::new("RMSE (price)").add_attribute(Attribute::Bold),
    ]);

    for (rank, result) in results.iter().enumerate() {
        let score = Cell::new(format!("{:.4}", result.report.mean_rmse_log));
        table.add_row(vec![
            Cell::new(rank + 1),
            Cell::new(format!("{}", result.params.alpha)),
            Cell::new(format!("{}", result.params.l1_ratio)),
            if rank == 0 {
                score.fg(Color::Green).add_attribute(Attribute::Bold)
            } else {
                score
            },
            Cell::new(format!("{:.4}", result.report.std_rmse_log)),
            Cell::new(format!("{:.0}", result.report.mean_rmse_price)),
        ]);
    }

    table.to_string()
}
