//! Numeric feature columns and the final feature matrix

use faer::Mat;
use polars::prelude::*;

/// One fully numeric output column.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub name: String,
    /// Schema column this feature was encoded from
    pub source: String,
    pub values: Vec<f64>,
}

impl Feature {
    pub fn new(name: impl Into<String>, source: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            values,
        }
    }
}

/// Dense row-major view handed to the model: one row per input row, columns
/// in the pipeline's documented output order.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    names: Vec<String>,
    data: Mat<f64>,
}

impl FeatureMatrix {
    pub fn from_features(features: &[Feature], rows: usize) -> Self {
        let mut data = Mat::<f64>::zeros(rows, features.len());
        for (j, feature) in features.iter().enumerate() {
            for (i, &value) in feature.values.iter().enumerate() {
                data[(i, j)] = value;
            }
        }
        Self {
            names: features.iter().map(|f| f.name.clone()).collect(),
            data,
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn nrows(&self) -> usize {
        self.data.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.data.ncols()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[(row, col)]
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        (0..self.nrows()).map(|i| self.data[(i, col)]).collect()
    }

    pub fn row(&self, row: usize) -> Vec<f64> {
        (0..self.ncols()).map(|j| self.data[(row, j)]).collect()
    }

    /// Matrix holding only the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> FeatureMatrix {
        let mut data = Mat::<f64>::zeros(rows.len(), self.ncols());
        for (new_i, &i) in rows.iter().enumerate() {
            for j in 0..self.ncols() {
                data[(new_i, j)] = self.data[(i, j)];
            }
        }
        FeatureMatrix {
            names: self.names.clone(),
            data,
        }
    }

    /// Polars frame of the matrix, optionally with a trailing target column.
    pub fn to_frame(&self, target: Option<(&str, &[f64])>) -> PolarsResult<DataFrame> {
        let mut columns: Vec<Column> = (0..self.ncols())
            .map(|j| Column::new(self.names[j].as_str().into(), self.column(j)))
            .collect();
        if let Some((name, values)) = target {
            columns.push(Column::new(name.into(), values.to_vec()));
        }
        DataFrame::new(columns)
    }
}
