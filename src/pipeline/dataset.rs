//! Column-oriented table of raw values
//!
//! Rows arrive as a polars `DataFrame`; stages before encoding work on this
//! lighter representation where every value is either a number, a string or
//! missing.

use polars::prelude::*;

use super::error::{PipelineError, PipelineResult, SchemaError};

/// Values of a single column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    pub fn len(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.len(),
            ColumnData::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn null_count(&self) -> usize {
        match self {
            ColumnData::Numeric(v) => v.iter().filter(|x| x.is_none()).count(),
            ColumnData::Text(v) => v.iter().filter(|x| x.is_none()).count(),
        }
    }

    fn select(&self, rows: &[usize]) -> ColumnData {
        match self {
            ColumnData::Numeric(v) => ColumnData::Numeric(rows.iter().map(|&i| v[i]).collect()),
            ColumnData::Text(v) => {
                ColumnData::Text(rows.iter().map(|&i| v[i].clone()).collect())
            }
        }
    }
}

/// Render a numeric value the way it would appear as a category label.
pub fn format_level(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Parse a text value as a number, accepting surrounding whitespace.
pub fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Ordered, named columns of equal height.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    names: Vec<String>,
    columns: Vec<ColumnData>,
    height: usize,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert a polars `DataFrame`, mapping nulls, NaN, blank strings and
    /// `na_tokens` to missing.
    pub fn from_frame(df: &DataFrame, na_tokens: &[String]) -> PipelineResult<Self> {
        let mut table = Table {
            height: df.height(),
            ..Table::default()
        };

        for column in df.get_columns() {
            let name = column.name().to_string();
            let data = if column.dtype().is_primitive_numeric() {
                let float_col = column.cast(&DataType::Float64)?;
                let values: Vec<Option<f64>> = float_col
                    .f64()?
                    .iter()
                    .map(|v| v.filter(|x| x.is_finite()))
                    .collect();
                ColumnData::Numeric(values)
            } else {
                let string_col = column.cast(&DataType::String)?;
                let values: Vec<Option<String>> = string_col
                    .str()?
                    .into_iter()
                    .map(|v| {
                        v.map(str::trim)
                            .filter(|s| !s.is_empty() && !na_tokens.iter().any(|t| t == s))
                            .map(|s| s.to_string())
                    })
                    .collect();
                ColumnData::Text(values)
            };
            table.push(name, data)?;
        }

        Ok(table)
    }

    /// Append a column. Heights must match the existing columns.
    pub fn push(&mut self, name: impl Into<String>, data: ColumnData) -> PipelineResult<()> {
        let name = name.into();
        if self.names.is_empty() {
            self.height = data.len();
        } else if data.len() != self.height {
            return Err(SchemaError::HeightMismatch {
                column: name,
                expected: self.height,
                found: data.len(),
            }
            .into());
        }
        if let Some(pos) = self.position(&name) {
            self.columns[pos] = data;
        } else {
            self.names.push(name);
            self.columns.push(data);
        }
        Ok(())
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.names.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    pub fn column(&self, name: &str) -> Option<&ColumnData> {
        self.position(name).map(|i| &self.columns[i])
    }

    fn require(&self, name: &str) -> PipelineResult<&ColumnData> {
        self.column(name)
            .ok_or_else(|| SchemaError::MissingColumn(name.to_string()).into())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ColumnData)> {
        self.names.iter().map(String::as_str).zip(self.columns.iter())
    }

    /// Remove a column, returning its data when present.
    pub fn remove(&mut self, name: &str) -> Option<ColumnData> {
        let pos = self.position(name)?;
        self.names.remove(pos);
        Some(self.columns.remove(pos))
    }

    /// Values of a column as numbers. Text is parsed; unparsable text is a
    /// schema type mismatch.
    pub fn numeric(&self, name: &str) -> PipelineResult<Vec<Option<f64>>> {
        match self.require(name)? {
            ColumnData::Numeric(values) => Ok(values.clone()),
            ColumnData::Text(values) => values
                .iter()
                .map(|v| match v {
                    None => Ok(None),
                    Some(s) => parse_number(s).map(Some).ok_or_else(|| {
                        PipelineError::from(SchemaError::TypeMismatch {
                            column: name.to_string(),
                            value: s.clone(),
                        })
                    }),
                })
                .collect(),
        }
    }

    /// Values of a column as category labels. Numbers are rendered with
    /// [`format_level`].
    pub fn text(&self, name: &str) -> PipelineResult<Vec<Option<String>>> {
        match self.require(name)? {
            ColumnData::Text(values) => Ok(values.clone()),
            ColumnData::Numeric(values) => Ok(values.iter().map(|v| v.map(format_level)).collect()),
        }
    }

    /// Whether every non-missing value of the column is numeric.
    pub fn is_numeric(&self, name: &str) -> bool {
        match self.column(name) {
            Some(ColumnData::Numeric(_)) => true,
            Some(ColumnData::Text(values)) => {
                values.iter().flatten().all(|s| parse_number(s).is_some())
                    && values.iter().any(|v| v.is_some())
            }
            None => false,
        }
    }

    /// New table holding only the given rows, in the given order.
    pub fn select_rows(&self, rows: &[usize]) -> Table {
        Table {
            names: self.names.clone(),
            columns: self.columns.iter().map(|c| c.select(rows)).collect(),
            height: rows.len(),
        }
    }
}
