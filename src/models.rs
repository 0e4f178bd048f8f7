//! Data models for tables, selections and derived views.
//!
//! This module contains the core data structures shared by the loaders,
//! the aggregation primitives and the reactive views. Tables are polars
//! `DataFrame`s; [`Scalar`] is the owned cell value used for group keys and
//! display text.

use crate::error::{DataError, SelectionError};
use polars::prelude::{col, len, lit, AnyValue, DataFrame, DataType, Expr, IntoLazy, LazyFrame, PolarsResult};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// A single cell value.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Missing value (null cell or NaN)
    Null,
    /// Integral number
    Int(i64),
    /// Floating point number
    Float(f64),
    /// Categorical or free text
    Text(String),
}

impl Scalar {
    /// Numeric view of the value, `None` for nulls and text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Scalar::Int(i) => Some(*i as f64),
            Scalar::Float(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }

    fn float(value: f64) -> Self {
        if value.is_nan() {
            Scalar::Null
        } else {
            Scalar::Float(value)
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Scalar::Null => 0,
            Scalar::Int(_) | Scalar::Float(_) => 1,
            Scalar::Text(_) => 2,
        }
    }
}

impl From<AnyValue<'_>> for Scalar {
    fn from(value: AnyValue<'_>) -> Self {
        match value {
            AnyValue::Null => Scalar::Null,
            AnyValue::Boolean(b) => Scalar::Int(i64::from(b)),
            AnyValue::Int32(i) => Scalar::Int(i64::from(i)),
            AnyValue::Int64(i) => Scalar::Int(i),
            AnyValue::UInt32(u) => Scalar::Int(i64::from(u)),
            AnyValue::UInt64(u) => i64::try_from(u).map(Scalar::Int).unwrap_or(Scalar::Float(u as f64)),
            AnyValue::Float32(f) => Scalar::float(f64::from(f)),
            AnyValue::Float64(f) => Scalar::float(f),
            AnyValue::String(s) => Scalar::Text(s.to_string()),
            AnyValue::StringOwned(s) => Scalar::Text(s.to_string()),
            other => Scalar::Text(other.to_string()),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Scalar::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Scalar::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Scalar::float(f)
    }
}

// Total order: nulls first, then numbers (ints and floats compared
// numerically), then text.
impl Ord for Scalar {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Scalar::Int(a), Scalar::Int(b)) => a.cmp(b),
            (Scalar::Text(a), Scalar::Text(b)) => a.cmp(b),
            (a, b) if a.rank() == 1 && b.rank() == 1 => {
                let x = a.as_f64().unwrap_or(f64::NAN);
                let y = b.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

impl PartialOrd for Scalar {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Scalar {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Scalar {}

/// Cell of `column` at `row` as an owned [`Scalar`].
pub fn scalar_at(frame: &DataFrame, column: &str, row: usize) -> PolarsResult<Scalar> {
    Ok(Scalar::from(frame.column(column)?.get(row)?))
}

/// A named, immutable dataframe.
///
/// Tables are built once and then shared read-only; preparation steps
/// produce a new table instead of editing one in place.
#[derive(Debug, Clone)]
pub struct BaseTable {
    name: String,
    frame: DataFrame,
}

impl BaseTable {
    pub fn new(name: impl Into<String>, frame: DataFrame) -> Self {
        Self {
            name: name.into(),
            frame,
        }
    }

    /// Name used in error messages and logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    /// Lazy query over the whole table. Columns are shared, not copied.
    pub fn lazy(&self) -> LazyFrame {
        self.frame.clone().lazy()
    }

    pub fn len(&self) -> usize {
        self.frame.height()
    }

    pub fn is_empty(&self) -> bool {
        self.frame.height() == 0
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.frame.get_column_index(column).is_some()
    }

    /// `DataError::MissingColumn` unless the column is present.
    pub fn require_column(&self, column: &str) -> Result<(), DataError> {
        if self.has_column(column) {
            Ok(())
        } else {
            Err(DataError::MissingColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
        }
    }
}

/// One choice offered by a selection control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionOption {
    /// Value matched against the table.
    pub value: String,
    /// Text shown in the control.
    pub label: String,
}

/// A filterable dimension with its declared options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dimension {
    /// Dimension name used by the controls (e.g. "class").
    pub name: String,
    /// Source column in the table (e.g. "Pclass").
    pub column: String,
    /// Control title.
    pub title: String,
    /// Declared options, excluding the implicit wildcard.
    pub options: Vec<DimensionOption>,
}

impl Dimension {
    pub fn new(name: &str, column: &str, title: &str) -> Self {
        Self {
            name: name.to_string(),
            column: column.to_string(),
            title: title.to_string(),
            options: Vec::new(),
        }
    }

    /// Add an option whose label equals its value.
    pub fn option(self, value: &str) -> Self {
        self.labelled_option(value, value)
    }

    /// Add an option with a separate display label.
    pub fn labelled_option(mut self, value: &str, label: &str) -> Self {
        self.options.push(DimensionOption {
            value: value.to_string(),
            label: label.to_string(),
        });
        self
    }

    /// Whether `value` is the wildcard or a declared option.
    pub fn accepts(&self, value: &SelectionValue) -> bool {
        match value {
            SelectionValue::All => true,
            SelectionValue::Value(v) => self.options.iter().any(|o| &o.value == v),
        }
    }
}

/// The state of one selection control.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SelectionValue {
    /// Wildcard: the dimension does not filter.
    #[default]
    All,
    /// Only rows equal to this category value are kept.
    Value(String),
}

impl SelectionValue {
    pub const WILDCARD: &'static str = "All";
}

impl From<&str> for SelectionValue {
    fn from(s: &str) -> Self {
        if s == Self::WILDCARD {
            SelectionValue::All
        } else {
            SelectionValue::Value(s.to_string())
        }
    }
}

impl fmt::Display for SelectionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionValue::All => write!(f, "{}", Self::WILDCARD),
            SelectionValue::Value(v) => write!(f, "{}", v),
        }
    }
}

impl Serialize for SelectionValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The active selection of every dimension of a view.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct FilterSelection {
    values: BTreeMap<String, SelectionValue>,
}

impl FilterSelection {
    /// Selection with every dimension set to the wildcard.
    pub fn all(dimensions: &[Dimension]) -> Self {
        Self {
            values: dimensions
                .iter()
                .map(|d| (d.name.clone(), SelectionValue::All))
                .collect(),
        }
    }

    pub fn get(&self, dimension: &str) -> Option<&SelectionValue> {
        self.values.get(dimension)
    }

    /// Merge a single change, leaving every other dimension untouched.
    ///
    /// Returns a new selection; `self` is not modified.
    pub fn with_change(
        &self,
        dimensions: &[Dimension],
        dimension: &str,
        value: SelectionValue,
    ) -> Result<Self, SelectionError> {
        let dim = dimensions
            .iter()
            .find(|d| d.name == dimension)
            .ok_or_else(|| SelectionError::UnknownDimension(dimension.to_string()))?;

        if !dim.accepts(&value) {
            return Err(SelectionError::InvalidValue {
                dimension: dimension.to_string(),
                value: value.to_string(),
            });
        }

        let mut next = self.clone();
        next.values.insert(dimension.to_string(), value);
        Ok(next)
    }

    /// Non-wildcard entries as `(dimension, value)` pairs.
    pub fn pinned(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().filter_map(|(k, v)| match v {
            SelectionValue::All => None,
            SelectionValue::Value(v) => Some((k.as_str(), v.as_str())),
        })
    }
}

/// The categorical key of one aggregate row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct GroupKey(pub Vec<Scalar>);

impl GroupKey {
    /// Display text of each key part.
    pub fn labels(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.labels().join(" / "))
    }
}

/// Reduction applied to the value column of each group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    /// Arithmetic mean
    Mean,
    /// Sum
    Sum,
    /// Number of rows in the group
    Count,
    /// Mean expressed as a percentage
    Rate,
}

impl Statistic {
    /// Per-group aggregation expression over `column`.
    ///
    /// Values are cast to floats first; nulls and non-numeric cells do not
    /// contribute. A group without numeric values reduces to null.
    pub fn expr(&self, column: &str) -> Expr {
        let values = col(column).cast(DataType::Float64);
        match self {
            Statistic::Sum => values.sum(),
            Statistic::Count => len().cast(DataType::Float64),
            Statistic::Mean => values.mean(),
            Statistic::Rate => values.mean() * lit(100.0),
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statistic::Mean => write!(f, "Mean"),
            Statistic::Sum => write!(f, "Sum"),
            Statistic::Count => write!(f, "Count"),
            Statistic::Rate => write!(f, "Rate (%)"),
        }
    }
}

/// One group of a derived view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    /// Group key values, in group column order.
    pub key: GroupKey,
    /// The reduced statistic.
    pub value: f64,
    /// Sample standard deviation, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread: Option<f64>,
    /// Number of source rows in the group.
    pub rows: usize,
}

/// The aggregate table bound to a chart.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DerivedView {
    /// Columns forming the group key.
    pub group_columns: Vec<String>,
    /// Rows sorted ascending by key.
    pub rows: Vec<AggregateRow>,
}

impl DerivedView {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Group keys in view order.
    pub fn keys(&self) -> Vec<GroupKey> {
        self.rows.iter().map(|r| r.key.clone()).collect()
    }
}
