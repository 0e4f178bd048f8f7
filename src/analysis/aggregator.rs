//! Grouping, reduction and summary statistics.
//!
//! This module builds the polars queries behind every chart: row filtering
//! by selection, group-by with a reduction, and the handful of descriptive
//! statistics used by the static listings charts. Results are copied out of
//! the collected frames into plain structs for the chart layer.

use crate::error::DataError;
use crate::models::{scalar_at, AggregateRow, BaseTable, Dimension, FilterSelection, GroupKey, Scalar, Statistic};
use polars::prelude::*;

const VALUE: &str = "agg_value";
const SPREAD: &str = "agg_spread";
const ROWS: &str = "agg_rows";

/// Predicate keeping rows that match every non-wildcard entry of
/// `selection`, or `None` when nothing is pinned.
///
/// Cells are compared by their text form, so a pinned `"1"` matches an
/// integer class column. Dimensions not declared in `dimensions` are ignored.
pub fn selection_filter(
    table: &BaseTable,
    dimensions: &[Dimension],
    selection: &FilterSelection,
) -> Result<Option<Expr>, DataError> {
    let mut predicates = Vec::new();
    for (name, value) in selection.pinned() {
        if let Some(dim) = dimensions.iter().find(|d| d.name == name) {
            table.require_column(&dim.column)?;
            predicates.push(col(dim.column.as_str()).cast(DataType::String).eq(lit(value)));
        }
    }

    Ok(predicates.into_iter().reduce(|a, b| a.and(b)))
}

/// Lazy query over the rows of `table` matching `selection`.
pub fn filtered(
    table: &BaseTable,
    dimensions: &[Dimension],
    selection: &FilterSelection,
) -> Result<LazyFrame, DataError> {
    let rows = table.lazy();
    Ok(match selection_filter(table, dimensions, selection)? {
        Some(predicate) => rows.filter(predicate),
        None => rows,
    })
}

/// Group `rows` by `group_columns` and reduce `value_column` per group.
///
/// Rows with a null in any key column are dropped, and null values are
/// skipped by the reduction. The result is sorted ascending by key.
pub fn group_reduce(
    table: &BaseTable,
    rows: LazyFrame,
    group_columns: &[String],
    value_column: &str,
    statistic: Statistic,
    with_spread: bool,
) -> Result<Vec<AggregateRow>, DataError> {
    for column in group_columns {
        table.require_column(column)?;
    }
    table.require_column(value_column)?;

    let keys: Vec<Expr> = group_columns.iter().map(|c| col(c.as_str())).collect();
    let rows = match keys.iter().cloned().map(Expr::is_not_null).reduce(|a, b| a.and(b)) {
        Some(present) => rows.filter(present),
        None => rows,
    };

    let mut aggs = vec![
        statistic.expr(value_column).alias(VALUE),
        len().cast(DataType::Int64).alias(ROWS),
    ];
    if with_spread {
        aggs.push(col(value_column).cast(DataType::Float64).std(1).alias(SPREAD));
    }

    let frame = rows
        .group_by(keys.clone())
        .agg(aggs)
        .sort_by_exprs(keys, SortMultipleOptions::default())
        .collect()?;

    let values = frame.column(VALUE)?.f64()?;
    let counts = frame.column(ROWS)?.i64()?;
    let spreads = if with_spread {
        Some(frame.column(SPREAD)?.f64()?)
    } else {
        None
    };

    (0..frame.height())
        .map(|i| {
            let key = group_columns
                .iter()
                .map(|c| scalar_at(&frame, c, i))
                .collect::<PolarsResult<Vec<_>>>()?;
            Ok(AggregateRow {
                key: GroupKey(key),
                value: values.get(i).unwrap_or(f64::NAN),
                spread: spreads.and_then(|s| s.get(i)),
                rows: counts.get(i).unwrap_or(0) as usize,
            })
        })
        .collect()
}

/// Values of `column` cast to floats; nulls and unparseable cells are `None`.
pub fn float_values(frame: &DataFrame, column: &str) -> PolarsResult<Vec<Option<f64>>> {
    let floats = frame.column(column)?.cast(&DataType::Float64)?;
    Ok(floats.f64()?.into_iter().collect())
}

/// Five-number summary with Tukey whiskers.
#[derive(Debug, Clone, PartialEq)]
pub struct BoxStats {
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    /// Smallest value within `q1 - 1.5 * IQR`.
    pub lower_whisker: f64,
    /// Largest value within `q3 + 1.5 * IQR`.
    pub upper_whisker: f64,
    /// Values beyond the whiskers, ascending.
    pub outliers: Vec<f64>,
}

/// Box plot statistics of `value_column` per distinct `key_column`,
/// ascending by key. Quartiles interpolate linearly between ranks.
pub fn box_stats(
    table: &BaseTable,
    key_column: &str,
    value_column: &str,
) -> Result<Vec<(Scalar, BoxStats)>, DataError> {
    table.require_column(key_column)?;
    table.require_column(value_column)?;

    let values = col(value_column).cast(DataType::Float64);
    let q1 = values.clone().quantile(lit(0.25), QuantileMethod::Linear);
    let q3 = values.clone().quantile(lit(0.75), QuantileMethod::Linear);
    let iqr = q3.clone() - q1.clone();
    let low_fence = q1.clone() - lit(1.5) * iqr.clone();
    let high_fence = q3.clone() + lit(1.5) * iqr;
    let inside = values
        .clone()
        .gt_eq(low_fence)
        .and(values.clone().lt_eq(high_fence));

    let frame = table
        .lazy()
        .filter(col(key_column).is_not_null().and(values.clone().is_not_null()))
        .group_by([col(key_column)])
        .agg([
            q1.alias("q1"),
            values.clone().median().alias("median"),
            q3.alias("q3"),
            values.clone().filter(inside.clone()).min().alias("lower"),
            values.clone().filter(inside.clone()).max().alias("upper"),
            values
                .filter(inside.not())
                .sort(SortOptions::default())
                .alias("outliers"),
        ])
        .sort_by_exprs([col(key_column)], SortMultipleOptions::default())
        .collect()?;

    let stat = |name: &str, i: usize| -> PolarsResult<f64> {
        Ok(frame.column(name)?.f64()?.get(i).unwrap_or(f64::NAN))
    };
    let outliers = frame.column("outliers")?.list()?;

    let mut groups = Vec::with_capacity(frame.height());
    for i in 0..frame.height() {
        let (q1, q3) = (stat("q1", i)?, stat("q3", i)?);
        let lower = stat("lower", i)?;
        let upper = stat("upper", i)?;
        let beyond = match outliers.get_as_series(i) {
            Some(series) => series.f64()?.into_iter().flatten().collect(),
            None => Vec::new(),
        };

        groups.push((
            scalar_at(&frame, key_column, i)?,
            BoxStats {
                q1,
                median: stat("median", i)?,
                q3,
                lower_whisker: if lower.is_nan() { q1 } else { lower },
                upper_whisker: if upper.is_nan() { q3 } else { upper },
                outliers: beyond,
            },
        ));
    }
    Ok(groups)
}

/// Least-squares line through the points as `(slope, intercept)`.
///
/// Returns `None` with fewer than two points or when every x is equal.
pub fn linear_fit(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;

    let sxx: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    if sxx == 0.0 {
        return None;
    }
    let sxy: f64 = points.iter().map(|p| (p.0 - mean_x) * (p.1 - mean_y)).sum();

    let slope = sxy / sxx;
    Some((slope, mean_y - slope * mean_x))
}

/// Trailing rolling mean.
///
/// Each output is the mean of up to `window` values ending at that position,
/// or NaN while fewer than `min_periods` values are available.
pub fn rolling_mean(values: &[f64], window: usize, min_periods: usize) -> Result<Vec<f64>, DataError> {
    let options = RollingOptionsFixedWindow {
        window_size: window.max(1),
        min_periods,
        ..Default::default()
    };
    let frame = df!("values" => values)?
        .lazy()
        .select([col("values").rolling_mean(options)])
        .collect()?;

    Ok(frame
        .column("values")?
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

/// A two-way table of summed values.
#[derive(Debug, Clone, PartialEq)]
pub struct Pivot {
    /// Row labels, ascending.
    pub index: Vec<Scalar>,
    /// Column labels, ascending.
    pub columns: Vec<Scalar>,
    /// `cells[row][column]`, zero where no source rows exist.
    pub cells: Vec<Vec<f64>>,
}

impl Pivot {
    /// Values of one pivot column across all rows.
    pub fn column_values(&self, column: usize) -> Vec<f64> {
        self.cells.iter().map(|row| row[column]).collect()
    }
}

/// Sum `value_column` into a table indexed by `index_column` with one column
/// per distinct value of `columns_column`, filling missing cells with zero.
pub fn pivot_sum(
    table: &BaseTable,
    index_column: &str,
    columns_column: &str,
    value_column: &str,
) -> Result<Pivot, DataError> {
    for column in [index_column, columns_column, value_column] {
        table.require_column(column)?;
    }

    let labels = table
        .lazy()
        .filter(col(columns_column).is_not_null())
        .group_by([col(columns_column)])
        .agg([len()])
        .sort_by_exprs([col(columns_column)], SortMultipleOptions::default())
        .collect()?;
    let columns = (0..labels.height())
        .map(|i| scalar_at(&labels, columns_column, i))
        .collect::<PolarsResult<Vec<_>>>()?;

    // One conditional sum per column label; an empty selection sums to zero.
    let values = col(value_column).cast(DataType::Float64);
    let cells: Vec<Expr> = columns
        .iter()
        .enumerate()
        .map(|(j, label)| {
            values
                .clone()
                .filter(col(columns_column).cast(DataType::String).eq(lit(label.to_string())))
                .sum()
                .alias(format!("cell_{}", j))
        })
        .collect();

    let frame = table
        .lazy()
        .filter(col(index_column).is_not_null())
        .group_by([col(index_column)])
        .agg(cells)
        .sort_by_exprs([col(index_column)], SortMultipleOptions::default())
        .collect()?;

    let index = (0..frame.height())
        .map(|i| scalar_at(&frame, index_column, i))
        .collect::<PolarsResult<Vec<_>>>()?;
    let mut grid = vec![vec![0.0; columns.len()]; index.len()];
    for j in 0..columns.len() {
        let sums = frame.column(&format!("cell_{}", j))?.f64()?;
        for (i, row) in grid.iter_mut().enumerate() {
            row[j] = sums.get(i).unwrap_or(0.0);
        }
    }

    Ok(Pivot {
        index,
        columns,
        cells: grid,
    })
}

/// Round to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SelectionValue;

    fn passengers() -> BaseTable {
        let frame = df!(
            "class" => [1i64, 1, 2, 3],
            "gender" => ["male", "female", "male", "male"],
            "survived" => [1i64, 1, 0, 0],
        )
        .unwrap();
        BaseTable::new("passengers", frame)
    }

    fn dims() -> Vec<Dimension> {
        vec![
            Dimension::new("class", "class", "Class").option("1").option("2").option("3"),
            Dimension::new("gender", "gender", "Gender").option("male").option("female"),
        ]
    }

    fn heights(table: &BaseTable, selection: &FilterSelection) -> usize {
        filtered(table, &dims(), selection).unwrap().collect().unwrap().height()
    }

    #[test]
    fn test_wildcard_selection_has_no_filter() {
        let table = passengers();
        let all = FilterSelection::all(&dims());
        assert!(selection_filter(&table, &dims(), &all).unwrap().is_none());
        assert_eq!(heights(&table, &all), 4);
    }

    #[test]
    fn test_filter_matches_integer_column_by_text() {
        let table = passengers();
        let dims = dims();
        let male = FilterSelection::all(&dims)
            .with_change(&dims, "gender", SelectionValue::from("male"))
            .unwrap();
        let male_first = male
            .with_change(&dims, "class", SelectionValue::from("1"))
            .unwrap();

        assert_eq!(heights(&table, &male), 3);
        assert_eq!(heights(&table, &male_first), 1);
    }

    #[test]
    fn test_group_reduce_rate_by_class() {
        let table = passengers();
        let groups = group_reduce(
            &table,
            table.lazy(),
            &["class".to_string()],
            "survived",
            Statistic::Rate,
            false,
        )
        .unwrap();

        let summary: Vec<(String, f64)> = groups
            .iter()
            .map(|g| (g.key.to_string(), g.value))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("1".to_string(), 100.0),
                ("2".to_string(), 0.0),
                ("3".to_string(), 0.0)
            ]
        );
        assert_eq!(groups[0].rows, 2);
    }

    #[test]
    fn test_group_reduce_missing_column() {
        let table = passengers();
        let err = group_reduce(
            &table,
            table.lazy(),
            &["deck".to_string()],
            "survived",
            Statistic::Mean,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, DataError::MissingColumn { column, .. } if column == "deck"));
    }

    #[test]
    fn test_group_reduce_drops_null_keys() {
        let table = BaseTable::new(
            "t",
            df!(
                "k" => [Some("a"), None, Some("a")],
                "v" => [Some(2i64), Some(5), None],
            )
            .unwrap(),
        );
        let groups = group_reduce(&table, table.lazy(), &["k".to_string()], "v", Statistic::Mean, true)
            .unwrap();

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].value, 2.0);
        assert_eq!(groups[0].rows, 2);
        // A single value has no sample deviation.
        assert_eq!(groups[0].spread, None);
    }

    #[test]
    fn test_group_reduce_spread_and_count() {
        let table = BaseTable::new(
            "t",
            df!(
                "k" => ["a", "a", "a", "a", "a", "a", "a", "a", "b"],
                "v" => [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0, 1.0],
            )
            .unwrap(),
        );
        let keys = ["k".to_string()];

        let spread = group_reduce(&table, table.lazy(), &keys, "v", Statistic::Mean, true).unwrap();
        assert!((spread[0].spread.unwrap() - 2.138089935).abs() < 1e-6);

        let counts = group_reduce(&table, table.lazy(), &keys, "v", Statistic::Count, false).unwrap();
        assert_eq!(counts[0].value, 8.0);
        assert_eq!(counts[1].value, 1.0);
    }

    #[test]
    fn test_box_stats_flags_outliers() {
        let table = BaseTable::new(
            "t",
            df!(
                "g" => ["a", "a", "a", "a", "a", "a"],
                "v" => [1.0, 2.0, 3.0, 4.0, 5.0, 100.0],
            )
            .unwrap(),
        );
        let groups = box_stats(&table, "g", "v").unwrap();
        assert_eq!(groups.len(), 1);

        let (group, stats) = &groups[0];
        assert_eq!(group, &Scalar::from("a"));
        assert_eq!(stats.median, 3.5);
        assert_eq!(stats.q1, 2.25);
        assert_eq!(stats.q3, 4.75);
        assert_eq!(stats.outliers, vec![100.0]);
        assert_eq!(stats.upper_whisker, 5.0);
        assert_eq!(stats.lower_whisker, 1.0);
    }

    #[test]
    fn test_linear_fit() {
        let (slope, intercept) = linear_fit(&[(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)]).unwrap();
        assert!((slope - 2.0).abs() < 1e-12);
        assert!((intercept - 1.0).abs() < 1e-12);
        assert_eq!(linear_fit(&[(1.0, 1.0), (1.0, 2.0)]), None);
    }

    #[test]
    fn test_rolling_mean_min_periods() {
        let smoothed = rolling_mean(&[2.0, 4.0, 6.0, 10.0], 2, 1).unwrap();
        assert_eq!(smoothed, vec![2.0, 3.0, 5.0, 8.0]);

        let strict = rolling_mean(&[2.0, 4.0], 2, 2).unwrap();
        assert!(strict[0].is_nan());
        assert_eq!(strict[1], 3.0);
    }

    #[test]
    fn test_pivot_sum_fills_missing_cells() {
        let table = BaseTable::new(
            "t",
            df!(
                "group" => ["Bronx", "Bronx", "Queens"],
                "room" => ["Private room", "Private room", "Shared room"],
                "reviews" => [4i64, 6, 1],
            )
            .unwrap(),
        );
        let pivot = pivot_sum(&table, "group", "room", "reviews").unwrap();

        assert_eq!(pivot.index, vec![Scalar::from("Bronx"), Scalar::from("Queens")]);
        assert_eq!(
            pivot.columns,
            vec![Scalar::from("Private room"), Scalar::from("Shared room")]
        );
        assert_eq!(pivot.cells, vec![vec![10.0, 0.0], vec![0.0, 1.0]]);
        assert_eq!(pivot.column_values(1), vec![0.0, 1.0]);
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(33.33333, 2), 33.33);
        assert_eq!(round_to(66.666, 2), 66.67);
    }
}
