//! Rental listings: the static chart set.
//!
//! Each function computes one chart directly from the listings table with
//! the `analysis` primitives. [`static_charts`] builds all of them.

use crate::analysis::{
    box_stats, float_values, group_reduce, linear_fit, pivot_sum, rolling_mean, round_to,
};
use crate::chart::{Axis, Figure, Trace, TraceKind};
use crate::error::DataError;
use crate::models::{scalar_at, BaseTable, Scalar, Statistic};
use chrono::NaiveDate;
use polars::prelude::{col, DataType};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Catalog name of the listings table.
pub const TABLE: &str = "listings";

const GROUP: &str = "neighbourhood_group";
const ROOM_TYPE: &str = "room_type";
const PRICE: &str = "price";
const REVIEWS: &str = "number_of_reviews";
const LAST_REVIEW: &str = "last_review";
const AVAILABILITY: &str = "availability_365";

const GROUP_COLORS: [&str; 5] = ["lightblue", "lightgreen", "lightgrey", "lightpink", "skyblue"];
const ROOM_COLORS: [&str; 3] = ["blue", "green", "coral"];
const ROOM_SYMBOLS: [&str; 3] = ["circle", "square", "diamond"];

/// First `last_review` date kept by the review trend.
pub fn trend_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 11, 1).unwrap_or_default()
}

/// Build every listings chart as `(file stem, figure)` pairs.
pub fn static_charts(table: &BaseTable) -> Result<Vec<(String, Figure)>, DataError> {
    if table.is_empty() {
        return Err(DataError::EmptyTable(table.name().to_string()));
    }

    let charts = vec![
        ("listing_across_neighbourhood_groups", listings_per_group(table)?),
        ("price_distribution_by_neighbourhood_group", price_distribution(table)?),
        (
            "average_availability_by_room_type_across_neighbourhoods",
            availability_by_room_type(table)?,
        ),
        ("price_vs_number_of_reviews_by_room_type", price_vs_reviews(table)?),
        (
            "trend_of_number_of_reviews_over_time_by_neighbourhood_group",
            review_trend_chart(table, trend_start())?,
        ),
        (
            "heatmap_of_price_vs_availability_across_neighbourhoods",
            price_availability_heatmap(table)?,
        ),
        (
            "number_of_reviews_by_room_type_across_neighbourhoods",
            reviews_by_room_type(table)?,
        ),
    ];

    info!("Built {} listings charts", charts.len());
    Ok(charts
        .into_iter()
        .map(|(name, figure)| (name.to_string(), figure))
        .collect())
}

/// Listing count per neighbourhood group, most listings first.
pub fn listings_per_group(table: &BaseTable) -> Result<Figure, DataError> {
    let mut counts = group_reduce(
        table,
        table.lazy(),
        &[GROUP.to_string()],
        GROUP,
        Statistic::Count,
        false,
    )?;
    // Stable, so equal counts stay in key order.
    counts.sort_by(|a, b| b.value.total_cmp(&a.value));

    let labels: Vec<String> = counts.iter().map(|r| r.key.to_string()).collect();
    let values: Vec<u64> = counts.iter().map(|r| r.value as u64).collect();
    let colors: Vec<&str> = (0..counts.len())
        .map(|i| GROUP_COLORS[i % GROUP_COLORS.len()])
        .collect();

    Ok(Figure::new("Listings Across Neighbourhood Groups")
        .x_axis(Axis::titled("Neighbourhood Group").categories(labels.clone()))
        .y_axis(Axis::titled("Number of Listings").from_zero())
        .with_trace(
            Trace::new(TraceKind::Bar)
                .x(json!(labels))
                .y(json!(values))
                .with("text", json!(values))
                .with("textposition", "outside")
                .with("marker", json!({ "color": colors })),
        ))
}

/// Price box plot per neighbourhood group with outliers marked.
pub fn price_distribution(table: &BaseTable) -> Result<Figure, DataError> {
    let mut figure = Figure::new("Price Distribution by Neighbourhood Group")
        .x_axis(Axis::titled("Neighbourhood Group"))
        .y_axis(Axis::titled("Price"));

    for (i, (group, stats)) in box_stats(table, GROUP, PRICE)?.into_iter().enumerate() {
        let label = group.to_string();
        let color = GROUP_COLORS[i % GROUP_COLORS.len()];

        figure.push(
            Trace::new(TraceKind::Box)
                .named(label.clone())
                .x(json!([label.as_str()]))
                .with("q1", json!([stats.q1]))
                .with("median", json!([stats.median]))
                .with("q3", json!([stats.q3]))
                .with("lowerfence", json!([stats.lower_whisker]))
                .with("upperfence", json!([stats.upper_whisker]))
                .with("fillcolor", color)
                .with("line", json!({ "color": "black" })),
        );
        if !stats.outliers.is_empty() {
            figure.push(
                Trace::new(TraceKind::Scatter)
                    .named(format!("{} outliers", label))
                    .x(json!(vec![label; stats.outliers.len()]))
                    .y(json!(stats.outliers))
                    .with("mode", "markers")
                    .with("showlegend", false)
                    .with("marker", json!({ "color": "red", "size": 4 })),
            );
        }
    }

    Ok(figure)
}

/// Mean availability per (group, room type) with standard deviation bars.
pub fn availability_by_room_type(table: &BaseTable) -> Result<Figure, DataError> {
    let rows = group_reduce(
        table,
        table.lazy(),
        &[GROUP.to_string(), ROOM_TYPE.to_string()],
        AVAILABILITY,
        Statistic::Mean,
        true,
    )?;

    let mut series: BTreeMap<&Scalar, (Vec<String>, Vec<f64>, Vec<Value>)> = BTreeMap::new();
    for row in &rows {
        let entry = series.entry(&row.key.0[1]).or_default();
        entry.0.push(row.key.0[0].to_string());
        entry.1.push(row.value);
        entry.2.push(row.spread.map(Value::from).unwrap_or(Value::Null));
    }

    let mut figure = Figure::new("Average Availability by Room Type Across Neighbourhoods")
        .x_axis(Axis::titled("Neighbourhood Group"))
        .y_axis(Axis::titled("Average Availability (days)").from_zero())
        .bar_mode("group")
        .legend(true);
    figure
        .layout
        .extra
        .insert("legend".to_string(), json!({ "title": { "text": "Room Type" } }));

    for (room_type, (groups, means, spreads)) in series {
        figure.push(
            Trace::new(TraceKind::Bar)
                .named(room_type.to_string())
                .x(json!(groups))
                .y(json!(means))
                .with("error_y", json!({ "type": "data", "array": spreads, "visible": true })),
        );
    }

    Ok(figure)
}

/// Price against review count per room type, each with a fitted trend line.
pub fn price_vs_reviews(table: &BaseTable) -> Result<Figure, DataError> {
    for column in [PRICE, REVIEWS, ROOM_TYPE] {
        table.require_column(column)?;
    }
    let frame = table
        .lazy()
        .filter(col(ROOM_TYPE).is_not_null())
        .select([col(ROOM_TYPE), col(PRICE), col(REVIEWS)])
        .collect()?;
    let prices = float_values(&frame, PRICE)?;
    let reviews = float_values(&frame, REVIEWS)?;

    let mut series: BTreeMap<Scalar, Vec<(f64, f64)>> = BTreeMap::new();
    for (i, pair) in prices.into_iter().zip(reviews).enumerate() {
        if let (Some(price), Some(reviews)) = pair {
            series
                .entry(scalar_at(&frame, ROOM_TYPE, i)?)
                .or_default()
                .push((price, reviews));
        }
    }

    let mut figure = Figure::new("Price vs. Number of Reviews by Room Type")
        .x_axis(Axis::titled("Price"))
        .y_axis(Axis::titled("Number of Reviews"))
        .legend(true);

    for (i, (room_type, points)) in series.into_iter().enumerate() {
        let color = ROOM_COLORS[i % ROOM_COLORS.len()];
        let name = room_type.to_string();
        let xs: Vec<f64> = points.iter().map(|p| p.0).collect();
        let ys: Vec<f64> = points.iter().map(|p| p.1).collect();

        figure.push(
            Trace::new(TraceKind::Scatter)
                .named(name.clone())
                .x(json!(xs))
                .y(json!(ys))
                .with("mode", "markers")
                .with(
                    "marker",
                    json!({ "color": color, "size": 4, "symbol": ROOM_SYMBOLS[i % ROOM_SYMBOLS.len()] }),
                ),
        );

        if let Some((slope, intercept)) = linear_fit(&points) {
            let lo = xs.iter().copied().fold(f64::INFINITY, f64::min);
            let hi = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            debug!("{} trend: reviews = {:.4} * price + {:.2}", name, slope, intercept);

            figure.push(
                Trace::new(TraceKind::Scatter)
                    .named(format!("{} trend", name))
                    .x(json!([lo, hi]))
                    .y(json!([slope * lo + intercept, slope * hi + intercept]))
                    .with("mode", "lines")
                    .with("line", json!({ "color": color, "dash": "dash" })),
            );
        }
    }

    Ok(figure)
}

/// Daily review totals per group since `since`, smoothed with a rolling mean
/// of window 2.
///
/// Rows whose `last_review` is missing or not a `YYYY-MM-DD` date are
/// dropped.
pub fn review_trend(
    table: &BaseTable,
    since: NaiveDate,
) -> Result<BTreeMap<Scalar, Vec<(NaiveDate, f64)>>, DataError> {
    for column in [GROUP, LAST_REVIEW, REVIEWS] {
        table.require_column(column)?;
    }
    let totals = table
        .lazy()
        .filter(col(GROUP).is_not_null().and(col(LAST_REVIEW).is_not_null()))
        .group_by([col(GROUP), col(LAST_REVIEW).cast(DataType::String)])
        .agg([col(REVIEWS).cast(DataType::Float64).sum()])
        .collect()?;
    let sums = totals.column(REVIEWS)?.f64()?;

    let mut daily: BTreeMap<(Scalar, NaiveDate), f64> = BTreeMap::new();
    for i in 0..totals.height() {
        let Scalar::Text(day) = scalar_at(&totals, LAST_REVIEW, i)? else {
            continue;
        };
        let Ok(date) = NaiveDate::parse_from_str(&day, "%Y-%m-%d") else {
            continue;
        };
        if date >= since {
            let group = scalar_at(&totals, GROUP, i)?;
            *daily.entry((group, date)).or_default() += sums.get(i).unwrap_or(0.0);
        }
    }

    let mut by_group: BTreeMap<Scalar, Vec<(NaiveDate, f64)>> = BTreeMap::new();
    for ((group, date), total) in daily {
        by_group.entry(group).or_default().push((date, total));
    }

    for (group, series) in by_group.iter_mut() {
        let totals: Vec<f64> = series.iter().map(|(_, t)| *t).collect();
        for (point, smoothed) in series.iter_mut().zip(rolling_mean(&totals, 2, 1)?) {
            point.1 = smoothed;
        }
        debug!("Review trend for {}: {} days", group, series.len());
    }

    Ok(by_group)
}

fn review_trend_chart(table: &BaseTable, since: NaiveDate) -> Result<Figure, DataError> {
    let mut figure = Figure::new("Trend of Number of Reviews Over Time by Neighbourhood Group")
        .x_axis(Axis::titled("Last Review Date"))
        .y_axis(Axis::titled("Rolling Average of Number of Reviews"))
        .legend(true);

    for (group, series) in review_trend(table, since)? {
        let dates: Vec<String> = series
            .iter()
            .map(|(d, _)| d.format("%Y-%m-%d").to_string())
            .collect();
        let values: Vec<f64> = series.iter().map(|(_, v)| *v).collect();

        figure.push(
            Trace::new(TraceKind::Scatter)
                .named(group.to_string())
                .x(json!(dates))
                .y(json!(values))
                .with("mode", "lines"),
        );
    }

    Ok(figure)
}

/// Mean availability of each group placed against the group's mean price.
pub fn price_availability_heatmap(table: &BaseTable) -> Result<Figure, DataError> {
    let group = [GROUP.to_string()];
    let prices = group_reduce(table, table.lazy(), &group, PRICE, Statistic::Mean, false)?;
    let availability =
        group_reduce(table, table.lazy(), &group, AVAILABILITY, Statistic::Mean, false)?;

    // One row per group; the x axis holds every rounded mean price, so each
    // row has a single filled cell.
    let mut price_axis: Vec<f64> = prices.iter().map(|r| round_to(r.value, 2)).collect();
    price_axis.sort_by(f64::total_cmp);
    price_axis.dedup();

    let mut groups = Vec::new();
    let mut z = Vec::new();
    for row in &prices {
        let price = round_to(row.value, 2);
        let mean_availability = availability
            .iter()
            .find(|a| a.key == row.key)
            .map(|a| a.value)
            .unwrap_or(f64::NAN);

        let cells: Vec<Value> = price_axis
            .iter()
            .map(|&p| {
                if p == price {
                    Value::from(mean_availability)
                } else {
                    Value::Null
                }
            })
            .collect();
        groups.push(row.key.to_string());
        z.push(cells);
    }

    let ticks: Vec<String> = price_axis.iter().map(|p| format!("{:.2}", p)).collect();
    Ok(Figure::new("Heatmap of Price vs Availability Across Neighbourhoods")
        .x_axis(Axis::titled("Average Price").categories(ticks.clone()))
        .y_axis(Axis::titled("Neighbourhood Group").categories(groups.clone()))
        .with_trace(
            Trace::new(TraceKind::Heatmap)
                .x(json!(ticks))
                .y(json!(groups))
                .with("z", json!(z))
                .with("colorscale", "YlGnBu")
                .with("xgap", 1)
                .with("ygap", 1)
                .with("colorbar", json!({ "title": { "text": "Average Availability (days)" } })),
        ))
}

/// Summed reviews per group, stacked by room type.
pub fn reviews_by_room_type(table: &BaseTable) -> Result<Figure, DataError> {
    let pivot = pivot_sum(table, GROUP, ROOM_TYPE, REVIEWS)?;
    let groups: Vec<String> = pivot.index.iter().map(ToString::to_string).collect();
    let colors = ["skyblue", "lightgreen", "lightcoral"];

    let mut figure = Figure::new("Number of Reviews by Room Type Across Neighbourhoods")
        .x_axis(Axis::titled("Neighbourhood Group"))
        .y_axis(Axis::titled("Number of Reviews"))
        .bar_mode("stack")
        .legend(true);

    for (i, room_type) in pivot.columns.iter().enumerate() {
        figure.push(
            Trace::new(TraceKind::Bar)
                .named(room_type.to_string())
                .x(json!(groups))
                .y(json!(pivot.column_values(i)))
                .with(
                    "marker",
                    json!({ "color": colors[i % colors.len()], "line": { "color": "black", "width": 1 } }),
                ),
        );
    }

    Ok(figure)
}

/// Mean nightly price over the whole table, for the export summary.
pub fn mean_price(table: &BaseTable) -> Result<Option<f64>, DataError> {
    table.require_column(PRICE)?;
    let frame = table
        .lazy()
        .select([col(PRICE).cast(DataType::Float64).mean()])
        .collect()?;
    Ok(frame.column(PRICE)?.f64()?.get(0))
}
