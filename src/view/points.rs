//! Filtered point projections.
//!
//! A [`PointView`] shares the filter step of [`ReactiveView`] but projects
//! matching rows to chart points instead of reducing them.
//!
//! [`ReactiveView`]: super::ReactiveView

use super::reactive::{merge_selection, ViewState};
use crate::analysis::{filtered, float_values};
use crate::chart::{Axis, Figure, Trace, TraceKind};
use crate::error::DataError;
use crate::models::{scalar_at, BaseTable, Dimension, FilterSelection, Scalar, SelectionValue};
use polars::prelude::PolarsResult;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};

const PALETTE: [&str; 6] = ["blue", "green", "red", "orange", "purple", "brown"];

/// Declarative description of a scatter chart.
#[derive(Debug, Clone)]
pub struct PointSpec {
    pub name: String,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub x_column: String,
    pub y_column: String,
    /// Column splitting points into coloured series.
    pub color_column: Option<String>,
    pub legend_title: Option<String>,
    /// `(column, label)` pairs shown on hover.
    pub tooltip: Vec<(String, String)>,
    pub dimensions: Vec<Dimension>,
}

impl PointSpec {
    pub fn new(name: &str, title: &str, x_column: &str, y_column: &str) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            x_label: x_column.to_string(),
            y_label: y_column.to_string(),
            x_column: x_column.to_string(),
            y_column: y_column.to_string(),
            color_column: None,
            legend_title: None,
            tooltip: Vec::new(),
            dimensions: Vec::new(),
        }
    }

    pub fn labels(mut self, x_label: &str, y_label: &str) -> Self {
        self.x_label = x_label.to_string();
        self.y_label = y_label.to_string();
        self
    }

    pub fn color_by(mut self, column: &str, legend_title: &str) -> Self {
        self.color_column = Some(column.to_string());
        self.legend_title = Some(legend_title.to_string());
        self
    }

    pub fn tooltip(mut self, column: &str, label: &str) -> Self {
        self.tooltip.push((column.to_string(), label.to_string()));
        self
    }

    pub fn dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    pub fn validate(&self, table: &BaseTable) -> Result<(), DataError> {
        if table.is_empty() {
            return Err(DataError::EmptyTable(table.name().to_string()));
        }
        let columns = [&self.x_column, &self.y_column]
            .into_iter()
            .chain(self.color_column.as_ref())
            .chain(self.tooltip.iter().map(|(c, _)| c))
            .chain(self.dimensions.iter().map(|d| &d.column));
        for column in columns {
            table.require_column(column)?;
        }
        Ok(())
    }
}

/// One plotted row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    /// Colour group, null when no colour column is configured.
    pub group: Scalar,
    pub tooltip: String,
}

/// Project the rows matching `selection` to points.
///
/// Rows whose x or y is not numeric are skipped.
pub fn derive_points(
    table: &BaseTable,
    spec: &PointSpec,
    selection: &FilterSelection,
) -> Result<Vec<Point>, DataError> {
    table.require_column(&spec.x_column)?;
    table.require_column(&spec.y_column)?;
    let rows = filtered(table, &spec.dimensions, selection)?.collect()?;
    let xs = float_values(&rows, &spec.x_column)?;
    let ys = float_values(&rows, &spec.y_column)?;

    let mut points = Vec::with_capacity(rows.height());
    for (i, (x, y)) in xs.into_iter().zip(ys).enumerate() {
        let (Some(x), Some(y)) = (x, y) else {
            continue;
        };
        let group = match spec.color_column.as_deref() {
            Some(column) => scalar_at(&rows, column, i)?,
            None => Scalar::Null,
        };
        let tooltip = spec
            .tooltip
            .iter()
            .map(|(column, label)| Ok(format!("{}: {}", label, scalar_at(&rows, column, i)?)))
            .collect::<PolarsResult<Vec<_>>>()?
            .join("<br>");
        points.push(Point {
            x,
            y,
            group,
            tooltip,
        });
    }

    Ok(points)
}

/// A scatter chart kept in sync with a filter selection.
#[derive(Debug, Clone)]
pub struct PointView {
    table: Arc<BaseTable>,
    spec: Arc<PointSpec>,
    selection: FilterSelection,
    points: Vec<Point>,
    state: ViewState,
}

impl PointView {
    pub fn initialize(table: Arc<BaseTable>, spec: PointSpec) -> Result<Self, DataError> {
        spec.validate(&table)?;
        let selection = FilterSelection::all(&spec.dimensions);
        let points = derive_points(&table, &spec, &selection)?;
        debug!("Initialized point view {} with {} points", spec.name, points.len());

        Ok(Self {
            table,
            spec: Arc::new(spec),
            selection,
            points,
            state: ViewState::Idle,
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &PointSpec {
        &self.spec
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    /// Colour groups present in the current points, ascending.
    pub fn groups(&self) -> Vec<Scalar> {
        let mut groups: Vec<Scalar> = self.points.iter().map(|p| p.group.clone()).collect();
        groups.sort();
        groups.dedup();
        groups
    }

    /// Apply one control change and replace the plotted points.
    pub fn on_selection_changed(
        &mut self,
        dimension: &str,
        value: impl Into<SelectionValue>,
    ) -> &[Point] {
        self.state = ViewState::Recomputing;
        self.selection = merge_selection(&self.spec.dimensions, &self.selection, dimension, value.into());

        self.points = derive_points(&self.table, &self.spec, &self.selection).unwrap_or_else(|e| {
            error!("Recompute of point view {} failed: {}", self.spec.name, e);
            Vec::new()
        });
        debug!(
            "Point view {} recomputed for {:?}: {} points",
            self.spec.name,
            self.selection,
            self.points.len()
        );

        self.state = ViewState::Idle;
        &self.points
    }

    /// Encode the points as a scatter chart with one series per group.
    pub fn figure(&self) -> Figure {
        let mut series: BTreeMap<&Scalar, Vec<&Point>> = BTreeMap::new();
        for point in &self.points {
            series.entry(&point.group).or_default().push(point);
        }

        let mut figure = Figure::new(&self.spec.title)
            .x_axis(Axis::titled(&self.spec.x_label))
            .y_axis(Axis::titled(&self.spec.y_label))
            .legend(self.spec.color_column.is_some());
        if let Some(title) = &self.spec.legend_title {
            figure.layout.extra.insert("legend".to_string(), json!({ "title": { "text": title } }));
        }

        for (i, (group, points)) in series.into_iter().enumerate() {
            let xs: Vec<f64> = points.iter().map(|p| p.x).collect();
            let ys: Vec<f64> = points.iter().map(|p| p.y).collect();
            let text: Vec<&str> = points.iter().map(|p| p.tooltip.as_str()).collect();

            figure.push(
                Trace::new(TraceKind::Scatter)
                    .named(group.to_string())
                    .x(json!(xs))
                    .y(json!(ys))
                    .with("mode", "markers")
                    .with("text", json!(text))
                    .with("hovertemplate", "%{text}<extra></extra>")
                    .with(
                        "marker",
                        json!({ "size": 10, "opacity": 0.4, "color": PALETTE[i % PALETTE.len()] }),
                    ),
            );
        }

        figure
    }
}
