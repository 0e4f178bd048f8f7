//! Reactive aggregation views.
//!
//! A [`ReactiveView`] binds one aggregate chart to a shared, read-only
//! [`BaseTable`]. Each selection change merges into the current
//! [`FilterSelection`], recomputes the [`DerivedView`] from scratch and
//! rebinds the chart in full. Nothing is cached between selections.

use crate::analysis::{filtered, group_reduce};
use crate::chart::{Axis, Figure, Trace, TraceKind};
use crate::error::{DataError, SelectionError};
use crate::models::{
    BaseTable, DerivedView, Dimension, FilterSelection, GroupKey, SelectionValue, Statistic,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// How a chart's categorical axis follows the data.
#[derive(Debug, Clone, PartialEq)]
pub enum CategoryAxis {
    /// Categories are exactly the groups present in the current view.
    Dynamic,
    /// Categories never change, whatever the selection.
    Fixed(Vec<GroupKey>),
}

/// Declarative description of an aggregate chart.
#[derive(Debug, Clone)]
pub struct ViewSpec {
    /// Identifier used in URLs and file names.
    pub name: String,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Filter controls offered with the chart.
    pub dimensions: Vec<Dimension>,
    /// Columns forming the group key.
    pub group_columns: Vec<String>,
    /// Numeric column being reduced.
    pub value_column: String,
    pub statistic: Statistic,
    /// Attach sample standard deviation error bars.
    pub error_bars: bool,
    pub axis: CategoryAxis,
    /// Bar colour.
    pub color: Option<String>,
}

impl ViewSpec {
    pub fn new(
        name: &str,
        title: &str,
        group_columns: &[&str],
        value_column: &str,
        statistic: Statistic,
    ) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            x_label: group_columns.join(" / "),
            y_label: format!("{} of {}", statistic, value_column),
            dimensions: Vec::new(),
            group_columns: group_columns.iter().map(|c| c.to_string()).collect(),
            value_column: value_column.to_string(),
            statistic,
            error_bars: false,
            axis: CategoryAxis::Dynamic,
            color: None,
        }
    }

    pub fn labels(mut self, x_label: &str, y_label: &str) -> Self {
        self.x_label = x_label.to_string();
        self.y_label = y_label.to_string();
        self
    }

    pub fn dimension(mut self, dimension: Dimension) -> Self {
        self.dimensions.push(dimension);
        self
    }

    #[allow(dead_code)] // None of the bundled dashboards plot spread
    pub fn error_bars(mut self) -> Self {
        self.error_bars = true;
        self
    }

    #[allow(dead_code)] // For dashboards with a constant category set
    pub fn fixed_axis(mut self, categories: Vec<GroupKey>) -> Self {
        self.axis = CategoryAxis::Fixed(categories);
        self
    }

    pub fn color(mut self, color: &str) -> Self {
        self.color = Some(color.to_string());
        self
    }

    /// Check that the table is non-empty and has every referenced column.
    pub fn validate(&self, table: &BaseTable) -> Result<(), DataError> {
        if table.is_empty() {
            return Err(DataError::EmptyTable(table.name().to_string()));
        }
        for column in &self.group_columns {
            table.require_column(column)?;
        }
        table.require_column(&self.value_column)?;
        for dim in &self.dimensions {
            table.require_column(&dim.column)?;
        }
        Ok(())
    }
}

/// Compute the derived view for a selection.
///
/// Pure: the result depends only on the arguments.
pub fn derive_view(
    table: &BaseTable,
    spec: &ViewSpec,
    selection: &FilterSelection,
) -> Result<DerivedView, DataError> {
    let rows = filtered(table, &spec.dimensions, selection)?;
    let groups = group_reduce(
        table,
        rows,
        &spec.group_columns,
        &spec.value_column,
        spec.statistic,
        spec.error_bars,
    )?;

    Ok(DerivedView {
        group_columns: spec.group_columns.clone(),
        rows: groups,
    })
}

/// Category list to display for a derived view.
pub fn categories_for(axis: &CategoryAxis, view: &DerivedView) -> Vec<GroupKey> {
    match axis {
        CategoryAxis::Dynamic => view.keys(),
        CategoryAxis::Fixed(keys) => keys.clone(),
    }
}

/// Merge a change into `current`, clamping undeclared values to the
/// wildcard. Unknown dimensions leave the selection as it is.
pub(crate) fn merge_selection(
    dimensions: &[Dimension],
    current: &FilterSelection,
    dimension: &str,
    value: SelectionValue,
) -> FilterSelection {
    match current.with_change(dimensions, dimension, value) {
        Ok(next) => next,
        Err(SelectionError::InvalidValue { dimension, value }) => {
            warn!(
                "\"{}\" is not an option of {} (currently {:?}), clamping to {}",
                value,
                dimension,
                current.get(&dimension),
                SelectionValue::WILDCARD
            );
            current
                .with_change(dimensions, &dimension, SelectionValue::All)
                .unwrap_or_else(|_| current.clone())
        }
        Err(e @ SelectionError::UnknownDimension(_)) => {
            warn!("Ignoring selection change: {}", e);
            current.clone()
        }
    }
}

/// Lifecycle of a view between events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewState {
    /// The chart reflects the committed selection.
    Idle,
    /// A selection change is being applied.
    Recomputing,
}

/// The display side of a view: the bound data and its category axis.
#[derive(Debug, Clone)]
pub struct ChartHandle {
    spec: Arc<ViewSpec>,
    data: DerivedView,
    categories: Vec<GroupKey>,
    revision: u64,
}

impl ChartHandle {
    fn new(spec: Arc<ViewSpec>, data: DerivedView) -> Self {
        let categories = categories_for(&spec.axis, &data);
        Self {
            spec,
            data,
            categories,
            revision: 0,
        }
    }

    /// Replace the bound data and, for dynamic axes, the category list.
    fn bind(&mut self, data: DerivedView) {
        if self.spec.axis == CategoryAxis::Dynamic {
            self.categories = categories_for(&self.spec.axis, &data);
        }
        self.data = data;
        self.revision += 1;
    }

    pub fn data(&self) -> &DerivedView {
        &self.data
    }

    pub fn categories(&self) -> &[GroupKey] {
        &self.categories
    }

    /// Category display labels, key parts joined with " / ".
    pub fn category_labels(&self) -> Vec<String> {
        self.categories().iter().map(ToString::to_string).collect()
    }

    /// Number of rebinds since initialization.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Encode the bound data as a bar chart.
    pub fn figure(&self) -> Figure {
        let spec = &self.spec;
        let rows = &self.data.rows;
        let levels = spec.group_columns.len();

        let (x, x_axis) = if levels == 1 {
            let labels: Vec<String> = rows.iter().map(|r| r.key.to_string()).collect();
            (
                json!(labels),
                Axis::titled(&spec.x_label).categories(self.category_labels()),
            )
        } else {
            // Multicategory x is one array per key level.
            let by_level: Vec<Vec<String>> = (0..levels)
                .map(|level| {
                    rows.iter()
                        .map(|r| r.key.0.get(level).map(ToString::to_string).unwrap_or_default())
                        .collect()
                })
                .collect();
            (json!(by_level), Axis::titled(&spec.x_label).multicategory())
        };

        let values: Vec<f64> = rows.iter().map(|r| r.value).collect();
        let mut trace = Trace::new(TraceKind::Bar)
            .named(spec.statistic.to_string())
            .x(x)
            .y(json!(values))
            .with("hovertemplate", "%{x}: %{y:.2f}<extra></extra>");

        if spec.error_bars {
            let spreads: Vec<Value> = rows
                .iter()
                .map(|r| r.spread.map(Value::from).unwrap_or(Value::Null))
                .collect();
            trace = trace.with(
                "error_y",
                json!({ "type": "data", "array": spreads, "visible": true }),
            );
        }
        if let Some(color) = &spec.color {
            trace = trace.with("marker", json!({ "color": color }));
        }

        Figure::new(&spec.title)
            .x_axis(x_axis)
            .y_axis(Axis::titled(&spec.y_label).from_zero())
            .with_trace(trace)
    }
}

/// An aggregate chart kept in sync with a filter selection.
#[derive(Debug, Clone)]
pub struct ReactiveView {
    table: Arc<BaseTable>,
    spec: Arc<ViewSpec>,
    selection: FilterSelection,
    chart: ChartHandle,
    state: ViewState,
}

impl ReactiveView {
    /// Compute the unfiltered aggregate and bind a chart to it.
    pub fn initialize(table: Arc<BaseTable>, spec: ViewSpec) -> Result<Self, DataError> {
        spec.validate(&table)?;

        let selection = FilterSelection::all(&spec.dimensions);
        let initial = derive_view(&table, &spec, &selection)?;
        debug!(
            "Initialized view {} over {} rows: {} groups",
            spec.name,
            table.len(),
            initial.len()
        );

        let spec = Arc::new(spec);
        Ok(Self {
            chart: ChartHandle::new(spec.clone(), initial),
            table,
            spec,
            selection,
            state: ViewState::Idle,
        })
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn spec(&self) -> &ViewSpec {
        &self.spec
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    /// The currently bound derived view.
    pub fn derived(&self) -> &DerivedView {
        self.chart.data()
    }

    pub fn chart(&self) -> &ChartHandle {
        &self.chart
    }

    pub fn state(&self) -> ViewState {
        self.state
    }

    /// Apply one control change and refresh the chart.
    ///
    /// Never fails: undeclared values are clamped to the wildcard and an
    /// empty subset binds an empty view.
    pub fn on_selection_changed(
        &mut self,
        dimension: &str,
        value: impl Into<SelectionValue>,
    ) -> &ChartHandle {
        debug_assert_eq!(self.state, ViewState::Idle);
        self.state = ViewState::Recomputing;

        self.selection = merge_selection(&self.spec.dimensions, &self.selection, dimension, value.into());

        // Columns were validated at initialization, so this only fails if
        // the view definition and table disagree; show an empty chart then.
        let derived = derive_view(&self.table, &self.spec, &self.selection).unwrap_or_else(|e| {
            error!("Recompute of view {} failed: {}", self.spec.name, e);
            DerivedView {
                group_columns: self.spec.group_columns.clone(),
                rows: Vec::new(),
            }
        });
        if derived.is_empty() {
            debug!("View {} has no rows for {:?}", self.spec.name, self.selection);
        }

        self.chart.bind(derived);
        debug!(
            "View {} rebound at revision {}: {} groups",
            self.spec.name,
            self.chart.revision(),
            self.chart.data().len()
        );
        self.state = ViewState::Idle;
        &self.chart
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Scalar;
    use polars::prelude::df;

    fn passengers() -> Arc<BaseTable> {
        let frame = df!(
            "class" => [1i64, 1, 2, 3],
            "gender" => ["male", "female", "male", "male"],
            "survived" => [1i64, 1, 0, 0],
        )
        .unwrap();
        Arc::new(BaseTable::new("passengers", frame))
    }

    fn spec() -> ViewSpec {
        ViewSpec::new("by_class", "Survival by Class", &["class"], "survived", Statistic::Rate)
            .dimension(Dimension::new("class", "class", "Class").option("1").option("2").option("3"))
            .dimension(Dimension::new("gender", "gender", "Gender").option("male").option("female"))
    }

    fn rates(view: &DerivedView) -> Vec<(String, f64)> {
        view.rows.iter().map(|r| (r.key.to_string(), r.value)).collect()
    }

    fn key(class: i64) -> GroupKey {
        GroupKey(vec![Scalar::Int(class)])
    }

    #[test]
    fn test_initial_aggregate() {
        let view = ReactiveView::initialize(passengers(), spec()).unwrap();
        assert_eq!(
            rates(view.derived()),
            vec![
                ("1".to_string(), 100.0),
                ("2".to_string(), 0.0),
                ("3".to_string(), 0.0)
            ]
        );
        assert_eq!(view.state(), ViewState::Idle);
        assert_eq!(view.chart().revision(), 0);
    }

    #[test]
    fn test_selection_scenario() {
        let mut view = ReactiveView::initialize(passengers(), spec()).unwrap();

        view.on_selection_changed("gender", "male");
        assert_eq!(
            rates(view.derived()),
            vec![
                ("1".to_string(), 100.0),
                ("2".to_string(), 0.0),
                ("3".to_string(), 0.0)
            ]
        );

        view.on_selection_changed("gender", "female");
        let chart = view.on_selection_changed("class", "1");
        assert_eq!(rates(chart.data()), vec![("1".to_string(), 100.0)]);
        assert_eq!(chart.categories(), &[key(1)]);
        assert_eq!(chart.revision(), 3);
        assert_eq!(view.state(), ViewState::Idle);
    }

    #[test]
    fn test_derive_view_is_pure() {
        let table = passengers();
        let spec = spec();
        let selection = FilterSelection::all(&spec.dimensions)
            .with_change(&spec.dimensions, "gender", SelectionValue::from("male"))
            .unwrap();

        let first = derive_view(&table, &spec, &selection).unwrap();
        let second = derive_view(&table, &spec, &selection).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_wildcard_identity() {
        let mut view = ReactiveView::initialize(passengers(), spec()).unwrap();
        let initial = view.derived().clone();

        view.on_selection_changed("class", "2");
        view.on_selection_changed("gender", "male");
        view.on_selection_changed("class", "All");
        view.on_selection_changed("gender", "All");

        assert_eq!(view.derived(), &initial);
        assert_eq!(view.chart().categories(), &[key(1), key(2), key(3)]);
    }

    #[test]
    fn test_empty_subset_is_not_an_error() {
        let mut view = ReactiveView::initialize(passengers(), spec()).unwrap();
        view.on_selection_changed("class", "2");
        let chart = view.on_selection_changed("gender", "female");

        assert!(chart.data().is_empty());
        assert!(chart.categories().is_empty());
        assert_eq!(chart.figure().mark_count(), 0);
    }

    #[test]
    fn test_categories_track_groups_exactly() {
        let mut view = ReactiveView::initialize(passengers(), spec()).unwrap();

        view.on_selection_changed("class", "3");
        assert_eq!(view.chart().categories(), &[key(3)]);

        view.on_selection_changed("class", "All");
        view.on_selection_changed("gender", "female");
        let chart = view.chart();
        assert_eq!(chart.categories(), chart.data().keys().as_slice());
        assert_eq!(chart.category_labels(), vec!["1".to_string()]);
    }

    #[test]
    fn test_fixed_axis_keeps_categories() {
        let fixed = vec![key(1), key(2), key(3)];
        let mut view =
            ReactiveView::initialize(passengers(), spec().fixed_axis(fixed.clone())).unwrap();

        view.on_selection_changed("class", "1");
        assert_eq!(view.chart().categories(), fixed.as_slice());
        assert_eq!(view.derived().len(), 1);
    }

    #[test]
    fn test_invalid_value_clamps_to_wildcard() {
        let mut view = ReactiveView::initialize(passengers(), spec()).unwrap();
        view.on_selection_changed("class", "1");
        view.on_selection_changed("class", "7");

        assert_eq!(view.selection().get("class"), Some(&SelectionValue::All));
        assert_eq!(view.derived().len(), 3);
    }

    #[test]
    fn test_unknown_dimension_keeps_selection() {
        let mut view = ReactiveView::initialize(passengers(), spec()).unwrap();
        view.on_selection_changed("gender", "male");
        let before = view.selection().clone();

        let chart = view.on_selection_changed("deck", "A");
        assert_eq!(chart.revision(), 2);
        assert_eq!(view.selection(), &before);
    }

    #[test]
    fn test_initialize_rejects_empty_table() {
        let frame = df!(
            "class" => Vec::<i64>::new(),
            "gender" => Vec::<&str>::new(),
            "survived" => Vec::<i64>::new(),
        )
        .unwrap();
        let empty = Arc::new(BaseTable::new("empty", frame));
        assert!(matches!(
            ReactiveView::initialize(empty, spec()),
            Err(DataError::EmptyTable(_))
        ));
    }

    #[test]
    fn test_initialize_rejects_missing_column() {
        let spec = ViewSpec::new("bad", "Bad", &["class"], "fare", Statistic::Mean);
        assert!(matches!(
            ReactiveView::initialize(passengers(), spec),
            Err(DataError::MissingColumn { column, .. }) if column == "fare"
        ));
    }

    #[test]
    fn test_figure_error_bars_and_multicategory() {
        let spec = ViewSpec::new(
            "class_gender",
            "Survival by Class and Gender",
            &["class", "gender"],
            "survived",
            Statistic::Mean,
        )
        .error_bars();
        let view = ReactiveView::initialize(passengers(), spec).unwrap();
        let figure = view.chart().figure();
        let value: Value = serde_json::from_str(&figure.to_json().unwrap()).unwrap();

        assert_eq!(value["layout"]["xaxis"]["type"], "multicategory");
        assert_eq!(
            value["data"][0]["x"],
            json!([["1", "1", "2", "3"], ["female", "male", "male", "male"]])
        );
        assert_eq!(value["data"][0]["error_y"]["type"], "data");
        assert_eq!(figure.mark_count(), 4);
    }
}
