//! Dashboard catalog and per-session view state.

use super::points::{PointSpec, PointView};
use super::reactive::{ReactiveView, ViewSpec, ViewState};
use crate::chart::Figure;
use crate::error::DataError;
use crate::models::{BaseTable, Dimension, FilterSelection, SelectionValue};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;
use uuid::Uuid;

/// Chart type of a dashboard.
#[derive(Debug, Clone)]
pub enum DashboardKind {
    Aggregate(ViewSpec),
    Points(PointSpec),
}

/// An interactive chart bound to a named table.
#[derive(Debug, Clone)]
pub struct Dashboard {
    pub table: String,
    pub kind: DashboardKind,
}

impl Dashboard {
    pub fn aggregate(table: &str, spec: ViewSpec) -> Self {
        Self {
            table: table.to_string(),
            kind: DashboardKind::Aggregate(spec),
        }
    }

    pub fn points(table: &str, spec: PointSpec) -> Self {
        Self {
            table: table.to_string(),
            kind: DashboardKind::Points(spec),
        }
    }

    pub fn name(&self) -> &str {
        match &self.kind {
            DashboardKind::Aggregate(spec) => &spec.name,
            DashboardKind::Points(spec) => &spec.name,
        }
    }

    pub fn title(&self) -> &str {
        match &self.kind {
            DashboardKind::Aggregate(spec) => &spec.title,
            DashboardKind::Points(spec) => &spec.title,
        }
    }

    pub fn dimensions(&self) -> &[Dimension] {
        match &self.kind {
            DashboardKind::Aggregate(spec) => &spec.dimensions,
            DashboardKind::Points(spec) => &spec.dimensions,
        }
    }

    pub fn info(&self) -> DashboardInfo {
        DashboardInfo {
            name: self.name().to_string(),
            title: self.title().to_string(),
            dimensions: self.dimensions().to_vec(),
        }
    }
}

/// Public description of a dashboard and its controls.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardInfo {
    pub name: String,
    pub title: String,
    pub dimensions: Vec<Dimension>,
}

/// Shared, read-only tables and the dashboards defined over them.
#[derive(Debug, Default)]
pub struct Catalog {
    tables: HashMap<String, Arc<BaseTable>>,
    dashboards: Vec<Dashboard>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table under its own name.
    pub fn add_table(&mut self, table: BaseTable) -> Arc<BaseTable> {
        let table = Arc::new(table);
        self.tables.insert(table.name().to_string(), table.clone());
        table
    }

    pub fn table(&self, name: &str) -> Option<&Arc<BaseTable>> {
        self.tables.get(name)
    }

    pub fn add_dashboard(&mut self, dashboard: Dashboard) {
        self.dashboards.push(dashboard);
    }

    pub fn dashboards(&self) -> &[Dashboard] {
        &self.dashboards
    }

    pub fn infos(&self) -> Vec<DashboardInfo> {
        self.dashboards.iter().map(Dashboard::info).collect()
    }

    /// Build fresh views for every dashboard.
    pub fn new_session(&self) -> Result<Session, DataError> {
        let mut charts = BTreeMap::new();

        for dashboard in &self.dashboards {
            let table = self
                .table(&dashboard.table)
                .cloned()
                .ok_or_else(|| DataError::UnknownTable(dashboard.table.clone()))?;

            let chart = match &dashboard.kind {
                DashboardKind::Aggregate(spec) => {
                    LiveChart::Aggregate(ReactiveView::initialize(table, spec.clone())?)
                }
                DashboardKind::Points(spec) => {
                    LiveChart::Points(PointView::initialize(table, spec.clone())?)
                }
            };
            charts.insert(dashboard.name().to_string(), chart);
        }

        let session = Session {
            id: Uuid::new_v4(),
            charts,
            last_seen: Instant::now(),
        };
        info!("Created session {} with {} charts", session.id, session.charts.len());
        Ok(session)
    }
}

/// A view owned by one session.
#[derive(Debug, Clone)]
pub enum LiveChart {
    Aggregate(ReactiveView),
    Points(PointView),
}

impl LiveChart {
    pub fn name(&self) -> &str {
        match self {
            LiveChart::Aggregate(view) => view.name(),
            LiveChart::Points(view) => view.name(),
        }
    }

    pub fn title(&self) -> &str {
        match self {
            LiveChart::Aggregate(view) => &view.spec().title,
            LiveChart::Points(view) => &view.spec().title,
        }
    }

    pub fn selection(&self) -> &FilterSelection {
        match self {
            LiveChart::Aggregate(view) => view.selection(),
            LiveChart::Points(view) => view.selection(),
        }
    }

    pub fn figure(&self) -> Figure {
        match self {
            LiveChart::Aggregate(view) => view.chart().figure(),
            LiveChart::Points(view) => view.figure(),
        }
    }

    pub fn on_selection_changed(&mut self, dimension: &str, value: SelectionValue) {
        match self {
            LiveChart::Aggregate(view) => {
                view.on_selection_changed(dimension, value);
            }
            LiveChart::Points(view) => {
                view.on_selection_changed(dimension, value);
            }
        }
    }

    /// Snapshot of the chart for the client.
    pub fn payload(&self) -> ChartPayload {
        let (categories, rows, state) = match self {
            LiveChart::Aggregate(view) => (
                view.chart().category_labels(),
                view.derived().len(),
                view.state(),
            ),
            LiveChart::Points(view) => (
                view.groups().iter().map(ToString::to_string).collect(),
                view.points().len(),
                view.state(),
            ),
        };

        ChartPayload {
            name: self.name().to_string(),
            title: self.title().to_string(),
            figure: self.figure(),
            selection: self.selection().clone(),
            categories,
            rows,
            state,
        }
    }
}

/// Chart state sent to the browser after every change.
#[derive(Debug, Clone, Serialize)]
pub struct ChartPayload {
    pub name: String,
    pub title: String,
    pub figure: Figure,
    pub selection: FilterSelection,
    /// Category axis labels, or colour groups for point charts.
    pub categories: Vec<String>,
    /// Number of bars or points.
    pub rows: usize,
    pub state: ViewState,
}

/// Selections and derived views of one interactive client.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    charts: BTreeMap<String, LiveChart>,
    /// Time of the last request that used this session.
    last_seen: Instant,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Mark the session as used now.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// Whether the session went unused for at least `ttl`.
    pub fn is_idle(&self, ttl: Duration) -> bool {
        self.last_seen.elapsed() >= ttl
    }

    pub fn chart(&self, name: &str) -> Option<&LiveChart> {
        self.charts.get(name)
    }

    pub fn charts(&self) -> impl Iterator<Item = &LiveChart> {
        self.charts.values()
    }

    pub fn payloads(&self) -> BTreeMap<String, ChartPayload> {
        self.charts
            .iter()
            .map(|(name, chart)| (name.clone(), chart.payload()))
            .collect()
    }

    /// Route a control change to one chart. `None` if the chart is unknown.
    pub fn select(&mut self, chart: &str, dimension: &str, value: &str) -> Option<ChartPayload> {
        let chart = self.charts.get_mut(chart)?;
        chart.on_selection_changed(dimension, SelectionValue::from(value));
        Some(chart.payload())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Statistic;
    use polars::prelude::df;

    fn catalog() -> Catalog {
        let frame = df!(
            "class" => [1i64, 1, 2, 3],
            "gender" => ["male", "female", "male", "male"],
            "survived" => [1i64, 1, 0, 0],
        )
        .unwrap();
        let table = BaseTable::new("passengers", frame);
        let gender = Dimension::new("gender", "gender", "Gender").option("male").option("female");

        let mut catalog = Catalog::new();
        catalog.add_table(table);
        catalog.add_dashboard(Dashboard::aggregate(
            "passengers",
            ViewSpec::new("by_class", "By Class", &["class"], "survived", Statistic::Rate)
                .dimension(gender.clone()),
        ));
        catalog.add_dashboard(Dashboard::points(
            "passengers",
            PointSpec::new("scatter", "Scatter", "class", "survived").dimension(gender),
        ));
        catalog
    }

    #[test]
    fn test_sessions_are_independent() {
        let catalog = catalog();
        let mut first = catalog.new_session().unwrap();
        let second = catalog.new_session().unwrap();
        assert_ne!(first.id(), second.id());

        let payload = first.select("by_class", "gender", "female").unwrap();
        assert_eq!(payload.rows, 1);
        assert_eq!(payload.categories, vec!["1".to_string()]);

        let untouched = second.chart("by_class").unwrap().payload();
        assert_eq!(untouched.rows, 3);
        assert_eq!(untouched.selection.get("gender"), Some(&SelectionValue::All));
    }

    #[test]
    fn test_idle_after_ttl() {
        let mut session = catalog().new_session().unwrap();
        assert!(!session.is_idle(Duration::from_secs(60)));
        assert!(session.is_idle(Duration::ZERO));

        session.touch();
        assert!(!session.is_idle(Duration::from_secs(60)));
    }

    #[test]
    fn test_select_unknown_chart() {
        let mut session = catalog().new_session().unwrap();
        assert!(session.select("missing", "gender", "male").is_none());
    }

    #[test]
    fn test_payloads_cover_every_dashboard() {
        let session = catalog().new_session().unwrap();
        let payloads = session.payloads();

        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads["scatter"].rows, 4);
        assert_eq!(payloads["by_class"].state, ViewState::Idle);
    }

    #[test]
    fn test_unknown_table() {
        let mut catalog = Catalog::new();
        catalog.add_dashboard(Dashboard::points("nowhere", PointSpec::new("p", "P", "x", "y")));
        assert!(matches!(catalog.new_session(), Err(DataError::UnknownTable(_))));
    }
}
