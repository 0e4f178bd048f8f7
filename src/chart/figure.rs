//! Chart figures in the Plotly.js JSON shape.
//!
//! A [`Figure`] is a list of traces plus a layout. It serializes directly to
//! the `{ data, layout }` object accepted by `Plotly.newPlot` and
//! `Plotly.react`, so the same value feeds static exports and live updates.

use serde::Serialize;
use serde_json::{Map, Value};

/// Plotly trace type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    Bar,
    Scatter,
    Box,
    Heatmap,
}

/// One data series.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    #[serde(rename = "type")]
    pub kind: TraceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub x: Value,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub y: Value,
    /// Trace attributes without a dedicated field (marker, error_y, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Trace {
    pub fn new(kind: TraceKind) -> Self {
        Self {
            kind,
            name: None,
            x: Value::Null,
            y: Value::Null,
            extra: Map::new(),
        }
    }

    pub fn x(mut self, x: impl Into<Value>) -> Self {
        self.x = x.into();
        self
    }

    pub fn y(mut self, y: impl Into<Value>) -> Self {
        self.y = y.into();
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set an arbitrary trace attribute.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    /// Number of x values, zero when x is unset.
    pub fn point_count(&self) -> usize {
        match &self.x {
            Value::Array(values) => match values.first() {
                // Multicategory x holds one array per level.
                Some(Value::Array(level)) => level.len(),
                _ => values.len(),
            },
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Title {
    pub text: String,
}

/// An axis of the layout.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Axis {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<Title>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categoryorder: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub categoryarray: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rangemode: Option<String>,
}

impl Axis {
    pub fn titled(text: &str) -> Self {
        Self {
            title: Some(Title {
                text: text.to_string(),
            }),
            ..Default::default()
        }
    }

    /// Categorical axis whose ticks are exactly `categories`, in order.
    pub fn categories(mut self, categories: Vec<String>) -> Self {
        self.kind = Some("category".to_string());
        self.categoryorder = Some("array".to_string());
        self.categoryarray = Some(categories);
        self
    }

    /// Axis over multi-level category tuples.
    pub fn multicategory(mut self) -> Self {
        self.kind = Some("multicategory".to_string());
        self
    }

    pub fn from_zero(mut self) -> Self {
        self.rangemode = Some("tozero".to_string());
        self
    }
}

/// Figure layout.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Layout {
    pub title: Title,
    pub xaxis: Axis,
    pub yaxis: Axis,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barmode: Option<String>,
    pub showlegend: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A complete chart.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Figure {
    pub data: Vec<Trace>,
    pub layout: Layout,
}

impl Figure {
    pub fn new(title: &str) -> Self {
        Self {
            data: Vec::new(),
            layout: Layout {
                title: Title {
                    text: title.to_string(),
                },
                ..Default::default()
            },
        }
    }

    pub fn title(&self) -> &str {
        &self.layout.title.text
    }

    pub fn x_axis(mut self, axis: Axis) -> Self {
        self.layout.xaxis = axis;
        self
    }

    pub fn y_axis(mut self, axis: Axis) -> Self {
        self.layout.yaxis = axis;
        self
    }

    pub fn bar_mode(mut self, mode: &str) -> Self {
        self.layout.barmode = Some(mode.to_string());
        self
    }

    pub fn legend(mut self, show: bool) -> Self {
        self.layout.showlegend = show;
        self
    }

    pub fn push(&mut self, trace: Trace) {
        self.data.push(trace);
    }

    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.push(trace);
        self
    }

    /// Total number of marks across traces.
    pub fn mark_count(&self) -> usize {
        self.data.iter().map(Trace::point_count).sum()
    }

    /// Serialize to the Plotly `{ data, layout }` JSON object.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}
