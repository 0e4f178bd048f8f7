//! Chart model shared by static exports and live dashboards.

pub mod figure;

pub use figure::{Axis, Figure, Trace, TraceKind};
