//! Document generation for static exports and the dashboard page.

pub mod generator;

pub use generator::{export_charts, render_dashboard_page};
