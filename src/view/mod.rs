//! Reactive views and session state.

pub mod points;
pub mod reactive;
pub mod session;

pub use points::PointSpec;
pub use reactive::ViewSpec;
pub use session::{Catalog, ChartPayload, Dashboard, DashboardInfo, Session};
