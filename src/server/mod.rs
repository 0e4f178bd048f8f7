//! Interactive mode: an axum server with one view set per browser session.

pub mod routes;

pub use routes::{run_server, AppState};
