//! Analysis modules.
//!
//! Filtering, grouping and the descriptive statistics behind the charts.

pub mod aggregator;

pub use aggregator::*;
