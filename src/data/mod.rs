//! Dataset loading and preparation.

pub mod listings;
pub mod loader;
pub mod titanic;

pub use loader::load_csv;
