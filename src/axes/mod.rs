//! Quality axes.
//!
//! The catalog defines which axes the radar shows, in which order, and
//! how each raw metric is mapped onto the shared 0-100 scale.

pub mod catalog;

pub use catalog::{normalize, AxisCatalog};
