//! Analysis modules.
//!
//! The aggregator turns analyzer output into the live metric snapshot;
//! the target mapper turns a quality profile into the target overlay.

pub mod aggregator;
pub mod target;

pub use aggregator::{AggregatorConfig, MetricAggregator};
pub use target::{AxisTarget, TargetMapper, TargetRule, TARGET_RULES};
