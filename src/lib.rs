//! Quality Radar - live writing-quality radar pipeline.
//!
//! Collects raw quality metrics from text analyzers, maps them onto a
//! common 0-100 scale, derives a target overlay from the selected
//! quality profile and keeps both in step with document edits through
//! a debounced update coordinator.

pub mod analysis;
pub mod axes;
pub mod cli;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod providers;
pub mod report;

pub use analysis::{AggregatorConfig, MetricAggregator, TargetMapper};
pub use axes::AxisCatalog;
pub use coordinator::{CoordinatorConfig, CoordinatorPhase, UpdateCoordinator};
pub use error::{CatalogError, ProviderError, RadarError, RadarResult};
pub use models::{
    AxisDefinition, AxisId, HandleOutcome, MetricPoint, MetricSnapshot, Normalization,
    NormalizationKind, QualityProfile, RefreshNotification, TargetPoint, TargetSnapshot,
    UpdateTrigger,
};
pub use pipeline::{PipelineParts, RadarPipeline, RadarView};
