//! Wiring of catalog, aggregator, target mapper and coordinator.
//!
//! This is the surface the chart and the numeric summary panel talk to.

use crate::analysis::{AggregatorConfig, MetricAggregator, TargetMapper};
use crate::axes::AxisCatalog;
use crate::coordinator::{CoordinatorConfig, UpdateCoordinator};
use crate::error::{CatalogError, RadarResult};
use crate::models::{
    HandleOutcome, MetricSnapshot, RadarSummary, RefreshNotification, TargetSnapshot,
    UpdateTrigger,
};
use crate::providers::{CapabilityGate, ProfileProvider, TextAnalysisProvider};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Live metrics plus the active target overlay, if any.
#[derive(Debug, Clone)]
pub struct RadarView {
    pub current: Arc<MetricSnapshot>,
    pub target: Option<Arc<TargetSnapshot>>,
}

impl RadarView {
    pub fn summary(&self) -> RadarSummary {
        RadarSummary::from_snapshots(&self.current, self.target.as_deref())
    }
}

/// Collaborators the pipeline is assembled from.
pub struct PipelineParts {
    pub catalog: AxisCatalog,
    pub readability: Arc<dyn TextAnalysisProvider>,
    pub style: Arc<dyn TextAnalysisProvider>,
    pub profiles: Arc<dyn ProfileProvider>,
    pub gate: Arc<dyn CapabilityGate>,
    pub aggregator: AggregatorConfig,
    pub coordinator: CoordinatorConfig,
}

/// The assembled radar pipeline.
pub struct RadarPipeline {
    catalog: Arc<AxisCatalog>,
    aggregator: Arc<MetricAggregator>,
    mapper: Arc<TargetMapper>,
    coordinator: UpdateCoordinator,
}

impl RadarPipeline {
    /// Assemble the pipeline, validating the catalog against both mapping tables.
    pub fn new(parts: PipelineParts) -> Result<Self, CatalogError> {
        let catalog = Arc::new(parts.catalog);
        let aggregator = Arc::new(MetricAggregator::new(
            Arc::clone(&catalog),
            parts.readability,
            parts.style,
            parts.aggregator,
        )?);
        let mapper = Arc::new(TargetMapper::new(Arc::clone(&catalog), parts.profiles)?);
        let coordinator = UpdateCoordinator::new(
            parts.coordinator,
            Arc::clone(&aggregator),
            Arc::clone(&mapper),
            parts.gate,
        );

        Ok(Self {
            catalog,
            aggregator,
            mapper,
            coordinator,
        })
    }

    pub fn catalog(&self) -> &AxisCatalog {
        &self.catalog
    }

    pub fn aggregator(&self) -> &Arc<MetricAggregator> {
        &self.aggregator
    }

    pub fn mapper(&self) -> &Arc<TargetMapper> {
        &self.mapper
    }

    pub fn coordinator(&self) -> &UpdateCoordinator {
        &self.coordinator
    }

    pub async fn snapshot(&self, cancel: &CancellationToken) -> RadarResult<Arc<MetricSnapshot>> {
        self.aggregator.get_snapshot(cancel).await
    }

    /// Overlay for the active profile.
    pub async fn overlay(
        &self,
        cancel: &CancellationToken,
    ) -> RadarResult<Option<Arc<TargetSnapshot>>> {
        self.mapper.active_overlay(cancel).await
    }

    /// Pull the snapshot and the overlay concurrently.
    pub async fn view(&self, cancel: &CancellationToken) -> RadarResult<RadarView> {
        let (current, target) =
            futures::try_join!(self.snapshot(cancel), self.overlay(cancel))?;
        Ok(RadarView { current, target })
    }

    /// Refresh now, skipping the debounce window, and return the fresh view.
    pub async fn force_refresh(&self, cancel: &CancellationToken) -> RadarResult<RadarView> {
        let outcome = self.coordinator.handle(UpdateTrigger::ManualRefresh);
        if outcome != HandleOutcome::Dispatched {
            debug!("Manual refresh not dispatched ({:?}), serving cached view", outcome);
        }
        self.view(cancel).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RefreshNotification> {
        self.coordinator.subscribe()
    }
}
