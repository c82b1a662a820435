//! Live metric aggregation.
//!
//! Pulls raw metrics from the two analyzers, normalizes them through the
//! axis catalog and keeps the resulting snapshot until it is invalidated.

use crate::axes::AxisCatalog;
use crate::error::{CatalogError, ProviderError, RadarError, RadarResult};
use crate::models::{MetricPoint, MetricSnapshot};
use crate::providers::sources::validate_table;
use crate::providers::{
    metric_source_for, MetricReport, ProviderSlot, TextAnalysisProvider, METRIC_SOURCES,
};
use chrono::Utc;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Settings for the aggregator.
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Upper bound for a single analyzer call.
    pub provider_timeout: Duration,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            provider_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Default)]
struct CacheSlot {
    snapshot: Option<Arc<MetricSnapshot>>,
    /// Bumped on every invalidation.
    generation: u64,
}

/// Computes and caches the normalized metric snapshot.
pub struct MetricAggregator {
    catalog: Arc<AxisCatalog>,
    readability: Arc<dyn TextAnalysisProvider>,
    style: Arc<dyn TextAnalysisProvider>,
    config: AggregatorConfig,
    cache: RwLock<CacheSlot>,
    compute_lock: Mutex<()>,
}

impl MetricAggregator {
    /// Create an aggregator. Fails if an axis has no metric source.
    pub fn new(
        catalog: Arc<AxisCatalog>,
        readability: Arc<dyn TextAnalysisProvider>,
        style: Arc<dyn TextAnalysisProvider>,
        config: AggregatorConfig,
    ) -> Result<Self, CatalogError> {
        validate_table(&catalog, METRIC_SOURCES, |s| s.axis, "metric source")?;

        Ok(Self {
            catalog,
            readability,
            style,
            config,
            cache: RwLock::new(CacheSlot::default()),
            compute_lock: Mutex::new(()),
        })
    }

    pub fn catalog(&self) -> &Arc<AxisCatalog> {
        &self.catalog
    }

    /// Return the cached snapshot, computing it first if needed.
    ///
    /// Concurrent callers share a single computation. A failed or
    /// cancelled computation never touches the cache.
    pub async fn get_snapshot(&self, cancel: &CancellationToken) -> RadarResult<Arc<MetricSnapshot>> {
        if cancel.is_cancelled() {
            return Err(RadarError::Cancelled);
        }

        if let Some(snapshot) = self.cached()? {
            debug!("Metric snapshot served from cache");
            return Ok(snapshot);
        }

        let _guard = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RadarError::Cancelled),
            guard = self.compute_lock.lock() => guard,
        };

        // Someone else may have finished while we waited for the lock.
        if let Some(snapshot) = self.cached()? {
            debug!("Metric snapshot computed by a concurrent caller");
            return Ok(snapshot);
        }

        let generation = self.generation()?;
        let started = Instant::now();

        let snapshot = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RadarError::Cancelled),
            result = self.compute(cancel) => result?,
        };

        if cancel.is_cancelled() {
            return Err(RadarError::Cancelled);
        }

        let snapshot = Arc::new(snapshot);
        let stored = self.store(Arc::clone(&snapshot), generation)?;
        info!(
            "Computed metric snapshot for {} axes in {:.1}ms{}",
            snapshot.points.len(),
            started.elapsed().as_secs_f64() * 1000.0,
            if stored { "" } else { " (invalidated meanwhile, not cached)" }
        );

        Ok(snapshot)
    }

    /// Drop the cached snapshot. The next `get_snapshot` recomputes.
    pub fn invalidate_cache(&self) -> RadarResult<()> {
        let mut slot = self
            .cache
            .write()
            .map_err(|_| RadarError::CacheUnavailable("metric"))?;
        slot.snapshot = None;
        slot.generation = slot.generation.wrapping_add(1);
        debug!("Metric snapshot invalidated (generation {})", slot.generation);
        Ok(())
    }

    /// Peek at the cache without computing.
    pub fn cached(&self) -> RadarResult<Option<Arc<MetricSnapshot>>> {
        self.cache
            .read()
            .map(|slot| slot.snapshot.clone())
            .map_err(|_| RadarError::CacheUnavailable("metric"))
    }

    fn generation(&self) -> RadarResult<u64> {
        self.cache
            .read()
            .map(|slot| slot.generation)
            .map_err(|_| RadarError::CacheUnavailable("metric"))
    }

    /// Store `snapshot` unless the cache was invalidated since `generation`.
    fn store(&self, snapshot: Arc<MetricSnapshot>, generation: u64) -> RadarResult<bool> {
        let mut slot = self
            .cache
            .write()
            .map_err(|_| RadarError::CacheUnavailable("metric"))?;
        if slot.generation != generation {
            return Ok(false);
        }
        slot.snapshot = Some(snapshot);
        Ok(true)
    }

    async fn compute(&self, cancel: &CancellationToken) -> RadarResult<MetricSnapshot> {
        let (readability, style) = futures::try_join!(
            self.fetch(ProviderSlot::Readability, cancel),
            self.fetch(ProviderSlot::Style, cancel),
        )?;

        let points = self
            .catalog
            .axes()
            .iter()
            .map(|axis| {
                let raw = metric_source_for(axis.id).and_then(|source| {
                    let report = match source.slot {
                        ProviderSlot::Readability => &readability,
                        ProviderSlot::Style => &style,
                    };
                    report.number(source.key)
                });

                let raw = raw.unwrap_or_else(|| {
                    warn!("Metric for axis '{}' is missing, using 0", axis.name);
                    0.0
                });

                MetricPoint {
                    axis_name: axis.name.clone(),
                    normalized_value: self.catalog.normalize(axis, raw),
                    raw_value: raw,
                    unit: axis.unit.clone(),
                }
            })
            .collect();

        Ok(MetricSnapshot {
            points,
            computed_at: Utc::now(),
            source_id: self.readability.source_id().or_else(|| self.style.source_id()),
        })
    }

    /// Read one analyzer, skipping it when no axis needs it.
    async fn fetch(
        &self,
        slot: ProviderSlot,
        cancel: &CancellationToken,
    ) -> Result<MetricReport, ProviderError> {
        let needed = self
            .catalog
            .axes()
            .iter()
            .filter_map(|axis| metric_source_for(axis.id))
            .any(|source| source.slot == slot);
        if !needed {
            return Ok(MetricReport::default());
        }

        let provider = match slot {
            ProviderSlot::Readability => &self.readability,
            ProviderSlot::Style => &self.style,
        };

        match tokio::time::timeout(self.config.provider_timeout, provider.fetch_metrics(cancel)).await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                provider: provider.name().to_string(),
                timeout_ms: self.config.provider_timeout.as_millis() as u64,
            }),
        }
    }
}
