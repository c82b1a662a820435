//! Collaborator seams of the radar pipeline.
//!
//! The pipeline never analyzes text itself. It pulls raw metrics from
//! [`TextAnalysisProvider`]s, the active profile from a
//! [`ProfileProvider`] and asks a [`CapabilityGate`] whether the feature
//! is available at all.

pub mod file;
pub mod sources;

pub use file::JsonMetricsFile;
pub use sources::{metric_source_for, MetricSource, ProviderSlot, METRIC_SOURCES};

use crate::error::ProviderError;
use crate::models::QualityProfile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// A single value reported by an analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Number(f64),
    Text(String),
}

impl MetricValue {
    /// Numeric reading of the value. Text is accepted when it parses.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetricValue::Number(n) if n.is_finite() => Some(*n),
            MetricValue::Number(_) => None,
            MetricValue::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        }
    }
}

/// Metrics returned by one analyzer for the active document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricReport {
    pub values: HashMap<String, MetricValue>,
}

impl MetricReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.values.insert(key.into(), MetricValue::Number(value));
        self
    }

    pub fn with_text(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), MetricValue::Text(value.into()));
        self
    }

    /// Numeric value for `key`, `None` when absent or unusable.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.values.get(key).and_then(MetricValue::as_number)
    }
}

/// Source of raw text metrics for the active document.
#[async_trait]
pub trait TextAnalysisProvider: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Identifier of the analyzed document, if the analyzer knows it.
    fn source_id(&self) -> Option<String> {
        None
    }

    async fn fetch_metrics(&self, cancel: &CancellationToken)
        -> Result<MetricReport, ProviderError>;
}

/// Source of the user's currently selected quality profile.
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    async fn active_profile(&self) -> Option<QualityProfile>;
}

/// Entitlement check for the radar feature.
pub trait CapabilityGate: Send + Sync {
    fn is_enabled(&self) -> bool;
}

/// In-memory analyzer, mostly for embedding and tests.
#[derive(Debug)]
pub struct StaticMetrics {
    name: String,
    report: RwLock<MetricReport>,
    reads: AtomicUsize,
}

impl StaticMetrics {
    pub fn new(name: impl Into<String>, report: MetricReport) -> Self {
        Self {
            name: name.into(),
            report: RwLock::new(report),
            reads: AtomicUsize::new(0),
        }
    }

    /// Replace the reported metrics.
    pub fn set(&self, report: MetricReport) {
        match self.report.write() {
            Ok(mut guard) => *guard = report,
            Err(poisoned) => *poisoned.into_inner() = report,
        }
    }

    /// How many times the metrics were fetched.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextAnalysisProvider for StaticMetrics {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch_metrics(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<MetricReport, ProviderError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.report
            .read()
            .map(|guard| guard.clone())
            .map_err(|_| ProviderError::failed(&self.name, "metric store poisoned"))
    }
}

/// Profile provider holding one optional profile in memory.
#[derive(Debug, Default)]
pub struct StaticProfile {
    profile: RwLock<Option<QualityProfile>>,
}

impl StaticProfile {
    pub fn new(profile: Option<QualityProfile>) -> Self {
        Self {
            profile: RwLock::new(profile),
        }
    }

    pub fn set(&self, profile: Option<QualityProfile>) {
        match self.profile.write() {
            Ok(mut guard) => *guard = profile,
            Err(poisoned) => *poisoned.into_inner() = profile,
        }
    }
}

#[async_trait]
impl ProfileProvider for StaticProfile {
    async fn active_profile(&self) -> Option<QualityProfile> {
        self.profile.read().ok().and_then(|guard| guard.clone())
    }
}

/// Capability gate backed by an atomic switch.
#[derive(Debug)]
pub struct FlagGate {
    enabled: AtomicBool,
}

impl FlagGate {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

impl CapabilityGate for FlagGate {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_value_as_number() {
        assert_eq!(MetricValue::Number(4.5).as_number(), Some(4.5));
        assert_eq!(MetricValue::Number(f64::NAN).as_number(), None);
        assert_eq!(MetricValue::Text(" 12.5 ".to_string()).as_number(), Some(12.5));
        assert_eq!(MetricValue::Text("n/a".to_string()).as_number(), None);
    }

    #[test]
    fn test_metric_report_lookup() {
        let report = MetricReport::new()
            .with("grade_level", 9.0)
            .with_text("readability_score", "61");
        assert_eq!(report.number("grade_level"), Some(9.0));
        assert_eq!(report.number("readability_score"), Some(61.0));
        assert_eq!(report.number("missing"), None);
    }

    #[test]
    fn test_metric_report_deserializes_mixed_values() {
        let report: MetricReport =
            serde_json::from_str(r#"{"values": {"a": 1.5, "b": "2"}}"#).unwrap();
        assert_eq!(report.number("a"), Some(1.5));
        assert_eq!(report.number("b"), Some(2.0));
    }

    #[tokio::test]
    async fn test_static_metrics_counts_reads() {
        let provider = StaticMetrics::new("readability", MetricReport::new().with("x", 1.0));
        let cancel = CancellationToken::new();

        let first = provider.fetch_metrics(&cancel).await.unwrap();
        assert_eq!(first.number("x"), Some(1.0));

        provider.set(MetricReport::new().with("x", 2.0));
        let second = provider.fetch_metrics(&cancel).await.unwrap();
        assert_eq!(second.number("x"), Some(2.0));
        assert_eq!(provider.reads(), 2);
    }

    #[tokio::test]
    async fn test_static_profile() {
        let provider = StaticProfile::new(None);
        assert!(provider.active_profile().await.is_none());

        provider.set(Some(QualityProfile::new("p", "Plain")));
        assert_eq!(
            provider.active_profile().await.map(|p| p.id),
            Some("p".to_string())
        );
    }

    #[test]
    fn test_flag_gate() {
        let gate = FlagGate::new(true);
        assert!(gate.is_enabled());
        gate.set_enabled(false);
        assert!(!gate.is_enabled());
    }
}
