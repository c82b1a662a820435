//! Data models for the quality radar.
//!
//! This module contains the core data structures shared by the catalog,
//! the aggregator, the target mapper and the update coordinator.

use crate::error::CatalogError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Identifier of a quality axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisId {
    /// How easy the text is to read (readability score).
    Readability,
    /// How much of the text avoids passive voice.
    Clarity,
    /// How few weak words (fillers, hedges) the text uses.
    Precision,
    /// How close the grade level sits to the intended audience.
    Accessibility,
    /// Average sentence length.
    Density,
    /// Variety of sentence lengths.
    Flow,
}

impl AxisId {
    /// All axes in default display order.
    pub const ALL: [AxisId; 6] = [
        AxisId::Readability,
        AxisId::Clarity,
        AxisId::Precision,
        AxisId::Accessibility,
        AxisId::Density,
        AxisId::Flow,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AxisId::Readability => "Readability",
            AxisId::Clarity => "Clarity",
            AxisId::Precision => "Precision",
            AxisId::Accessibility => "Accessibility",
            AxisId::Density => "Density",
            AxisId::Flow => "Flow",
        }
    }
}

impl fmt::Display for AxisId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AxisId {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AxisId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| CatalogError::UnknownAxis(s.to_string()))
    }
}

/// Field-less tag of a normalization rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationKind {
    Direct,
    Inverse,
    TargetCentered,
}

impl fmt::Display for NormalizationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NormalizationKind::Direct => write!(f, "direct"),
            NormalizationKind::Inverse => write!(f, "inverse"),
            NormalizationKind::TargetCentered => write!(f, "target-centered"),
        }
    }
}

/// Rule that maps a raw metric onto the 0-100 scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Normalization {
    /// Higher raw values are better.
    Direct { max_value: f64 },
    /// Lower raw values are better.
    Inverse { max_value: f64 },
    /// Raw values closest to `target` are best.
    TargetCentered { target: f64, max_deviation: f64 },
}

impl Normalization {
    pub fn kind(&self) -> NormalizationKind {
        match self {
            Normalization::Direct { .. } => NormalizationKind::Direct,
            Normalization::Inverse { .. } => NormalizationKind::Inverse,
            Normalization::TargetCentered { .. } => NormalizationKind::TargetCentered,
        }
    }
}

/// A single axis of the radar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisDefinition {
    pub id: AxisId,
    /// Display name.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub normalization: Normalization,
    /// Display position, clockwise from the top.
    pub sort_order: u32,
}

impl AxisDefinition {
    pub fn new(id: AxisId, normalization: Normalization, sort_order: u32) -> Self {
        Self {
            id,
            name: id.as_str().to_string(),
            description: None,
            unit: None,
            normalization,
            sort_order,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn kind(&self) -> NormalizationKind {
        self.normalization.kind()
    }

    /// Upper end of the raw scale shown for this axis.
    pub fn max_value(&self) -> f64 {
        match self.normalization {
            Normalization::Direct { max_value } | Normalization::Inverse { max_value } => max_value,
            Normalization::TargetCentered {
                target,
                max_deviation,
            } => target + max_deviation,
        }
    }

    pub fn target_value(&self) -> Option<f64> {
        match self.normalization {
            Normalization::TargetCentered { target, .. } => Some(target),
            _ => None,
        }
    }

    pub fn max_deviation(&self) -> Option<f64> {
        match self.normalization {
            Normalization::TargetCentered { max_deviation, .. } => Some(max_deviation),
            _ => None,
        }
    }
}

/// One axis value of the live metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub axis_name: String,
    /// Score on the 0-100 scale.
    pub normalized_value: f64,
    pub raw_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// Immutable, normalized view of the live document metrics.
///
/// `points` always follows the catalog's axis order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    pub points: Vec<MetricPoint>,
    pub computed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl MetricSnapshot {
    pub fn point(&self, axis_name: &str) -> Option<&MetricPoint> {
        self.points
            .iter()
            .find(|p| p.axis_name.eq_ignore_ascii_case(axis_name))
    }
}

/// One axis value of a target overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetPoint {
    pub axis_name: String,
    pub normalized_value: f64,
    pub raw_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tolerance_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TargetPoint {
    /// Whether a raw value falls inside this point's tolerance band.
    ///
    /// Points without any tolerance bound accept nothing but the exact target.
    pub fn accepts(&self, raw: f64) -> bool {
        match (self.tolerance_min, self.tolerance_max) {
            (None, None) => raw == self.raw_value,
            (min, max) => {
                min.map_or(true, |lo| raw >= lo) && max.map_or(true, |hi| raw <= hi)
            }
        }
    }
}

/// Target overlay derived from a quality profile, same order as the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    pub profile_id: String,
    pub profile_name: String,
    pub points: Vec<TargetPoint>,
    pub computed_at: DateTime<Utc>,
}

impl TargetSnapshot {
    pub fn point(&self, axis_name: &str) -> Option<&TargetPoint> {
        self.points
            .iter()
            .find(|p| p.axis_name.eq_ignore_ascii_case(axis_name))
    }
}

/// A user-selected quality profile.
///
/// Every constraint is optional; missing ones fall back to per-axis defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityProfile {
    pub id: String,
    pub name: String,
    /// Intended reading grade level of the audience.
    pub target_grade_level: Option<f64>,
    /// Allowed deviation from the grade level, in grades.
    pub grade_tolerance: Option<f64>,
    pub allow_passive_voice: Option<bool>,
    pub max_passive_voice_percent: Option<f64>,
    pub flag_filler_words: Option<bool>,
    pub flag_hedging_words: Option<bool>,
    /// Longest acceptable sentence, in words.
    pub max_sentence_length: Option<f64>,
}

impl QualityProfile {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Number of weak-word flags the profile turns on.
    pub fn weak_word_flags(&self) -> usize {
        [self.flag_filler_words, self.flag_hedging_words]
            .iter()
            .filter(|flag| flag.unwrap_or(false))
            .count()
    }
}

/// External change signal fed into the update coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateTrigger {
    /// The readability analyzer has new metrics.
    MetricsChangedA,
    /// The style analyzer has new metrics.
    MetricsChangedB,
    /// The selected profile (or its constraints) changed. `None` means all profiles.
    ProfileChanged { profile_id: Option<String> },
    ManualRefresh,
    ViewOpened,
}

impl UpdateTrigger {
    /// Triggers that go through the debounce window.
    pub fn is_debounced(&self) -> bool {
        matches!(
            self,
            UpdateTrigger::MetricsChangedA | UpdateTrigger::MetricsChangedB
        )
    }

    /// Triggers whose dispatch must drop the metric snapshot.
    pub fn invalidates_metrics(&self) -> bool {
        matches!(
            self,
            UpdateTrigger::MetricsChangedA
                | UpdateTrigger::MetricsChangedB
                | UpdateTrigger::ManualRefresh
        )
    }
}

impl fmt::Display for UpdateTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateTrigger::MetricsChangedA => write!(f, "metrics-changed-a"),
            UpdateTrigger::MetricsChangedB => write!(f, "metrics-changed-b"),
            UpdateTrigger::ProfileChanged { profile_id: Some(id) } => {
                write!(f, "profile-changed({})", id)
            }
            UpdateTrigger::ProfileChanged { profile_id: None } => write!(f, "profile-changed"),
            UpdateTrigger::ManualRefresh => write!(f, "manual-refresh"),
            UpdateTrigger::ViewOpened => write!(f, "view-opened"),
        }
    }
}

/// Coalesced refresh signal delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshNotification {
    pub trigger: UpdateTrigger,
    /// False when the notification closes a debounced burst.
    pub was_immediate: bool,
    pub received_at: DateTime<Utc>,
    pub dispatched_at: DateTime<Utc>,
}

/// What happened to a single trigger handed to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// The coordinator is not listening.
    Dropped,
    /// The capability gate refused the caller.
    Denied,
    /// The debounce timer was started or reset.
    Debouncing,
    /// A notification went out.
    Dispatched,
}

/// Headline numbers of a radar view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RadarSummary {
    /// Mean of all normalized scores.
    pub average_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weakest_axis: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strongest_axis: Option<String>,
    /// Axes whose raw value sits inside the profile's tolerance band.
    pub within_tolerance: usize,
    /// Axes compared against a target.
    pub compared: usize,
}

impl RadarSummary {
    /// Summarize a metric snapshot, optionally against a target overlay.
    pub fn from_snapshots(current: &MetricSnapshot, target: Option<&TargetSnapshot>) -> Self {
        let mut summary = Self::default();
        if current.points.is_empty() {
            return summary;
        }

        let total: f64 = current.points.iter().map(|p| p.normalized_value).sum();
        summary.average_score = total / current.points.len() as f64;

        let by_score = |a: &&MetricPoint, b: &&MetricPoint| {
            a.normalized_value
                .partial_cmp(&b.normalized_value)
                .unwrap_or(std::cmp::Ordering::Equal)
        };
        summary.weakest_axis = current
            .points
            .iter()
            .min_by(by_score)
            .map(|p| p.axis_name.clone());
        summary.strongest_axis = current
            .points
            .iter()
            .max_by(by_score)
            .map(|p| p.axis_name.clone());

        if let Some(target) = target {
            for point in &current.points {
                if let Some(goal) = target.point(&point.axis_name) {
                    summary.compared += 1;
                    if goal.accepts(point.raw_value) {
                        summary.within_tolerance += 1;
                    }
                }
            }
        }

        summary
    }
}

/// Metadata about a rendered radar report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_name: Option<String>,
    pub duration_seconds: f64,
}

/// A complete radar report: live metrics, optional target and summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RadarReport {
    pub metadata: ReportMetadata,
    pub current: MetricSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<TargetSnapshot>,
    pub summary: RadarSummary,
}
