//! Fixed mapping from radar axes to the analyzer metric that feeds them.

use crate::axes::AxisCatalog;
use crate::error::CatalogError;
use crate::models::AxisId;

/// Which of the two analyzers a metric comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderSlot {
    /// Readability analyzer; its change signal is `MetricsChangedA`.
    Readability,
    /// Style analyzer; its change signal is `MetricsChangedB`.
    Style,
}

/// Where the raw value of one axis is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSource {
    pub axis: AxisId,
    pub slot: ProviderSlot,
    pub key: &'static str,
}

pub const METRIC_SOURCES: &[MetricSource] = &[
    MetricSource {
        axis: AxisId::Readability,
        slot: ProviderSlot::Readability,
        key: "readability_score",
    },
    MetricSource {
        axis: AxisId::Accessibility,
        slot: ProviderSlot::Readability,
        key: "grade_level",
    },
    MetricSource {
        axis: AxisId::Clarity,
        slot: ProviderSlot::Style,
        key: "passive_voice_percent",
    },
    MetricSource {
        axis: AxisId::Precision,
        slot: ProviderSlot::Style,
        key: "weak_words_per_100",
    },
    MetricSource {
        axis: AxisId::Density,
        slot: ProviderSlot::Style,
        key: "avg_sentence_length",
    },
    MetricSource {
        axis: AxisId::Flow,
        slot: ProviderSlot::Style,
        key: "sentence_length_stddev",
    },
];

pub fn metric_source_for(axis: AxisId) -> Option<&'static MetricSource> {
    METRIC_SOURCES.iter().find(|s| s.axis == axis)
}

/// Check that every catalog axis has exactly one entry in `table`.
pub(crate) fn validate_table<T>(
    catalog: &AxisCatalog,
    table: &[T],
    axis_of: impl Fn(&T) -> AxisId,
    table_name: &'static str,
) -> Result<(), CatalogError> {
    for axis in catalog.axes() {
        let count = table.iter().filter(|entry| axis_of(entry) == axis.id).count();
        match count {
            1 => {}
            0 => {
                return Err(CatalogError::MissingMapping {
                    axis: axis.name.clone(),
                    table: table_name,
                })
            }
            count => {
                return Err(CatalogError::DuplicateMapping {
                    axis: axis.name.clone(),
                    table: table_name,
                    count,
                })
            }
        }
    }
    Ok(())
}
