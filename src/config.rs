//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.radar.toml` files.

use crate::analysis::AggregatorConfig;
use crate::axes::AxisCatalog;
use crate::coordinator::CoordinatorConfig;
use crate::error::CatalogError;
use crate::models::{AxisDefinition, AxisId, Normalization, NormalizationKind, QualityProfile};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default config file name.
pub const CONFIG_FILE: &str = ".radar.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Update coordinator settings.
    #[serde(default)]
    pub coordinator: CoordinatorSettings,

    /// Metric aggregation settings.
    #[serde(default)]
    pub aggregator: AggregatorSettings,

    /// Feature switches.
    #[serde(default)]
    pub features: FeatureConfig,

    /// Default quality profile.
    #[serde(default)]
    pub profile: Option<QualityProfile>,

    /// Custom axis catalog. Empty means the built-in catalog.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub axes: Vec<AxisConfig>,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path. Empty writes to stdout.
    #[serde(default)]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

/// Update coordinator settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorSettings {
    /// Debounce window for metric changes, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Buffered notifications per subscriber.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,

    /// How often `--watch` checks the metrics file, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            notification_capacity: default_notification_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_notification_capacity() -> usize {
    64
}

fn default_poll_interval_ms() -> u64 {
    500
}

/// Metric aggregation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatorSettings {
    /// Timeout for a single analyzer call, in milliseconds.
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            provider_timeout_ms: default_provider_timeout_ms(),
        }
    }
}

fn default_provider_timeout_ms() -> u64 {
    2000
}

/// Feature switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Whether the radar feature is enabled for this user.
    #[serde(default = "default_true")]
    pub radar_enabled: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            radar_enabled: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// One `[[axes]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisConfig {
    /// Axis identifier (readability, clarity, precision, accessibility, density, flow).
    pub axis: String,
    pub kind: NormalizationKind,
    #[serde(default)]
    pub max_value: Option<f64>,
    #[serde(default)]
    pub target_value: Option<f64>,
    #[serde(default)]
    pub max_deviation: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub sort_order: Option<u32>,
}

impl AxisConfig {
    /// Validate the entry into an axis definition.
    pub fn to_definition(&self, position: u32) -> Result<AxisDefinition, CatalogError> {
        let id: AxisId = self.axis.parse()?;
        let name = id.as_str().to_string();
        let require = |value: Option<f64>, field: &'static str| {
            value.ok_or_else(|| CatalogError::MissingParameter {
                axis: name.clone(),
                field,
            })
        };

        let normalization = match self.kind {
            NormalizationKind::Direct => Normalization::Direct {
                max_value: require(self.max_value, "max_value")?,
            },
            NormalizationKind::Inverse => Normalization::Inverse {
                max_value: require(self.max_value, "max_value")?,
            },
            NormalizationKind::TargetCentered => Normalization::TargetCentered {
                target: require(self.target_value, "target_value")?,
                max_deviation: require(self.max_deviation, "max_deviation")?,
            },
        };

        let mut definition =
            AxisDefinition::new(id, normalization, self.sort_order.unwrap_or(position));
        definition.description = self.description.clone();
        definition.unit = self.unit.clone();
        Ok(definition)
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(debounce) = args.debounce_ms {
            self.coordinator.debounce_ms = debounce;
        }
        if let Some(timeout) = args.provider_timeout_ms {
            self.aggregator.provider_timeout_ms = timeout;
        }
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Build the axis catalog: the `[[axes]]` entries, or the built-in one.
    pub fn catalog(&self) -> Result<AxisCatalog, CatalogError> {
        if self.axes.is_empty() {
            return Ok(AxisCatalog::standard());
        }

        let axes = self
            .axes
            .iter()
            .enumerate()
            .map(|(i, axis)| axis.to_definition(i as u32))
            .collect::<Result<Vec<_>, _>>()?;
        AxisCatalog::new(axes)
    }

    /// Log level after merging: `quiet` wins, then `[general] verbose`.
    pub fn log_level(&self, quiet: bool) -> tracing::Level {
        if quiet {
            tracing::Level::ERROR
        } else if self.general.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig {
            provider_timeout: Duration::from_millis(self.aggregator.provider_timeout_ms.max(1)),
        }
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            debounce: Duration::from_millis(self.coordinator.debounce_ms),
            notification_capacity: self.coordinator.notification_capacity,
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.coordinator.poll_interval_ms.max(10))
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config {
            profile: Some(QualityProfile {
                id: "general".to_string(),
                name: "General audience".to_string(),
                target_grade_level: Some(8.0),
                grade_tolerance: Some(1.0),
                allow_passive_voice: Some(true),
                max_passive_voice_percent: Some(10.0),
                flag_filler_words: Some(true),
                flag_hedging_words: Some(false),
                max_sentence_length: Some(25.0),
            }),
            ..Config::default()
        };
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
