//! JSON-file backed analyzer.
//!
//! The metrics file holds one object per analyzer:
//!
//! ```json
//! {
//!   "readability": { "readability_score": 62.0, "grade_level": 9 },
//!   "style": { "passive_voice_percent": 12, "avg_sentence_length": "17.5" }
//! }
//! ```

use super::{MetricReport, MetricValue, TextAnalysisProvider};
use crate::error::ProviderError;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Reads one section of a JSON metrics file on every fetch.
#[derive(Debug, Clone)]
pub struct JsonMetricsFile {
    path: PathBuf,
    section: String,
}

impl JsonMetricsFile {
    pub fn new(path: impl Into<PathBuf>, section: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            section: section.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Extract this provider's section from an already parsed file.
    pub fn section_of(&self, root: &Value) -> Result<MetricReport, ProviderError> {
        let section = match root.get(&self.section) {
            Some(Value::Object(map)) => map,
            Some(Value::Null) | None => return Ok(MetricReport::default()),
            Some(_) => {
                return Err(ProviderError::failed(
                    &self.section,
                    format!("section '{}' is not an object", self.section),
                ))
            }
        };

        let mut report = MetricReport::default();
        for (key, value) in section {
            let value = match value {
                Value::Number(n) => n.as_f64().map(MetricValue::Number),
                Value::String(s) => Some(MetricValue::Text(s.clone())),
                _ => None,
            };
            if let Some(value) = value {
                report.values.insert(key.clone(), value);
            }
        }
        Ok(report)
    }
}

#[async_trait]
impl TextAnalysisProvider for JsonMetricsFile {
    fn name(&self) -> &str {
        &self.section
    }

    fn source_id(&self) -> Option<String> {
        Some(self.path.display().to_string())
    }

    async fn fetch_metrics(
        &self,
        _cancel: &CancellationToken,
    ) -> Result<MetricReport, ProviderError> {
        debug!("Reading '{}' metrics from {}", self.section, self.path.display());

        let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            ProviderError::failed(
                &self.section,
                format!("failed to read {}: {}", self.path.display(), e),
            )
        })?;

        let root: Value = serde_json::from_str(&content).map_err(|e| {
            ProviderError::failed(
                &self.section,
                format!("failed to parse {}: {}", self.path.display(), e),
            )
        })?;

        self.section_of(&root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_metrics(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_reads_section() {
        let file = write_metrics(
            r#"{"readability": {"readability_score": 62.5, "grade_level": "9", "note": true},
                "style": {"avg_sentence_length": 17}}"#,
        );
        let provider = JsonMetricsFile::new(file.path(), "readability");

        let report = provider
            .fetch_metrics(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(report.number("readability_score"), Some(62.5));
        assert_eq!(report.number("grade_level"), Some(9.0));
        assert!(report.values.get("note").is_none());
        assert_eq!(report.number("avg_sentence_length"), None);
        assert_eq!(
            provider.source_id(),
            Some(file.path().display().to_string())
        );
    }

    #[tokio::test]
    async fn test_missing_section_is_empty() {
        let file = write_metrics(r#"{"readability": {}}"#);
        let provider = JsonMetricsFile::new(file.path(), "style");

        let report = provider
            .fetch_metrics(&CancellationToken::new())
            .await
            .unwrap();
        assert!(report.values.is_empty());
    }

    #[tokio::test]
    async fn test_bad_json_fails() {
        let file = write_metrics("{ not json");
        let provider = JsonMetricsFile::new(file.path(), "style");

        let err = provider
            .fetch_metrics(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_fails() {
        let provider = JsonMetricsFile::new("/nonexistent/metrics.json", "style");
        tokio_test::assert_err!(provider.fetch_metrics(&CancellationToken::new()).await);
    }
}
