//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// Quality Radar - writing-quality radar for a document
///
/// Reads analyzer output for a document, scores it on six quality axes
/// and compares it against a quality profile. Markdown/JSON reports.
///
/// Examples:
///   quality-radar --metrics metrics.json
///   quality-radar --metrics metrics.json --profile newsroom.json --format json
///   quality-radar --metrics metrics.json --watch --debounce-ms 200
///   quality-radar --metrics metrics.json --min-score 60
///   quality-radar --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Analyzer output to score
    ///
    /// A JSON object with a `readability` section (readability_score,
    /// grade_level) and a `style` section (passive_voice_percent,
    /// weak_words_per_100, avg_sentence_length, sentence_length_stddev).
    #[arg(short, long, value_name = "FILE", required_unless_present = "init_config")]
    pub metrics: Option<PathBuf>,

    /// Quality profile to compare against (JSON)
    ///
    /// If not specified, the [profile] section of the config file is used.
    #[arg(short, long, value_name = "FILE")]
    pub profile: Option<PathBuf>,

    /// Output file path for the report
    ///
    /// If not specified, the report is written to stdout.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .radar.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Debounce window for metric changes in watch mode
    #[arg(long, value_name = "MS")]
    pub debounce_ms: Option<u64>,

    /// Timeout for reading one analyzer section
    #[arg(long, value_name = "MS")]
    pub provider_timeout_ms: Option<u64>,

    /// Keep running and re-render whenever the metrics file changes
    #[arg(short, long)]
    pub watch: bool,

    /// Fail if any axis scores below this value
    ///
    /// Useful for CI pipelines. Exit code 2 when the threshold is missed.
    #[arg(long, value_name = "SCORE")]
    pub min_score: Option<f64>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .radar.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        match self.metrics {
            None => return Err("--metrics is required".to_string()),
            Some(ref path) if !path.is_file() => {
                return Err(format!("Metrics file does not exist: {}", path.display()));
            }
            Some(_) => {}
        }

        if let Some(ref path) = self.profile {
            if !path.is_file() {
                return Err(format!("Profile file does not exist: {}", path.display()));
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(score) = self.min_score {
            if !(0.0..=100.0).contains(&score) {
                return Err("Minimum score must be between 0 and 100".to_string());
            }
        }

        if self.provider_timeout_ms == Some(0) {
            return Err("Provider timeout must be at least 1 ms".to_string());
        }

        if self.watch && self.output.is_none() && self.format == OutputFormat::Json {
            return Err("--watch with JSON output needs --output".to_string());
        }

        Ok(())
    }
}
