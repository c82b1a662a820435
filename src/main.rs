//! Quality Radar - writing-quality radar for a document
//!
//! A CLI tool that scores analyzer output on six quality axes, compares
//! it against a quality profile and renders the result as a report.
//!
//! Exit codes:
//!   0 - Success (all axes at or above --min-score, or no --min-score set)
//!   1 - Runtime error (unreadable metrics, bad config, etc.)
//!   2 - At least one axis scored below --min-score

use anyhow::{Context, Result};
use chrono::Utc;
use quality_radar::cli::{Args, OutputFormat};
use quality_radar::config::{Config, CONFIG_FILE};
use quality_radar::models::{QualityProfile, RadarReport, ReportMetadata, UpdateTrigger};
use quality_radar::providers::{CapabilityGate, FlagGate, JsonMetricsFile, StaticProfile};
use quality_radar::report;
use quality_radar::{PipelineParts, RadarPipeline};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

const READABILITY_SECTION: &str = "readability";
const STYLE_SECTION: &str = "style";

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config first so `[general] verbose` can raise the log level.
    let (mut config, origin) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(config.log_level(args.quiet));

    info!("Quality Radar v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    origin.log();

    match run(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Radar failed: {:#}", e);
            eprintln!("\nError: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .radar.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("{} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to customize the profile, debounce window and axes.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Everything a render needs besides the pipeline.
struct RenderContext {
    document: String,
    output: Option<PathBuf>,
    format: OutputFormat,
    min_score: Option<f64>,
}

/// Build the pipeline and render once, or keep rendering in watch mode.
async fn run(args: Args, config: Config) -> Result<i32> {
    let metrics_path = args
        .metrics
        .clone()
        .context("No metrics file given (use --metrics)")?;

    let profile = match args.profile {
        Some(ref path) => Some(read_profile(path).await?),
        None => config.profile.clone(),
    };
    match profile {
        Some(ref p) => info!("Using quality profile: {} ({})", p.name, p.id),
        None => info!("No quality profile selected, target overlay disabled"),
    }

    let catalog = config.catalog().context("Invalid axis configuration")?;
    let profiles = Arc::new(StaticProfile::new(profile));
    let gate = Arc::new(FlagGate::new(config.features.radar_enabled));

    if !gate.is_enabled() {
        warn!("Radar feature is disabled in [features]; nothing to render");
        return Ok(0);
    }

    let pipeline = RadarPipeline::new(PipelineParts {
        catalog,
        readability: Arc::new(JsonMetricsFile::new(&metrics_path, READABILITY_SECTION)),
        style: Arc::new(JsonMetricsFile::new(&metrics_path, STYLE_SECTION)),
        profiles: profiles.clone(),
        gate,
        aggregator: config.aggregator_config(),
        coordinator: config.coordinator_config(),
    })
    .context("Axis catalog does not match the metric tables")?;

    let output = if config.general.output.is_empty() {
        None
    } else {
        Some(PathBuf::from(&config.general.output))
    };
    let ctx = RenderContext {
        document: metrics_path.display().to_string(),
        output,
        format: args.format,
        min_score: args.min_score,
    };

    if args.watch {
        return run_watch(&pipeline, &ctx, &config, &metrics_path, args.profile.as_deref(), &profiles)
            .await;
    }

    let report = render(&pipeline, &ctx, &CancellationToken::new()).await?;
    Ok(exit_code(&report, ctx.min_score))
}

/// Pull a fresh view from the pipeline and write the report.
async fn render(
    pipeline: &RadarPipeline,
    ctx: &RenderContext,
    cancel: &CancellationToken,
) -> Result<RadarReport> {
    let start_time = Instant::now();

    let view = pipeline
        .view(cancel)
        .await
        .context("Failed to compute the radar view")?;
    let summary = view.summary();

    let report = RadarReport {
        metadata: ReportMetadata {
            generated_at: Utc::now(),
            document: Some(ctx.document.clone()),
            profile_name: view.target.as_ref().map(|t| t.profile_name.clone()),
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        current: (*view.current).clone(),
        target: view.target.as_deref().cloned(),
        summary,
    };

    let content = match ctx.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    match ctx.output {
        Some(ref path) => {
            report::write_report(&content, path)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!(
                "Report saved to {} (average score {:.1})",
                path.display(),
                report.summary.average_score
            );
        }
        None => println!("{}", content),
    }

    Ok(report)
}

/// Re-render on every coordinator notification until Ctrl-C.
async fn run_watch(
    pipeline: &RadarPipeline,
    ctx: &RenderContext,
    config: &Config,
    metrics_path: &Path,
    profile_path: Option<&Path>,
    profiles: &Arc<StaticProfile>,
) -> Result<i32> {
    let cancel = CancellationToken::new();
    let coordinator = pipeline.coordinator();
    coordinator.start_listening();

    let mut notifications = pipeline.subscribe();
    let (tx, rx) = mpsc::channel(32);
    let listener = coordinator.listen(rx);

    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping watch");
        }
        interrupt.cancel();
    });

    let watcher = tokio::spawn(watch_files(
        metrics_path.to_path_buf(),
        profile_path.map(Path::to_path_buf),
        Arc::clone(profiles),
        tx,
        config.poll_interval(),
        cancel.clone(),
    ));

    info!(
        "Watching {} (debounce {}ms)",
        metrics_path.display(),
        config.coordinator.debounce_ms
    );

    let mut last = render(pipeline, ctx, &cancel).await?;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            received = notifications.recv() => match received {
                Ok(notification) => {
                    debug!(
                        "Refresh after {} (immediate: {})",
                        notification.trigger, notification.was_immediate
                    );
                    match render(pipeline, ctx, &cancel).await {
                        Ok(report) => last = report,
                        Err(e) if cancel.is_cancelled() => debug!("Render cancelled: {:#}", e),
                        Err(e) => warn!("Render failed: {:#}", e),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Skipped {} notifications", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }

    coordinator.stop_listening();
    if let Err(e) = watcher.await {
        warn!("File watcher ended abnormally: {}", e);
    }
    listener.abort();

    Ok(exit_code(&last, ctx.min_score))
}

/// Last-seen state of the watched files.
#[derive(Debug, Default, PartialEq)]
struct WatchedState {
    readability: Option<Value>,
    style: Option<Value>,
    profile: Option<QualityProfile>,
}

/// Triggers to send for the difference between two observations.
fn changed_triggers(previous: &WatchedState, current: &WatchedState) -> Vec<UpdateTrigger> {
    let mut triggers = Vec::new();
    if previous.readability != current.readability {
        triggers.push(UpdateTrigger::MetricsChangedA);
    }
    if previous.style != current.style {
        triggers.push(UpdateTrigger::MetricsChangedB);
    }
    if previous.profile != current.profile {
        triggers.push(UpdateTrigger::ProfileChanged {
            profile_id: current.profile.as_ref().map(|p| p.id.clone()),
        });
    }
    triggers
}

async fn observe(metrics_path: &Path, profile_path: Option<&Path>) -> WatchedState {
    let mut state = WatchedState::default();

    match read_json(metrics_path).await {
        Ok(mut root) => {
            state.readability = root.get_mut(READABILITY_SECTION).map(Value::take);
            state.style = root.get_mut(STYLE_SECTION).map(Value::take);
        }
        Err(e) => debug!("Metrics file not readable yet: {:#}", e),
    }

    if let Some(path) = profile_path {
        match read_profile(path).await {
            Ok(profile) => state.profile = Some(profile),
            Err(e) => debug!("Profile file not readable: {:#}", e),
        }
    }

    state
}

/// Poll the watched files and feed changes into the coordinator.
async fn watch_files(
    metrics_path: PathBuf,
    profile_path: Option<PathBuf>,
    profiles: Arc<StaticProfile>,
    tx: mpsc::Sender<UpdateTrigger>,
    poll_interval: std::time::Duration,
    cancel: CancellationToken,
) {
    let mut previous = observe(&metrics_path, profile_path.as_deref()).await;
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let current = observe(&metrics_path, profile_path.as_deref()).await;
        let triggers = changed_triggers(&previous, &current);
        if triggers.is_empty() {
            continue;
        }

        if previous.profile != current.profile {
            profiles.set(current.profile.clone());
        }
        for trigger in triggers {
            debug!("Detected change: {}", trigger);
            if tx.send(trigger).await.is_err() {
                return;
            }
        }
        previous = current;
    }
}

async fn read_json(path: &Path) -> Result<Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

async fn read_profile(path: &Path) -> Result<QualityProfile> {
    let value = read_json(path).await?;
    serde_json::from_value(value)
        .with_context(|| format!("Invalid quality profile in {}", path.display()))
}

/// 2 when any axis scored below the threshold, else 0.
fn exit_code(report: &RadarReport, min_score: Option<f64>) -> i32 {
    let Some(threshold) = min_score else {
        return 0;
    };

    let failing: Vec<&str> = report
        .current
        .points
        .iter()
        .filter(|p| p.normalized_value < threshold)
        .map(|p| p.axis_name.as_str())
        .collect();

    if failing.is_empty() {
        0
    } else {
        eprintln!(
            "\nAxes below {:.0}: {}. Failing (exit code 2).",
            threshold,
            failing.join(", ")
        );
        2
    }
}

/// Where the configuration came from, logged once logging is up.
enum ConfigOrigin {
    Explicit(PathBuf),
    DefaultFile,
    Builtin,
    Unreadable(anyhow::Error),
}

impl ConfigOrigin {
    fn log(&self) {
        match self {
            ConfigOrigin::Explicit(path) => info!("Loaded config from: {}", path.display()),
            ConfigOrigin::DefaultFile => info!("Loaded default config from {}", CONFIG_FILE),
            ConfigOrigin::Builtin => debug!("No config file found, using defaults"),
            ConfigOrigin::Unreadable(e) => warn!("Failed to load config: {:#}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigOrigin)> {
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigOrigin::Explicit(config_path.clone())));
    }

    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigOrigin::DefaultFile)),
        Ok(None) => Ok((Config::default(), ConfigOrigin::Builtin)),
        Err(e) => Ok((Config::default(), ConfigOrigin::Unreadable(e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quality_radar::models::{MetricPoint, MetricSnapshot, RadarSummary};
    use serde_json::json;

    fn report_with_scores(scores: &[(&str, f64)]) -> RadarReport {
        let current = MetricSnapshot {
            points: scores
                .iter()
                .map(|(axis, score)| MetricPoint {
                    axis_name: axis.to_string(),
                    normalized_value: *score,
                    raw_value: *score,
                    unit: None,
                })
                .collect(),
            computed_at: Utc::now(),
            source_id: None,
        };
        RadarReport {
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                document: None,
                profile_name: None,
                duration_seconds: 0.0,
            },
            summary: RadarSummary::from_snapshots(&current, None),
            current,
            target: None,
        }
    }

    #[test]
    fn test_exit_code_threshold() {
        let report = report_with_scores(&[("Readability", 72.0), ("Clarity", 40.0)]);

        assert_eq!(exit_code(&report, None), 0);
        assert_eq!(exit_code(&report, Some(40.0)), 0);
        assert_eq!(exit_code(&report, Some(50.0)), 2);
    }

    #[test]
    fn test_changed_triggers() {
        let before = WatchedState {
            readability: Some(json!({"readability_score": 60})),
            style: Some(json!({"passive_voice_percent": 8})),
            profile: None,
        };

        let mut after = WatchedState {
            readability: before.readability.clone(),
            style: Some(json!({"passive_voice_percent": 12})),
            profile: None,
        };
        assert_eq!(
            changed_triggers(&before, &after),
            vec![UpdateTrigger::MetricsChangedB]
        );

        after.readability = None;
        after.profile = Some(QualityProfile::new("news", "Newsroom"));
        assert_eq!(
            changed_triggers(&before, &after),
            vec![
                UpdateTrigger::MetricsChangedA,
                UpdateTrigger::MetricsChangedB,
                UpdateTrigger::ProfileChanged {
                    profile_id: Some("news".to_string())
                },
            ]
        );

        assert!(changed_triggers(&before, &before).is_empty());
    }

    #[tokio::test]
    async fn test_observe_reads_sections_and_profile() {
        let dir = tempfile::tempdir().unwrap();
        let metrics = dir.path().join("metrics.json");
        let profile = dir.path().join("profile.json");
        std::fs::write(
            &metrics,
            r#"{"readability": {"grade_level": 9}, "style": {"avg_sentence_length": 17}}"#,
        )
        .unwrap();
        std::fs::write(&profile, r#"{"id": "news", "name": "Newsroom"}"#).unwrap();

        let state = observe(&metrics, Some(&profile)).await;
        assert_eq!(state.readability, Some(json!({"grade_level": 9})));
        assert_eq!(state.style, Some(json!({"avg_sentence_length": 17})));
        assert_eq!(state.profile.map(|p| p.id), Some("news".to_string()));

        let missing = observe(&dir.path().join("absent.json"), None).await;
        assert_eq!(missing, WatchedState::default());
    }
}
