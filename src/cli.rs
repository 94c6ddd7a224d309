use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tabled::{Table, Tabled};
use tracing::{info, warn};

use weblog_triage::config::{Config, MAX_SUMMARY_LINES};
use weblog_triage::llm::prompts::summary::REPORT_SECTIONS;
use weblog_triage::llm::provider::create_provider;
use weblog_triage::{
    BatchOutcome, LogProcessor, LogSource, SummaryAnalyzer, SummaryReport, TrafficSummary, TriageError,
};

#[derive(Parser)]
#[command(name = "weblog-triage")]
#[command(author, version, about = "LLM-assisted triage of web access logs")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Classify the next batch(es) of the access log
    Process {
        /// Access-log CSV (overrides source.path)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Number of batches to process
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Process one batch per interval until interrupted
    Monitor {
        /// Access-log CSV (overrides source.path)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Seconds between batches (overrides monitor.interval_secs)
        #[arg(short, long)]
        interval: Option<u64>,
    },

    /// Show traffic statistics for the start of the access log
    Traffic {
        /// Access-log CSV (overrides source.path)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Records to read (overrides summary.max_lines)
        #[arg(short, long)]
        lines: Option<usize>,

        /// Output format (table, json)
        #[arg(long, default_value = "table")]
        format: String,
    },

    /// Generate a security report for the start of the access log
    Summary {
        /// Access-log CSV (overrides source.path)
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Records to read (overrides summary.max_lines)
        #[arg(short, long)]
        lines: Option<usize>,

        /// Output format (text, json)
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Check that the configured model backend is reachable
    Health,

    /// Generate default configuration file
    GenConfig {
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Table row for predictions
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Prediction")]
    prediction: String,
    #[tabled(rename = "Pattern")]
    pattern: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Req/s")]
    rps: String,
    #[tabled(rename = "Window")]
    window: String,
    #[tabled(rename = "First seen")]
    first_seen: String,
}

/// Table row for key/value statistics
#[derive(Tabled)]
struct StatRow {
    #[tabled(rename = "Metric")]
    metric: String,
    #[tabled(rename = "Value")]
    value: String,
}

pub fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load(path),
        None => Config::load_or_default(),
    }
}

pub async fn run_command(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Commands::Process { file, count, format } => cmd_process(config, file, count, format).await,
        Commands::Monitor { file, interval } => cmd_monitor(config, file, interval).await,
        Commands::Traffic { file, lines, format } => cmd_traffic(config, file, lines, format),
        Commands::Summary { file, lines, format } => cmd_summary(config, file, lines, format).await,
        Commands::Health => cmd_health(config).await,
        Commands::GenConfig { output } => cmd_gen_config(output),
    }
}

fn resolve_source(config: &Config, file: Option<PathBuf>) -> Result<LogSource> {
    let path = file
        .or_else(|| config.source.path.clone())
        .context("No access log given: pass --file or set source.path in the config")?;
    Ok(LogSource::new(path))
}

async fn cmd_process(config: Config, file: Option<PathBuf>, count: usize, format: String) -> Result<()> {
    let source = resolve_source(&config, file)?;
    let mut processor = LogProcessor::from_config(&config, source).context("Failed to set up the pipeline")?;

    let mut outcomes = Vec::with_capacity(count);
    for _ in 0..count.max(1) {
        outcomes.push(processor.process_logs().await?);
    }

    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&outcomes)?),
        _ => {
            for outcome in &outcomes {
                print_outcome(outcome);
            }
        }
    }

    Ok(())
}

async fn cmd_monitor(config: Config, file: Option<PathBuf>, interval: Option<u64>) -> Result<()> {
    let source = resolve_source(&config, file)?;
    let secs = interval.unwrap_or(config.monitor.interval_secs).max(1);
    let path = source.path().to_path_buf();
    let mut processor = LogProcessor::from_config(&config, source).context("Failed to set up the pipeline")?;

    info!(
        "Monitoring {} every {}s (batch size {})",
        path.display(),
        secs,
        config.source.batch_size
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match processor.process_logs().await {
                    Ok(outcome) => print_outcome(&outcome),
                    Err(TriageError::EmptyBatch) => warn!("Batch had no usable rows"),
                    Err(e) => return Err(e).context("Batch processing failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping monitor");
                break;
            }
        }
    }

    Ok(())
}

fn cmd_traffic(config: Config, file: Option<PathBuf>, lines: Option<usize>, format: String) -> Result<()> {
    let source = resolve_source(&config, file)?;
    let limit = lines.map_or(config.summary.effective_max_lines(), |n| n.min(MAX_SUMMARY_LINES));
    let rows = source
        .read_rows(Some(limit))
        .with_context(|| format!("Failed to read {}", source.path().display()))?;

    let summary = TrafficSummary::from_rows(&rows);
    match format.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => print_traffic(&summary),
    }

    Ok(())
}

async fn cmd_summary(config: Config, file: Option<PathBuf>, lines: Option<usize>, format: String) -> Result<()> {
    let source = resolve_source(&config, file)?;
    let limit = lines.map_or(config.summary.effective_max_lines(), |n| n.min(MAX_SUMMARY_LINES));
    let rows = source
        .read_rows(Some(limit))
        .with_context(|| format!("Failed to read {}", source.path().display()))?;

    let provider = create_provider(&config.llm).context("Failed to create LLM provider")?;
    let analyzer = SummaryAnalyzer::new(Arc::from(provider))
        .with_sample_size(config.summary.sample_size)
        .with_temperature(config.llm.temperature());

    let traffic = TrafficSummary::from_rows(&rows);
    let report = analyzer.generate(&rows).await.context("Failed to generate summary")?;

    match format.as_str() {
        "json" => {
            let combined = serde_json::json!({ "traffic": traffic, "report": report });
            println!("{}", serde_json::to_string_pretty(&combined)?);
        }
        _ => {
            print_traffic(&traffic);
            print_report(&report)?;
        }
    }

    Ok(())
}

async fn cmd_health(config: Config) -> Result<()> {
    let provider = create_provider(&config.llm).context("Failed to create LLM provider")?;
    let health = provider.health_check().await?;

    println!("{}", "=== Model Backend ===".bold());
    println!("Provider: {}", health.provider);
    if let Some(model) = &health.model {
        println!("Model:    {}", model);
    }
    if let Some(latency) = health.latency_ms {
        println!("Latency:  {}ms", latency);
    }
    if health.available {
        println!("Status:   {}", "AVAILABLE".green().bold());
    } else {
        println!("Status:   {}", "UNAVAILABLE".red().bold());
        if let Some(error) = &health.error {
            println!("Error:    {}", error);
        }
    }

    println!();
    println!("{}", "=== Memory ===".bold());
    if config.memory.enabled {
        println!("Status:   {} ({})", "ENABLED".green().bold(), config.memory.url);
    } else {
        println!("Status:   {}", "DISABLED".yellow());
    }

    Ok(())
}

fn cmd_gen_config(output: Option<PathBuf>) -> Result<()> {
    let config = Config::default();
    let toml_str = toml::to_string_pretty(&config)?;

    match output {
        Some(path) => {
            std::fs::write(&path, &toml_str)?;
            println!("Configuration written to {}", path.display());
        }
        None => {
            println!("{}", toml_str);
        }
    }

    Ok(())
}

fn print_outcome(outcome: &BatchOutcome) {
    let m = &outcome.metrics;
    println!(
        "{} {}  {} rows  {} sources  {:.2} req/s  {:.1}% errors",
        "Batch".bold(),
        outcome.batch_id,
        m.total_requests,
        m.unique_ips,
        m.requests_per_second,
        m.error_rate
    );
    if outcome.dropped_rows > 0 {
        println!("{} {} malformed rows", "Dropped".yellow(), outcome.dropped_rows);
    }

    if outcome.predictions.is_empty() {
        println!("No predictions");
        return;
    }

    let rows: Vec<PredictionRow> = outcome
        .predictions
        .iter()
        .map(|p| PredictionRow {
            source: p.source.clone(),
            prediction: if p.is_abnormal() {
                p.prediction.to_string().red().bold().to_string()
            } else {
                p.prediction.to_string().green().to_string()
            },
            pattern: p.reasoning.pattern_type.clone(),
            confidence: format!("{:.0}%", p.reasoning.confidence),
            rps: format!("{:.2}", p.metrics.requests_per_second),
            window: format!("{}s", p.metrics.time_window_seconds),
            first_seen: p.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();
    println!("{}", Table::new(rows));

    let threats = outcome.active_threats();
    if threats > 0 {
        println!("{} {}", "Active threats:".red().bold(), threats);
        for p in outcome.predictions.iter().filter(|p| p.is_abnormal()) {
            println!("  {} {}", p.source.red(), p.reasoning.description);
        }
    }
    println!();
}

fn print_traffic(summary: &TrafficSummary) {
    let rows = vec![
        StatRow {
            metric: "Total requests".to_string(),
            value: summary.total_requests.to_string(),
        },
        StatRow {
            metric: "Unique IPs".to_string(),
            value: summary.unique_ips.to_string(),
        },
        StatRow {
            metric: "Error rate".to_string(),
            value: format!("{:.1}%", summary.error_rate),
        },
        StatRow {
            metric: "Success rate".to_string(),
            value: format!("{:.1}%", summary.success_rate),
        },
        StatRow {
            metric: "Requests/min".to_string(),
            value: format!("{:.1}", summary.requests_per_minute),
        },
        StatRow {
            metric: "Avg response size".to_string(),
            value: summary.avg_response_size.clone(),
        },
    ];

    println!("{}", "=== Traffic ===".bold());
    println!("{}", Table::new(rows));
}

fn print_report(report: &SummaryReport) -> Result<()> {
    println!();
    println!("{}", "=== Security Report ===".bold());
    for section in REPORT_SECTIONS {
        println!();
        println!("{}", section.replace('_', " ").to_uppercase().cyan().bold());
        match report.section(section) {
            Some(Value::String(text)) => println!("{}", text),
            Some(value) => println!("{}", serde_json::to_string_pretty(value)?),
            None => println!("-"),
        }
    }
    Ok(())
}
