use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use order_pipeline::app::run_use_case::PipelineRunUseCase;
use order_pipeline::config::{PipelineConfig, CONFIG_PATH_ENV};
use order_pipeline::domain::Domain;
use order_pipeline::infra::FileReportAdapter;
use order_pipeline::pipeline::dispatch::transport_for;
use order_pipeline::pipeline::ingestion::source_for_path;
use order_pipeline::pipeline::processing::validate::Severity;
use order_pipeline::{logging, observability};

const LOG_DIR: &str = "logs";

#[derive(Parser)]
#[command(name = "order_pipeline")]
#[command(about = "Cleans and validates order records, then notifies their owners")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline: validate, notify and write reports
    Run {
        /// Input file (.csv or .json)
        #[arg(long, short)]
        input: PathBuf,
        /// TOML configuration file (defaults to $ORDER_PIPELINE_CONFIG or the domain preset)
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// Record domain preset: flight or steel
        #[arg(long, short)]
        domain: Option<Domain>,
        /// Report output directory
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Log notifications instead of sending them
        #[arg(long)]
        dry_run: bool,
    },
    /// Normalize, validate and partition only; nothing is sent or written
    Validate {
        #[arg(long, short)]
        input: PathBuf,
        #[arg(long, short)]
        config: Option<PathBuf>,
        #[arg(long, short)]
        domain: Option<Domain>,
    },
    /// Print the effective configuration as TOML
    ShowConfig {
        #[arg(long, short)]
        config: Option<PathBuf>,
        #[arg(long, short)]
        domain: Option<Domain>,
    },
}

/// File (flag or env) first, then the domain preset; env overrides on top.
fn resolve_config(path: Option<PathBuf>, domain: Option<Domain>) -> Result<PipelineConfig> {
    let path = path.or_else(|| std::env::var(CONFIG_PATH_ENV).ok().map(PathBuf::from));

    let mut config = match path {
        Some(path) => {
            let config = PipelineConfig::load(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            if let Some(requested) = domain {
                if requested != config.domain {
                    warn!(
                        "--domain {} ignored, {} configures domain {}",
                        requested,
                        path.display(),
                        config.domain
                    );
                }
            }
            config
        }
        None => PipelineConfig::for_domain(domain.unwrap_or(Domain::Flight)),
    };

    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    Ok(config)
}

async fn run(
    input: &Path,
    config: Option<PathBuf>,
    domain: Option<Domain>,
    output: Option<PathBuf>,
    dry_run: bool,
) -> Result<()> {
    let mut config = resolve_config(config, domain)?;
    if let Some(output) = output {
        config.report.output_dir = output;
    }
    config.dispatch.dry_run |= dry_run;

    if let Err(e) = observability::init() {
        warn!("Metrics disabled: {}", e);
    }

    let sink = FileReportAdapter::new(&config.report.output_dir)?;
    let use_case = PipelineRunUseCase::from_config(&config, transport_for(&config.dispatch), Box::new(sink))?;

    println!("🚀 Running {} pipeline on {}...", config.domain, input.display());
    let source = source_for_path(input);
    let report = use_case.run(source.as_ref()).await?;
    let summary = &report.summary;

    println!("\n📊 Pipeline Results (run {}):", report.run_id);
    println!("   Raw records: {}", report.raw_count);
    println!("   Unique records: {}", summary.total);
    println!("   Duplicates dropped: {}", summary.duplicates);
    println!("   Valid: {} ({:.1}%)", summary.valid, summary.validity_rate());
    println!("   Invalid: {}", summary.invalid);
    println!("   Warnings: {}", summary.warnings);
    println!("   Notifications sent: {}", summary.sent);
    println!("   Notifications failed: {}", summary.failed);
    println!("   Skipped (no email): {}", summary.skipped);
    println!("   Success rate: {:.1}%", summary.success_rate * 100.0);
    println!("   Total value: {:.2}", summary.total_value);
    println!("   Completion rate: {:.1}%", summary.completion_rate);
    if !summary.quality_grades.is_empty() {
        println!("   Total weight: {:.1} kg", summary.total_weight_kg);
        println!(
            "   Reject rate: {:.1}%  Rework rate: {:.1}%",
            summary.reject_rate, summary.rework_rate
        );
    }
    if let Some(top) = summary.top_customers_by_value.first() {
        println!("   Top customer: {} ({} orders, {:.2})", top.name, top.orders, top.total_value);
    }
    println!("   Reports: {}", config.report.output_dir.display());

    if summary.failed > 0 {
        println!("\n⚠️  Failed notifications:");
        for result in report.notifications.iter().filter(|r| !r.is_sent()) {
            println!(
                "   - {} after {} attempts: {}",
                result.record_id,
                result.attempts,
                result.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
    Ok(())
}

fn validate(input: &Path, config: Option<PathBuf>, domain: Option<Domain>) -> Result<()> {
    let config = resolve_config(config, domain)?;
    // The sink and transport are never reached when only screening
    let use_case = PipelineRunUseCase::from_config(
        &config,
        transport_for(&config.dispatch),
        Box::new(order_pipeline::infra::InMemoryReportSink::new()),
    )?;

    let source = source_for_path(input);
    let screening = use_case.screen(source.as_ref())?;
    let violations = screening.violations();
    let partition = &screening.partition;

    println!("\n🔎 Validation Results for {}:", input.display());
    println!("   Raw records: {}", screening.raw_count);
    println!("   Duplicates dropped: {}", partition.duplicates.len());
    let errors: usize = partition.rejected.iter().map(|v| v.errors().count()).sum();
    let warnings: usize = partition
        .accepted
        .iter()
        .chain(partition.rejected.iter())
        .map(|v| v.warnings().count())
        .sum();
    println!("   Accepted: {}", partition.accepted.len());
    println!("   Rejected: {} ({} errors)", partition.rejected.len(), errors);
    println!("   Warnings: {}", warnings);

    if !violations.is_empty() {
        println!("\n⚠️  Violations:");
        for v in &violations {
            let marker = match v.severity {
                Severity::Error => "❌",
                Severity::Warning => "⚠️ ",
            };
            println!("   {} [{}] {}: {}", marker, v.category, v.record_id, v.message);
        }
    } else {
        println!("✅ No violations found");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let _guard = logging::init_logging(Path::new(LOG_DIR), cli.verbose);

    match cli.command {
        Commands::Run {
            input,
            config,
            domain,
            output,
            dry_run,
        } => run(&input, config, domain, output, dry_run).await?,
        Commands::Validate {
            input,
            config,
            domain,
        } => validate(&input, config, domain)?,
        Commands::ShowConfig { config, domain } => {
            let config = resolve_config(config, domain)?;
            print!("{}", config.to_toml()?);
        }
    }

    info!("Done");
    Ok(())
}
