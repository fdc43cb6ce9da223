//! newslabel
//!
//! Batch multi-label classification of Vietnamese environment and natural
//! resources news against an OpenAI-compatible chat completions service.

use anyhow::{bail, Context, Result};
use clap::Parser;
use newslabel_batch::{estimate_cost, BatchOrchestrator, CostEstimate, Dataset, RunStatus, RunSummary};
use newslabel_classifiers::{
    ClassificationClient, OpenAiBackend, PromptBuilder, RateGovernor, ResponseValidator,
};
use newslabel_telemetry::{FileCheckpointStore, ResultWriter};
use std::fs::{File, OpenOptions};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

mod cli;
mod config;

use cli::{Cli, Commands, LogFormat, ProcessArgs};
use config::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;

    let log_file = cli.log_file.as_deref().or(config.log_file.as_deref());
    // Dropping the guard flushes the file writer
    let _log_guard = init_tracing(cli.verbose, cli.log_format, log_file)?;

    if let Some(addr) = cli.metrics_addr {
        init_metrics(addr)?;
    }

    match cli.command {
        Commands::Test => test_connection(&config).await,
        Commands::Estimate { data } => {
            let mut config = config;
            if let Some(data) = data {
                config.data_path = data;
            }
            estimate(&config)
        }
        Commands::Process(args) => process(config, &args).await,
        Commands::Reset { output_dir } => {
            let dir = output_dir.unwrap_or(config.output_dir);
            if FileCheckpointStore::reset(&dir)? {
                println!("Checkpoint cleared in {}", dir.display());
            } else {
                println!("No checkpoint found in {}", dir.display());
            }
            Ok(())
        }
    }
}

fn build_client(config: &AppConfig) -> Result<Arc<ClassificationClient>> {
    let backend = Arc::new(OpenAiBackend::new(&config.classifier.backend)?);
    let governor = Arc::new(RateGovernor::new(&config.classifier.rate_limits));
    Ok(Arc::new(ClassificationClient::new(
        backend,
        governor,
        config.classifier.clone(),
    )))
}

async fn test_connection(config: &AppConfig) -> Result<()> {
    config.classifier.validate()?;
    let client = build_client(config)?;

    info!(model = %config.classifier.model, "Testing connection");
    let completion = client.check_connection().await?;
    println!("Connection OK");
    println!("  Model:    {}", completion.model);
    println!("  Response: {}", completion.content.trim());
    if let Some(usage) = completion.usage {
        println!("  Tokens:   {} in / {} out", usage.input_tokens, usage.output_tokens);
    }
    Ok(())
}

fn estimate(config: &AppConfig) -> Result<()> {
    config.validate_pricing()?;
    let dataset = Dataset::load(&config.data_path)?;
    let prompts = PromptBuilder::new(
        config.classifier.max_content_chars,
        config.classifier.max_tokens,
    );
    let estimate = estimate_cost(
        dataset.records(),
        dataset.len(),
        &prompts,
        &config.classifier.model,
        &config.pricing,
    )?;
    print_estimate(&estimate);
    Ok(())
}

async fn process(mut config: AppConfig, args: &ProcessArgs) -> Result<()> {
    config.apply_args(args);
    config.validate()?;

    let client = build_client(&config)?;
    info!(model = %config.classifier.model, "Testing connection before processing");
    if let Err(e) = client.check_connection().await {
        error!(error = %e, "Connection test failed");
        bail!("connection test failed, not starting: {}", e);
    }

    let dataset = Dataset::load(&config.data_path)?;
    info!(
        path = %config.data_path.display(),
        records = dataset.len(),
        "Dataset loaded"
    );
    let estimate = estimate_cost(
        dataset.records(),
        dataset.len(),
        client.prompts(),
        &config.classifier.model,
        &config.pricing,
    )?;
    print_estimate(&estimate);

    let store = FileCheckpointStore::open(config.checkpoint(), dataset.fingerprint())?;
    let validator = ResponseValidator::new(
        config.classifier.confidence_threshold,
        config.classifier.max_labels_before_warning,
    );
    let orchestrator =
        BatchOrchestrator::new(client, validator, config.pricing.clone(), Arc::new(store));

    let cancel = CancellationToken::new();
    let signal_task = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            shutdown_signal().await;
            warn!("Shutdown signal received, stopping after committed records");
            cancel.cancel();
        }
    });

    let report = orchestrator.run(dataset.records(), &config.run, cancel).await;
    signal_task.abort();
    let report = report?;

    let writer = ResultWriter::new(config.output_dir.clone());
    writer.write_results(&report.outcomes)?;
    writer.write_summary(&report.summary)?;
    writer.write_final_csv(dataset.headers(), dataset.rows(), &report.outcomes)?;

    print_summary(&report.summary);
    match report.status() {
        RunStatus::Completed => Ok(()),
        RunStatus::Cancelled => {
            println!("Run interrupted. Run `newslabel process` again to resume.");
            Ok(())
        }
        RunStatus::Aborted { reason } => bail!("run aborted: {}", reason),
    }
}

fn print_estimate(estimate: &CostEstimate) {
    println!("Cost estimate");
    println!("  Dataset size:      {}", estimate.dataset_size);
    println!("  Model:             {}", estimate.model);
    println!("  Avg input tokens:  {}", estimate.avg_input_tokens);
    println!("  Avg output tokens: {}", estimate.avg_output_tokens);
    println!("  Cost per record:   ${:.6}", estimate.cost_per_record);
    println!("  Estimated total:   ${:.4}", estimate.total_cost);
}

fn print_summary(summary: &RunSummary) {
    println!("Processing summary");
    println!("  Records in range:  {}", summary.total_records);
    println!(
        "  Processed:         {} ({} this run, {} resumed)",
        summary.processed, summary.newly_processed, summary.skipped
    );
    println!(
        "  Succeeded:         {} ({:.1}%)",
        summary.success_count, summary.success_rate
    );
    println!("  Failed:            {}", summary.failure_count);
    println!("  Total cost:        ${:.4}", summary.total_cost);
    println!(
        "  Avg cost/success:  ${:.6}",
        summary.average_cost_per_success
    );
    println!("  Duration:          {:.1}s", summary.duration_secs);
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging
fn init_tracing(
    verbose: bool,
    format: LogFormat,
    log_file: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("newslabel=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("newslabel=info"))
    };

    let (text, json) = match format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer()), None),
        LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
    };

    let (file, guard) = match log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_log_file(path)?);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .with(file)
        .init();
    Ok(guard)
}

/// Open `path` for appending, creating missing parent directories
fn open_log_file(path: &Path) -> Result<File> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}

/// Install the Prometheus exporter and describe the run's series
fn init_metrics(addr: SocketAddr) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics exporter: {}", e))?;

    metrics::describe_counter!(
        "newslabel_records_total",
        "Records committed, by status"
    );
    metrics::describe_counter!(
        "newslabel_attempts_total",
        "Model service calls, by result"
    );
    metrics::describe_counter!(
        "newslabel_fallback_total",
        "Records handed to the fallback model"
    );
    metrics::describe_counter!(
        "newslabel_tokens_total",
        "Tokens billed, by direction"
    );
    metrics::describe_gauge!(
        "newslabel_cost_usd_total",
        "Running cost of the run in USD"
    );
    metrics::describe_histogram!(
        "newslabel_record_latency_ms",
        metrics::Unit::Milliseconds,
        "Per-record classification latency in milliseconds"
    );

    info!(%addr, "Metrics exporter listening");
    Ok(())
}
