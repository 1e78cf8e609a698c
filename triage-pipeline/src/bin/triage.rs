//! triage - run one report through the triage pipeline and print the tip.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use triage_agent::backend::OpenAiBackend;
use triage_agent::{EventBus, InMemoryAuditLog, LlmBackend, RawTip};
use triage_pipeline::{reference_pipeline, PipelineConfig, ReferenceIndexes, TriageError};

#[derive(Parser, Debug)]
#[command(name = "triage", about = "Triage a raw report through the pipeline")]
struct Args {
    /// Raw tip JSON file (`{"source": ..., "content": ..., "metadata": ..., "warrant_states": ...}`)
    input: PathBuf,

    /// Pipeline configuration (YAML)
    #[arg(long, env = "TRIAGE_CONFIG")]
    config: Option<PathBuf>,

    /// Override the configured log level
    #[arg(long, env = "TRIAGE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Also print the audit trail
    #[arg(long, default_value = "false")]
    audit: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };

    // Initialize tracing/logging
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.general.log_level.clone());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("triage_pipeline={0},triage_agent={0},compliance={0}", log_level).into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let input = std::fs::read_to_string(&args.input).map_err(|e| TriageError::Io {
        path: args.input.display().to_string(),
        source: e,
    })?;
    let raw: RawTip = serde_json::from_str(&input).map_err(TriageError::from)?;

    let backend = OpenAiBackend::new(
        config.model.base_url.clone(),
        config.model.model.clone(),
        config.model.api_key(),
        config.model.timeout(),
    )
    .map_err(TriageError::from)?;
    if !backend.is_available().await {
        warn!(base_url = %config.model.base_url, "Model backend unreachable; model stages will fall back");
    }

    info!(pipeline_id = %config.pipeline_id, model = %config.model.model, "Starting triage");

    let audit = Arc::new(InMemoryAuditLog::new());
    let pipeline = reference_pipeline(
        &config,
        Arc::new(backend),
        &ReferenceIndexes::default(),
        audit.clone(),
        Arc::new(EventBus::new()),
    )?;

    let tip = pipeline.process_tip(raw).await;
    println!("{}", serde_json::to_string_pretty(&tip)?);

    if args.audit {
        println!("{}", serde_json::to_string_pretty(&audit.entries().await)?);
    }

    Ok(())
}
