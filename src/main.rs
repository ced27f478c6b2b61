mod audit;
mod batch;
mod config;
mod embedding;
mod http;
mod llm;
mod metrics;
mod models;
mod pipeline;
mod prompt;
mod resolve;
mod tabular;
mod taxonomy;

use audit::AuditLog;
use batch::{BatchOrchestrator, BatchSettings, write_final};
use config::MapperConfig;
use embedding::embedder_from_model;
use eyre::{Result, WrapErr};
use llm::{HttpOracle, OracleConfig};
use pipeline::{LabelContext, LabelProcessor};
use std::sync::Arc;
use tabular::{CsvSink, read_table, read_taxonomy};
use taxonomy::{CandidateRanker, Taxonomy};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

#[tokio::main]
async fn main() {
    init_tracing();
    if let Err(err) = run().await {
        error!(target: "catmap.setup", "category mapping aborted: {err:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    let config = MapperConfig::from_env().wrap_err("invalid configuration")?;
    let paths = config.paths()?;
    let run_id = Uuid::new_v4();
    info!(target: "catmap.setup", %run_id, input = %paths.input.display(), "category_mapping_started");

    let taxonomy = Taxonomy::new(
        read_taxonomy(&paths.taxonomy).wrap_err("failed to load allowed categories")?,
    )?;
    info!(
        target: "catmap.setup",
        categories = taxonomy.len(),
        duplicates = taxonomy.duplicates().len(),
        "taxonomy_loaded"
    );

    let input = read_table(&paths.input).wrap_err("failed to load internal categories")?;
    info!(target: "catmap.setup", labels = input.rows.len(), "input_loaded");

    let embedder = embedder_from_model(&config.embedding_model)?;
    info!(target: "catmap.setup", model = embedder.model_id(), "encoding_taxonomy");
    let ranker = CandidateRanker::new(&taxonomy, &embedder)?;
    let top_n = ranker.effective_top_n(config.top_n);

    let oracle = Arc::new(HttpOracle::new(OracleConfig {
        endpoint: config.oracle_url.clone(),
        timeout: config.oracle_timeout(),
    }));

    let mut audit = match AuditLog::open(&paths.audit_log, run_id) {
        Ok(log) => log,
        Err(err) => {
            warn!(target: "catmap.audit", path = %paths.audit_log.display(), error = %err, "audit_log_unavailable");
            AuditLog::disabled(run_id)
        }
    };

    let settings = config.resolver_settings();
    let processor = LabelProcessor::new(LabelContext {
        taxonomy: &taxonomy,
        ranker: &ranker,
        embedder: &embedder,
        settings: &settings,
        top_n,
        run_id,
    });
    let orchestrator = BatchOrchestrator::new(
        processor,
        oracle,
        BatchSettings {
            max_concurrent: config.max_concurrent,
            checkpoint_interval: config.checkpoint_interval,
            oracle_timeout: config.oracle_timeout(),
        },
        run_id,
    );

    let mut checkpoint = CsvSink::new(&paths.checkpoint);
    let outcome = orchestrator.run(&input, &mut audit, &mut checkpoint).await;

    let mut output = CsvSink::new(&paths.output);
    write_final(&input, &outcome, &mut output, &mut checkpoint)?;

    let summary = outcome.summary;
    info!(
        target: "catmap.setup",
        %run_id,
        auto_mapped = summary.success,
        needs_review = summary.needs_check,
        errors = summary.errors,
        skipped = summary.skipped,
        checkpoints = outcome.checkpoints_written,
        "category_mapping_complete"
    );
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
