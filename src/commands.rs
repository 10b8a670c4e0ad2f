use anyhow::{Context, Result};
use console::style;
use std::fmt::Write as _;
use tracing::info;

use crate::answer::{AnswerComposer, ConversationContext};
use crate::config::credentials::redact;
use crate::config::{Config, Credentials, Workload};
use crate::ingest::{IngestOptions, IngestReport, IngestionPipeline};
use crate::retrieval::RetrievalPipeline;
use crate::{completion, embeddings, vector_store};

/// Ingest every configured source into the vector store
#[inline]
pub async fn run_ingest(config: &Config) -> Result<IngestReport> {
    let credentials = Credentials::from_env(config, Workload::Ingest)?;

    let embedder = embeddings::from_config(config, &credentials)
        .context("Failed to initialize embedding client")?;
    let store = vector_store::from_config(config, &credentials)
        .await
        .context("Failed to initialize vector store")?;

    let pipeline = IngestionPipeline::new(embedder, store, IngestOptions::from_config(config));
    let report = pipeline.ingest_sources(&config.sources).await?;

    print!("{}", render_ingest_report(&report));
    Ok(report)
}

/// Retrieve context for `query` and print a composed answer
#[inline]
pub async fn run_query(
    config: &Config,
    query: &str,
    concern: Option<String>,
    subtopic: Option<String>,
) -> Result<String> {
    anyhow::ensure!(!query.trim().is_empty(), "query text cannot be empty");

    let credentials = Credentials::from_env(config, Workload::Query)?;

    let embedder = embeddings::from_config(config, &credentials)
        .context("Failed to initialize embedding client")?;
    let store = vector_store::from_config(config, &credentials)
        .await
        .context("Failed to initialize vector store")?;
    let completion = completion::from_config(config, &credentials)
        .context("Failed to initialize completion client")?;

    let retrieval = RetrievalPipeline::new(embedder, store).with_top_k(config.retrieval.top_k);
    let retrieved = retrieval.retrieve(query).await?;
    info!("Composing answer from {} record(s)", retrieved.len());

    let context = ConversationContext::new(concern, subtopic);
    let answer = AnswerComposer::new(completion)
        .compose(query, &retrieved, &context)
        .await?;

    println!("{}", answer);
    Ok(answer)
}

/// Print the effective configuration; credentials only show whether they are set
#[inline]
pub fn show_config(config: &Config) -> Result<()> {
    let credentials = Credentials::from_lookup(|name| std::env::var(name).ok());

    eprintln!("{}", style("Current Configuration").bold().cyan());
    eprintln!();
    eprint!("{}", render_config(config, &credentials)?);
    eprintln!();
    eprintln!(
        "Config file: {}",
        style(config.config_file_path().display()).dim()
    );
    Ok(())
}

/// Write the default configuration file unless one already exists
#[inline]
pub fn init_config(config: &Config) -> Result<bool> {
    let path = config.config_file_path();
    if path.exists() {
        eprintln!(
            "Configuration already exists at {}",
            style(path.display()).cyan()
        );
        return Ok(false);
    }

    config.save().context("Failed to save configuration")?;
    eprintln!(
        "{} {}",
        style("Configuration written to").green(),
        style(path.display()).cyan()
    );
    Ok(true)
}

/// Effective configuration as TOML followed by credential status
#[inline]
pub fn render_config(config: &Config, credentials: &Credentials) -> Result<String> {
    let mut rendered =
        toml::to_string_pretty(config).context("Failed to serialize config to TOML")?;

    let _ = writeln!(rendered, "\n[credentials]");
    let _ = writeln!(
        rendered,
        "OPENAI_API_KEY = \"{}\"",
        redact(credentials.openai_api_key())
    );
    let _ = writeln!(
        rendered,
        "PINECONE_API_KEY = \"{}\"",
        redact(credentials.pinecone_api_key())
    );
    let _ = writeln!(
        rendered,
        "vector_database_path = \"{}\"",
        config.vector_database_path().display()
    );
    Ok(rendered)
}

/// Human-readable summary of an ingestion run
#[inline]
pub fn render_ingest_report(report: &IngestReport) -> String {
    let mut out = String::from("Ingestion completed successfully!\n");
    for file in &report.files {
        let _ = writeln!(out, "  {}:", file.source);
        let _ = writeln!(out, "    Rows: {}", file.rows);
        let _ = writeln!(out, "    Batches: {}", file.batches);
        let _ = writeln!(out, "    Vectors upserted: {}", file.vectors_upserted);
        if file.rate_limit_waits > 0 {
            let _ = writeln!(out, "    Rate-limit cooldowns: {}", file.rate_limit_waits);
        }
        if file.upsert_retries > 0 {
            let _ = writeln!(out, "    Upsert retries: {}", file.upsert_retries);
        }
    }
    let _ = writeln!(out, "  Total rows: {}", report.total_rows());
    let _ = writeln!(out, "  Total vectors: {}", report.total_vectors());
    if let Some(dimension) = report.dimension {
        let _ = writeln!(out, "  Dimension: {}", dimension);
    }
    let _ = writeln!(
        out,
        "  Started: {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out, "  Duration: {:?}", report.duration);
    out
}
