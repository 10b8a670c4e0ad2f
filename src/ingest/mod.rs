// Ingestion pipeline
// Files -> normalised records -> batches -> embeddings -> vector store upserts
//
// Files and batches are processed strictly one at a time so the rate-limit
// cooldown and the pacing delay throttle the whole process, not a single batch.


use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{Config, SourceConfig};
use crate::embeddings::EmbeddingClient;
use crate::http::ServiceError;
use crate::records::{Record, RecordFamily, RecordNormalizer, read_rows};
use crate::retry::{Sleeper, TokioSleeper};
use crate::vector_store::{UpsertOutcome, Vector, VectorStoreClient};
use crate::{RagError, Result};

pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(20);
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_millis(300);
pub const DEFAULT_MAX_RATE_LIMIT_WAITS: u32 = 10;

/// Tuning for one ingestion run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    pub batch_size: usize,
    /// Fixed wait after the embedding service reports a rate limit
    pub rate_limit_cooldown: Duration,
    /// Cooldowns allowed for a single batch before the run fails
    pub max_rate_limit_waits: u32,
    /// Sleep after every acknowledged upsert
    pub pacing_delay: Duration,
    /// Lock the vector length up front instead of taking it from the first batch
    pub expected_dimension: Option<usize>,
    pub show_progress: bool,
}

impl Default for IngestOptions {
    #[inline]
    fn default() -> Self {
        Self {
            batch_size: crate::config::settings::DEFAULT_BATCH_SIZE,
            rate_limit_cooldown: DEFAULT_RATE_LIMIT_COOLDOWN,
            max_rate_limit_waits: DEFAULT_MAX_RATE_LIMIT_WAITS,
            pacing_delay: DEFAULT_PACING_DELAY,
            expected_dimension: None,
            show_progress: false,
        }
    }
}

impl IngestOptions {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.ingest.batch_size,
            rate_limit_cooldown: config.ingest.rate_limit_cooldown(),
            max_rate_limit_waits: config.ingest.max_rate_limit_waits,
            pacing_delay: config.ingest.pacing_delay(),
            expected_dimension: config.embedding.dimension,
            show_progress: console::user_attended_stderr(),
        }
    }
}

/// Lifecycle of a single batch
///
/// `Pending -> Embedding -> Upserting -> Done`, with `Embedding -> Pending`
/// after a rate-limit cooldown. Any other failure lands in `Failed`.
#[derive(Debug)]
pub enum BatchState {
    Pending,
    Embedding,
    Upserting(Vec<Vector>),
    Done(UpsertOutcome),
    Failed(RagError),
}

impl BatchState {
    #[inline]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Embedding => "embedding",
            Self::Upserting(_) => "upserting",
            Self::Done(_) => "done",
            Self::Failed(_) => "failed",
        }
    }
}

/// What happened to one input file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileReport {
    pub source: String,
    pub rows: usize,
    pub batches: usize,
    pub vectors_upserted: usize,
    pub rate_limit_waits: u32,
    pub upsert_retries: u32,
}

/// Summary of a whole ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub files: Vec<FileReport>,
    pub dimension: Option<usize>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl IngestReport {
    #[inline]
    pub fn total_rows(&self) -> usize {
        self.files.iter().map(|f| f.rows).sum()
    }

    #[inline]
    pub fn total_vectors(&self) -> usize {
        self.files.iter().map(|f| f.vectors_upserted).sum()
    }
}

/// Per-batch bookkeeping carried through the state machine
struct BatchProgress {
    rate_limit_waits: u32,
}

pub struct IngestionPipeline {
    embedder: Arc<dyn EmbeddingClient>,
    store: VectorStoreClient,
    options: IngestOptions,
    sleeper: Arc<dyn Sleeper>,
}

impl std::fmt::Debug for IngestionPipeline {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("model", &self.embedder.model())
            .field("store", &self.store)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl IngestionPipeline {
    #[inline]
    pub fn new(
        embedder: Arc<dyn EmbeddingClient>,
        store: VectorStoreClient,
        options: IngestOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            options,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Replace the sleeper used for cooldowns and pacing
    #[inline]
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    #[inline]
    pub fn options(&self) -> &IngestOptions {
        &self.options
    }

    /// Ingest every configured source in order; the first failure aborts the run
    #[inline]
    pub async fn ingest_sources(&self, sources: &[SourceConfig]) -> Result<IngestReport> {
        let started = Instant::now();
        let mut dimension = self.options.expected_dimension;
        let mut report = IngestReport {
            started_at: Utc::now(),
            ..IngestReport::default()
        };

        info!(
            "Starting ingestion of {} source(s) into namespace {}",
            sources.len(),
            self.store.namespace()
        );

        for source in sources {
            let file_report = self
                .ingest_file(source.family, &source.path, &mut dimension)
                .await?;
            report.files.push(file_report);
        }

        report.dimension = dimension;
        report.duration = started.elapsed();

        info!(
            "Ingestion complete: {} rows, {} vectors in {:?}",
            report.total_rows(),
            report.total_vectors(),
            report.duration
        );
        Ok(report)
    }

    async fn ingest_file(
        &self,
        family: RecordFamily,
        path: &Path,
        dimension: &mut Option<usize>,
    ) -> Result<FileReport> {
        info!("Reading {} rows from {}", family, path.display());
        let rows = read_rows(path).map_err(|e| {
            error!("Failed to read {}: {}", path.display(), e);
            e
        })?;

        let records = RecordNormalizer::new(family).normalize_all(&rows);
        self.run_records(family, &records, dimension).await
    }

    /// Ingest already-normalised records of one family
    #[inline]
    pub async fn ingest_records(
        &self,
        family: RecordFamily,
        records: &[Record],
    ) -> Result<FileReport> {
        let mut dimension = self.options.expected_dimension;
        self.run_records(family, records, &mut dimension).await
    }

    async fn run_records(
        &self,
        family: RecordFamily,
        records: &[Record],
        dimension: &mut Option<usize>,
    ) -> Result<FileReport> {
        let mut report = FileReport {
            source: family.source_name().to_string(),
            rows: records.len(),
            ..FileReport::default()
        };

        if records.is_empty() {
            info!("No rows for {}, nothing to ingest", family);
            return Ok(report);
        }

        let batch_size = self.options.batch_size.max(1);
        let batch_count = records.len().div_ceil(batch_size);
        let bar = self.progress_bar(family, batch_count);

        for (index, batch) in records.chunks(batch_size).enumerate() {
            debug!(
                "{} batch {}/{} ({} records)",
                family,
                index + 1,
                batch_count,
                batch.len()
            );

            let mut progress = BatchProgress {
                rate_limit_waits: 0,
            };
            let outcome = self
                .run_batch(family, index, batch, dimension, &mut progress)
                .await;
            report.rate_limit_waits += progress.rate_limit_waits;

            let outcome = match outcome {
                Ok(outcome) => outcome,
                Err(e) => {
                    bar.abandon_with_message(format!("{} failed", family));
                    return Err(e);
                }
            };

            report.batches += 1;
            report.vectors_upserted += outcome.upserted;
            report.upsert_retries += outcome.attempts.saturating_sub(1);
            bar.inc(1);

            self.sleeper.sleep(self.options.pacing_delay).await;
        }

        bar.finish_with_message(format!("{} done", family));
        info!(
            "Ingested {} vectors for {} in {} batch(es)",
            report.vectors_upserted, family, report.batches
        );
        Ok(report)
    }

    /// Drive one batch through its states until `Done` or `Failed`
    async fn run_batch(
        &self,
        family: RecordFamily,
        index: usize,
        batch: &[Record],
        dimension: &mut Option<usize>,
        progress: &mut BatchProgress,
    ) -> Result<UpsertOutcome> {
        let texts: Vec<String> = batch.iter().map(|r| r.text.clone()).collect();
        let mut state = BatchState::Pending;

        loop {
            debug!("{} batch {} is {}", family, index + 1, state.label());

            state = match state {
                BatchState::Pending => BatchState::Embedding,
                BatchState::Embedding => match self.embedder.embed(&texts).await {
                    Ok(values) => match build_vectors(batch, values, dimension) {
                        Ok(vectors) => BatchState::Upserting(vectors),
                        Err(e) => BatchState::Failed(e),
                    },
                    Err(e) if e.is_rate_limited() => {
                        self.cool_down(family, index, e, progress).await
                    }
                    Err(e) => {
                        error!("Failed to embed {} batch {}: {}", family, index + 1, e);
                        BatchState::Failed(RagError::Embedding(e))
                    }
                },
                BatchState::Upserting(vectors) => match self.store.upsert(&vectors).await {
                    Ok(outcome) => BatchState::Done(outcome),
                    Err(e) => {
                        error!("Failed to upsert {} batch {}: {}", family, index + 1, e);
                        BatchState::Failed(RagError::BatchFailed {
                            source_name: family.source_name().to_string(),
                            batch: index + 1,
                            reason: e.to_string(),
                        })
                    }
                },
                BatchState::Done(outcome) => return Ok(outcome),
                BatchState::Failed(e) => return Err(e),
            };
        }
    }

    /// Wait out a rate limit and send the batch back to `Pending`
    async fn cool_down(
        &self,
        family: RecordFamily,
        index: usize,
        error: ServiceError,
        progress: &mut BatchProgress,
    ) -> BatchState {
        if progress.rate_limit_waits >= self.options.max_rate_limit_waits {
            error!(
                "Giving up on {} batch {} after {} rate-limit cooldowns",
                family,
                index + 1,
                progress.rate_limit_waits
            );
            return BatchState::Failed(RagError::Embedding(error));
        }

        progress.rate_limit_waits += 1;
        warn!(
            "Embedding rate limited on {} batch {} ({}); cooling down for {:?}",
            family,
            index + 1,
            error,
            self.options.rate_limit_cooldown
        );
        self.sleeper.sleep(self.options.rate_limit_cooldown).await;
        BatchState::Pending
    }

    fn progress_bar(&self, family: RecordFamily, batches: usize) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let style = ProgressStyle::with_template("{spinner} [{pos}/{len}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        let bar = ProgressBar::new(batches as u64).with_style(style);
        bar.set_message(format!("Ingesting {}", family));
        bar
    }
}

/// Pair each record with its embedding, enforcing one dimensionality per run
fn build_vectors(
    batch: &[Record],
    values: Vec<Vec<f32>>,
    dimension: &mut Option<usize>,
) -> Result<Vec<Vector>> {
    if values.len() != batch.len() {
        return Err(RagError::Embedding(ServiceError::Permanent(format!(
            "Mismatch between request and response counts: {} vs {}",
            batch.len(),
            values.len()
        ))));
    }

    let mut vectors = Vec::with_capacity(batch.len());
    for (record, values) in batch.iter().zip(values) {
        let expected = *dimension.get_or_insert(values.len());
        if values.len() != expected {
            error!(
                "Embedding for {} has {} dimensions, expected {}",
                record.id,
                values.len(),
                expected
            );
            return Err(RagError::DimensionMismatch {
                expected,
                actual: values.len(),
                id: record.id.clone(),
            });
        }

        vectors.push(Vector {
            id: record.id.clone(),
            values,
            metadata: record.metadata.clone(),
        });
    }
    Ok(vectors)
}
