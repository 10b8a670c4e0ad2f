// Local LanceDB backend
// One table per namespace; metadata is kept as a JSON string column


use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, Table};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{Match, Vector, VectorIndex, latest_by_id};
use crate::http::ServiceError;
use crate::records::Metadata;

/// Vector index stored in a local LanceDB directory
pub struct LanceIndex {
    connection: Connection,
}

impl std::fmt::Debug for LanceIndex {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LanceIndex").finish_non_exhaustive()
    }
}

fn store_error(context: &str, error: impl std::fmt::Display) -> ServiceError {
    ServiceError::Permanent(format!("{}: {}", context, error))
}

/// Namespaces become table names; anything but `[A-Za-z0-9_-]` is replaced
fn table_name(namespace: &str) -> String {
    let name: String = namespace
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        "default".to_string()
    } else {
        name
    }
}

fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                vector_dim as i32,
            ),
            false,
        ),
        Field::new("metadata", DataType::Utf8, false),
    ]))
}

impl LanceIndex {
    /// Open (or create) the LanceDB directory at `path`
    #[inline]
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(path).map_err(|e| {
            anyhow::anyhow!(
                "Failed to create vector database directory {}: {}",
                path.display(),
                e
            )
        })?;

        let uri = path.to_string_lossy().to_string();
        debug!("Initializing LanceDB at path: {}", uri);

        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to LanceDB: {}", e))?;

        info!("Vector store initialized at {}", uri);
        Ok(Self { connection })
    }

    async fn open_existing(&self, table: &str) -> Result<Option<Table>, ServiceError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| store_error("Failed to list tables", e))?;

        if !table_names.iter().any(|name| name == table) {
            return Ok(None);
        }

        self.connection
            .open_table(table)
            .execute()
            .await
            .map(Some)
            .map_err(|e| store_error("Failed to open table", e))
    }

    /// Open the namespace table, creating it with `vector_dim` if missing
    async fn open_or_create(&self, table: &str, vector_dim: usize) -> Result<Table, ServiceError> {
        if let Some(existing) = self.open_existing(table).await? {
            let existing_dim = detect_vector_dimension(&existing).await?;
            if existing_dim != vector_dim {
                return Err(ServiceError::Permanent(format!(
                    "Vector dimension mismatch for namespace {}: table has {}, batch has {}",
                    table, existing_dim, vector_dim
                )));
            }
            return Ok(existing);
        }

        info!(
            "Creating table {} with {} dimensions",
            table, vector_dim
        );
        self.connection
            .create_empty_table(table, create_schema(vector_dim))
            .execute()
            .await
            .map_err(|e| store_error("Failed to create table", e))
    }

    /// Total rows stored for `namespace`
    #[inline]
    pub async fn count(&self, namespace: &str) -> Result<usize, ServiceError> {
        match self.open_existing(&table_name(namespace)).await? {
            Some(table) => table
                .count_rows(None)
                .await
                .map_err(|e| store_error("Failed to count rows", e)),
            None => Ok(0),
        }
    }
}

async fn detect_vector_dimension(table: &Table) -> Result<usize, ServiceError> {
    let schema = table
        .schema()
        .await
        .map_err(|e| store_error("Failed to get table schema", e))?;

    for field in schema.fields() {
        if field.name() == "vector" {
            if let DataType::FixedSizeList(_, size) = field.data_type() {
                return Ok(*size as usize);
            }
        }
    }

    Err(ServiceError::Permanent(
        "Could not find vector column or determine dimension".to_string(),
    ))
}

fn create_record_batch(vectors: &[&Vector], vector_dim: usize) -> Result<RecordBatch, ServiceError> {
    let mut ids = Vec::with_capacity(vectors.len());
    let mut metadata = Vec::with_capacity(vectors.len());
    let mut flat_values = Vec::with_capacity(vectors.len() * vector_dim);

    for vector in vectors {
        if vector.values.len() != vector_dim {
            return Err(ServiceError::Permanent(format!(
                "Vector {} has {} dimensions, expected {}",
                vector.id,
                vector.values.len(),
                vector_dim
            )));
        }
        ids.push(vector.id.as_str());
        metadata.push(
            serde_json::to_string(&vector.metadata)
                .map_err(|e| store_error("Failed to encode metadata", e))?,
        );
        flat_values.extend_from_slice(&vector.values);
    }

    let field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        field,
        vector_dim as i32,
        Arc::new(Float32Array::from(flat_values)),
        None,
    )
    .map_err(|e| store_error("Failed to create vector array", e))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(metadata)),
    ];

    RecordBatch::try_new(create_schema(vector_dim), arrays)
        .map_err(|e| store_error("Failed to create record batch", e))
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, ServiceError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| ServiceError::Permanent(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| ServiceError::Permanent(format!("Invalid {} column type", name)))
}

fn parse_search_batch(
    batch: &RecordBatch,
    include_metadata: bool,
) -> Result<Vec<Match>, ServiceError> {
    let ids = string_column(batch, "id")?;
    let metadata = string_column(batch, "metadata")?;
    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let mut matches = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        let distance = distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });
        let metadata = if include_metadata {
            serde_json::from_str::<Metadata>(metadata.value(row))
                .map_err(|e| store_error("Failed to decode metadata", e))?
        } else {
            Metadata::new()
        };

        matches.push(Match {
            id: ids.value(row).to_string(),
            // Lower distance is closer; expose a higher-is-better score
            score: 1.0 - distance,
            metadata,
        });
    }
    Ok(matches)
}

#[async_trait]
impl VectorIndex for LanceIndex {
    async fn upsert(&self, namespace: &str, vectors: &[Vector]) -> Result<usize, ServiceError> {
        let vectors = latest_by_id(vectors);
        let Some(first) = vectors.first() else {
            return Ok(0);
        };
        let vector_dim = first.values.len();
        let table_name = table_name(namespace);
        let record_batch = create_record_batch(&vectors, vector_dim)?;
        let table = self.open_or_create(&table_name, vector_dim).await?;

        // Single merge keyed on id: matched rows are replaced, new ids appended
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        let mut merge = table.merge_insert(&["id"]);
        merge
            .when_matched_update_all(None)
            .when_not_matched_insert_all();
        merge
            .execute(Box::new(reader))
            .await
            .map_err(|e| store_error("Failed to upsert vectors", e))?;

        debug!("Stored {} vectors in {}", vectors.len(), table_name);
        Ok(vectors.len())
    }

    async fn query(
        &self,
        namespace: &str,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<Match>, ServiceError> {
        let Some(table) = self.open_existing(&table_name(namespace)).await? else {
            debug!("Namespace {} has no table yet", namespace);
            return Ok(Vec::new());
        };

        let mut results = table
            .vector_search(vector)
            .map_err(|e| store_error("Failed to create vector search", e))?
            .column("vector")
            .limit(top_k)
            .execute()
            .await
            .map_err(|e| store_error("Failed to execute search", e))?;

        let mut matches = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| store_error("Failed to read result stream", e))?
        {
            matches.extend(parse_search_batch(&batch, include_metadata)?);
        }

        debug!("Parsed {} search results", matches.len());
        Ok(matches)
    }
}
