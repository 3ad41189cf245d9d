
use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use itertools::Itertools;
use lancedb::{
    Connection, Table,
    query::{ExecutableQuery, QueryBase},
};
use tracing::{debug, info};

use super::{ChunkMetadata, ChunkRecord, StoredChunk};
use crate::config::Config;
use crate::{KbError, Result};

/// A named collection of chunks in LanceDB.
///
/// The vector dimension is fixed by the table schema: the first upsert into an
/// empty collection sets it, and every later write must match it exactly. The
/// collection never resizes itself; dimension changes go through
/// [`drop_and_recreate`](Self::drop_and_recreate).
pub struct VectorCollection {
    connection: Connection,
    table_name: String,
}

impl VectorCollection {
    /// Open (or lazily create) the collection configured in `config`.
    #[inline]
    pub async fn open(config: &Config) -> Result<Self> {
        let db_path = config.vector_database_path();
        debug!("Opening LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path).map_err(|e| {
            KbError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        Ok(Self {
            connection,
            table_name: config.storage.collection_name.clone(),
        })
    }

    /// Open the underlying table if it has been created.
    async fn table(&self) -> Result<Option<Table>> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to list tables: {}", e)))?;

        if !table_names.contains(&self.table_name) {
            return Ok(None);
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to open table: {}", e)))?;
        Ok(Some(table))
    }

    /// The vector dimension the collection is locked to, or `None` while the
    /// collection is still empty.
    #[inline]
    pub async fn dimension(&self) -> Result<Option<usize>> {
        let Some(table) = self.table().await? else {
            return Ok(None);
        };

        let schema = table
            .schema()
            .await
            .map_err(|e| KbError::Database(format!("Failed to get table schema: {}", e)))?;

        for field in schema.fields() {
            if field.name() == "vector" {
                if let DataType::FixedSizeList(_, size) = field.data_type() {
                    return Ok(Some(usize::try_from(*size).unwrap_or(0)));
                }
            }
        }

        Err(KbError::Database(
            "Could not find vector column or determine dimension".to_string(),
        ))
    }

    /// Insert chunks, replacing any existing chunks with the same ids.
    ///
    /// All vectors in the batch must share one length; on an empty collection
    /// that length becomes the table dimension, otherwise it must match the
    /// existing one or the whole batch is rejected.
    #[inline]
    pub async fn upsert(&self, records: &[ChunkRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("No chunks to store");
            return Ok(());
        }

        let batch_dim = records[0].vector.len();
        if batch_dim == 0 {
            return Err(KbError::Validation(
                "chunk vectors cannot be empty".to_string(),
            ));
        }
        for record in records {
            if record.vector.len() != batch_dim {
                return Err(KbError::DimensionMismatch {
                    expected: batch_dim,
                    actual: record.vector.len(),
                });
            }
        }

        let mut seen = HashSet::with_capacity(records.len());
        for record in records {
            if !seen.insert(record.id.as_str()) {
                return Err(KbError::Validation(format!(
                    "duplicate chunk id in batch: {}",
                    record.id
                )));
            }
        }

        let table = match self.table().await? {
            Some(table) => {
                let existing = self.dimension().await?.unwrap_or(batch_dim);
                if existing != batch_dim {
                    return Err(KbError::DimensionMismatch {
                        expected: existing,
                        actual: batch_dim,
                    });
                }
                table
            }
            None => self.create_table(batch_dim).await?,
        };

        // Replace-by-id semantics: clear any rows with these ids first.
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        table
            .delete(&id_predicate(&ids))
            .await
            .map_err(|e| KbError::Database(format!("Failed to delete replaced chunks: {}", e)))?;

        let record_batch = create_record_batch(records, batch_dim)?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to insert chunks: {}", e)))?;

        debug!("Stored {} chunks", records.len());
        Ok(())
    }

    /// Fetch the chunks with the given ids; missing ids are silently skipped.
    #[inline]
    pub async fn get(&self, ids: &[String]) -> Result<Vec<StoredChunk>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let Some(table) = self.table().await? else {
            return Ok(vec![]);
        };

        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        let results = table
            .query()
            .only_if(id_predicate(&id_refs))
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to query chunks: {}", e)))?;

        collect_chunks(results).await
    }

    /// Fetch every chunk in the collection.
    #[inline]
    pub async fn get_all(&self) -> Result<Vec<StoredChunk>> {
        let Some(table) = self.table().await? else {
            return Ok(vec![]);
        };

        let results = table
            .query()
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to scan collection: {}", e)))?;

        collect_chunks(results).await
    }

    /// Delete the chunks with the given ids.
    #[inline]
    pub async fn delete(&self, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let Some(table) = self.table().await? else {
            return Ok(());
        };

        let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
        table
            .delete(&id_predicate(&id_refs))
            .await
            .map_err(|e| KbError::Database(format!("Failed to delete chunks: {}", e)))?;
        Ok(())
    }

    /// Delete every chunk belonging to `source`, returning how many were
    /// removed.
    #[inline]
    pub async fn delete_by_source(&self, source: &str) -> Result<u64> {
        let Some(table) = self.table().await? else {
            return Ok(0);
        };

        let predicate = format!("source = '{}'", escape_literal(source));
        let count = table
            .count_rows(Some(predicate.clone()))
            .await
            .map_err(|e| KbError::Database(format!("Failed to count source chunks: {}", e)))?;

        table
            .delete(&predicate)
            .await
            .map_err(|e| KbError::Database(format!("Failed to delete source chunks: {}", e)))?;

        debug!("Deleted {} chunks for source: {}", count, source);
        Ok(count as u64)
    }

    /// Total number of chunks stored.
    #[inline]
    pub async fn count(&self) -> Result<u64> {
        let Some(table) = self.table().await? else {
            return Ok(0);
        };

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| KbError::Database(format!("Failed to count rows: {}", e)))?;
        Ok(count as u64)
    }

    /// Distinct source names, in the order they are first encountered.
    #[inline]
    pub async fn sources(&self) -> Result<Vec<String>> {
        let chunks = self.get_all().await?;
        Ok(chunks
            .into_iter()
            .map(|chunk| chunk.metadata.source)
            .unique()
            .collect())
    }

    /// Drop the collection and recreate it empty at the given dimension.
    ///
    /// This is destructive; callers are expected to hold a snapshot they can
    /// re-ingest from.
    #[inline]
    pub async fn drop_and_recreate(&self, dimension: usize) -> Result<()> {
        info!(
            "Recreating collection {} with vector dimension {}",
            self.table_name, dimension
        );

        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to list tables for drop: {}", e)))?;

        if table_names.contains(&self.table_name) {
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| KbError::Database(format!("Failed to drop table: {}", e)))?;
        }

        self.create_table(dimension).await?;
        Ok(())
    }

    /// Return the `k` nearest chunks to `vector` with similarity scores
    /// (higher is closer).
    #[inline]
    pub async fn query_nearest(
        &self,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<(StoredChunk, f32)>> {
        let Some(table) = self.table().await? else {
            return Ok(vec![]);
        };

        if let Some(expected) = self.dimension().await? {
            if expected != vector.len() {
                return Err(KbError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
        }

        debug!("Searching for nearest chunks with limit: {}", k);

        let mut results = table
            .vector_search(vector)
            .map_err(|e| KbError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .limit(k)
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to execute search: {}", e)))?;

        let mut scored = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| KbError::Database(format!("Failed to read result stream: {}", e)))?
        {
            let chunks = parse_chunk_batch(&batch)?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|col| col.as_any().downcast_ref::<Float32Array>().cloned());

            for (row, chunk) in chunks.into_iter().enumerate() {
                let distance = distances.as_ref().map_or(0.0, |d| {
                    if d.is_null(row) { 0.0 } else { d.value(row) }
                });
                scored.push((chunk, 1.0 - distance));
            }
        }

        Ok(scored)
    }

    async fn create_table(&self, dimension: usize) -> Result<Table> {
        let schema = create_schema(dimension);
        let table = self
            .connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(|e| KbError::Database(format!("Failed to create table: {}", e)))?;
        info!(
            "Created collection {} with {} dimensions",
            self.table_name, dimension
        );
        Ok(table)
    }
}

fn create_schema(vector_dim: usize) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                i32::try_from(vector_dim).unwrap_or(i32::MAX),
            ),
            false,
        ),
        Field::new("content", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("file_path", DataType::Utf8, true),
        Field::new("created_at", DataType::Utf8, false),
    ]))
}

fn create_record_batch(records: &[ChunkRecord], vector_dim: usize) -> Result<RecordBatch> {
    let len = records.len();

    let mut ids = Vec::with_capacity(len);
    let mut contents = Vec::with_capacity(len);
    let mut sources = Vec::with_capacity(len);
    let mut chunk_indices = Vec::with_capacity(len);
    let mut file_paths = Vec::with_capacity(len);
    let mut created_ats = Vec::with_capacity(len);
    let mut flat_values = Vec::with_capacity(len * vector_dim);

    for record in records {
        ids.push(record.id.as_str());
        contents.push(record.text.as_str());
        sources.push(record.metadata.source.as_str());
        chunk_indices.push(record.metadata.chunk_index);
        file_paths.push(record.metadata.file_path.as_deref());
        created_ats.push(record.created_at.as_str());
        flat_values.extend_from_slice(&record.vector);
    }

    let values_array = Float32Array::from(flat_values);
    let item_field = Arc::new(Field::new("item", DataType::Float32, false));
    let vector_array = FixedSizeListArray::try_new(
        item_field,
        i32::try_from(vector_dim).unwrap_or(i32::MAX),
        Arc::new(values_array),
        None,
    )
    .map_err(|e| KbError::Database(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(contents)),
        Arc::new(StringArray::from(sources)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(StringArray::from(file_paths)),
        Arc::new(StringArray::from(created_ats)),
    ];

    RecordBatch::try_new(create_schema(vector_dim), arrays)
        .map_err(|e| KbError::Database(format!("Failed to create record batch: {}", e)))
}

async fn collect_chunks(
    mut results: lancedb::arrow::SendableRecordBatchStream,
) -> Result<Vec<StoredChunk>> {
    let mut chunks = Vec::new();
    while let Some(batch) = results
        .try_next()
        .await
        .map_err(|e| KbError::Database(format!("Failed to read result stream: {}", e)))?
    {
        chunks.extend(parse_chunk_batch(&batch)?);
    }
    Ok(chunks)
}

fn parse_chunk_batch(batch: &RecordBatch) -> Result<Vec<StoredChunk>> {
    let ids = string_column(batch, "id")?;
    let contents = string_column(batch, "content")?;
    let sources = string_column(batch, "source")?;
    let file_paths = string_column(batch, "file_path")?;

    let chunk_indices = batch
        .column_by_name("chunk_index")
        .ok_or_else(|| KbError::Database("Missing chunk_index column".to_string()))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| KbError::Database("Invalid chunk_index column type".to_string()))?;

    let mut chunks = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        chunks.push(StoredChunk {
            id: ids.value(row).to_string(),
            text: contents.value(row).to_string(),
            metadata: ChunkMetadata {
                source: sources.value(row).to_string(),
                chunk_index: chunk_indices.value(row),
                file_path: if file_paths.is_null(row) {
                    None
                } else {
                    Some(file_paths.value(row).to_string())
                },
            },
        });
    }
    Ok(chunks)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| KbError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| KbError::Database(format!("Invalid {} column type", name)))
}

fn id_predicate(ids: &[&str]) -> String {
    let quoted = ids
        .iter()
        .map(|id| format!("'{}'", escape_literal(id)))
        .join(", ");
    format!("id IN ({})", quoted)
}

/// Escape a string for use inside a single-quoted SQL literal.
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
