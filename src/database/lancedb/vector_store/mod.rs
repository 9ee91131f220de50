
use super::SchemaRecord;
use crate::{RagError, Result, config::Config};
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const TABLE_NAME: &str = "schema_documents";

/// Vector database store using LanceDB for schema document search
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: usize,
}

/// Search result from vector similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    /// Cosine distance to the query vector, clamped to be non-negative
    pub distance: f32,
}

impl VectorStore {
    /// Open the store under the configured base directory
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        Self::open(
            &config.vector_database_path(),
            config.ollama.embedding_dimension as usize,
        )
        .await
    }

    /// Open or create a store at `db_path`.
    ///
    /// `vector_dimension` is used for a freshly created table; an existing
    /// table keeps the dimension it was created with.
    #[inline]
    pub async fn open(db_path: &Path, vector_dimension: usize) -> Result<Self> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(db_path).map_err(|e| {
            RagError::Database(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to LanceDB: {}", e)))?;

        let mut store = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            vector_dimension,
        };
        store.initialize_table().await?;

        info!("Vector store initialized successfully");
        Ok(store)
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    async fn table_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;
        Ok(table_names.contains(&self.table_name))
    }

    async fn initialize_table(&mut self) -> Result<()> {
        if self.table_exists().await? {
            debug!("Schema document table already exists, detecting vector dimension");
            match self.detect_existing_vector_dimension().await {
                Ok(dim) => {
                    self.vector_dimension = dim;
                    info!("Detected existing vector dimension: {}", dim);
                }
                Err(e) => warn!(
                    "Could not detect vector dimension from existing table: {}",
                    e
                ),
            }
            return Ok(());
        }

        self.create_table(self.vector_dimension).await
    }

    async fn create_table(&self, vector_dim: usize) -> Result<()> {
        self.connection
            .create_empty_table(&self.table_name, Self::create_schema(vector_dim)?)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to create table: {}", e)))?;

        info!(
            "Schema document table created with {} dimensions",
            vector_dim
        );
        Ok(())
    }

    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let table = self.open_table().await?;
        let schema = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to get table schema: {}", e)))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                RagError::Database(
                    "Could not find vector column or determine dimension".to_string(),
                )
            })
    }

    fn create_schema(vector_dim: usize) -> Result<Arc<Schema>> {
        let dim = i32::try_from(vector_dim).map_err(|_| {
            RagError::Database(format!("Vector dimension {} is too large", vector_dim))
        })?;

        Ok(Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, false)), dim),
                false,
            ),
            Field::new("content", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ])))
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to open table: {}", e)))
    }

    async fn drop_table_if_exists(&self) -> Result<()> {
        if self.table_exists().await? {
            info!("Dropping existing schema document table");
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop table: {}", e)))?;
        }
        Ok(())
    }

    /// Replace every stored document with `records`.
    ///
    /// The table is recreated using the dimension of the first record, so a
    /// change of embedding model is picked up on reindex.
    #[inline]
    pub async fn replace_all(&mut self, records: &[SchemaRecord]) -> Result<()> {
        let vector_dim = records
            .first()
            .map_or(self.vector_dimension, |record| record.vector.len());

        self.drop_table_if_exists().await?;
        self.create_table(vector_dim).await?;
        self.vector_dimension = vector_dim;

        self.add_records(records).await
    }

    /// Append records to the table
    #[inline]
    pub async fn add_records(&self, records: &[SchemaRecord]) -> Result<()> {
        if records.is_empty() {
            debug!("No schema records to store");
            return Ok(());
        }

        let record_batch = self.create_record_batch(records)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert records: {}", e)))?;

        info!("Stored {} schema records", records.len());
        Ok(())
    }

    fn create_record_batch(&self, records: &[SchemaRecord]) -> Result<RecordBatch> {
        let len = records.len();
        let vector_dim = self.vector_dimension;

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut contents = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for record in records {
            if record.vector.len() != vector_dim {
                return Err(RagError::Database(format!(
                    "Record {} has {} dimensions, expected {}",
                    record.id,
                    record.vector.len(),
                    vector_dim
                )));
            }
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            contents.push(record.content.as_str());
            created_ats.push(record.created_at.as_str());
        }

        let schema = Self::create_schema(vector_dim)?;
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let dim = i32::try_from(vector_dim).map_err(|_| {
            RagError::Database(format!("Vector dimension {} is too large", vector_dim))
        })?;
        let vector_array =
            FixedSizeListArray::try_new(field, dim, Arc::new(Float32Array::from(flat_values)), None)
                .map_err(|e| {
                    RagError::Database(format!("Failed to create vector array: {}", e))
                })?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(StringArray::from(contents)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(schema, arrays)
            .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
    }

    /// Return up to `limit` documents nearest to `query_vector` by cosine
    /// distance, ascending. An empty table yields no results.
    #[inline]
    pub async fn search(&self, query_vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        if self.count().await? == 0 {
            debug!("Vector store is empty, skipping search");
            return Ok(Vec::new());
        }

        debug!("Searching for similar vectors with limit: {}", limit);
        let table = self.open_table().await?;

        let mut results = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read result stream: {}", e)))?
        {
            hits.extend(Self::parse_search_batch(&batch)?);
        }

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        debug!("Parsed {} search results", hits.len());
        Ok(hits)
    }

    fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
        batch
            .column_by_name(name)
            .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
            .as_any()
            .downcast_ref::<StringArray>()
            .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<SearchHit>> {
        let ids = Self::string_column(batch, "id")?;
        let contents = Self::string_column(batch, "content")?;
        let distances = batch
            .column_by_name("_distance")
            .ok_or_else(|| RagError::Database("Missing _distance column".to_string()))?
            .as_any()
            .downcast_ref::<Float32Array>()
            .ok_or_else(|| RagError::Database("Invalid _distance column type".to_string()))?;

        (0..batch.num_rows())
            .map(|row| {
                if distances.is_null(row) {
                    return Err(RagError::Database(format!(
                        "Missing _distance for {}",
                        ids.value(row)
                    )));
                }
                Ok(SearchHit {
                    id: ids.value(row).to_string(),
                    content: contents.value(row).to_string(),
                    distance: distances.value(row).max(0.0),
                })
            })
            .collect()
    }

    /// Number of stored documents
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        self.open_table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))
    }
}
