//! LanceDB Vector Store - 디스크 영속 벡터 저장소
//!
//! 저장소 디렉토리 하나에 파티션(코퍼스)마다 테이블 하나를 둡니다.
//! 임베딩 차원은 파티션에 처음 쓰는 배치로 결정됩니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};

use super::vector::{distance_to_similarity, SearchResult, VectorEntry, VectorStore};

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
///
/// `Connection`은 내부적으로 공유 가능하므로 동시 검색에 안전합니다.
pub struct LanceVectorStore {
    db: Connection,
    table_name: String,
}

impl LanceVectorStore {
    /// 저장소 열기 (없으면 생성)
    ///
    /// # Arguments
    /// * `path` - 저장소 디렉토리
    /// * `partition` - 테이블 이름
    pub async fn open(path: &Path, partition: &str) -> Result<Self> {
        if !path.exists() {
            tokio::fs::create_dir_all(path)
                .await
                .context("Failed to create vector store directory")?;
        }

        Self::connect(path, partition).await
    }

    /// 이미 존재하는 저장소만 열기
    ///
    /// 질의 전용 진입점에서 사용합니다. 디렉토리가 없으면 실패합니다.
    pub async fn open_existing(path: &Path, partition: &str) -> Result<Self> {
        if !path.is_dir() {
            anyhow::bail!(
                "Vector store not found at {}. Run `campus-assistant ingest` first.",
                path.display()
            );
        }

        Self::connect(path, partition).await
    }

    async fn connect(path: &Path, partition: &str) -> Result<Self> {
        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self {
            db,
            table_name: partition.to_string(),
        })
    }

    /// 파티션 이름
    pub fn partition(&self) -> &str {
        &self.table_name
    }

    /// 저장소 내 전체 파티션 목록
    pub async fn list_partitions(&self) -> Result<Vec<String>> {
        self.db
            .table_names()
            .execute()
            .await
            .context("Failed to list tables")
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(dimension: i32) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("chunk_text", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension,
                ),
                false,
            ),
        ])
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(entries: &[VectorEntry]) -> Result<RecordBatch> {
        let first = entries
            .first()
            .ok_or_else(|| anyhow::anyhow!("Cannot create batch from empty entries"))?;
        let dimension = first.embedding.len();

        if dimension == 0 {
            anyhow::bail!("Cannot store zero-dimension embeddings");
        }
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {} (chunk {} of {})",
                dimension,
                bad.embedding.len(),
                bad.chunk_index,
                bad.source
            );
        }

        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let sources: Vec<&str> = entries.iter().map(|e| e.source.as_str()).collect();
        let chunk_indices: Vec<i32> = entries.iter().map(|e| e.chunk_index).collect();
        let chunk_texts: Vec<&str> = entries.iter().map(|e| e.chunk_text.as_str()).collect();

        // 임베딩을 FixedSizeList로 변환
        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(sources)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(StringArray::from(chunk_texts)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    /// 파티션(테이블) 존재 여부
    ///
    /// 저장소 조회 실패는 `false`가 아니라 에러입니다.
    pub async fn has_partition(&self) -> Result<bool> {
        Ok(self.list_partitions().await?.contains(&self.table_name))
    }

    async fn open_table(&self) -> Result<lancedb::table::Table> {
        self.db
            .open_table(&self.table_name)
            .execute()
            .await
            .with_context(|| format!("Failed to open table '{}'", self.table_name))
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let batch = Self::entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        if self.has_partition().await? {
            // 기존 테이블에 추가
            self.open_table()
                .await?
                .add(batches)
                .execute()
                .await
                .context("Failed to add vectors to table")?;
        } else {
            // 새 테이블 생성
            self.db
                .create_table(&self.table_name, batches)
                .execute()
                .await
                .context("Failed to create table")?;
        }

        tracing::debug!(
            "Inserted {} vectors into '{}'",
            entries.len(),
            self.table_name
        );
        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if limit == 0 || !self.has_partition().await? {
            return Ok(vec![]);
        }

        let table = self.open_table().await?;

        let stream = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let mut search_results = Vec::new();

        for batch in batches {
            let ids = string_column(&batch, "id")?;
            let sources = string_column(&batch, "source")?;
            let chunk_texts = string_column(&batch, "chunk_text")?;

            let chunk_indices = batch
                .column_by_name("chunk_index")
                .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing chunk_index column"))?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                search_results.push(SearchResult {
                    id: ids.value(i).to_string(),
                    source: sources.value(i).to_string(),
                    chunk_index: chunk_indices.value(i),
                    chunk_text: chunk_texts.value(i).to_string(),
                    similarity: distance_to_similarity(distances.value(i)),
                });
            }
        }

        // 배치 경계와 무관하게 유사도 순서 보장 (안정 정렬)
        search_results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        search_results.truncate(limit);

        Ok(search_results)
    }

    async fn count(&self) -> Result<usize> {
        if !self.has_partition().await? {
            return Ok(0);
        }

        let count = self
            .open_table()
            .await?
            .count_rows(None)
            .await
            .context("Failed to count rows")?;
        Ok(count)
    }

    async fn clear(&self) -> Result<usize> {
        if !self.has_partition().await? {
            return Ok(0);
        }

        let before = self.count().await?;
        self.db
            .drop_table(&self.table_name)
            .await
            .context("Failed to drop table")?;

        tracing::info!("Cleared partition '{}' ({} rows)", self.table_name, before);
        Ok(before)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(source: &str, chunk_index: i32, embedding: Vec<f32>) -> VectorEntry {
        VectorEntry::new(
            source,
            chunk_index,
            format!("chunk {} of {}", chunk_index, source),
            embedding,
        )
    }

    #[tokio::test]
    async fn test_lance_store_basic() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(&temp_dir.path().join("db"), "campus_information")
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 0);

        let entries = vec![
            entry("data.txt", 0, vec![1.0, 0.0, 0.0, 0.0]),
            entry("data.txt", 1, vec![0.0, 1.0, 0.0, 0.0]),
        ];
        assert_eq!(store.insert_batch(&entries).await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 2);

        let partitions = store.list_partitions().await.unwrap();
        assert_eq!(partitions, vec!["campus_information".to_string()]);
    }

    #[tokio::test]
    async fn test_lance_search_orders_by_similarity() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(temp_dir.path(), "search_test")
            .await
            .unwrap();

        let entries = vec![
            entry("far.txt", 0, vec![0.0, 0.0, 10.0, 0.0]),
            entry("near.txt", 0, vec![1.0, 0.1, 0.0, 0.0]),
            entry("mid.txt", 0, vec![1.0, 2.0, 0.0, 0.0]),
        ];
        store.insert_batch(&entries).await.unwrap();

        let results = store.search(&[1.0, 0.0, 0.0, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source, "near.txt");
        assert_eq!(results[1].source, "mid.txt");
        assert!(results[0].similarity >= results[1].similarity);

        // 같은 질의는 같은 순서
        let again = store.search(&[1.0, 0.0, 0.0, 0.0], 2).await.unwrap();
        let ids: Vec<_> = results.iter().map(|r| r.id.clone()).collect();
        let ids_again: Vec<_> = again.iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, ids_again);
    }

    #[tokio::test]
    async fn test_lance_search_missing_table() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(temp_dir.path(), "empty").await.unwrap();

        let results = store.search(&[1.0, 0.0], 3).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_lance_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(temp_dir.path(), "clear_test")
            .await
            .unwrap();

        let entries = vec![
            entry("a.txt", 0, vec![0.5, 0.5]),
            entry("a.txt", 1, vec![0.1, 0.9]),
            entry("b.txt", 0, vec![0.9, 0.1]),
        ];
        store.insert_batch(&entries).await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 3);
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(store.clear().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let store = LanceVectorStore::open(temp_dir.path(), "dims").await.unwrap();

        let entries = vec![entry("a.txt", 0, vec![1.0, 0.0]), entry("a.txt", 1, vec![1.0])];
        let err = store.insert_batch(&entries).await.unwrap_err();
        assert!(err.to_string().contains("dimension mismatch"));
    }

    #[tokio::test]
    async fn test_open_existing_requires_directory() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");

        assert!(LanceVectorStore::open_existing(&missing, "x").await.is_err());
        assert!(LanceVectorStore::open_existing(temp_dir.path(), "x").await.is_ok());
    }

    #[tokio::test]
    async fn test_has_partition() {
        let temp_dir = TempDir::new().unwrap();
        let writer = LanceVectorStore::open(temp_dir.path(), "campus_information")
            .await
            .unwrap();
        writer
            .insert_batch(&[entry("data.txt", 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        assert!(writer.has_partition().await.unwrap());

        let missing = LanceVectorStore::open_existing(temp_dir.path(), "missing")
            .await
            .unwrap();
        assert!(!missing.has_partition().await.unwrap());
    }
}
