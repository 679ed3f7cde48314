//! In-memory Vector Store - 전수 코사인 유사도 검색
//!
//! 소규모 코퍼스나 테스트용입니다. 영속성은 없습니다.

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::vector::{cosine_similarity, SearchResult, VectorEntry, VectorStore};

/// 메모리 벡터 저장소
#[derive(Debug, Default)]
pub struct MemoryVectorStore {
    entries: RwLock<Vec<VectorEntry>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 엔트리로 초기화
    pub fn with_entries(entries: Vec<VectorEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        let mut guard = self
            .entries
            .write()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        guard.extend_from_slice(entries);
        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let guard = self
            .entries
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut results: Vec<SearchResult> = guard
            .iter()
            .map(|e| SearchResult {
                id: e.id.clone(),
                source: e.source.clone(),
                chunk_index: e.chunk_index,
                chunk_text: e.chunk_text.clone(),
                similarity: cosine_similarity(query_embedding, &e.embedding),
            })
            .collect();

        // 안정 정렬: 동점은 삽입 순서 유지
        results.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(limit);

        Ok(results)
    }

    async fn count(&self) -> Result<usize> {
        let guard = self
            .entries
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        Ok(guard.len())
    }

    async fn clear(&self) -> Result<usize> {
        let mut guard = self
            .entries
            .write()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        let removed = guard.len();
        guard.clear();
        Ok(removed)
    }
}
