//! 수집(ingest) 모듈 - 문서 → 청크 → 임베딩 → 벡터 저장소
//!
//! 오프라인으로 코퍼스가 바뀔 때마다 한 번 실행합니다.
//! 파티션 옆에 임베딩 모델 마커 파일을 남겨, 질의 시점에
//! 다른 모델을 쓰고 있는지 확인할 수 있게 합니다.

mod loader;

use std::path::Path;

use anyhow::{Context, Result};

use crate::embedding::EmbeddingProvider;
use crate::knowledge::{spreadsheet_chunker, text_chunker, Chunker, VectorEntry, VectorStore};

pub use loader::{collect_sources, load_source, SourceKind};

// ============================================================================
// Types
// ============================================================================

/// 소스 하나의 수집 결과
#[derive(Debug, Clone)]
pub struct IngestReport {
    /// 원본 파일 경로
    pub source: String,
    /// 소스 타입
    pub kind: SourceKind,
    /// 저장된 청크 수
    pub chunks: usize,
    /// 원본 문자 수
    pub characters: usize,
}

// ============================================================================
// IngestPipeline
// ============================================================================

/// 수집 파이프라인
pub struct IngestPipeline<'a> {
    embedder: &'a dyn EmbeddingProvider,
    store: &'a dyn VectorStore,
}

impl<'a> IngestPipeline<'a> {
    pub fn new(embedder: &'a dyn EmbeddingProvider, store: &'a dyn VectorStore) -> Self {
        Self { embedder, store }
    }

    /// 파일 수집 (타입별 기본 청커 사용)
    ///
    /// 텍스트는 300/50, 스프레드시트는 500/50 설정입니다.
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestReport> {
        let kind = SourceKind::from_path(path)
            .ok_or_else(|| anyhow::anyhow!("Unsupported file type: {:?}", path))?;

        let chunker = match kind {
            SourceKind::Text => text_chunker(),
            SourceKind::Spreadsheet => spreadsheet_chunker(),
        };

        self.ingest(path, kind, chunker.as_ref()).await
    }

    /// 파일 수집 (청커 지정)
    pub async fn ingest(
        &self,
        path: &Path,
        kind: SourceKind,
        chunker: &dyn Chunker,
    ) -> Result<IngestReport> {
        let text = load_source(path, kind).await?;
        let source = path.display().to_string();

        let chunks = self.ingest_text(&source, &text, chunker).await?;

        Ok(IngestReport {
            source,
            kind,
            chunks,
            characters: text.chars().count(),
        })
    }

    /// 텍스트 청킹 → 임베딩 → 저장, 저장된 청크 수 반환
    pub async fn ingest_text(
        &self,
        source: &str,
        text: &str,
        chunker: &dyn Chunker,
    ) -> Result<usize> {
        let chunks = chunker.chunk(text);
        if chunks.is_empty() {
            tracing::warn!("No chunks generated for source: {}", source);
            return Ok(0);
        }

        tracing::info!(
            "Chunked {} into {} pieces ({})",
            source,
            chunks.len(),
            chunker.name()
        );

        let embeddings = self
            .embedder
            .embed_batch(&chunks)
            .await
            .context("Failed to embed chunks")?;

        let entries: Vec<VectorEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (chunk, embedding))| VectorEntry::new(source, i as i32, chunk, embedding))
            .collect();

        let inserted = self
            .store
            .insert_batch(&entries)
            .await
            .context("Failed to insert vectors")?;

        Ok(inserted)
    }
}

// ============================================================================
// Model Marker
// ============================================================================

fn marker_path(store_path: &Path, partition: &str) -> std::path::PathBuf {
    store_path.join(format!("{}.model", partition))
}

/// 파티션에 사용된 임베딩 모델 기록
pub fn write_model_marker(store_path: &Path, partition: &str, model: &str) -> Result<()> {
    std::fs::create_dir_all(store_path).context("Failed to create vector store directory")?;
    std::fs::write(marker_path(store_path, partition), model)
        .context("Failed to write embedding model marker")
}

/// 기록된 임베딩 모델 조회 (마커가 없으면 `None`)
pub fn read_model_marker(store_path: &Path, partition: &str) -> Option<String> {
    std::fs::read_to_string(marker_path(store_path, partition))
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

// ============================================================================
// Tests
// ============================================================================
