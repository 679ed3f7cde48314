//! Vector Store - 벡터 검색 트레이트 및 유틸리티
//!
//! 질의 파이프라인은 저장소를 블랙박스로 취급합니다:
//! 같은 임베딩, 같은 저장소 내용이면 같은 순서의 결과를 반환해야 합니다.

use anyhow::Result;
use async_trait::async_trait;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 청크 ID (uuid)
    pub id: String,
    /// 원본 파일 경로
    pub source: String,
    /// 청크 인덱스 (0-based)
    pub chunk_index: i32,
    /// 청크 텍스트
    pub chunk_text: String,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

impl VectorEntry {
    /// 새 ID로 엔트리 생성
    pub fn new(source: &str, chunk_index: i32, chunk_text: String, embedding: Vec<f32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            chunk_index,
            chunk_text,
            embedding,
        }
    }
}

/// 검색 결과
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// 청크 ID
    pub id: String,
    /// 원본 파일 경로
    pub source: String,
    /// 청크 인덱스
    pub chunk_index: i32,
    /// 청크 텍스트
    pub chunk_text: String,
    /// 유사도 스코어 (높을수록 유사)
    pub similarity: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 동시 읽기에 안전해야 합니다. 구현체는 공유 커서 상태를 갖지 않습니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 벡터 배치 삽입
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 벡터 검색 (유사도 내림차순, 최대 `limit`개)
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 모든 벡터 삭제, 삭제된 개수 반환
    async fn clear(&self) -> Result<usize>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다.
/// 길이가 다르거나 영벡터면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// L2 거리를 (0, 1] 유사도로 변환
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

// ============================================================================
// Tests
// ============================================================================
