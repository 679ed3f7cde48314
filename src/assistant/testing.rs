//! 테스트용 스텁 프로바이더

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::AssistantError;
use crate::knowledge::{MemoryVectorStore, SearchResult, VectorEntry, VectorStore};
use crate::llm::ChatModel;

use super::ChatAssistant;

/// 키워드 포함 여부로 결정적인 벡터를 만드는 임베딩
///
/// 차원 순서: library, parking, dining, 상수항
pub struct KeywordEmbedding;

impl KeywordEmbedding {
    pub fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let has = |word: &str| if lower.contains(word) { 1.0 } else { 0.0 };
        vec![has("library"), has("parking"), has("dining"), 0.1]
    }
}

#[async_trait]
impl EmbeddingProvider for KeywordEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AssistantError> {
        Ok(Self::vector(text))
    }

    fn model(&self) -> &str {
        "keyword"
    }
}

/// 항상 실패하는 임베딩
pub struct FailingEmbedding;

#[async_trait]
impl EmbeddingProvider for FailingEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, AssistantError> {
        Err(AssistantError::remote("embedding: HTTP 401 Unauthorized: invalid api key"))
    }

    fn model(&self) -> &str {
        "failing"
    }
}

/// 프롬프트를 기록하고 길이를 돌려주는 채팅 모델
#[derive(Default)]
pub struct RecordingChat {
    pub prompts: Mutex<Vec<String>>,
}

impl RecordingChat {
    pub fn calls(&self) -> usize {
        self.prompts.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().ok().and_then(|p| p.last().cloned())
    }
}

#[async_trait]
impl ChatModel for RecordingChat {
    async fn complete(&self, prompt: &str) -> Result<String, AssistantError> {
        self.prompts
            .lock()
            .map_err(|e| AssistantError::remote(e.to_string()))?
            .push(prompt.to_string());
        Ok(format!("prompt length: {}", prompt.chars().count()))
    }

    fn model(&self) -> &str {
        "recording"
    }
}

/// 타임아웃을 흉내내는 채팅 모델
#[derive(Default)]
pub struct TimeoutChat {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ChatModel for TimeoutChat {
    async fn complete(&self, _prompt: &str) -> Result<String, AssistantError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AssistantError::remote(
            "chat completion: request timed out after 60s",
        ))
    }

    fn model(&self) -> &str {
        "timeout"
    }
}

/// 항상 실패하는 저장소
pub struct BrokenStore;

#[async_trait]
impl VectorStore for BrokenStore {
    async fn insert_batch(&self, _entries: &[VectorEntry]) -> Result<usize> {
        anyhow::bail!("store is corrupt")
    }

    async fn search(&self, _query_embedding: &[f32], _limit: usize) -> Result<Vec<SearchResult>> {
        anyhow::bail!("store is corrupt")
    }

    async fn count(&self) -> Result<usize> {
        anyhow::bail!("store is corrupt")
    }

    async fn clear(&self) -> Result<usize> {
        anyhow::bail!("store is corrupt")
    }
}

/// 캠퍼스 안내 청크가 들어있는 저장소
pub fn campus_store() -> MemoryVectorStore {
    let texts = [
        "Library hours: 8am-10pm daily.",
        "Parking rules: permits are required on weekdays.",
        "Parking rules: visitors use lot C.",
        "Dining hall serves breakfast from 7am.",
    ];

    MemoryVectorStore::with_entries(
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                VectorEntry::new("data.txt", i as i32, text.to_string(), KeywordEmbedding::vector(text))
            })
            .collect(),
    )
}

/// 스텁으로 구성된 어시스턴트
pub fn assistant_with(
    store: Arc<dyn VectorStore>,
    chat: Arc<dyn ChatModel>,
) -> ChatAssistant {
    ChatAssistant::new(Arc::new(KeywordEmbedding), store, chat)
}
