//! 임베딩 모듈 - OpenAI 호환 API를 통한 텍스트 벡터화
//!
//! 텍스트를 벡터로 변환하는 임베딩 프로바이더입니다.
//! 수집(ingest)과 질의에서 반드시 같은 모델을 사용해야 합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OpenAiEmbedding::new(&config.embedding, config.remote.clone())?;
//! let embedding = embedder.embed("도서관 운영 시간").await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::EndpointConfig;
use crate::error::AssistantError;
use crate::remote::{send_with_retry, RetryPolicy};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AssistantError>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    ///
    /// 하나라도 실패하면 전체가 실패합니다. 부분 결과는 없습니다.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AssistantError> {
        let mut results = Vec::with_capacity(texts.len());
        for (i, text) in texts.iter().enumerate() {
            tracing::debug!("Embedding batch {}/{}", i + 1, texts.len());
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 모델 식별자
    fn model(&self) -> &str;
}

// ============================================================================
// OpenAI-compatible Embedding
// ============================================================================

/// OpenAI 호환 `/embeddings` 구현체
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: String,
    url: String,
    model: String,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl OpenAiEmbedding {
    /// 새 임베딩 클라이언트 생성
    ///
    /// # Arguments
    /// * `endpoint` - API 키, base URL, 모델
    /// * `policy` - 타임아웃/재시도 정책
    pub fn new(endpoint: &EndpointConfig, policy: RetryPolicy) -> Result<Self, AssistantError> {
        let client = policy.build_client()?;

        Ok(Self {
            api_key: endpoint.api_key.clone(),
            url: format!("{}/embeddings", endpoint.base_url.trim_end_matches('/')),
            model: endpoint.model.clone(),
            client,
            policy,
        })
    }
}

/// 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
    encoding_format: &'static str,
}

/// 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, AssistantError> {
        let request = EmbedRequest {
            model: &self.model,
            input: text,
            encoding_format: "float",
        };

        let body = send_with_retry(&self.policy, "embedding", || {
            self.client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&request)
        })
        .await?;

        let response: EmbedResponse = serde_json::from_str(&body).map_err(|e| {
            AssistantError::RemoteService(format!("embedding: malformed response: {}", e))
        })?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AssistantError::RemoteService("embedding: response contained no vectors".to_string()))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
