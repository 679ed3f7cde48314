//! LLM 모듈 - OpenAI 호환 채팅 완성 API
//!
//! 단일 턴, 비스트리밍 호출만 지원합니다.
//! 호출 간 대화 상태를 유지하지 않습니다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::ChatConfig;
use crate::error::AssistantError;
use crate::remote::{send_with_retry, RetryPolicy};

// ============================================================================
// ChatModel Trait
// ============================================================================

/// 채팅 모델 트레이트
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// 프롬프트 하나에 대한 완성 텍스트
    async fn complete(&self, prompt: &str) -> Result<String, AssistantError>;

    /// 모델 식별자
    fn model(&self) -> &str;
}

// ============================================================================
// OpenAI-compatible Chat
// ============================================================================

/// OpenAI 호환 `/chat/completions` 구현체
#[derive(Debug)]
pub struct OpenAiChat {
    api_key: String,
    url: String,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl OpenAiChat {
    pub fn new(config: &ChatConfig, policy: RetryPolicy) -> Result<Self, AssistantError> {
        let client = policy.build_client()?;

        Ok(Self {
            api_key: config.endpoint.api_key.clone(),
            url: format!(
                "{}/chat/completions",
                config.endpoint.base_url.trim_end_matches('/')
            ),
            model: config.endpoint.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            client,
            policy,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl ChatModel for OpenAiChat {
    async fn complete(&self, prompt: &str) -> Result<String, AssistantError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stream: false,
        };

        let body = send_with_retry(&self.policy, "chat completion", || {
            self.client
                .post(&self.url)
                .bearer_auth(&self.api_key)
                .json(&request)
        })
        .await?;

        let response: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            AssistantError::RemoteService(format!("chat completion: malformed response: {}", e))
        })?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                AssistantError::RemoteService("chat completion: response contained no message".to_string())
            })
    }

    fn model(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
