//! 질의 파이프라인 - 검색 증강 질의응답
//!
//! 질문 하나를 다음 순서로 처리합니다:
//! 1. 질문 임베딩 (실패 시 에러 전파)
//! 2. 벡터 저장소 검색 (실패 시 빈 컨텍스트로 계속)
//! 3. 프롬프트 렌더링 (컨텍스트 → 질문)
//! 4. 채팅 완성 호출 (단일, 비스트리밍)
//!
//! `answer`는 바깥 경계에서 모든 에러를 `"query failed: <원인>"` 텍스트로 바꿉니다.
//! 호출 간 상태는 없습니다.

mod prompt;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use crate::config::{Config, DEFAULT_TOP_K};
use crate::embedding::{EmbeddingProvider, OpenAiEmbedding};
use crate::error::AssistantError;
use crate::ingest::read_model_marker;
use crate::knowledge::{LanceVectorStore, SearchResult, VectorStore};
use crate::llm::{ChatModel, OpenAiChat};

pub use prompt::{build_context, PromptTemplate, DEFAULT_TEMPLATE};

/// 실패 응답 접두어
pub const FAILURE_PREFIX: &str = "query failed: ";

// ============================================================================
// ChatAssistant
// ============================================================================

/// 검색 증강 어시스턴트
///
/// 모든 구성 요소가 `Send + Sync`이므로 `Arc`로 감싸 동시 요청에 공유할 수 있습니다.
pub struct ChatAssistant {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    chat: Arc<dyn ChatModel>,
    template: PromptTemplate,
    top_k: usize,
}

impl ChatAssistant {
    /// 구성 요소로 생성 (기본 템플릿, 기본 top-k)
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        chat: Arc<dyn ChatModel>,
    ) -> Self {
        Self {
            embedder,
            store,
            chat,
            template: PromptTemplate::default(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// 설정에서 생성
    ///
    /// 벡터 저장소 디렉토리나 파티션이 없으면 `Configuration` 에러입니다.
    pub async fn from_config(config: &Config) -> Result<Self, AssistantError> {
        let embedder = OpenAiEmbedding::new(&config.embedding, config.remote.clone())?;
        let chat = OpenAiChat::new(&config.chat, config.remote.clone())?;

        let store = LanceVectorStore::open_existing(&config.store.path, &config.store.partition)
            .await
            .map_err(|e| AssistantError::Configuration(format!("{:#}", e)))?;

        let partitions = store
            .list_partitions()
            .await
            .map_err(|e| AssistantError::Configuration(format!("{:#}", e)))?;
        if !partitions.contains(&config.store.partition) {
            let available = if partitions.is_empty() {
                "none".to_string()
            } else {
                partitions.join(", ")
            };
            return Err(AssistantError::Configuration(format!(
                "partition '{}' not found in {} (available: {}). Run `campus-assistant ingest` first.",
                config.store.partition,
                config.store.path.display(),
                available
            )));
        }

        match read_model_marker(&config.store.path, &config.store.partition) {
            Some(model) if model != config.embedding.model => tracing::warn!(
                "Partition '{}' was built with embedding model '{}' but '{}' is configured; similarity scores will be meaningless",
                config.store.partition,
                model,
                config.embedding.model
            ),
            Some(_) => {}
            None => tracing::debug!(
                "No embedding model marker for partition '{}'",
                config.store.partition
            ),
        }

        tracing::info!(
            "Assistant ready (partition: {}, embedding: {}, chat: {}, top_k: {})",
            config.store.partition,
            config.embedding.model,
            config.chat.endpoint.model,
            config.store.top_k
        );

        Ok(Self::new(Arc::new(embedder), Arc::new(store), Arc::new(chat))
            .with_top_k(config.store.top_k))
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// 질문에 대한 답변 (실패해도 항상 문자열 반환)
    pub async fn answer(&self, question: &str) -> String {
        match self.try_answer(question).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::error!("Query failed: {}", e);
                format!("{}{}", FAILURE_PREFIX, e)
            }
        }
    }

    /// 질문에 대한 답변 (에러 그대로 반환)
    pub async fn try_answer(&self, question: &str) -> Result<String, AssistantError> {
        if question.trim().is_empty() {
            tracing::debug!("Empty question passed through to remote services");
        }

        let results = self.search(question, self.top_k).await?;
        let prompt = self.render_prompt(question, &results);

        tracing::debug!(
            "Sending prompt ({} chars, {} chunks) to {}",
            prompt.chars().count(),
            results.len(),
            self.chat.model()
        );

        self.chat.complete(&prompt).await
    }

    /// 검색 결과만 조회 (채팅 호출 없음)
    ///
    /// `answer`와 같은 검색 경로를 사용합니다.
    pub async fn debug_retrieve(
        &self,
        question: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>, AssistantError> {
        self.search(question, k).await
    }

    /// 프롬프트 렌더링
    pub fn render_prompt(&self, question: &str, results: &[SearchResult]) -> String {
        self.template.render(&build_context(results), question)
    }

    /// 질문 임베딩 + 검색
    async fn search(&self, question: &str, k: usize) -> Result<Vec<SearchResult>, AssistantError> {
        let query_embedding = self.embedder.embed(question).await?;
        Ok(self.retrieve(&query_embedding, k).await)
    }

    /// 저장소 검색, 실패하면 빈 결과
    async fn retrieve(&self, query_embedding: &[f32], k: usize) -> Vec<SearchResult> {
        match self.store.search(query_embedding, k).await {
            Ok(mut results) => {
                results.truncate(k);
                results
            }
            Err(e) => {
                let err = AssistantError::retrieval(format!("{:#}", e));
                tracing::warn!("{}; continuing with empty context", err);
                Vec::new()
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use crate::knowledge::MemoryVectorStore;

    fn context_block(prompt: &str) -> &str {
        let start = prompt.find("<context>\n").unwrap() + "<context>\n".len();
        let end = prompt.find("\n</context>").unwrap();
        &prompt[start..end]
    }

    #[tokio::test]
    async fn test_library_hours_scenario() {
        let chat = Arc::new(RecordingChat::default());
        let assistant = assistant_with(Arc::new(campus_store()), chat.clone()).with_top_k(1);

        let question = "What is the library's opening hours?";
        let answer = assistant.answer(question).await;

        let prompt = chat.last_prompt().unwrap();
        assert_eq!(context_block(&prompt), "Library hours: 8am-10pm daily.");
        assert!(prompt.ends_with(&format!("Question: {}", question)));
        assert_eq!(answer, format!("prompt length: {}", prompt.chars().count()));

        // 컨텍스트가 포함된 만큼 길어짐
        let bare = assistant.render_prompt(question, &[]);
        assert!(prompt.chars().count() > bare.chars().count());
    }

    #[tokio::test]
    async fn test_completion_timeout_is_fail_soft() {
        let chat = Arc::new(TimeoutChat::default());
        let assistant = assistant_with(Arc::new(campus_store()), chat.clone());

        let answer = assistant.answer("When does the dining hall open?").await;
        assert!(answer.starts_with("query failed: "));
        assert!(answer.contains("timed out"));
        assert_eq!(chat.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_real_client_timeout_is_fail_soft() {
        use axum::routing::post;
        use axum::Router;

        use crate::config::{ChatConfig, EndpointConfig};
        use crate::remote::tests::spawn_stub;
        use crate::remote::RetryPolicy;

        let router = Router::new().route(
            "/chat/completions",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "late"
            }),
        );
        let base = spawn_stub(router).await;
        let chat = OpenAiChat::new(
            &ChatConfig {
                endpoint: EndpointConfig {
                    api_key: "k".to_string(),
                    base_url: base,
                    model: "m".to_string(),
                },
                temperature: 0.7,
                max_tokens: None,
            },
            RetryPolicy::no_retry(Duration::from_millis(100)),
        )
        .unwrap();

        let assistant = assistant_with(Arc::new(campus_store()), Arc::new(chat));
        let answer = assistant.answer("library").await;
        assert!(answer.starts_with(FAILURE_PREFIX));
    }

    #[tokio::test]
    async fn test_empty_store_still_answers() {
        let chat = Arc::new(RecordingChat::default());
        let assistant = assistant_with(Arc::new(MemoryVectorStore::new()), chat.clone());

        let answer = assistant.answer("Where can I park?").await;
        assert!(!answer.starts_with(FAILURE_PREFIX));
        assert_eq!(chat.calls(), 1);
        assert_eq!(context_block(&chat.last_prompt().unwrap()), "");
    }

    #[tokio::test]
    async fn test_broken_store_degrades_to_empty_context() {
        let chat = Arc::new(RecordingChat::default());
        let assistant = assistant_with(Arc::new(BrokenStore), chat.clone());

        let answer = assistant.answer("Where can I park?").await;
        assert!(answer.starts_with("prompt length: "));
        assert_eq!(context_block(&chat.last_prompt().unwrap()), "");

        let results = assistant.debug_retrieve("Where can I park?", 3).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_failure_is_not_fabricated() {
        let chat = Arc::new(RecordingChat::default());
        let assistant = ChatAssistant::new(
            Arc::new(FailingEmbedding),
            Arc::new(campus_store()),
            chat.clone(),
        );

        let answer = assistant.answer("library").await;
        assert!(answer.starts_with("query failed: remote service error"));
        assert_eq!(chat.calls(), 0);

        let err = assistant.try_answer("library").await.unwrap_err();
        assert!(matches!(err, AssistantError::RemoteService(_)));
        assert!(assistant.debug_retrieve("library", 3).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_question() {
        let chat = Arc::new(RecordingChat::default());
        let assistant = assistant_with(Arc::new(campus_store()), chat.clone());

        let answer = assistant.answer("").await;
        assert!(answer.starts_with("prompt length: "));

        let answer = assistant.answer("   ").await;
        assert!(!answer.is_empty());
    }

    #[tokio::test]
    async fn test_debug_retrieve_bounded_ordered_idempotent() {
        let chat = Arc::new(RecordingChat::default());
        let assistant = assistant_with(Arc::new(campus_store()), chat.clone());

        for k in [0, 1, 2, 3, 10] {
            let results = assistant.debug_retrieve("parking rules", k).await.unwrap();
            assert!(results.len() <= k);
            assert!(results
                .windows(2)
                .all(|w| w[0].similarity >= w[1].similarity));
        }

        let first = assistant.debug_retrieve("parking rules", 2).await.unwrap();
        let second = assistant.debug_retrieve("parking rules", 2).await.unwrap();
        let ids = |r: &[SearchResult]| r.iter().map(|x| x.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&first[..]), ids(&second[..]));
        assert!(first.iter().all(|r| r.chunk_text.starts_with("Parking rules")));

        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn test_prompt_uses_current_question_only() {
        let chat = Arc::new(RecordingChat::default());
        let assistant = assistant_with(Arc::new(campus_store()), chat.clone()).with_top_k(1);

        assistant.answer("library?").await;
        assistant.answer("dining?").await;

        let prompt = chat.last_prompt().unwrap();
        assert!(prompt.ends_with("Question: dining?"));
        assert!(!prompt.contains("library?"));
        assert_eq!(context_block(&prompt), "Dining hall serves breakfast from 7am.");
    }

    #[tokio::test]
    async fn test_concurrent_answers_are_isolated() {
        let chat = Arc::new(RecordingChat::default());
        let assistant = Arc::new(assistant_with(Arc::new(campus_store()), chat.clone()));

        let questions: Vec<String> = (0..16).map(|i| format!("question {}", i)).collect();
        let handles: Vec<_> = questions
            .iter()
            .cloned()
            .map(|q| {
                let assistant = assistant.clone();
                tokio::spawn(async move {
                    let answer = assistant.answer(&q).await;
                    (q, answer)
                })
            })
            .collect();

        for handle in handles {
            let (question, answer) = handle.await.unwrap();
            let expected = assistant.render_prompt(
                &question,
                &assistant.debug_retrieve(&question, assistant.top_k()).await.unwrap(),
            );
            assert_eq!(answer, format!("prompt length: {}", expected.chars().count()));
        }
        assert_eq!(chat.calls(), 16);
    }

    #[tokio::test]
    async fn test_from_config_requires_existing_partition() {
        use crate::knowledge::VectorEntry;

        let temp_dir = tempfile::TempDir::new().unwrap();
        let store_path = temp_dir.path().join("db");
        let writer = LanceVectorStore::open(&store_path, "campus_information")
            .await
            .unwrap();
        writer
            .insert_batch(&[VectorEntry::new(
                "data.txt",
                0,
                "Library hours: 8am-10pm daily.".to_string(),
                vec![1.0, 0.0],
            )])
            .await
            .unwrap();

        let store_dir = store_path.display().to_string();
        let config_for = |partition: &str| {
            let partition = partition.to_string();
            let store_dir = store_dir.clone();
            Config::from_lookup(move |key| match key {
                "EMBEDDING_API_KEY" | "API_KEY" => Some("key".to_string()),
                "EMBEDDING_MODEL" | "MODEL" => Some("model".to_string()),
                "EMBEDDING_BASE_URL" | "BASE_URL" => Some("http://127.0.0.1:9".to_string()),
                "VECTORSTORE_PATH" => Some(store_dir.clone()),
                "VECTORSTORE_PARTITION" => Some(partition.clone()),
                _ => None,
            })
            .unwrap()
        };

        let err = ChatAssistant::from_config(&config_for("typo"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, AssistantError::Configuration(_)));
        assert!(err.to_string().contains("'typo'"));
        assert!(err.to_string().contains("campus_information"));

        assert!(ChatAssistant::from_config(&config_for("campus_information"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_custom_template() {
        let chat = Arc::new(RecordingChat::default());
        let template = PromptTemplate::new("以下问题基于提供的 context：\n{context}\nQuestion: {question}").unwrap();
        let assistant = assistant_with(Arc::new(campus_store()), chat.clone())
            .with_template(template)
            .with_top_k(1);

        assistant.answer("library").await;
        assert_eq!(
            chat.last_prompt().unwrap(),
            "以下问题基于提供的 context：\nLibrary hours: 8am-10pm daily.\nQuestion: library"
        );
    }
}
