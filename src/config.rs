//! 설정 모듈 - 환경변수 기반 설정 로드
//!
//! 프로세스 시작 시 한 번만 읽어서 `Config`로 고정합니다.
//! 필수 값이 없으면 첫 질의가 아니라 시작 시점에 실패합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let config = Config::from_env()?;
//! let assistant = ChatAssistant::from_config(&config).await?;
//! ```

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::AssistantError;
use crate::remote::RetryPolicy;

// ============================================================================
// Environment Variables
// ============================================================================

pub const ENV_EMBEDDING_API_KEY: &str = "EMBEDDING_API_KEY";
pub const ENV_EMBEDDING_MODEL: &str = "EMBEDDING_MODEL";
pub const ENV_EMBEDDING_BASE_URL: &str = "EMBEDDING_BASE_URL";
pub const ENV_CHAT_API_KEY: &str = "API_KEY";
pub const ENV_CHAT_MODEL: &str = "MODEL";
pub const ENV_CHAT_BASE_URL: &str = "BASE_URL";
pub const ENV_VECTORSTORE_PATH: &str = "VECTORSTORE_PATH";
/// 이전 배포에서 쓰던 저장소 경로 변수
pub const ENV_LEGACY_STORE_PATH: &str = "CLASSES_PATH";
pub const ENV_PARTITION: &str = "VECTORSTORE_PARTITION";
pub const ENV_TOP_K: &str = "RETRIEVAL_TOP_K";
pub const ENV_TEMPERATURE: &str = "CHAT_TEMPERATURE";
pub const ENV_MAX_TOKENS: &str = "CHAT_MAX_TOKENS";
pub const ENV_TIMEOUT_SECS: &str = "REMOTE_TIMEOUT_SECS";
pub const ENV_MAX_RETRIES: &str = "REMOTE_MAX_RETRIES";

/// 텍스트 코퍼스 파티션
pub const TEXT_PARTITION: &str = "campus_information";
/// 스프레드시트(시간표) 코퍼스 파티션
pub const SPREADSHEET_PARTITION: &str = "classes_information";

/// 기본 검색 개수
pub const DEFAULT_TOP_K: usize = 4;
/// 기본 샘플링 온도
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

// ============================================================================
// Types
// ============================================================================

/// OpenAI 호환 엔드포인트 설정
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

/// 채팅 완성 설정
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub endpoint: EndpointConfig,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

/// 벡터 저장소 설정
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// LanceDB 디렉토리
    pub path: PathBuf,
    /// 질의 시 사용할 파티션(테이블)
    pub partition: String,
    /// 검색 개수
    pub top_k: usize,
}

/// 전체 설정
#[derive(Debug, Clone)]
pub struct Config {
    pub embedding: EndpointConfig,
    pub chat: ChatConfig,
    pub store: StoreConfig,
    pub remote: RetryPolicy,
}

impl Config {
    /// `.env` 파일과 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self, AssistantError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!("Loaded environment from {:?}", path);
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 임의의 조회 함수에서 설정 로드
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AssistantError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup: &lookup };

        // 누락된 필수 변수를 한 번에 보고
        let missing: Vec<&str> = [
            ENV_EMBEDDING_API_KEY,
            ENV_EMBEDDING_MODEL,
            ENV_EMBEDDING_BASE_URL,
            ENV_CHAT_API_KEY,
            ENV_CHAT_MODEL,
            ENV_CHAT_BASE_URL,
        ]
        .into_iter()
        .filter(|key| env.get(key).is_none())
        .collect();

        if !missing.is_empty() {
            return Err(AssistantError::Configuration(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let embedding = EndpointConfig {
            api_key: env.required(ENV_EMBEDDING_API_KEY)?,
            base_url: env.base_url(ENV_EMBEDDING_BASE_URL)?,
            model: env.required(ENV_EMBEDDING_MODEL)?,
        };

        let temperature = env.parsed::<f32>(ENV_TEMPERATURE)?.unwrap_or(DEFAULT_TEMPERATURE);
        if !temperature.is_finite() || temperature < 0.0 {
            return Err(AssistantError::Configuration(format!(
                "{} must be a non-negative number (got {})",
                ENV_TEMPERATURE, temperature
            )));
        }

        let chat = ChatConfig {
            endpoint: EndpointConfig {
                api_key: env.required(ENV_CHAT_API_KEY)?,
                base_url: env.base_url(ENV_CHAT_BASE_URL)?,
                model: env.required(ENV_CHAT_MODEL)?,
            },
            temperature,
            max_tokens: env.parsed(ENV_MAX_TOKENS)?,
        };

        let path = env
            .get(ENV_VECTORSTORE_PATH)
            .or_else(|| env.get(ENV_LEGACY_STORE_PATH))
            .map(PathBuf::from)
            .unwrap_or_else(|| get_data_dir().join("db"));

        let top_k = env.parsed(ENV_TOP_K)?.unwrap_or(DEFAULT_TOP_K);
        if top_k == 0 {
            return Err(AssistantError::Configuration(format!(
                "{} must be at least 1",
                ENV_TOP_K
            )));
        }

        let store = StoreConfig {
            path,
            partition: env
                .get(ENV_PARTITION)
                .unwrap_or_else(|| SPREADSHEET_PARTITION.to_string()),
            top_k,
        };

        let defaults = RetryPolicy::default();
        let timeout = match env.parsed::<u64>(ENV_TIMEOUT_SECS)? {
            Some(0) => {
                return Err(AssistantError::Configuration(format!(
                    "{} must be at least 1",
                    ENV_TIMEOUT_SECS
                )))
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.timeout,
        };
        let remote = RetryPolicy {
            max_retries: env.parsed(ENV_MAX_RETRIES)?.unwrap_or(defaults.max_retries),
            timeout,
            ..defaults
        };

        Ok(Self {
            embedding,
            chat,
            store,
            remote,
        })
    }
}

/// 환경변수 조회 헬퍼
struct EnvReader<'a, F> {
    lookup: &'a F,
}

impl<F> EnvReader<'_, F>
where
    F: Fn(&str) -> Option<String>,
{
    /// 비어있지 않은 값만 반환
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, AssistantError> {
        self.get(key)
            .ok_or_else(|| AssistantError::Configuration(format!("{} is not set", key)))
    }

    /// URL 검증 후 끝의 '/' 제거
    fn base_url(&self, key: &str) -> Result<String, AssistantError> {
        let raw = self.required(key)?;
        Url::parse(&raw).map_err(|e| {
            AssistantError::Configuration(format!("{} is not a valid URL ({}): {}", key, raw, e))
        })?;
        Ok(raw.trim_end_matches('/').to_string())
    }

    fn parsed<T>(&self, key: &str) -> Result<Option<T>, AssistantError>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw.parse::<T>().map(Some).map_err(|e| {
                AssistantError::Configuration(format!("{} has invalid value '{}': {}", key, raw, e))
            }),
            None => Ok(None),
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// 데이터 디렉토리 경로 (~/.campus-assistant/)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".campus-assistant")
}

/// API 키 마스킹 (상태 출력용)
pub fn mask_secret(secret: &str) -> String {
    let count = secret.chars().count();
    if count <= 8 {
        return "*".repeat(count);
    }
    let head: String = secret.chars().take(4).collect();
    let tail: String = secret.chars().skip(count - 4).collect();
    format!("{}...{}", head, tail)
}

// ============================================================================
// Tests
// ============================================================================
