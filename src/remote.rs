//! 원격 API 호출 정책 - 타임아웃 + 지수 백오프 재시도
//!
//! 임베딩/채팅 클라이언트가 공유합니다.
//! 전송 실패, 타임아웃, 429, 5xx 응답만 재시도하고
//! 나머지 실패는 즉시 `AssistantError::RemoteService`로 반환합니다.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::error::AssistantError;

/// 기본 최대 재시도 횟수
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;
/// 요청당 기본 타임아웃
const DEFAULT_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// RetryPolicy
// ============================================================================

/// 재시도 정책
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// 최초 시도 이후 최대 재시도 횟수
    pub max_retries: u32,
    /// 첫 재시도 전 대기 시간 (시도마다 2배)
    pub initial_backoff: Duration,
    /// 요청당 타임아웃
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    /// 재시도 없이 한 번만 시도
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            timeout,
        }
    }

    /// n번째 시도(0-based) 실패 후 대기 시간
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt))
    }

    /// 타임아웃이 적용된 HTTP 클라이언트 생성
    pub fn build_client(&self) -> Result<reqwest::Client, AssistantError> {
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| AssistantError::Configuration(format!("Failed to create HTTP client: {}", e)))
    }
}

/// 재시도 대상 상태 코드 여부
pub fn is_retryable(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

// ============================================================================
// Request Execution
// ============================================================================

/// OpenAI 호환 에러 응답
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// 요청 전송 + 재시도, 성공 시 응답 본문 반환
///
/// # Arguments
/// * `policy` - 재시도 정책
/// * `service` - 로그/에러 메시지에 쓰일 서비스 이름
/// * `build` - 매 시도마다 새 요청을 만드는 함수
pub async fn send_with_retry<F>(
    policy: &RetryPolicy,
    service: &str,
    build: F,
) -> Result<String, AssistantError>
where
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut last_error = String::new();

    for attempt in 0..=policy.max_retries {
        if attempt > 0 {
            let backoff = policy.backoff(attempt - 1);
            tracing::warn!(
                "{} request failed ({}), retrying in {:?} (attempt {}/{})",
                service,
                last_error,
                backoff,
                attempt,
                policy.max_retries
            );
            tokio::time::sleep(backoff).await;
        }

        let response = match build().send().await {
            Ok(resp) => resp,
            Err(e) => {
                last_error = if e.is_timeout() {
                    format!("request timed out after {:?}", policy.timeout)
                } else {
                    format!("failed to send request: {}", e)
                };
                continue;
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                last_error = if e.is_timeout() {
                    format!("request timed out after {:?}", policy.timeout)
                } else {
                    format!("failed to read response body: {}", e)
                };
                continue;
            }
        };

        if status.is_success() {
            return Ok(body);
        }

        let detail = serde_json::from_str::<ApiErrorBody>(&body)
            .map(|b| b.error.message)
            .unwrap_or(body);
        last_error = format!("HTTP {}: {}", status, detail);

        if !is_retryable(status) {
            break;
        }
    }

    Err(AssistantError::RemoteService(format!(
        "{}: {}",
        service, last_error
    )))
}

// ============================================================================
// Tests
// ============================================================================
