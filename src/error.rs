//! 에러 타입
//!
//! 파이프라인 경계에서 구분해야 하는 세 가지 에러 종류를 정의합니다.
//! - `Configuration`: 시작 시점에 즉시 중단
//! - `RemoteService`: `ChatAssistant::answer` 경계에서 텍스트 응답으로 변환
//! - `Retrieval`: 파이프라인 내부에서 빈 컨텍스트로 흡수

use thiserror::Error;

/// 어시스턴트 에러
#[derive(Debug, Error)]
pub enum AssistantError {
    /// 필수 설정 누락 또는 잘못된 값
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 임베딩/채팅 API 호출 실패, 타임아웃, 잘못된 응답
    #[error("remote service error: {0}")]
    RemoteService(String),

    /// 벡터 저장소 접근 실패
    #[error("retrieval error: {0}")]
    Retrieval(String),
}

impl AssistantError {
    pub fn config<E: std::fmt::Display>(err: E) -> Self {
        AssistantError::Configuration(err.to_string())
    }

    pub fn remote<E: std::fmt::Display>(err: E) -> Self {
        AssistantError::RemoteService(err.to_string())
    }

    pub fn retrieval<E: std::fmt::Display>(err: E) -> Self {
        AssistantError::Retrieval(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AssistantError::remote("timed out");
        assert_eq!(err.to_string(), "remote service error: timed out");

        let err = AssistantError::config("MODEL is not set");
        assert!(err.to_string().starts_with("configuration error"));
    }
}
