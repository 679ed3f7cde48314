//! 프롬프트 템플릿
//!
//! 삽입 지점은 정확히 두 개(`{context}`, `{question}`)이고
//! 컨텍스트가 항상 질문보다 앞에 옵니다.

use crate::error::AssistantError;
use crate::knowledge::SearchResult;

const CONTEXT_SLOT: &str = "{context}";
const QUESTION_SLOT: &str = "{question}";

/// 기본 템플릿
pub const DEFAULT_TEMPLATE: &str = "Given the following context, analyze the question and produce a reasonable answer:
<context>
{context}
</context>
Question: {question}";

/// 청크 사이 구분자
const CHUNK_SEPARATOR: &str = "\n\n";

/// 검증된 프롬프트 템플릿
///
/// 생성 시 템플릿을 세 조각으로 나눠두고 렌더링은 한 번에 이어 붙입니다.
/// 컨텍스트 안에 `{question}` 같은 문자열이 있어도 다시 치환되지 않습니다.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    prefix: String,
    middle: String,
    suffix: String,
}

impl PromptTemplate {
    pub fn new(template: &str) -> Result<Self, AssistantError> {
        for slot in [CONTEXT_SLOT, QUESTION_SLOT] {
            let count = template.matches(slot).count();
            if count != 1 {
                return Err(AssistantError::Configuration(format!(
                    "prompt template must contain {} exactly once (found {})",
                    slot, count
                )));
            }
        }

        let (prefix, rest) = template
            .split_once(CONTEXT_SLOT)
            .ok_or_else(|| AssistantError::config("prompt template is missing {context}"))?;
        let (middle, suffix) = rest.split_once(QUESTION_SLOT).ok_or_else(|| {
            AssistantError::config("prompt template must place {context} before {question}")
        })?;

        Ok(Self {
            prefix: prefix.to_string(),
            middle: middle.to_string(),
            suffix: suffix.to_string(),
        })
    }

    /// 컨텍스트와 질문을 채워 넣은 프롬프트
    pub fn render(&self, context: &str, question: &str) -> String {
        let mut prompt = String::with_capacity(
            self.prefix.len() + context.len() + self.middle.len() + question.len() + self.suffix.len(),
        );
        prompt.push_str(&self.prefix);
        prompt.push_str(context);
        prompt.push_str(&self.middle);
        prompt.push_str(question);
        prompt.push_str(&self.suffix);
        prompt
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self {
            prefix: "Given the following context, analyze the question and produce a reasonable answer:\n<context>\n".to_string(),
            middle: "\n</context>\nQuestion: ".to_string(),
            suffix: String::new(),
        }
    }
}

/// 검색 순서대로 청크 텍스트를 이어 붙임 (중복 제거 없음)
pub fn build_context(results: &[SearchResult]) -> String {
    results
        .iter()
        .map(|r| r.chunk_text.as_str())
        .collect::<Vec<_>>()
        .join(CHUNK_SEPARATOR)
}
