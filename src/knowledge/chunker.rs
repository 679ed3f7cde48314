//! Text Chunking Module
//!
//! 고정 크기 윈도우 + 오버랩 방식의 텍스트 분할을 제공합니다.
//! 크기는 바이트가 아니라 문자(char) 수 기준입니다.
//!
//! - `CharacterChunker`: 단일 구분자로 나눈 뒤 윈도우로 병합 (일반 텍스트)
//! - `RecursiveChunker`: 구분자 목록을 차례로 시도 (스프레드시트 등 구조가 약한 텍스트)

use anyhow::Result;

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 인접 청크 간 오버랩 (문자 수)
    pub chunk_overlap: usize,
}

impl ChunkConfig {
    /// 검증 후 생성
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            anyhow::bail!("chunk_size must be greater than 0");
        }
        if chunk_overlap >= chunk_size {
            anyhow::bail!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap,
                chunk_size
            );
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// 일반 텍스트용 (300 / 50)
    pub fn for_text() -> Self {
        Self {
            chunk_size: 300,
            chunk_overlap: 50,
        }
    }

    /// 스프레드시트용 (500 / 50)
    pub fn for_spreadsheet() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// CharacterChunker
// ============================================================================

/// 단일 구분자 청커
///
/// 구분자로 나눈 조각들을 `chunk_size`를 넘지 않게 이어붙입니다.
/// 한 조각이 `chunk_size`보다 크면 자르지 않고 그대로 하나의 청크가 됩니다.
pub struct CharacterChunker {
    config: ChunkConfig,
    separator: String,
}

impl CharacterChunker {
    pub fn new(config: ChunkConfig, separator: &str) -> Self {
        Self {
            config,
            separator: separator.to_string(),
        }
    }

    /// 문단 구분자("\n\n")로 생성
    pub fn paragraphs(config: ChunkConfig) -> Self {
        Self::new(config, "\n\n")
    }
}

impl Chunker for CharacterChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        let splits = split_on(text, &self.separator);
        merge_splits(&splits, &self.separator, &self.config)
    }

    fn name(&self) -> &'static str {
        "CharacterChunker"
    }
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 재귀 청커
///
/// 큰 구분자부터 시도하고, 여전히 큰 조각은 다음 구분자로 다시 나눕니다.
/// 마지막 구분자 ""는 문자 단위 분할입니다.
pub struct RecursiveChunker {
    config: ChunkConfig,
    separators: Vec<String>,
}

impl RecursiveChunker {
    pub fn new(config: ChunkConfig) -> Self {
        Self::with_separators(config, &["\n\n", "\n", " ", ""])
    }

    pub fn with_separators(config: ChunkConfig, separators: &[&str]) -> Self {
        Self {
            config,
            separators: separators.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn split_recursive(&self, text: &str, separators: &[String]) -> Vec<String> {
        // 텍스트에 존재하는 첫 구분자 선택
        let position = separators
            .iter()
            .position(|s| s.is_empty() || text.contains(s.as_str()))
            .unwrap_or(separators.len().saturating_sub(1));

        let (separator, rest) = match separators.get(position) {
            Some(sep) => (sep.as_str(), &separators[position + 1..]),
            None => return vec![text.to_string()],
        };

        let splits = split_on(text, separator);
        let mut good: Vec<&str> = Vec::new();
        let mut chunks = Vec::new();

        for split in splits {
            if char_len(split) < self.config.chunk_size {
                good.push(split);
                continue;
            }

            if !good.is_empty() {
                chunks.extend(merge_splits(&good, separator, &self.config));
                good.clear();
            }

            if rest.is_empty() {
                chunks.push(split.to_string());
            } else {
                chunks.extend(self.split_recursive(split, rest));
            }
        }

        if !good.is_empty() {
            chunks.extend(merge_splits(&good, separator, &self.config));
        }

        chunks
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        self.split_recursive(text, &self.separators)
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 구분자로 분할 (빈 조각 제거, ""는 문자 단위)
fn split_on<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    text.split(separator).filter(|s| !s.is_empty()).collect()
}

/// 조각들을 구분자로 이어 붙이며 윈도우 단위로 병합
///
/// 청크를 확정할 때마다 끝부분 조각들을 `chunk_overlap` 이내로 남겨
/// 다음 청크의 앞부분으로 사용합니다.
fn merge_splits(splits: &[&str], separator: &str, config: &ChunkConfig) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut total = 0usize;

    for &split in splits {
        let len = char_len(split);
        let joined_sep = if current.is_empty() { 0 } else { sep_len };

        if total + len + joined_sep > config.chunk_size {
            if total > config.chunk_size {
                tracing::warn!(
                    "Created a chunk of size {}, which is longer than the specified {}",
                    total,
                    config.chunk_size
                );
            }

            if !current.is_empty() {
                if let Some(chunk) = join_chunk(&current, separator) {
                    chunks.push(chunk);
                }

                // 오버랩 범위만 남기고 앞에서부터 제거
                loop {
                    let pending_sep = if current.is_empty() { 0 } else { sep_len };
                    let over_overlap = total > config.chunk_overlap;
                    let no_room = total > 0 && total + len + pending_sep > config.chunk_size;
                    if !(over_overlap || no_room) {
                        break;
                    }

                    let removed = current.remove(0);
                    let removed_sep = if current.is_empty() { 0 } else { sep_len };
                    total -= char_len(removed) + removed_sep;
                }
            }
        }

        let added_sep = if current.is_empty() { 0 } else { sep_len };
        total += len + added_sep;
        current.push(split);
    }

    if let Some(chunk) = join_chunk(&current, separator) {
        chunks.push(chunk);
    }

    chunks
}

fn join_chunk(parts: &[&str], separator: &str) -> Option<String> {
    let joined = parts.join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 일반 텍스트 청커 (300 / 50, 문단 구분자)
pub fn text_chunker() -> Box<dyn Chunker> {
    Box::new(CharacterChunker::paragraphs(ChunkConfig::for_text()))
}

/// 스프레드시트 청커 (500 / 50, 재귀 분할)
pub fn spreadsheet_chunker() -> Box<dyn Chunker> {
    Box::new(RecursiveChunker::new(ChunkConfig::for_spreadsheet()))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn config(chunk_size: usize, chunk_overlap: usize) -> ChunkConfig {
        ChunkConfig::new(chunk_size, chunk_overlap).unwrap()
    }

    #[test]
    fn test_config_presets() {
        assert_eq!(ChunkConfig::for_text(), config(300, 50));
        assert_eq!(ChunkConfig::for_spreadsheet(), config(500, 50));
    }

    #[test]
    fn test_config_validation() {
        assert!(ChunkConfig::new(0, 0).is_err());
        assert!(ChunkConfig::new(100, 100).is_err());
        assert!(ChunkConfig::new(100, 99).is_ok());
    }

    #[test]
    fn test_empty_text() {
        assert!(text_chunker().chunk("").is_empty());
        assert!(spreadsheet_chunker().chunk("   \n\n ").is_empty());
    }

    #[test]
    fn test_character_chunker_overlap() {
        let chunker = CharacterChunker::paragraphs(config(10, 4));
        let chunks = chunker.chunk("aaaa\n\nbbbb\n\ncccc\n\ndddd");

        assert_eq!(
            chunks,
            vec!["aaaa\n\nbbbb", "bbbb\n\ncccc", "cccc\n\ndddd"]
        );
    }

    #[test]
    fn test_character_chunker_no_overlap() {
        let chunker = CharacterChunker::paragraphs(config(10, 0));
        let chunks = chunker.chunk("aaaa\n\nbbbb\n\ncccc\n\ndddd");

        assert_eq!(chunks, vec!["aaaa\n\nbbbb", "cccc\n\ndddd"]);
    }

    #[test]
    fn test_character_chunker_keeps_oversized_split() {
        let chunker = CharacterChunker::paragraphs(config(3, 0));
        let chunks = chunker.chunk("一二三四五六");

        assert_eq!(chunks, vec!["一二三四五六"]);
    }

    #[test]
    fn test_small_text_single_chunk() {
        let chunks = text_chunker().chunk("Library hours: 8am-10pm daily.");
        assert_eq!(chunks, vec!["Library hours: 8am-10pm daily."]);
    }

    #[test]
    fn test_recursive_chunker_lines() {
        let chunker = RecursiveChunker::new(config(20, 0));
        let chunks = chunker.chunk("line one\nline two\nline three");

        assert_eq!(chunks, vec!["line one\nline two", "line three"]);
    }

    #[test]
    fn test_recursive_chunker_falls_back_to_chars() {
        let chunker = RecursiveChunker::new(config(10, 0));
        let chunks = chunker.chunk("abcdefghijklmnopqrstuvwxy");

        assert_eq!(chunks, vec!["abcdefghij", "klmnopqrst", "uvwxy"]);
    }

    #[test]
    fn test_recursive_chunker_counts_chars_not_bytes() {
        let chunker = RecursiveChunker::new(config(3, 0));
        let chunks = chunker.chunk("一二三四五六七");

        assert_eq!(chunks, vec!["一二三", "四五六", "七"]);
    }

    #[test]
    fn test_chunks_respect_size() {
        let text = (0..200)
            .map(|i| format!("row {} value {}", i, i * 7))
            .collect::<Vec<_>>()
            .join("\n");
        let cfg = ChunkConfig::for_spreadsheet();
        let chunks = RecursiveChunker::new(cfg).chunk(&text);

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= cfg.chunk_size));
    }
}
