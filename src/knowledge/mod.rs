//! Knowledge 모듈 - 벡터 저장소와 청킹
//!
//! - LanceDB: 디스크 영속 벡터 검색 (파티션 = 테이블)
//! - Memory: 전수 코사인 검색 (테스트/소규모)
//! - Chunker: 고정 윈도우 + 오버랩 텍스트 분할

mod chunker;
mod lance;
mod memory;
mod vector;

// Re-exports
pub use chunker::{
    spreadsheet_chunker, text_chunker, CharacterChunker, ChunkConfig, Chunker, RecursiveChunker,
};
pub use lance::LanceVectorStore;
pub use memory::MemoryVectorStore;
pub use vector::{
    cosine_similarity, distance_to_similarity, SearchResult, VectorEntry, VectorStore,
};
