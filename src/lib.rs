//! campus-assistant - 캠퍼스 안내 질의응답 어시스턴트
//!
//! OpenAI 호환 임베딩/채팅 API와 LanceDB 벡터 검색을 결합한
//! 검색 증강(RAG) 질의응답 시스템입니다.

pub mod assistant;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod remote;
pub mod server;

// Re-exports
pub use assistant::{build_context, ChatAssistant, PromptTemplate, DEFAULT_TEMPLATE};
pub use config::{get_data_dir, ChatConfig, Config, EndpointConfig, StoreConfig};
pub use embedding::{EmbeddingProvider, OpenAiEmbedding};
pub use error::AssistantError;
pub use ingest::{IngestPipeline, IngestReport, SourceKind};
pub use knowledge::{
    spreadsheet_chunker, text_chunker, CharacterChunker, ChunkConfig, Chunker, LanceVectorStore,
    MemoryVectorStore, RecursiveChunker, SearchResult, VectorEntry, VectorStore,
};
pub use llm::{ChatModel, OpenAiChat};
pub use remote::RetryPolicy;
