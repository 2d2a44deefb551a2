//! docqa-rag - 문서 기반 질의응답 RAG 시스템
//!
//! 사내 문서(텍스트, 마크다운, PDF, DOCX)를 청크로 나누고
//! LanceDB 벡터 인덱스로 검색한 뒤, 검색된 근거만으로 Gemini가 답변합니다.
//!
//! ```text
//! 문서 폴더 → loader → chunker → VectorIndex (세대 게시)
//! 질문 → Retriever (top-k) → AnswerSynthesizer → {answer, sources}
//! ```

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod gemini;
pub mod generation;
pub mod knowledge;
pub mod loader;
pub mod qa;

// Re-exports
pub use config::{get_data_dir, QaConfig};
pub use embedding::{EmbeddingProvider, GeminiEmbedding};
pub use error::{FailedBatch, RagError, Result};
pub use gemini::{get_api_key, has_api_key};
pub use generation::{GeminiChat, GenerationError, GenerativeModel};
pub use knowledge::{
    default_chunker, split, split_documents, BuildOptions, Chunk, ChunkConfig, Chunker, Document,
    IndexHandle, IndexManifest, Metadata, RecursiveChunker, Retriever, ScoredChunk, VectorIndex,
};
pub use loader::{load_documents, DocumentLoader, LoadReport};
pub use qa::{
    AnswerSynthesizer, IngestReport, PromptStrategy, QaOrchestrator, QaResponse,
    INSUFFICIENT_CONTEXT,
};
