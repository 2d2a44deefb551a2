//! Knowledge 모듈 - 문서 청킹, 벡터 인덱스, 검색
//!
//! - Chunker: 경계 우선순위 기반 문자 단위 분할 (정확한 overlap)
//! - LanceDB: 세대별 벡터 테이블 (ANN, 코사인)
//! - SQLite: 세대별 청크 payload
//! - Index: 세대 디렉토리 + `CURRENT` 포인터로 원자적 게시
//! - Retriever: 질문 임베딩 → 상위 k개 청크

mod chunker;
mod document;
mod index;
mod lance;
mod payload;
mod retriever;
mod vector;

// Re-exports
pub use chunker::{
    default_chunker, split, split_documents, ChunkConfig, Chunker, RecursiveChunker,
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
};
pub use document::{Chunk, Document, Metadata, ScoredChunk, CHUNK_INDEX_KEY, SOURCE_FILE_KEY};
pub use index::{
    corpus_fingerprint, BuildOptions, IndexHandle, IndexManifest, VectorIndex,
    DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY,
};
pub use retriever::{Retriever, DEFAULT_TOP_K};
pub use vector::cosine_similarity;
