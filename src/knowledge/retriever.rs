//! Retriever - 질문 임베딩 후 상위 k개 청크 검색
//!
//! 인덱스가 아직 없거나 비어 있으면 임베딩 호출 없이 빈 결과를 돌려줍니다.

use std::sync::Arc;

use super::document::{Chunk, ScoredChunk};
use super::index::IndexHandle;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// 기본 검색 개수
pub const DEFAULT_TOP_K: usize = 4;

/// 질문 → 관련 청크 검색기
#[derive(Clone)]
pub struct Retriever {
    index: IndexHandle,
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
}

impl Retriever {
    pub fn new(index: IndexHandle, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            index,
            embedder,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// 검색 개수 지정 (builder)
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn index(&self) -> &IndexHandle {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// 관련 청크 (유사도 내림차순)
    pub async fn retrieve(&self, question: &str) -> Result<Vec<Chunk>> {
        Ok(self
            .retrieve_scored(question, self.top_k)
            .await?
            .into_iter()
            .map(|s| s.chunk)
            .collect())
    }

    /// 유사도 점수 포함 검색
    pub async fn retrieve_scored(&self, question: &str, limit: usize) -> Result<Vec<ScoredChunk>> {
        let index = match self.index.snapshot().await? {
            Some(index) if !index.is_empty() => index,
            _ => {
                tracing::debug!("No published index, nothing to retrieve");
                return Ok(Vec::new());
            }
        };

        let query = self
            .embedder
            .embed_query(question)
            .await
            .map_err(|e| RagError::retrieval(format!("failed to embed question: {:#}", e)))?;

        let results = index.search(&query, limit).await?;

        tracing::debug!(
            "Retrieved {} chunks (best score {:.3})",
            results.len(),
            results.first().map(|r| r.score).unwrap_or(0.0)
        );

        Ok(results)
    }
}
