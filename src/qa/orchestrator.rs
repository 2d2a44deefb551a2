//! QA Orchestrator - 질문 → 검색 → 답변 생성
//!
//! 요청 사이에 유지되는 상태는 인덱스 핸들뿐입니다.
//! 재빌드는 내부 뮤텍스로 직렬화되고, 새 세대가 게시된 뒤에만 핸들이 교체됩니다.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;

use super::prompt::PromptStrategy;
use super::synthesizer::AnswerSynthesizer;
use crate::config::QaConfig;
use crate::embedding::{EmbeddingProvider, GeminiEmbedding};
use crate::error::{RagError, Result};
use crate::gemini::get_api_key;
use crate::generation::{GeminiChat, GenerativeModel};
use crate::knowledge::{
    corpus_fingerprint, split_documents, BuildOptions, Chunk, ChunkConfig, Document, IndexHandle,
    IndexManifest, RecursiveChunker, Retriever, VectorIndex,
};

// ============================================================================
// Types
// ============================================================================

/// 질의응답 결과
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QaResponse {
    /// 생성된 답변 (빈 질문이면 빈 문자열)
    pub answer: String,
    /// 모델에 실제로 전달된 청크 (검색 순서)
    pub sources: Vec<Chunk>,
}

/// 인덱스 수집 결과
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub documents: usize,
    pub chunks: usize,
    /// fingerprint가 같아 재빌드를 건너뛰었는지 여부
    pub skipped: bool,
    /// 현재 게시된 세대
    pub manifest: IndexManifest,
}

// ============================================================================
// QaOrchestrator
// ============================================================================

/// 문서 기반 질의응답 오케스트레이터
pub struct QaOrchestrator {
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
    chunker: RecursiveChunker,
    build_options: BuildOptions,
    build_lock: Mutex<()>,
}

impl QaOrchestrator {
    pub fn new(
        index: IndexHandle,
        embedder: Arc<dyn EmbeddingProvider>,
        model: Arc<dyn GenerativeModel>,
    ) -> Self {
        Self {
            retriever: Retriever::new(index, embedder),
            synthesizer: AnswerSynthesizer::new(model),
            chunker: RecursiveChunker::with_defaults(),
            build_options: BuildOptions::default(),
            build_lock: Mutex::new(()),
        }
    }

    /// 설정 + Gemini 프로바이더로 생성 (게시된 인덱스를 바로 엶)
    ///
    /// API 키가 없으면 `RagError::Configuration`.
    pub async fn from_config(config: &QaConfig) -> Result<Self> {
        config.validate()?;

        let api_key = get_api_key().map_err(|e| RagError::config(format!("{:#}", e)))?;

        let embedder = GeminiEmbedding::with_model(
            api_key.clone(),
            &config.embedding.model,
            config.embedding.dimension,
        )
        .map_err(|e| RagError::config(format!("{:#}", e)))?;

        let chat = GeminiChat::new(
            api_key,
            &config.generation.model,
            config.generation.temperature,
        )
        .map_err(|e| RagError::config(format!("{:#}", e)))?
        .with_max_output_tokens(config.generation.max_output_tokens);

        let index = IndexHandle::open(config.index_dir()).await;

        Ok(Self::new(index, Arc::new(embedder), Arc::new(chat))
            .with_chunk_config(config.chunk)?
            .with_build_options(config.build_options())
            .with_top_k(config.top_k)
            .with_strategy(config.strategy))
    }

    /// 청킹 설정 (builder, 검증 포함)
    pub fn with_chunk_config(mut self, config: ChunkConfig) -> Result<Self> {
        self.chunker = RecursiveChunker::new(config)?;
        Ok(self)
    }

    pub fn with_build_options(mut self, options: BuildOptions) -> Self {
        self.build_options = options;
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.retriever = self.retriever.with_top_k(top_k);
        self
    }

    pub fn with_strategy(mut self, strategy: PromptStrategy) -> Self {
        self.synthesizer = self.synthesizer.with_strategy(strategy);
        self
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn synthesizer(&self) -> &AnswerSynthesizer {
        &self.synthesizer
    }

    pub fn index(&self) -> &IndexHandle {
        self.retriever.index()
    }

    pub fn chunk_config(&self) -> &ChunkConfig {
        self.chunker.config()
    }

    /// 질문에 대한 답변 + 근거 청크
    ///
    /// 빈 질문은 외부 호출 없이 `{answer: "", sources: []}`.
    pub async fn answer(&self, question: &str) -> Result<QaResponse> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(QaResponse::default());
        }

        let sources = self.retriever.retrieve(question).await?;
        let answer = self.synthesizer.synthesize(question, &sources).await?;

        tracing::info!("Answered question with {} source chunks", sources.len());

        Ok(QaResponse { answer, sources })
    }

    /// 제한 시간 내 답변
    ///
    /// 시간이 지나면 진행 중인 호출을 버리고 `RagError::Timeout`을 반환합니다.
    /// 읽기 경로만 타므로 영속 상태는 바뀌지 않습니다.
    pub async fn answer_with_timeout(&self, question: &str, limit: Duration) -> Result<QaResponse> {
        match tokio::time::timeout(limit, self.answer(question)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!("Answer timed out after {:?}", limit);
                Err(RagError::Timeout(limit))
            }
        }
    }

    /// 문서 → 청크 (현재 청킹 설정)
    pub fn chunk_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        split_documents(&self.chunker, documents)
    }

    /// 무조건 새 인덱스 빌드 후 게시
    pub async fn rebuild(&self, documents: &[Document]) -> Result<IngestReport> {
        self.ingest(documents, true).await
    }

    /// 인덱스 수집
    ///
    /// `force`가 아니고 현재 게시본의 fingerprint가 같으면 빌드를 건너뜁니다.
    /// 실패해도 기존 게시본과 핸들은 그대로입니다.
    pub async fn ingest(&self, documents: &[Document], force: bool) -> Result<IngestReport> {
        let _guard = self.build_lock.lock().await;

        let chunks = self.chunk_documents(documents);
        let embedder = self.retriever.embedder();

        if !force {
            let fingerprint = corpus_fingerprint(&chunks, embedder.name(), embedder.dimension());
            // 읽을 수 없는 게시본은 재빌드 대상
            if let Ok(Some(current)) = self.index().snapshot().await {
                if current.manifest().fingerprint == fingerprint {
                    tracing::info!(
                        "Corpus unchanged (generation {}), skipping rebuild",
                        current.manifest().generation
                    );
                    return Ok(IngestReport {
                        documents: documents.len(),
                        chunks: chunks.len(),
                        skipped: true,
                        manifest: current.manifest().clone(),
                    });
                }
            }
        }

        let index = VectorIndex::build(
            self.index().location(),
            &chunks,
            &**embedder,
            &self.build_options,
        )
        .await?;

        let manifest = index.manifest().clone();
        self.index().publish(index).await;

        tracing::info!(
            "Indexed {} documents into {} chunks (generation {})",
            documents.len(),
            chunks.len(),
            manifest.generation
        );

        Ok(IngestReport {
            documents: documents.len(),
            chunks: chunks.len(),
            skipped: false,
            manifest,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct ConstEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ConstEmbedder {
        async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
            Ok(vec![1.0, text.len() as f32 / 100.0])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "const"
        }
    }

    struct SlowModel {
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl GenerativeModel for SlowModel {
        async fn generate(&self, _prompt: &str) -> std::result::Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok("done".to_string())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn orchestrator(dir: &TempDir, delay: Duration) -> (QaOrchestrator, Arc<SlowModel>) {
        let model = Arc::new(SlowModel {
            calls: AtomicUsize::new(0),
            delay,
        });
        let qa = QaOrchestrator::new(
            IndexHandle::empty(dir.path()),
            Arc::new(ConstEmbedder),
            model.clone(),
        );
        (qa, model)
    }

    #[tokio::test]
    async fn test_blank_question_short_circuits() {
        let dir = TempDir::new().unwrap();
        let (qa, model) = orchestrator(&dir, Duration::ZERO);

        for q in ["", "   ", "\n\t"] {
            let response = qa.answer(q).await.unwrap();
            assert_eq!(response, QaResponse::default());
        }
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = TempDir::new().unwrap();
        let (qa, _) = orchestrator(&dir, Duration::from_secs(5));

        let err = qa
            .answer_with_timeout("slow question", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_ingest_skips_unchanged_corpus() {
        let dir = TempDir::new().unwrap();
        let (qa, _) = orchestrator(&dir, Duration::ZERO);
        let docs = vec![Document::new("Vacation requests need notice.", "a.txt")];

        let first = qa.ingest(&docs, false).await.unwrap();
        assert!(!first.skipped);

        let second = qa.ingest(&docs, false).await.unwrap();
        assert!(second.skipped);
        assert_eq!(second.manifest.generation, first.manifest.generation);

        let forced = qa.rebuild(&docs).await.unwrap();
        assert!(!forced.skipped);
    }

    #[tokio::test]
    async fn test_invalid_chunk_config() {
        let dir = TempDir::new().unwrap();
        let (qa, _) = orchestrator(&dir, Duration::ZERO);
        let err = qa.with_chunk_config(ChunkConfig::new(100, 100)).err();
        assert!(matches!(err, Some(RagError::Configuration(_))));
    }
}
