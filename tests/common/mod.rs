//! 통합 테스트용 가짜 프로바이더

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use docqa_rag::{Document, EmbeddingProvider, GenerationError, GenerativeModel};

/// 임베딩 어휘 (등장 횟수 차원)
pub const VOCABULARY: [&str; 6] = ["vacation", "request", "sick", "benefit", "dental", "conduct"];

/// 어휘 등장 횟수 + 상수 bias 차원 (결정적)
#[derive(Default)]
pub struct VocabularyEmbedder {
    pub batches: AtomicUsize,
    pub queries: AtomicUsize,
}

impl VocabularyEmbedder {
    pub fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = VOCABULARY
            .iter()
            .map(|word| lower.matches(word).count() as f32)
            .collect();
        v.push(0.1);
        v
    }
}

#[async_trait]
impl EmbeddingProvider for VocabularyEmbedder {
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(Self::vector(text))
    }

    async fn embed_query(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vector(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }

    fn dimension(&self) -> usize {
        VOCABULARY.len() + 1
    }

    fn name(&self) -> &str {
        "vocabulary-test"
    }
}

/// 같은 차원이지만 배치 임베딩이 항상 실패하는 embedder
pub struct FailingEmbedder;

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        anyhow::bail!("embedding service unavailable")
    }

    fn dimension(&self) -> usize {
        VOCABULARY.len() + 1
    }

    fn name(&self) -> &str {
        "vocabulary-test"
    }
}

/// 호출 수와 마지막 프롬프트를 기록하는 생성 모델
pub struct FakeModel {
    pub answer: String,
    pub calls: AtomicUsize,
    pub last_prompt: Mutex<Option<String>>,
}

impl FakeModel {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeModel for FakeModel {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        Ok(self.answer.clone())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// 응답이 오지 않는 생성 모델
pub struct HangingModel;

#[async_trait]
impl GenerativeModel for HangingModel {
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        std::future::pending::<()>().await;
        Err(GenerationError::new("unreachable", false))
    }

    fn name(&self) -> &str {
        "hanging"
    }
}

/// 휴가/병가/복지 규정 문서
pub fn handbook() -> Vec<Document> {
    vec![
        Document::new(
            "Vacation requests must be submitted 14 days in advance.\n\n\
             Sick leave requires a doctor note after 3 days.\n\n\
             Dental benefit enrollment opens every May.",
            "leave-policy.txt",
        ),
        Document::new(
            "The code of conduct applies to all employees and contractors.",
            "conduct.md",
        ),
    ]
}
