//! Answer Synthesizer - 검색된 청크를 근거로 답변 생성
//!
//! 생성 호출은 한 번만 하며 이 계층에서는 재시도하지 않습니다.

use std::sync::Arc;

use super::prompt::{grounded_prompt, PromptStrategy};
use crate::error::{RagError, Result};
use crate::generation::GenerativeModel;
use crate::knowledge::Chunk;

/// 답변 생성기
#[derive(Clone)]
pub struct AnswerSynthesizer {
    model: Arc<dyn GenerativeModel>,
    strategy: PromptStrategy,
}

impl AnswerSynthesizer {
    pub fn new(model: Arc<dyn GenerativeModel>) -> Self {
        Self {
            model,
            strategy: PromptStrategy::default(),
        }
    }

    /// 프롬프트 전략 지정 (builder)
    pub fn with_strategy(mut self, strategy: PromptStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> PromptStrategy {
        self.strategy
    }

    pub fn build_prompt(&self, question: &str, context: &[Chunk]) -> String {
        grounded_prompt(question, context, self.strategy)
    }

    /// 질문 + 문맥 → 답변 텍스트
    ///
    /// 문맥이 비어 있어도 같은 프롬프트로 호출합니다.
    pub async fn synthesize(&self, question: &str, context: &[Chunk]) -> Result<String> {
        let prompt = self.build_prompt(question, context);

        tracing::debug!(
            "Generating answer with {} ({} context chunks, {} chars)",
            self.model.name(),
            context.len(),
            prompt.chars().count()
        );

        self.model
            .generate(&prompt)
            .await
            .map_err(|e| RagError::Synthesis {
                message: e.message,
                retryable: e.retryable,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationError;
    use crate::knowledge::Metadata;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 받은 프롬프트를 기록하는 모델
    struct RecordingModel {
        prompts: Mutex<Vec<String>>,
        fail: Option<bool>,
    }

    #[async_trait]
    impl GenerativeModel for RecordingModel {
        async fn generate(&self, prompt: &str) -> std::result::Result<String, GenerationError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            match self.fail {
                Some(retryable) => Err(GenerationError::new("upstream down", retryable)),
                None => Ok("14 days".to_string()),
            }
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn model(fail: Option<bool>) -> Arc<RecordingModel> {
        Arc::new(RecordingModel {
            prompts: Mutex::new(Vec::new()),
            fail,
        })
    }

    fn chunk(content: &str) -> Chunk {
        Chunk {
            id: "0-0".to_string(),
            content: content.to_string(),
            metadata: Metadata::new(),
        }
    }

    #[tokio::test]
    async fn test_synthesize_sends_grounded_prompt() {
        let recording = model(None);
        let synthesizer = AnswerSynthesizer::new(recording.clone());

        let answer = synthesizer
            .synthesize("How much notice?", &[chunk("Submit 14 days ahead.")])
            .await
            .unwrap();
        assert_eq!(answer, "14 days");

        let prompts = recording.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Submit 14 days ahead."));
        assert!(prompts[0].contains("Question: How much notice?"));
    }

    #[tokio::test]
    async fn test_empty_context_still_calls_model() {
        let recording = model(None);
        let synthesizer = AnswerSynthesizer::new(recording.clone());

        synthesizer.synthesize("Anything?", &[]).await.unwrap();
        assert_eq!(recording.prompts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_maps_to_synthesis_error_without_retry() {
        let recording = model(Some(true));
        let synthesizer = AnswerSynthesizer::new(recording.clone())
            .with_strategy(PromptStrategy::Categorized);

        let err = synthesizer.synthesize("q", &[]).await.unwrap_err();
        assert!(matches!(err, RagError::Synthesis { retryable: true, .. }));
        assert_eq!(recording.prompts.lock().unwrap().len(), 1);
    }
}
