//! QA 모듈 - 프롬프트 구성, 답변 생성, 전체 질의응답 흐름

mod orchestrator;
mod prompt;
mod synthesizer;

pub use orchestrator::{IngestReport, QaOrchestrator, QaResponse};
pub use prompt::{
    classify, context_block, grounded_prompt, is_urgent, role_preamble, PromptStrategy,
    QueryCategory, INSUFFICIENT_CONTEXT,
};
pub use synthesizer::AnswerSynthesizer;
