//! 생성 모듈 - Gemini generateContent 어댑터
//!
//! 프롬프트를 보내고 응답 텍스트를 돌려줍니다.
//! 응답 형태(후보/파트 구조, 차단 사유 등)는 이 어댑터 안에서 정규화되므로
//! 상위 계층은 항상 평문 텍스트만 받습니다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gemini::{get_api_key, GeminiApiError, GeminiClient};

/// 기본 생성 모델
pub const DEFAULT_MODEL: &str = "gemini-2.5-pro";

/// 기본 temperature (사실 기반 답변용으로 낮게)
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// 기본 최대 출력 토큰
pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;

/// 생성 모델 분당 요청 수
const RATE_LIMIT_RPM: u32 = 30;

// ============================================================================
// GenerativeModel Trait
// ============================================================================

/// 생성 호출 실패
#[derive(Debug, Error)]
#[error("{message}")]
pub struct GenerationError {
    pub message: String,
    /// 같은 요청을 다시 보내면 성공할 수 있는지 여부
    pub retryable: bool,
}

impl GenerationError {
    pub fn new(message: impl Into<String>, retryable: bool) -> Self {
        Self {
            message: message.into(),
            retryable,
        }
    }
}

impl From<GeminiApiError> for GenerationError {
    fn from(err: GeminiApiError) -> Self {
        let retryable = err.is_retryable();
        Self::new(err.to_string(), retryable)
    }
}

/// 생성 모델 트레이트 - 프롬프트 → 텍스트
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// 단일 블로킹 생성 호출
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Gemini Chat
// ============================================================================

/// Gemini generateContent 구현체
///
/// source: https://ai.google.dev/api/generate-content
#[derive(Debug, Clone)]
pub struct GeminiChat {
    client: GeminiClient,
    model: String,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiChat {
    /// 모델/temperature 지정하여 생성
    pub fn new(api_key: String, model: &str, temperature: f32) -> anyhow::Result<Self> {
        if !(0.0..=2.0).contains(&temperature) {
            anyhow::bail!("Invalid temperature: {}. Must be between 0.0 and 2.0", temperature);
        }

        Ok(Self {
            client: GeminiClient::new(api_key, RATE_LIMIT_RPM)?,
            model: model.strip_prefix("models/").unwrap_or(model).to_string(),
            temperature,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        })
    }

    /// 환경변수 API 키 + 기본 모델
    pub fn from_env() -> anyhow::Result<Self> {
        Self::new(get_api_key()?, DEFAULT_MODEL, DEFAULT_TEMPERATURE)
    }

    /// 최대 출력 토큰 지정 (builder)
    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    fn request(&self, prompt: &str) -> GenerateRequest {
        GenerateRequest {
            contents: vec![RequestContent {
                role: "user".to_string(),
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: self.temperature,
                max_output_tokens: self.max_output_tokens,
            },
        }
    }
}

#[async_trait]
impl GenerativeModel for GeminiChat {
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let url = GeminiClient::model_url(&self.model, "generateContent");
        let body = self.client.post_json(&url, &self.request(prompt)).await?;

        let response: GenerateResponse = serde_json::from_str(&body).map_err(|e| {
            GenerationError::from(GeminiApiError::Malformed(format!(
                "Failed to parse generateContent response: {}",
                e
            )))
        })?;

        response.into_text()
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<RequestContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent {
    role: String,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "promptFeedback")]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
    #[serde(rename = "finishReason")]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    /// thinking 모델의 사고 과정 파트
    #[serde(default)]
    thought: bool,
}

#[derive(Debug, Deserialize)]
struct PromptFeedback {
    #[serde(rename = "blockReason")]
    block_reason: Option<String>,
}

impl GenerateResponse {
    /// 첫 번째 후보의 텍스트 파트를 이어붙여 평문으로 정규화
    fn into_text(self) -> Result<String, GenerationError> {
        let block_reason = self.prompt_feedback.and_then(|f| f.block_reason);

        let candidate = match self.candidates.into_iter().next() {
            Some(c) => c,
            None => {
                let reason = block_reason.unwrap_or_else(|| "no candidates".to_string());
                return Err(GenerationError::new(
                    format!("Model returned no answer ({})", reason),
                    false,
                ));
            }
        };

        let text: String = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter(|p| !p.thought)
                    .filter_map(|p| p.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.trim().is_empty() {
            let reason = candidate
                .finish_reason
                .unwrap_or_else(|| "UNKNOWN".to_string());
            return Err(GenerationError::new(
                format!("Model returned empty text (finishReason: {})", reason),
                false,
            ));
        }

        Ok(text.trim().to_string())
    }
}

// ============================================================================
// Tests
// ============================================================================
