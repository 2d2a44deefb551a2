//! 임베딩 모듈 - Gemini API를 통한 텍스트 벡터화
//!
//! 문서 청크와 질문을 같은 벡터 공간으로 변환합니다.
//! 문서는 `RETRIEVAL_DOCUMENT`, 질문은 `RETRIEVAL_QUERY` 태스크 타입으로 임베딩합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = GeminiEmbedding::from_env()?;
//! let vectors = embedder.embed_batch(&chunks).await?;
//! let query = embedder.embed_query("How much notice for vacation?").await?;
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::gemini::{get_api_key, GeminiClient};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
/// 빌드 시점과 질의 시점에 같은 차원을 반환해야 합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 문서 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 질문 임베딩 (기본 구현: `embed`와 동일)
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(text).await
    }

    /// 배치 임베딩 (기본 구현: 순차 호출)
    ///
    /// 반환 순서는 입력 순서와 같아야 합니다.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더(모델) 이름 - 인덱스 manifest에 기록됨
    fn name(&self) -> &str;
}

// ============================================================================
// Google Gemini Embedding
// ============================================================================

/// 기본 임베딩 모델 (MRL 지원)
/// source: https://ai.google.dev/gemini-api/docs/embeddings
pub const DEFAULT_MODEL: &str = "gemini-embedding-001";

/// 기본 임베딩 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// Gemini 무료 티어 기준 분당 요청 수
const RATE_LIMIT_RPM: u32 = 60;

/// batchEmbedContents 한 번에 보낼 수 있는 최대 요청 수
const MAX_BATCH_REQUESTS: usize = 100;

/// MRL 모델이 허용하는 출력 차원
const MRL_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// 임베딩 태스크 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskType {
    Document,
    Query,
}

impl TaskType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Document => "RETRIEVAL_DOCUMENT",
            Self::Query => "RETRIEVAL_QUERY",
        }
    }
}

/// Google Gemini 임베딩 구현체
///
/// source: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug, Clone)]
pub struct GeminiEmbedding {
    client: GeminiClient,
    model: String,
    dimension: usize,
}

impl GeminiEmbedding {
    /// 기본 모델/차원으로 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_model(api_key, DEFAULT_MODEL, DEFAULT_DIMENSION)
    }

    /// 모델과 차원을 지정하여 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `model` - 임베딩 모델 이름 (`models/` 접두사 생략 가능)
    /// * `dimension` - 출력 차원 (gemini-embedding 계열은 768, 1536, 3072 중 선택)
    pub fn with_model(api_key: String, model: &str, dimension: usize) -> Result<Self> {
        validate_dimension(model, dimension)?;

        let model = model.strip_prefix("models/").unwrap_or(model).to_string();
        let client = GeminiClient::new(api_key, RATE_LIMIT_RPM)?;

        Ok(Self {
            client,
            model,
            dimension,
        })
    }

    /// 환경변수에서 API 키를 읽어 생성
    ///
    /// 우선순위: GEMINI_API_KEY > GOOGLE_AI_API_KEY
    pub fn from_env() -> Result<Self> {
        Self::new(get_api_key()?)
    }

    /// 환경변수 API 키 + 모델/차원 지정
    pub fn from_env_with_model(model: &str, dimension: usize) -> Result<Self> {
        Self::with_model(get_api_key()?, model, dimension)
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, text: &str, task_type: TaskType) -> EmbedRequest {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: EmbedContent {
                parts: vec![EmbedPart {
                    text: text.to_string(),
                }],
            },
            task_type: task_type.as_str().to_string(),
            output_dimensionality: Some(self.dimension),
        }
    }

    /// 단일 텍스트 임베딩 (embedContent)
    async fn embed_one(&self, text: &str, task_type: TaskType) -> Result<Vec<f32>> {
        // 빈 텍스트는 API가 거부하므로 영벡터
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let url = GeminiClient::model_url(&self.model, "embedContent");
        let body = self
            .client
            .post_json(&url, &self.request(text, task_type))
            .await
            .context("Embedding request failed")?;

        let response: EmbedResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;

        self.check_dimension(response.embedding.values)
    }

    /// 배치 임베딩 (batchEmbedContents)
    async fn embed_many(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Vec<f32>> = vec![Vec::new(); texts.len()];

        // 빈 텍스트는 요청에서 제외하고 영벡터로 채움
        let pending: Vec<usize> = texts
            .iter()
            .enumerate()
            .filter_map(|(i, t)| {
                if t.trim().is_empty() {
                    None
                } else {
                    Some(i)
                }
            })
            .collect();

        for (i, text) in texts.iter().enumerate() {
            if text.trim().is_empty() {
                results[i] = vec![0.0; self.dimension];
            }
        }

        let url = GeminiClient::model_url(&self.model, "batchEmbedContents");

        for group in pending.chunks(MAX_BATCH_REQUESTS) {
            let request = BatchEmbedRequest {
                requests: group
                    .iter()
                    .map(|&i| self.request(&texts[i], TaskType::Document))
                    .collect(),
            };

            tracing::debug!("Embedding {} texts with {}", group.len(), self.model);

            let body = self
                .client
                .post_json(&url, &request)
                .await
                .context("Batch embedding request failed")?;

            let response: BatchEmbedResponse =
                serde_json::from_str(&body).context("Failed to parse batch embedding response")?;

            if response.embeddings.len() != group.len() {
                anyhow::bail!(
                    "Batch embedding returned {} vectors for {} texts",
                    response.embeddings.len(),
                    group.len()
                );
            }

            for (&i, values) in group.iter().zip(response.embeddings) {
                results[i] = self.check_dimension(values.values)?;
            }
        }

        Ok(results)
    }

    fn check_dimension(&self, values: Vec<f32>) -> Result<Vec<f32>> {
        if values.len() != self.dimension {
            anyhow::bail!(
                "Embedding model {} returned dimension {}, expected {}",
                self.model,
                values.len(),
                self.dimension
            );
        }
        Ok(values)
    }
}

/// 모델별 차원 검증
fn validate_dimension(model: &str, dimension: usize) -> Result<()> {
    if dimension == 0 {
        anyhow::bail!("Invalid dimension: 0");
    }

    if model.contains("gemini-embedding") && !MRL_DIMENSIONS.contains(&dimension) {
        anyhow::bail!(
            "Invalid dimension: {}. Must be 768, 1536, or 3072",
            dimension
        );
    }

    Ok(())
}

/// Gemini API 요청 본문
/// source: https://ai.google.dev/gemini-api/docs/embeddings
#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: EmbedContent,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality", skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Debug, Serialize)]
struct EmbedContent {
    parts: Vec<EmbedPart>,
}

#[derive(Debug, Serialize)]
struct EmbedPart {
    text: String,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

/// Gemini API 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text, TaskType::Document).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_one(text, TaskType::Query).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embed_many(texts).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dimension() {
        let result = GeminiEmbedding::with_model("fake_key".to_string(), DEFAULT_MODEL, 999);
        let err = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(err.contains("Invalid dimension"));

        assert!(GeminiEmbedding::with_model("fake_key".to_string(), "text-embedding-004", 0).is_err());
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in [768, 1536, 3072] {
            assert!(GeminiEmbedding::with_model("fake_key".to_string(), DEFAULT_MODEL, dim).is_ok());
        }
        // 비 MRL 모델은 차원 제한 없음
        assert!(GeminiEmbedding::with_model("fake_key".to_string(), "text-embedding-004", 256).is_ok());
    }

    #[test]
    fn test_model_prefix_stripped() {
        let embedder =
            GeminiEmbedding::with_model("fake_key".to_string(), "models/gemini-embedding-001", 768)
                .unwrap();
        assert_eq!(embedder.model(), "gemini-embedding-001");
        assert_eq!(embedder.name(), "gemini-embedding-001");
    }

    #[test]
    fn test_request_shape() {
        let embedder = GeminiEmbedding::new("fake_key".to_string()).unwrap();
        let request = BatchEmbedRequest {
            requests: vec![embedder.request("hello", TaskType::Query)],
        };
        let json = serde_json::to_value(&request).unwrap();

        assert_eq!(json["requests"][0]["model"], "models/gemini-embedding-001");
        assert_eq!(json["requests"][0]["taskType"], "RETRIEVAL_QUERY");
        assert_eq!(json["requests"][0]["outputDimensionality"], 768);
        assert_eq!(json["requests"][0]["content"]["parts"][0]["text"], "hello");
    }

    #[test]
    fn test_batch_response_parse() {
        let body = r#"{"embeddings":[{"values":[0.1,0.2]},{"values":[0.3,0.4]}]}"#;
        let response: BatchEmbedResponse = serde_json::from_str(body).unwrap();
        assert_eq!(response.embeddings.len(), 2);
        assert_eq!(response.embeddings[1].values, vec![0.3, 0.4]);
    }

    #[tokio::test]
    async fn test_blank_texts_skip_api() {
        let embedder = GeminiEmbedding::new("fake_key".to_string()).unwrap();
        let vectors = embedder
            .embed_batch(&["   ".to_string(), String::new()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert!(vectors.iter().all(|v| v.len() == 768 && v.iter().all(|x| *x == 0.0)));
    }
}
