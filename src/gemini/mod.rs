//! Gemini API 공통 클라이언트
//!
//! 임베딩(embedContent / batchEmbedContents)과 생성(generateContent)이
//! 함께 사용하는 HTTP 계층입니다.
//!
//! - API 키 로드 (환경변수)
//! - Rate Limiter (RPM + 최소 딜레이)
//! - 429 / 5xx 지수 백오프 재시도
//!
//! source: https://ai.google.dev/gemini-api/docs

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

/// Gemini API 베이스 URL
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// 요청 타임아웃
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
/// 재시도 가능한 에러의 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
const INITIAL_BACKOFF_MS: u64 = 2000;

// ============================================================================
// Errors
// ============================================================================

/// Gemini HTTP 호출 에러
#[derive(Debug, Error)]
pub enum GeminiApiError {
    /// 네트워크/전송 실패
    #[error("Request failed: {0}")]
    Transport(String),

    /// 재시도 후에도 429
    #[error("Rate limit exceeded (429) after {0} attempts")]
    RateLimited(u32),

    /// API 에러 응답
    #[error("Gemini API error ({status}): {message}")]
    Status { status: u16, message: String },

    /// 응답 파싱 실패 / 예상치 못한 형태
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl GeminiApiError {
    /// 호출자 수준에서 재시도할 가치가 있는지 여부
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RateLimited(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Malformed(_) => false,
        }
    }
}

/// Gemini API 에러 응답 본문
#[derive(Debug, Deserialize)]
struct GeminiErrorBody {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

// ============================================================================
// Rate Limiter
// ============================================================================

/// Rate Limiter with minimum delay between requests
#[derive(Debug)]
pub(crate) struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: u32,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    pub(crate) fn new(max_requests: u32, window: Duration, min_delay: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay,
            last_request: None,
        }
    }

    /// RPM 기준 생성 (최소 딜레이 = 60s / RPM)
    pub(crate) fn per_minute(rpm: u32) -> Self {
        let rpm = rpm.max(1);
        Self::new(
            rpm,
            Duration::from_secs(60),
            Duration::from_millis(60_000 / rpm as u64),
        )
    }

    /// 요청 가능 여부 확인 및 대기
    async fn acquire(&mut self) {
        // 1. 최소 딜레이 적용 (버스트 방지)
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.min_delay {
                let wait_time = self.min_delay - elapsed;
                tracing::debug!("Min delay: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }

        let now = Instant::now();

        // 2. 윈도우 밖의 오래된 요청 제거
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        // 3. Rate limit 초과 시 대기
        if self.requests.len() >= self.max_requests as usize {
            if let Some(&oldest) = self.requests.first() {
                let wait_time = self.window.saturating_sub(now.duration_since(oldest));
                if !wait_time.is_zero() {
                    tracing::debug!("Rate limit reached, waiting {:?}", wait_time);
                    tokio::time::sleep(wait_time).await;
                }
                let now = Instant::now();
                self.requests.retain(|&t| now.duration_since(t) < self.window);
            }
        }

        // 4. 현재 요청 기록
        let now = Instant::now();
        self.requests.push(now);
        self.last_request = Some(now);
    }
}

// ============================================================================
// GeminiClient
// ============================================================================

/// API 키 + HTTP 클라이언트 + Rate Limiter 묶음
#[derive(Debug, Clone)]
pub struct GeminiClient {
    api_key: String,
    client: reqwest::Client,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl GeminiClient {
    /// 새 클라이언트 생성
    ///
    /// # Arguments
    /// * `api_key` - Google AI API 키
    /// * `rpm` - 분당 최대 요청 수
    pub fn new(api_key: String, rpm: u32) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            api_key,
            client,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::per_minute(rpm))),
        })
    }

    /// 모델 엔드포인트 URL
    pub fn model_url(model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:{}", GEMINI_API_BASE, model, method)
    }

    /// JSON POST (재시도 포함) - 성공 시 응답 본문 반환
    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
    ) -> Result<String, GeminiApiError> {
        let mut last_error: Option<GeminiApiError> = None;

        for attempt in 0..=MAX_RETRIES {
            {
                let mut limiter = self.rate_limiter.lock().await;
                limiter.acquire().await;
            }

            let backoff = Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt));

            // API 키는 URL이 아닌 헤더로 전송
            let response = match self
                .client
                .post(url)
                .header("x-goog-api-key", &self.api_key)
                .json(body)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(GeminiApiError::Transport(e.to_string()));
                    if attempt < MAX_RETRIES {
                        tracing::warn!(
                            "Request failed, retrying in {:?} (attempt {}/{})",
                            backoff,
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }
                    break;
                }
            };

            let status = response.status();
            let text = response
                .text()
                .await
                .map_err(|e| GeminiApiError::Transport(e.to_string()))?;

            if status.is_success() {
                return Ok(text);
            }

            let code = status.as_u16();
            if code == 429 || status.is_server_error() {
                tracing::warn!(
                    "Gemini returned {}, backing off {:?} (attempt {}/{})",
                    code,
                    backoff,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(if code == 429 {
                    GeminiApiError::RateLimited(attempt + 1)
                } else {
                    parse_error_body(code, &text)
                });

                if attempt < MAX_RETRIES {
                    tokio::time::sleep(backoff).await;
                    continue;
                }
                break;
            }

            // 그 외 4xx - 즉시 실패
            return Err(parse_error_body(code, &text));
        }

        Err(last_error.unwrap_or(GeminiApiError::Transport(format!(
            "Request failed after {} retries",
            MAX_RETRIES
        ))))
    }
}

/// 에러 응답 본문 → GeminiApiError
fn parse_error_body(status: u16, body: &str) -> GeminiApiError {
    let message = match serde_json::from_str::<GeminiErrorBody>(body) {
        Ok(parsed) if !parsed.error.status.is_empty() => {
            format!("{}: {}", parsed.error.status, parsed.error.message)
        }
        Ok(parsed) => parsed.error.message,
        Err(_) => body.to_string(),
    };
    GeminiApiError::Status { status, message }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드 (환경변수에서)
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> anyhow::Result<String> {
    for var in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Tests
// ============================================================================
