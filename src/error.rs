//! 에러 타입 - RAG 파이프라인 에러 분류
//!
//! 라이브러리 경계에서는 타입이 있는 [`RagError`]를 반환하고,
//! CLI 계층에서만 `anyhow`로 감쌉니다.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// 임베딩에 실패한 배치 정보 (재시도용)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailedBatch {
    /// 배치 번호 (0-based)
    pub index: usize,
    /// 청크 범위 시작 (포함)
    pub start: usize,
    /// 청크 범위 끝 (미포함)
    pub end: usize,
}

impl fmt::Display for FailedBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch #{} (chunks {}..{})", self.index, self.start, self.end)
    }
}

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 잘못된 설정 (청킹 파라미터, 임베딩 차원 불일치 등). 재시도 불가.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 문서 로드/파싱 실패. 해당 문서만 건너뛰고 경고로 보고됩니다.
    #[error("Ingestion error ({}): {message}", .path.display())]
    Ingestion { path: PathBuf, message: String },

    /// 인덱스 빌드 실패. 기존에 게시된 인덱스는 그대로 유지됩니다.
    #[error("Index build error: {message}")]
    IndexBuild {
        message: String,
        batch: Option<FailedBatch>,
    },

    /// 검색 실패 또는 인덱스 손상 ("문서 없음"과는 구분됨)
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// 생성 모델 호출 실패
    #[error("Synthesis error: {message}")]
    Synthesis { message: String, retryable: bool },

    /// 호출자가 지정한 제한 시간 초과
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
}

impl RagError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn ingestion(path: impl Into<PathBuf>, message: impl fmt::Display) -> Self {
        Self::Ingestion {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub fn index_build(message: impl Into<String>) -> Self {
        Self::IndexBuild {
            message: message.into(),
            batch: None,
        }
    }

    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::Retrieval(message.into())
    }

    /// 사용자에게 보여줄 에러 분류
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "Configuration problem",
            Self::Ingestion { .. } => "Document could not be loaded",
            Self::IndexBuild { .. } => "Knowledge base build failed",
            Self::Retrieval(_) => "Knowledge base unavailable",
            Self::Synthesis { .. } => "Answer generation failed",
            Self::Timeout(_) => "Request timed out",
        }
    }

    /// 호출자 수준에서 재시도할 가치가 있는지 여부
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Synthesis { retryable, .. } => *retryable,
            Self::IndexBuild { batch, .. } => batch.is_some(),
            Self::Timeout(_) => true,
            _ => false,
        }
    }
}

/// 라이브러리 공용 Result
pub type Result<T> = std::result::Result<T, RagError>;
