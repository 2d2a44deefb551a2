//! 설정 - 청킹, 검색, 임베딩, 생성 파라미터
//!
//! 기본값 → `DOCQA_*` 환경변수 → CLI 플래그 순으로 덮어씁니다.
//!
//! | 환경변수 | 필드 |
//! |---|---|
//! | `DOCQA_DATA_DIR` | `data_dir` |
//! | `DOCQA_CHUNK_SIZE` / `DOCQA_CHUNK_OVERLAP` | `chunk` |
//! | `DOCQA_TOP_K` | `top_k` |
//! | `DOCQA_PROMPT_STRATEGY` | `strategy` |
//! | `DOCQA_EMBEDDING_MODEL` / `DOCQA_EMBEDDING_DIMENSION` | `embedding` |
//! | `DOCQA_EMBED_BATCH_SIZE` / `DOCQA_EMBED_CONCURRENCY` | `embedding` |
//! | `DOCQA_GENERATION_MODEL` / `DOCQA_TEMPERATURE` | `generation` |

use std::path::PathBuf;
use std::str::FromStr;

use crate::embedding;
use crate::error::{RagError, Result};
use crate::generation;
use crate::knowledge::{BuildOptions, ChunkConfig, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY, DEFAULT_TOP_K};
use crate::qa::PromptStrategy;

/// 데이터 디렉토리 (`~/.local/share/.docqa-rag` 등)
pub fn get_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".docqa-rag")
}

/// 임베딩 설정
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingSettings {
    pub model: String,
    pub dimension: usize,
    pub batch_size: usize,
    pub concurrency: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            model: embedding::DEFAULT_MODEL.to_string(),
            dimension: embedding::DEFAULT_DIMENSION,
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// 생성 설정
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: generation::DEFAULT_MODEL.to_string(),
            temperature: generation::DEFAULT_TEMPERATURE,
            max_output_tokens: generation::DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

/// QA 파이프라인 전체 설정
#[derive(Debug, Clone, PartialEq)]
pub struct QaConfig {
    pub data_dir: PathBuf,
    pub chunk: ChunkConfig,
    pub top_k: usize,
    pub strategy: PromptStrategy,
    pub embedding: EmbeddingSettings,
    pub generation: GenerationSettings,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            chunk: ChunkConfig::default(),
            top_k: DEFAULT_TOP_K,
            strategy: PromptStrategy::default(),
            embedding: EmbeddingSettings::default(),
            generation: GenerationSettings::default(),
        }
    }
}

impl QaConfig {
    /// 기본값 + 프로세스 환경변수
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 기본값 + 주어진 조회 함수 (테스트용으로 분리)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("DOCQA_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(v) = get("DOCQA_CHUNK_SIZE") {
            config.chunk.chunk_size = parse_var("DOCQA_CHUNK_SIZE", &v)?;
        }
        if let Some(v) = get("DOCQA_CHUNK_OVERLAP") {
            config.chunk.overlap = parse_var("DOCQA_CHUNK_OVERLAP", &v)?;
        }
        if let Some(v) = get("DOCQA_TOP_K") {
            config.top_k = parse_var("DOCQA_TOP_K", &v)?;
        }
        if let Some(v) = get("DOCQA_PROMPT_STRATEGY") {
            config.strategy = v.parse()?;
        }
        if let Some(v) = get("DOCQA_EMBEDDING_MODEL") {
            config.embedding.model = v;
        }
        if let Some(v) = get("DOCQA_EMBEDDING_DIMENSION") {
            config.embedding.dimension = parse_var("DOCQA_EMBEDDING_DIMENSION", &v)?;
        }
        if let Some(v) = get("DOCQA_EMBED_BATCH_SIZE") {
            config.embedding.batch_size = parse_var("DOCQA_EMBED_BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("DOCQA_EMBED_CONCURRENCY") {
            config.embedding.concurrency = parse_var("DOCQA_EMBED_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("DOCQA_GENERATION_MODEL") {
            config.generation.model = v;
        }
        if let Some(v) = get("DOCQA_TEMPERATURE") {
            config.generation.temperature = parse_var("DOCQA_TEMPERATURE", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// 설정값 검증
    pub fn validate(&self) -> Result<()> {
        self.chunk.validate()?;
        self.build_options().validate()?;

        if self.top_k == 0 {
            return Err(RagError::config("top_k must be greater than 0"));
        }
        if self.embedding.dimension == 0 {
            return Err(RagError::config("embedding dimension must be greater than 0"));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(RagError::config(format!(
                "temperature {} is outside 0.0..=2.0",
                self.generation.temperature
            )));
        }
        Ok(())
    }

    /// 인덱스 위치
    pub fn index_dir(&self) -> PathBuf {
        self.data_dir.join("index")
    }

    /// 기본 문서 디렉토리
    pub fn documents_dir(&self) -> PathBuf {
        self.data_dir.join("documents")
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions {
            batch_size: self.embedding.batch_size,
            concurrency: self.embedding.concurrency,
        }
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| RagError::config(format!("{} has invalid value '{}'", key, value)))
}
