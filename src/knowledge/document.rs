//! 문서 / 청크 데이터 모델
//!
//! - Document: 로더가 만든 원본 텍스트 + 메타데이터 (불변)
//! - Chunk: 문서 텍스트의 연속 구간, 임베딩/검색 단위

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 문자열 메타데이터 맵 (정렬된 직렬화를 위해 BTreeMap 사용)
pub type Metadata = BTreeMap<String, String>;

/// 원본 파일명 메타데이터 키
pub const SOURCE_FILE_KEY: &str = "source_file";

/// 청크 순번 메타데이터 키
pub const CHUNK_INDEX_KEY: &str = "chunk_index";

// ============================================================================
// Document
// ============================================================================

/// 로더가 생성한 문서
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// 정규화된 텍스트
    pub content: String,
    /// 메타데이터 (최소 `source_file` 포함)
    pub metadata: Metadata,
}

impl Document {
    /// 원본 파일명과 함께 생성
    pub fn new(content: impl Into<String>, source_file: impl Into<String>) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert(SOURCE_FILE_KEY.to_string(), source_file.into());
        Self {
            content: content.into(),
            metadata,
        }
    }

    /// 메타데이터 추가 (builder)
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn source_file(&self) -> Option<&str> {
        self.metadata.get(SOURCE_FILE_KEY).map(String::as_str)
    }
}

// ============================================================================
// Chunk
// ============================================================================

/// 청크 - 임베딩 및 검색의 단위
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// 빌드 내에서 유일한 ID (`{문서 순번}-{청크 순번}`)
    pub id: String,
    /// 원본 문서 텍스트의 부분 문자열
    pub content: String,
    /// 부모 문서 메타데이터 + `chunk_index`
    pub metadata: Metadata,
}

impl Chunk {
    pub fn chunk_index(&self) -> Option<usize> {
        self.metadata.get(CHUNK_INDEX_KEY).and_then(|v| v.parse().ok())
    }

    pub fn source_file(&self) -> Option<&str> {
        self.metadata.get(SOURCE_FILE_KEY).map(String::as_str)
    }
}

/// 유사도 스코어가 붙은 검색 결과
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// 코사인 유사도 (-1.0 ~ 1.0, 높을수록 관련성 높음)
    pub score: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_source_file() {
        let doc = Document::new("hello", "handbook.pdf").with_metadata("page", "3");
        assert_eq!(doc.source_file(), Some("handbook.pdf"));
        assert_eq!(doc.metadata.get("page").map(String::as_str), Some("3"));
    }

    #[test]
    fn test_chunk_index_parse() {
        let mut metadata = Metadata::new();
        metadata.insert(CHUNK_INDEX_KEY.to_string(), "7".to_string());
        let chunk = Chunk {
            id: "0-7".to_string(),
            content: "text".to_string(),
            metadata,
        };
        assert_eq!(chunk.chunk_index(), Some(7));
        assert_eq!(chunk.source_file(), None);
    }
}
