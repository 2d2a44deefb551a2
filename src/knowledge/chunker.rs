//! Text Chunking Module
//!
//! 자연스러운 경계(문단 → 줄 → 문장 → 공백)를 우선하는 고정 크기 청커입니다.
//! 크기와 오버랩은 바이트가 아닌 문자(char) 단위입니다.
//!
//! 청크는 원본 텍스트의 `[start, end)` 구간이며, 다음 청크는 항상
//! `end - overlap`에서 시작하므로 연속된 두 청크의 오버랩은 정확히 `overlap` 문자입니다.

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

use super::document::{Chunk, Document, CHUNK_INDEX_KEY};

/// 기본 청크 크기 (문자 수)
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// 기본 오버랩 크기 (문자 수)
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

/// 경계 우선순위 (앞쪽일수록 우선). 모두 실패하면 문자 단위로 자릅니다.
const BOUNDARY_LEVELS: &[&[&str]] = &[
    &["\n\n"],
    &["\n"],
    &[".", "!", "?"],
    &[" ", "\t"],
];

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 연속 청크 간 오버랩 (문자 수, chunk_size 미만)
    pub overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }

    /// 긴 문맥 위주의 설정
    pub fn for_rag() -> Self {
        Self::new(1500, 300)
    }

    /// 빠른 인덱싱용 설정 (오버랩 없음)
    pub fn for_fast() -> Self {
        Self::new(1000, 0)
    }

    /// 파라미터 검증 (`overlap < chunk_size`)
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::config("chunk_size must be greater than zero"));
        }
        if self.overlap >= self.chunk_size {
            return Err(RagError::config(format!(
                "overlap ({}) must be less than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn chunk(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 경계 우선순위 기반 청커
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    config: ChunkConfig,
}

impl RecursiveChunker {
    /// 설정 검증 후 생성
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 기본 설정 (1000 / 200)
    pub fn with_defaults() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// `(start + overlap, start + chunk_size]` 범위에서 가장 우선순위가 높은 경계 중
    /// 가장 뒤쪽 위치를 찾습니다. 위치는 문자 인덱스입니다.
    fn find_boundary(&self, text: &str, offsets: &[usize], start: usize) -> Option<usize> {
        let lo = start + self.config.overlap + 1;
        let hi = start + self.config.chunk_size;

        for level in BOUNDARY_LEVELS {
            for end in (lo..=hi).rev() {
                let hit = level.iter().any(|sep| {
                    let n = sep.chars().count();
                    end >= start + n && &text[offsets[end - n]..offsets[end]] == *sep
                });
                if hit {
                    return Some(end);
                }
            }
        }

        None
    }
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }

        // 문자 인덱스 -> 바이트 오프셋 (마지막은 text.len())
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = offsets.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;

        loop {
            if total - start <= self.config.chunk_size {
                chunks.push(text[offsets[start]..].to_string());
                break;
            }

            let end = self
                .find_boundary(text, &offsets, start)
                .unwrap_or(start + self.config.chunk_size);

            chunks.push(text[offsets[start]..offsets[end]].to_string());

            // end > start + overlap 이므로 항상 전진
            start = end - self.config.overlap;
        }

        chunks
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Document Splitting
// ============================================================================

/// 문서 목록을 청크로 분할
///
/// `overlap >= chunk_size`이면 `RagError::Configuration`을 반환합니다.
pub fn split(documents: &[Document], chunk_size: usize, overlap: usize) -> Result<Vec<Chunk>> {
    let chunker = RecursiveChunker::new(ChunkConfig::new(chunk_size, overlap))?;
    Ok(split_documents(&chunker, documents))
}

/// 주어진 청커로 문서 목록을 분할
///
/// 입력 문서 순서, 문서 내에서는 왼쪽에서 오른쪽 순서를 유지합니다.
/// 각 청크는 문서 메타데이터 전체와 `chunk_index`를 가집니다.
pub fn split_documents(chunker: &dyn Chunker, documents: &[Document]) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for (doc_index, doc) in documents.iter().enumerate() {
        let pieces = chunker.chunk(&doc.content);
        if pieces.is_empty() {
            tracing::debug!(
                "No chunks for document #{} ({:?})",
                doc_index,
                doc.source_file()
            );
            continue;
        }

        for (chunk_index, content) in pieces.into_iter().enumerate() {
            let mut metadata = doc.metadata.clone();
            metadata.insert(CHUNK_INDEX_KEY.to_string(), chunk_index.to_string());

            chunks.push(Chunk {
                id: format!("{}-{}", doc_index, chunk_index),
                content,
                metadata,
            });
        }
    }

    tracing::debug!(
        "{} split {} documents into {} chunks",
        chunker.name(),
        documents.len(),
        chunks.len()
    );
    chunks
}

/// 기본 청커 생성
pub fn default_chunker() -> Box<dyn Chunker> {
    Box::new(RecursiveChunker::with_defaults())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunker(size: usize, overlap: usize) -> RecursiveChunker {
        RecursiveChunker::new(ChunkConfig::new(size, overlap)).unwrap()
    }

    fn head(s: &str, n: usize) -> String {
        s.chars().take(n).collect()
    }

    fn tail(s: &str, n: usize) -> String {
        let count = s.chars().count();
        s.chars().skip(count.saturating_sub(n)).collect()
    }

    #[test]
    fn test_chunker_empty() {
        let chunker = RecursiveChunker::with_defaults();
        assert!(chunker.chunk("").is_empty());
        assert!(chunker.chunk("   \n\n  ").is_empty());
    }

    #[test]
    fn test_chunker_small_text() {
        let chunks = RecursiveChunker::with_defaults().chunk("Short paragraph.");
        assert_eq!(chunks, vec!["Short paragraph.".to_string()]);
    }

    #[test]
    fn test_overlap_must_be_less_than_size() {
        let err = RecursiveChunker::new(ChunkConfig::new(100, 100)).unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));

        let docs = vec![Document::new("some text", "a.txt")];
        let err = split(&docs, 100, 100).unwrap_err();
        assert!(matches!(err, RagError::Configuration(_)));

        assert!(ChunkConfig::new(0, 0).validate().is_err());
    }

    #[test]
    fn test_prefers_paragraph_break() {
        let text = format!("{}\n\n{}", "a".repeat(40), "b".repeat(40));
        let chunks = chunker(60, 5).chunk(&text);

        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].ends_with("\n\n"));
        assert_eq!(tail(&chunks[0], 5), head(&chunks[1], 5));
    }

    #[test]
    fn test_prefers_sentence_end_over_whitespace() {
        let text = "One two three. Four five six seven eight nine ten eleven twelve";
        let chunks = chunker(30, 3).chunk(text);
        assert!(chunks[0].ends_with('.'));
    }

    #[test]
    fn test_raw_cut_without_separators() {
        let text = "x".repeat(250);
        let chunks = chunker(100, 20).chunk(&text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 100);
        assert_eq!(chunks[1].len(), 100);
        assert_eq!(chunks[2].len(), 90);
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let text = "휴가 신청은 14일 전에 제출해야 합니다. ".repeat(20);
        let chunks = chunker(50, 10).chunk(&text);

        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(c.chars().count() <= 50);
        }
        for pair in chunks.windows(2) {
            assert_eq!(tail(&pair[0], 10), head(&pair[1], 10));
        }
    }

    #[test]
    fn test_split_carries_metadata() {
        let docs = vec![
            Document::new("a".repeat(30), "one.txt").with_metadata("page", "1"),
            Document::new("", "empty.txt"),
            Document::new("b".repeat(10), "two.txt"),
        ];
        let chunks = split(&docs, 20, 5).unwrap();

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].id, "0-0");
        assert_eq!(chunks[1].id, "0-1");
        assert_eq!(chunks[2].id, "2-0");
        assert_eq!(chunks[1].source_file(), Some("one.txt"));
        assert_eq!(chunks[1].metadata.get("page").map(String::as_str), Some("1"));
        assert_eq!(chunks[1].chunk_index(), Some(1));
        assert_eq!(chunks[2].chunk_index(), Some(0));
    }

    #[test]
    fn test_vacation_scenario() {
        let text = "Vacation requests must be submitted 14 days in advance. \
                    Sick leave requires a doctor's note for absences over 3 days.";
        let chunks = chunker(60, 10).chunk(text);

        assert!(chunks.len() >= 2);
        assert_eq!(
            chunks[0],
            "Vacation requests must be submitted 14 days in advance."
        );
        assert!(chunks[1].starts_with("n advance."));
    }

    #[test]
    fn test_deterministic() {
        let text = "Lorem ipsum dolor sit amet. ".repeat(100);
        let a = RecursiveChunker::with_defaults().chunk(&text);
        let b = RecursiveChunker::with_defaults().chunk(&text);
        assert_eq!(a, b);
    }

    #[test]
    fn test_config_presets() {
        assert_eq!(ChunkConfig::default(), ChunkConfig::new(1000, 200));
        assert!(ChunkConfig::for_rag().validate().is_ok());
        assert_eq!(ChunkConfig::for_fast().overlap, 0);
    }

    proptest! {
        #[test]
        fn prop_chunks_bounded_with_exact_overlap(
            text in "[a-zA-Z .!?\n]{0,4000}",
        ) {
            let chunks = RecursiveChunker::with_defaults().chunk(&text);

            for c in &chunks {
                prop_assert!(c.chars().count() <= DEFAULT_CHUNK_SIZE);
            }
            for pair in chunks.windows(2) {
                prop_assert_eq!(
                    tail(&pair[0], DEFAULT_CHUNK_OVERLAP),
                    head(&pair[1], DEFAULT_CHUNK_OVERLAP)
                );
            }
        }
    }
}
