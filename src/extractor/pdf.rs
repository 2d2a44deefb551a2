//! PDF 텍스트 추출 모듈
//!
//! pdf-extract는 문서 전체 텍스트 하나만 돌려주므로, 페이지 경계는
//! 폼피드 또는 "--- Page 3 ---" 같은 구분 줄로 복원합니다.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use regex::Regex;

/// PDF 한 페이지
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfPage {
    /// 1부터 시작
    pub number: usize,
    pub text: String,
}

/// PDF 파일에서 페이지별 텍스트 추출
///
/// 텍스트 레이어가 없는 PDF(스캔본)는 빈 벡터입니다.
pub fn extract_pages(path: &Path) -> Result<Vec<PdfPage>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .map_err(|e| anyhow::anyhow!("Failed to extract text from PDF {:?}: {}", path, e))?;

    if text.trim().is_empty() {
        tracing::warn!("PDF {:?} has no text layer (scanned document?)", path);
        return Ok(Vec::new());
    }

    let pages = paginate(&text);
    tracing::debug!("PDF {:?}: {} pages", path, pages.len());
    Ok(pages)
}

/// 전체 텍스트 → 페이지 (빈 페이지는 버리고 번호를 다시 매김)
fn paginate(text: &str) -> Vec<PdfPage> {
    let pieces = split_on_form_feed(text)
        .or_else(|| split_on_markers(text))
        .unwrap_or_else(|| vec![text]);

    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .enumerate()
        .map(|(i, piece)| PdfPage {
            number: i + 1,
            text: piece.to_string(),
        })
        .collect()
}

/// 내용 있는 조각이 둘 이상일 때만 분리로 인정
fn non_trivial(pieces: Vec<&str>) -> Option<Vec<&str>> {
    let filled = pieces.iter().filter(|p| !p.trim().is_empty()).count();
    (filled > 1).then_some(pieces)
}

fn split_on_form_feed(text: &str) -> Option<Vec<&str>> {
    non_trivial(text.split('\x0c').collect())
}

fn page_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^\s*[-=]+\s*(?:Page\s*)?\d+\s*[-=]+\s*$").expect("Invalid regex")
    })
}

fn split_on_markers(text: &str) -> Option<Vec<&str>> {
    non_trivial(page_marker().split(text).collect())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(pages: &[PdfPage]) -> Vec<&str> {
        pages.iter().map(|p| p.text.as_str()).collect()
    }

    #[test]
    fn test_form_feed_pages() {
        let pages = paginate("Leave policy\x0cBenefits overview\x0c\x0cCode of conduct");
        assert_eq!(
            texts(&pages),
            vec!["Leave policy", "Benefits overview", "Code of conduct"]
        );
        assert_eq!(pages[2].number, 3);
    }

    #[test]
    fn test_marker_pages() {
        let pages = paginate("intro\n--- Page 2 ---\nsecond page\n=== 3 ===\nthird page");
        assert_eq!(texts(&pages), vec!["intro", "second page", "third page"]);
    }

    #[test]
    fn test_single_page() {
        let pages = paginate("  Just some text without page breaks \n");
        assert_eq!(
            pages,
            vec![PdfPage {
                number: 1,
                text: "Just some text without page breaks".to_string()
            }]
        );
    }

    #[test]
    fn test_trailing_form_feed_is_one_page() {
        assert_eq!(paginate("only page\x0c").len(), 1);
    }

    #[test]
    fn test_missing_file() {
        assert!(extract_pages(Path::new("/definitely/not/here.pdf")).is_err());
    }
}
