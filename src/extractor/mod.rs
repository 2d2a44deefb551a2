//! 콘텐츠 추출 모듈
//!
//! 파일 형식별로 원문 텍스트를 꺼냅니다.
//! - 텍스트/마크다운: 직접 읽기 (UTF-8이 아니면 손실 변환)
//! - PDF: pdf-extract, 페이지 단위
//! - DOCX: word/document.xml의 단락 텍스트

pub mod docx;
pub mod pdf;

use std::path::Path;

use anyhow::{Context, Result};

use crate::collector::FileType;

// ============================================================================
// Extracted Content
// ============================================================================

/// 추출된 콘텐츠 (파일 하나 → 1개 이상)
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    /// 추출된 원문 텍스트 (정규화 전)
    pub text: String,
    /// PDF 페이지 번호 (1부터 시작)
    pub page_number: Option<usize>,
}

impl ExtractedContent {
    fn whole(text: String) -> Self {
        Self {
            text,
            page_number: None,
        }
    }
}

// ============================================================================
// Content Extractor
// ============================================================================

/// 파일에서 콘텐츠 추출
pub async fn extract(path: &Path, file_type: FileType) -> Result<Vec<ExtractedContent>> {
    match file_type {
        FileType::Text => extract_text(path).await,
        FileType::Pdf => extract_pdf(path).await,
        FileType::Docx => extract_docx(path).await,
    }
}

/// 텍스트 파일에서 추출
async fn extract_text(path: &Path) -> Result<Vec<ExtractedContent>> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read text file: {:?}", path))?;

    let text = match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("{:?} is not valid UTF-8, decoding lossily", path);
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    };

    Ok(vec![ExtractedContent::whole(text)])
}

/// PDF 파일에서 추출
async fn extract_pdf(path: &Path) -> Result<Vec<ExtractedContent>> {
    // PDF 추출은 CPU 바운드이므로 spawn_blocking 사용
    let path = path.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || pdf::extract_pages(&path))
        .await
        .context("PDF extraction task failed")??;

    Ok(pages
        .into_iter()
        .map(|page| ExtractedContent {
            text: page.text,
            page_number: Some(page.number),
        })
        .collect())
}

/// DOCX 파일에서 추출
async fn extract_docx(path: &Path) -> Result<Vec<ExtractedContent>> {
    let path = path.to_path_buf();
    let text = tokio::task::spawn_blocking(move || docx::extract_text_from_docx(&path))
        .await
        .context("DOCX extraction task failed")??;

    Ok(vec![ExtractedContent::whole(text)])
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_extract_text_lossy() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin1.txt");
        std::fs::write(&path, [b'c', b'a', b'f', 0xE9]).unwrap();

        let content = extract(&path, FileType::Text).await.unwrap();
        assert_eq!(content.len(), 1);
        assert!(content[0].text.starts_with("caf"));
        assert!(content[0].page_number.is_none());
    }

    #[tokio::test]
    async fn test_extract_broken_pdf_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"not a pdf").unwrap();

        assert!(extract(&path, FileType::Pdf).await.is_err());
    }
}
