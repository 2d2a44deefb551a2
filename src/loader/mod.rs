//! 문서 로더 - 폴더 → 정규화된 Document 목록
//!
//! 읽거나 파싱할 수 없는 파일은 건너뛰고 `warnings`에 `RagError::Ingestion`으로 남깁니다.
//! 한 파일의 실패가 전체 로드를 멈추지 않습니다.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::collector::{CollectedFile, CollectorConfig, FileCollector};
use crate::error::RagError;
use crate::extractor;
use crate::knowledge::Document;

/// 로더가 추가하는 메타데이터 키
pub const SOURCE_PATH_KEY: &str = "source_path";
pub const FILE_TYPE_KEY: &str = "file_type";
pub const PAGE_KEY: &str = "page";

// ============================================================================
// Load Report
// ============================================================================

/// 로드 결과
#[derive(Debug, Default)]
pub struct LoadReport {
    /// 경로 순 문서 (PDF는 페이지 순)
    pub documents: Vec<Document>,
    /// 건너뛴 파일들 (`RagError::Ingestion`)
    pub warnings: Vec<RagError>,
    /// 읽은 파일 수
    pub files: usize,
}

// ============================================================================
// Document Loader
// ============================================================================

/// 폴더 문서 로더
pub struct DocumentLoader {
    collector: FileCollector,
}

impl DocumentLoader {
    pub fn new(config: CollectorConfig) -> Self {
        Self {
            collector: FileCollector::new(config),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 폴더의 지원 문서를 모두 로드
    ///
    /// 폴더가 없으면 빈 결과입니다.
    pub async fn load_dir(&self, dir: &Path) -> LoadReport {
        let mut report = LoadReport::default();

        let collection = match self.collector.collect_directory(dir) {
            Ok(c) => c,
            Err(e) => {
                report.warnings.push(RagError::ingestion(dir, format!("{:#}", e)));
                return report;
            }
        };

        for file in &collection.oversized {
            report.warnings.push(RagError::ingestion(
                &file.path,
                format!("file is too large ({} bytes)", file.size),
            ));
        }

        for file in &collection.files {
            report.files += 1;
            match load_file(file).await {
                Ok(documents) if documents.is_empty() => {
                    tracing::warn!("No text in {:?}, skipping", file.path);
                    report
                        .warnings
                        .push(RagError::ingestion(&file.path, "no extractable text"));
                }
                Ok(documents) => report.documents.extend(documents),
                Err(e) => {
                    tracing::warn!("Skipping {:?}: {}", file.path, e);
                    report.warnings.push(e);
                }
            }
        }

        tracing::info!(
            "Loaded {} documents from {} files ({} skipped)",
            report.documents.len(),
            report.files,
            report.warnings.len()
        );

        report
    }
}

/// 기본 설정으로 폴더 로드
pub async fn load_documents(dir: &Path) -> LoadReport {
    DocumentLoader::with_defaults().load_dir(dir).await
}

/// 파일 하나 → 문서 (PDF는 페이지별, 빈 페이지는 제외)
async fn load_file(file: &CollectedFile) -> Result<Vec<Document>, RagError> {
    let contents = extractor::extract(&file.path, file.file_type)
        .await
        .map_err(|e| RagError::ingestion(&file.path, format!("{:#}", e)))?;

    let source_file = file.file_name();
    let source_path = file.path.display().to_string();

    Ok(contents
        .into_iter()
        .filter_map(|content| {
            let text = normalize_text(&content.text);
            if text.is_empty() {
                return None;
            }

            let mut doc = Document::new(text, source_file.clone())
                .with_metadata(SOURCE_PATH_KEY, source_path.clone())
                .with_metadata(FILE_TYPE_KEY, file.file_type.as_str());
            if let Some(page) = content.page_number {
                doc = doc.with_metadata(PAGE_KEY, page.to_string());
            }
            Some(doc)
        })
        .collect())
}

// ============================================================================
// Normalization
// ============================================================================

fn excess_newlines() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\n{3,}").expect("Invalid regex"))
}

/// 추출 텍스트 정규화
///
/// - CRLF / CR → LF
/// - 탭과 개행을 제외한 제어 문자 제거
/// - 줄 끝 공백 제거
/// - 3개 이상 연속 개행 → 빈 줄 하나
/// - 앞뒤 공백 제거
pub fn normalize_text(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");

    let cleaned: String = unified
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();

    let trimmed_lines: Vec<&str> = cleaned.lines().map(str::trim_end).collect();
    let joined = trimmed_lines.join("\n");

    excess_newlines()
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_text() {
        let raw = "Title\r\n\r\n\r\n\r\nBody line   \rnext\u{0}line\t\u{7}end  \n\n\n";
        assert_eq!(normalize_text(raw), "Title\n\nBody line\nnextline\tend");
    }

    #[test]
    fn test_normalize_whitespace_only() {
        assert_eq!(normalize_text(" \r\n\t \n "), "");
    }

    #[tokio::test]
    async fn test_load_directory() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("leave.txt"),
            "Vacation requests must be submitted 14 days in advance.\r\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("blank.md"), "   \n\n").unwrap();
        std::fs::write(dir.path().join("broken.pdf"), "not really a pdf").unwrap();
        std::fs::write(dir.path().join("notes.csv"), "a,b").unwrap();

        let report = load_documents(dir.path()).await;

        assert_eq!(report.files, 3);
        assert_eq!(report.documents.len(), 1);
        let doc = &report.documents[0];
        assert_eq!(doc.source_file(), Some("leave.txt"));
        assert_eq!(
            doc.content,
            "Vacation requests must be submitted 14 days in advance."
        );
        assert_eq!(doc.metadata.get(FILE_TYPE_KEY).map(String::as_str), Some("text"));

        // blank.md + broken.pdf
        assert_eq!(report.warnings.len(), 2);
        assert!(report
            .warnings
            .iter()
            .all(|w| matches!(w, RagError::Ingestion { .. })));
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let dir = TempDir::new().unwrap();
        let report = load_documents(&dir.path().join("documents")).await;
        assert!(report.documents.is_empty());
        assert!(report.warnings.is_empty());
    }
}
