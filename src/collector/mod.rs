//! 파일 수집 모듈
//!
//! 문서 폴더를 재귀 탐색하여 지원하는 문서 파일만 모읍니다.
//! .gitignore 패턴과 숨김 파일 규칙을 존중하며, 결과는 경로 순으로 정렬됩니다.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ignore::{DirEntry, WalkBuilder};

// ============================================================================
// File Types
// ============================================================================

/// 지원하는 문서 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// 텍스트 / 마크다운
    Text,
    /// PDF (페이지 단위 문서)
    Pdf,
    /// Word 문서 (word/document.xml)
    Docx,
}

impl FileType {
    /// 확장자로 파일 타입 결정
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" | "md" | "markdown" => Some(FileType::Text),
            "pdf" => Some(FileType::Pdf),
            "docx" => Some(FileType::Docx),
            _ => None,
        }
    }

    /// 파일 경로에서 타입 결정
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// 메타데이터에 기록되는 이름
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Text => "text",
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
        }
    }
}

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    /// 파일 경로
    pub path: PathBuf,
    /// 파일 타입
    pub file_type: FileType,
    /// 파일 크기 (바이트)
    pub size: u64,
}

impl CollectedFile {
    /// 워커 항목 → 지원 문서 (디렉토리, 지원하지 않는 확장자는 None)
    fn from_entry(entry: &DirEntry) -> Result<Option<Self>> {
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            return Ok(None);
        }
        let Some(file_type) = FileType::from_path(entry.path()) else {
            return Ok(None);
        };

        let size = entry
            .metadata()
            .with_context(|| format!("Failed to read metadata: {:?}", entry.path()))?
            .len();

        Ok(Some(Self {
            path: entry.path().to_path_buf(),
            file_type,
            size,
        }))
    }

    /// 파일명 (`source_file` 메타데이터)
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 50 * 1024 * 1024, // 50MB
        }
    }
}

/// 수집 결과
#[derive(Debug, Default)]
pub struct Collection {
    /// 경로 순으로 정렬된 파일
    pub files: Vec<CollectedFile>,
    /// 크기 제한으로 건너뛴 파일
    pub oversized: Vec<CollectedFile>,
}

/// 파일 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 폴더 재귀 수집
    ///
    /// 폴더가 없으면 빈 결과를 반환합니다.
    pub fn collect_directory(&self, path: &Path) -> Result<Collection> {
        if !path.exists() {
            tracing::info!("Document directory {:?} does not exist yet", path);
            return Ok(Collection::default());
        }

        if !path.is_dir() {
            anyhow::bail!("Not a directory: {:?}", path);
        }

        let walker = WalkBuilder::new(path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .require_git(false)
            .build();

        let mut files: Vec<CollectedFile> = walker
            .filter_map(|entry| {
                entry
                    .map_err(|e| tracing::warn!("Failed to read entry: {}", e))
                    .ok()
            })
            .filter_map(|entry| match CollectedFile::from_entry(&entry) {
                Ok(file) => file,
                Err(e) => {
                    tracing::warn!("{:#}", e);
                    None
                }
            })
            .collect();

        files.sort_by(|a, b| a.path.cmp(&b.path));

        let limit = self.config.max_file_size;
        let (files, oversized): (Vec<_>, Vec<_>) = files
            .into_iter()
            .partition(|file| limit == 0 || file.size <= limit);

        for file in &oversized {
            tracing::debug!("Skipping large file: {:?} ({} bytes)", file.path, file.size);
        }

        let collection = Collection { files, oversized };

        tracing::info!("Collected {} files from {:?}", collection.files.len(), path);
        Ok(collection)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_type_from_extension() {
        assert_eq!(FileType::from_extension("md"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("TXT"), Some(FileType::Text));
        assert_eq!(FileType::from_extension("PDF"), Some(FileType::Pdf));
        assert_eq!(FileType::from_extension("docx"), Some(FileType::Docx));
        assert_eq!(FileType::from_extension("png"), None);
        assert_eq!(FileType::from_extension("exe"), None);
    }

    #[test]
    fn test_collect_sorted_and_filtered() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.md"), "a").unwrap();
        std::fs::write(dir.path().join("image.png"), "x").unwrap();
        std::fs::write(dir.path().join(".hidden.txt"), "h").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("c.txt"), "c").unwrap();

        let collection = FileCollector::with_defaults()
            .collect_directory(dir.path())
            .unwrap();
        let names: Vec<String> = collection.files.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, vec!["a.md", "b.txt", "c.txt"]);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let dir = TempDir::new().unwrap();
        let collection = FileCollector::with_defaults()
            .collect_directory(&dir.path().join("nope"))
            .unwrap();
        assert!(collection.files.is_empty());
    }

    #[test]
    fn test_oversized_files_reported() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("big.txt"), "0123456789").unwrap();

        let collector = FileCollector::new(CollectorConfig {
            max_file_size: 5,
            ..Default::default()
        });
        let collection = collector.collect_directory(dir.path()).unwrap();
        assert!(collection.files.is_empty());
        assert_eq!(collection.oversized.len(), 1);
    }
}
