//! CLI 모듈
//!
//! docqa-rag CLI 명령어 정의 및 구현

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::config::QaConfig;
use crate::error::RagError;
use crate::gemini::has_api_key;
use crate::knowledge::{ChunkConfig, IndexHandle};
use crate::loader::{load_documents, PAGE_KEY};
use crate::qa::{classify, is_urgent, PromptStrategy, QaOrchestrator};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docqa-rag")]
#[command(version, about = "사내 문서 기반 질의응답 (RAG)", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 문서 폴더로 인덱스 빌드
    Ingest {
        /// 문서 폴더 (기본: 데이터 디렉토리/documents)
        #[arg(short, long)]
        dir: Option<PathBuf>,

        /// 문서가 바뀌지 않았어도 강제 재빌드
        #[arg(long)]
        force: bool,

        /// 청크 크기 (문자)
        #[arg(long)]
        chunk_size: Option<usize>,

        /// 청크 간 겹침 (문자)
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// 질문하고 근거와 함께 답변 받기
    Ask {
        /// 질문
        question: String,

        /// 프롬프트 전략 (plain | categorized)
        #[arg(short, long)]
        strategy: Option<String>,

        /// 제한 시간 (초)
        #[arg(short, long)]
        timeout_secs: Option<u64>,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 답변 생성 없이 관련 청크만 검색
    Query {
        /// 검색 쿼리
        question: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// 상태 확인
    Status,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = QaConfig::from_env().context("설정 로드 실패")?;

    match cli.command {
        Commands::Ingest {
            dir,
            force,
            chunk_size,
            overlap,
        } => cmd_ingest(config, dir, force, chunk_size, overlap).await,
        Commands::Ask {
            question,
            strategy,
            timeout_secs,
            json,
        } => cmd_ask(config, &question, strategy, timeout_secs, json).await,
        Commands::Query { question, limit } => cmd_query(config, &question, limit).await,
        Commands::Status => cmd_status(config).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

fn require_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }
    Ok(())
}

/// 수집 명령어 (ingest)
///
/// 폴더의 문서를 읽어 새 인덱스 세대를 빌드하고 게시합니다.
async fn cmd_ingest(
    mut config: QaConfig,
    dir: Option<PathBuf>,
    force: bool,
    chunk_size: Option<usize>,
    overlap: Option<usize>,
) -> Result<()> {
    require_api_key()?;

    config.chunk = ChunkConfig::new(
        chunk_size.unwrap_or(config.chunk.chunk_size),
        overlap.unwrap_or(config.chunk.overlap),
    );

    let dir = dir.unwrap_or_else(|| config.documents_dir());
    println!("[*] 문서 폴더: {}", dir.display());

    let report = load_documents(&dir).await;
    for warning in &report.warnings {
        println!("[!] {}: {}", warning.category(), warning);
    }

    if report.documents.is_empty() {
        println!("[!] 로드된 문서가 없습니다. 빈 인덱스를 게시합니다.");
    } else {
        println!(
            "[*] 파일 {} 개에서 문서 {} 건 로드",
            report.files,
            report.documents.len()
        );
    }

    let orchestrator = QaOrchestrator::from_config(&config)
        .await
        .context("초기화 실패")?;

    println!(
        "[*] 청킹 (크기 {}, 겹침 {}) 및 임베딩 생성 중...",
        config.chunk.chunk_size, config.chunk.overlap
    );

    let ingest = orchestrator
        .ingest(&report.documents, force)
        .await
        .map_err(describe)?;

    if ingest.skipped {
        println!(
            "[OK] 문서가 바뀌지 않았습니다. 기존 인덱스 유지 (세대 {})",
            ingest.manifest.generation
        );
    } else {
        println!(
            "[OK] 인덱스 게시 완료: 문서 {}, 청크 {} (세대 {})",
            ingest.documents, ingest.chunks, ingest.manifest.generation
        );
    }

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(
    mut config: QaConfig,
    question: &str,
    strategy: Option<String>,
    timeout_secs: Option<u64>,
    json: bool,
) -> Result<()> {
    require_api_key()?;

    if let Some(strategy) = strategy {
        config.strategy = strategy.parse::<PromptStrategy>().map_err(describe)?;
    }

    let orchestrator = QaOrchestrator::from_config(&config)
        .await
        .context("초기화 실패")?;

    if !json {
        let category = classify(question);
        let priority = if is_urgent(question) { " (긴급)" } else { "" };
        tracing::debug!("Question category: {}{}", category.as_str(), priority);
        println!("[*] 질문: \"{}\"", question);
    }

    let response = match timeout_secs {
        Some(secs) => {
            orchestrator
                .answer_with_timeout(question, Duration::from_secs(secs))
                .await
        }
        None => orchestrator.answer(question).await,
    }
    .map_err(describe)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&response).context("JSON 직렬화 실패")?
        );
        return Ok(());
    }

    println!("\n{}\n", response.answer);

    if response.sources.is_empty() {
        println!("[!] 참고한 문서가 없습니다.");
        return Ok(());
    }

    println!("[OK] 참고 문서 ({} 건):", response.sources.len());
    for (i, chunk) in response.sources.iter().enumerate() {
        println!(
            "  {}. {}{}",
            i + 1,
            chunk.source_file().unwrap_or("-"),
            page_suffix(chunk.metadata.get(PAGE_KEY))
        );
        println!("     {}", truncate_text(&chunk.content, 120));
    }

    Ok(())
}

/// 검색 명령어 (query)
///
/// 답변 생성 없이 벡터 검색 결과만 보여줍니다.
async fn cmd_query(config: QaConfig, question: &str, limit: usize) -> Result<()> {
    require_api_key()?;

    println!("[*] 검색 중: \"{}\"", question);

    let orchestrator = QaOrchestrator::from_config(&config)
        .await
        .context("초기화 실패")?;

    let results = orchestrator
        .retriever()
        .retrieve_scored(question, limit)
        .await
        .map_err(describe)?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        let chunk = &result.chunk;
        println!(
            "{}. [점수: {:.4}] {}{}",
            i + 1,
            result.score,
            chunk.source_file().unwrap_or("-"),
            page_suffix(chunk.metadata.get(PAGE_KEY))
        );
        println!("   ID: {}", chunk.id);
        println!("   내용: {}", truncate_text(&chunk.content, 200));
        println!();
    }

    Ok(())
}

/// 상태 명령어 (status)
///
/// 데이터 디렉토리, API 키, 게시된 인덱스 세대를 보여줍니다.
async fn cmd_status(config: QaConfig) -> Result<()> {
    println!("docqa-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!("[*] 문서 폴더: {}", config.documents_dir().display());
    println!(
        "[*] 청킹: 크기 {}, 겹침 {} / top_k: {} / 프롬프트: {}",
        config.chunk.chunk_size, config.chunk.overlap, config.top_k, config.strategy
    );
    println!(
        "[*] 모델: 임베딩 {} ({}차원), 생성 {}",
        config.embedding.model, config.embedding.dimension, config.generation.model
    );

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    let index = IndexHandle::open(config.index_dir()).await;
    match index.snapshot().await {
        Ok(Some(current)) => {
            let manifest = current.manifest();
            println!("[OK] 인덱스 세대: {}", manifest.generation);
            println!(
                "     청크 {} 개, {} ({}차원)",
                manifest.chunk_count, manifest.embedding_model, manifest.dimension
            );
            println!(
                "     빌드 시각: {}",
                manifest.built_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
        }
        Ok(None) => {
            println!("[!] 인덱스: 없음 (docqa-rag ingest 로 빌드)");
        }
        Err(e) => {
            println!("[!] 인덱스를 읽을 수 없습니다: {}", e);
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 라이브러리 에러 → 분류가 붙은 CLI 에러
fn describe(error: RagError) -> anyhow::Error {
    let retry = if error.is_retryable() {
        " (잠시 후 다시 시도하세요)"
    } else {
        ""
    };
    anyhow::anyhow!("{}{}: {}", error.category(), retry, error)
}

fn page_suffix(page: Option<&String>) -> String {
    page.map(|p| format!(" (p.{})", p)).unwrap_or_default()
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("hello", 10), "hello");
        assert_eq!(truncate_text("hello world", 5), "hello...");
        assert_eq!(truncate_text("vacation\npolicy", 20), "vacation policy");
    }

    #[test]
    fn test_truncate_unicode() {
        assert_eq!(truncate_text("휴가 신청 규정", 5), "휴가 신청...");
    }

    #[test]
    fn test_page_suffix() {
        assert_eq!(page_suffix(Some(&"3".to_string())), " (p.3)");
        assert_eq!(page_suffix(None), "");
    }

    #[test]
    fn test_describe_includes_category() {
        let err = describe(RagError::Timeout(Duration::from_secs(5)));
        let message = err.to_string();
        assert!(message.starts_with("Request timed out"));
        assert!(message.contains("다시 시도"));
    }

    #[test]
    fn test_parse_ask_command() {
        let cli = Cli::parse_from([
            "docqa-rag",
            "ask",
            "How many vacation days?",
            "--strategy",
            "categorized",
            "--timeout-secs",
            "30",
        ]);
        match cli.command {
            Commands::Ask {
                question,
                strategy,
                timeout_secs,
                json,
            } => {
                assert_eq!(question, "How many vacation days?");
                assert_eq!(strategy.as_deref(), Some("categorized"));
                assert_eq!(timeout_secs, Some(30));
                assert!(!json);
            }
            _ => panic!("expected ask"),
        }
    }
}
