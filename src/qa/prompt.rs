//! 프롬프트 구성 - 근거 문맥 블록, 질의 분류, 역할 프리앰블
//!
//! 분류는 프롬프트에만 영향을 줍니다. 검색은 항상 원래 질문으로 합니다.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::RagError;
use crate::knowledge::Chunk;

/// 문맥이 부족할 때 모델이 답해야 하는 문구
pub const INSUFFICIENT_CONTEXT: &str = "I don't know";

// ============================================================================
// Query Classification
// ============================================================================

/// 질의 분류 (판정 순서대로 나열)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryCategory {
    Policy,
    Leave,
    Benefits,
    Compliance,
    General,
}

impl QueryCategory {
    /// 판정 순서 (General은 기본값)
    const ORDERED: [QueryCategory; 4] = [
        QueryCategory::Policy,
        QueryCategory::Leave,
        QueryCategory::Benefits,
        QueryCategory::Compliance,
    ];

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Self::Policy => &["policy", "policies", "rule", "regulation", "handbook"],
            Self::Leave => &["leave", "vacation", "sick", "time off", "pto", "fmla"],
            Self::Benefits => &["benefit", "insurance", "retirement", "401k", "health", "dental"],
            Self::Compliance => &["compliance", "legal", "law", "regulation", "audit"],
            Self::General => &[],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Policy => "policy",
            Self::Leave => "leave",
            Self::Benefits => "benefits",
            Self::Compliance => "compliance",
            Self::General => "general",
        }
    }
}

impl fmt::Display for QueryCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const URGENT_KEYWORDS: [&str; 5] = ["urgent", "emergency", "asap", "immediate", "critical"];

/// 소문자로 바꾼 질문에 키워드가 부분 문자열로 들어 있는지
///
/// 단어 경계를 보지 않으므로 "healthcare"는 health, "lawsuit"는 law에 걸립니다.
fn mentions_any(lowered: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|k| lowered.contains(k))
}

/// 질의 분류 (순수 함수)
///
/// Policy → Leave → Benefits → Compliance 순으로 처음 맞는 분류, 없으면 General.
pub fn classify(question: &str) -> QueryCategory {
    let lowered = question.to_lowercase();

    QueryCategory::ORDERED
        .into_iter()
        .find(|category| mentions_any(&lowered, category.keywords()))
        .unwrap_or(QueryCategory::General)
}

/// 긴급 질의 여부 (순수 함수)
pub fn is_urgent(question: &str) -> bool {
    mentions_any(&question.to_lowercase(), &URGENT_KEYWORDS)
}

// ============================================================================
// Prompt Strategy
// ============================================================================

/// 프롬프트 선택 전략
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptStrategy {
    /// 프리앰블 없음
    #[default]
    Plain,
    /// 질의 분류에 따른 역할 프리앰블 추가
    Categorized,
}

impl FromStr for PromptStrategy {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "plain" => Ok(Self::Plain),
            "categorized" | "categorised" => Ok(Self::Categorized),
            other => Err(RagError::config(format!(
                "unknown prompt strategy '{}' (expected plain or categorized)",
                other
            ))),
        }
    }
}

impl fmt::Display for PromptStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => f.write_str("plain"),
            Self::Categorized => f.write_str("categorized"),
        }
    }
}

/// 분류 + 긴급도에 따른 역할 프리앰블
///
/// 긴급도 표기는 Policy, Leave, General에만 붙고 분류마다 문구가 다릅니다.
pub fn role_preamble(category: QueryCategory, urgent: bool) -> String {
    match category {
        QueryCategory::Policy => format!(
            "You are a senior HR assistant. Cite the relevant policy sections, \
             note any exceptions, and list next steps.\nQuery urgency: {}",
            if urgent { "HIGH" } else { "NORMAL" }
        ),
        QueryCategory::Leave => format!(
            "You are an HR leave specialist. Explain the procedure, the approval \
             workflow, and any deadlines that apply.\nPriority: {}",
            if urgent { "URGENT" } else { "STANDARD" }
        ),
        QueryCategory::Benefits => "You are an HR benefits coordinator. Cover eligibility and \
             enrollment periods, and say who to contact for follow-up."
            .to_string(),
        QueryCategory::Compliance => "You are an HR compliance officer. Address the legal or \
             regulatory question and name the required documentation."
            .to_string(),
        QueryCategory::General => format!(
            "You are an experienced HR generalist. Give practical guidance and point \
             to the right resources.\nHandle with {}.",
            if urgent { "immediate attention" } else { "standard care" }
        ),
    }
}

// ============================================================================
// Grounded Prompt
// ============================================================================

/// 검색 순서대로 청크 본문을 빈 줄로 연결
pub fn context_block(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .map(|c| c.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// 문맥 근거 프롬프트
///
/// 문맥이 비어 있어도 같은 형태로 만들어집니다.
pub fn grounded_prompt(question: &str, chunks: &[Chunk], strategy: PromptStrategy) -> String {
    let mut prompt = String::new();

    if strategy == PromptStrategy::Categorized {
        prompt.push_str(&role_preamble(classify(question), is_urgent(question)));
        prompt.push_str("\n\n");
    }

    prompt.push_str(&format!(
        "You are an AI assistant that answers questions using ONLY the context provided.\n\
         If the answer is not in the context, say \"{}\".\n\n\
         Context:\n{}\n\n\
         Question: {}\n\n\
         Answer clearly and concisely:",
        INSUFFICIENT_CONTEXT,
        context_block(chunks),
        question.trim()
    ));

    prompt
}

// ============================================================================
// Tests
// ============================================================================
