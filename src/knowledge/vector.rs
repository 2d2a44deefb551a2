//! Vector 레코드 타입 및 유사도 유틸리티

use std::cmp::Ordering;

/// 벡터 레코드 (저장용)
#[derive(Debug, Clone)]
pub struct VectorRecord {
    /// 청크 ID (payload store 키)
    pub id: String,
    /// 빌드 시 삽입 순서 (동점 정렬용)
    pub position: i64,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// ANN 검색 히트
#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub id: String,
    pub position: i64,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub similarity: f32,
}

/// 유사도 내림차순, 동점이면 삽입 순서 오름차순
pub fn rank_hits(hits: &mut [VectorHit]) {
    hits.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(Ordering::Equal)
            .then(a.position.cmp(&b.position))
    });
}

/// 코사인 유사도 계산
///
/// 길이가 다르거나 영벡터면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, position: i64, similarity: f32) -> VectorHit {
        VectorHit {
            id: id.to_string(),
            position,
            similarity,
        }
    }

    #[test]
    fn test_rank_hits_ties_use_position() {
        let mut hits = vec![hit("c", 2, 0.5), hit("a", 0, 0.9), hit("b", 1, 0.5)];
        rank_hits(&mut hits);
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-4);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-4);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-4);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }
}
