//! Vector Index - 세대(generation) 단위로 게시되는 영속 인덱스
//!
//! ```text
//! <location>/
//!   CURRENT                       # 게시된 세대 이름 (rename으로 원자적 교체)
//!   generations/<gen-id>/
//!     manifest.json               # 차원, 청크 수, 모델, fingerprint
//!     vectors.lance/              # LanceDB 벡터 테이블
//!     payload.db                  # SQLite 청크 본문
//! ```
//!
//! 빌드는 새 세대 디렉토리를 끝까지 쓴 다음에만 `CURRENT`를 바꿉니다.
//! 중간에 실패하거나 프로세스가 죽어도 이전 세대가 그대로 유효합니다.

use std::collections::HashSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use super::document::{Chunk, ScoredChunk};
use super::lance::LanceVectorTable;
use super::payload::PayloadStore;
use super::vector::{rank_hits, VectorRecord};
use crate::embedding::EmbeddingProvider;
use crate::error::{FailedBatch, RagError, Result};

/// 디스크 포맷 버전
pub const FORMAT_VERSION: u32 = 1;

const CURRENT_FILE: &str = "CURRENT";
const GENERATIONS_DIR: &str = "generations";
const MANIFEST_FILE: &str = "manifest.json";
const VECTORS_DIR: &str = "vectors.lance";
const PAYLOAD_FILE: &str = "payload.db";

/// 기본 임베딩 배치 크기
pub const DEFAULT_BATCH_SIZE: usize = 32;
/// 기본 동시 배치 수
pub const DEFAULT_CONCURRENCY: usize = 4;

/// 경계 동점 처리를 위해 k보다 더 가져오는 후보 수
const TIE_SLACK: usize = 8;

// ============================================================================
// Manifest / Options
// ============================================================================

/// 세대 메타데이터 (`manifest.json`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub generation: String,
    pub dimension: usize,
    pub chunk_count: usize,
    pub embedding_model: String,
    /// 청크 집합 + 임베딩 모델의 SHA-256
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
}

/// 빌드 옵션
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// 임베딩 요청 한 번에 보낼 청크 수
    pub batch_size: usize,
    /// 동시에 진행할 배치 수
    pub concurrency: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl BuildOptions {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(RagError::config("batch_size must be greater than 0"));
        }
        if self.concurrency == 0 {
            return Err(RagError::config("concurrency must be greater than 0"));
        }
        Ok(())
    }
}

// ============================================================================
// VectorIndex
// ============================================================================

/// 게시된 한 세대의 읽기 전용 인덱스
pub struct VectorIndex {
    location: PathBuf,
    generation_dir: PathBuf,
    manifest: IndexManifest,
    /// 청크가 0개면 테이블을 만들지 않음
    vectors: Option<LanceVectorTable>,
    payload: PayloadStore,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("generation_dir", &self.generation_dir)
            .field("manifest", &self.manifest)
            .finish()
    }
}

impl VectorIndex {
    /// 청크를 임베딩하여 새 세대를 만들고 게시
    ///
    /// 임베딩 실패 시 실패한 배치(번호, 청크 범위)를 담은
    /// `RagError::IndexBuild`를 반환하며 기존 게시본은 건드리지 않습니다.
    pub async fn build(
        location: &Path,
        chunks: &[Chunk],
        embedder: &dyn EmbeddingProvider,
        options: &BuildOptions,
    ) -> Result<Self> {
        options.validate()?;

        let dimension = embedder.dimension();
        if dimension == 0 {
            return Err(RagError::config("embedding dimension must be greater than 0"));
        }

        let mut seen = HashSet::with_capacity(chunks.len());
        if let Some(dup) = chunks.iter().find(|c| !seen.insert(c.id.as_str())) {
            return Err(RagError::index_build(format!("duplicate chunk id {}", dup.id)));
        }

        tracing::info!(
            "Building index: {} chunks, model {} ({} dims)",
            chunks.len(),
            embedder.name(),
            dimension
        );

        // 1. 임베딩 (배치 병렬, 순서 유지)
        let embeddings = embed_chunks(chunks, embedder, options).await?;

        // 2. 새 세대 기록
        let generation = new_generation_id();
        let generation_dir = location.join(GENERATIONS_DIR).join(&generation);

        let manifest = IndexManifest {
            format_version: FORMAT_VERSION,
            generation: generation.clone(),
            dimension,
            chunk_count: chunks.len(),
            embedding_model: embedder.name().to_string(),
            fingerprint: corpus_fingerprint(chunks, embedder.name(), dimension),
            built_at: Utc::now(),
        };

        let written = write_generation(&generation_dir, chunks, embeddings, &manifest).await;
        let (vectors, payload) = match written {
            Ok(parts) => parts,
            Err(e) => {
                discard_generation(&generation_dir);
                return Err(RagError::index_build(format!(
                    "failed to write generation {}: {:#}",
                    generation, e
                )));
            }
        };

        // 3. CURRENT 교체
        let previous = read_current(location).ok().flatten();
        if let Err(e) = publish_generation(location, &generation) {
            discard_generation(&generation_dir);
            return Err(e);
        }

        tracing::info!("Published index generation {}", generation);

        // 4. 현재 + 직전 세대만 유지
        prune_generations(location, &generation, previous.as_deref());

        Ok(Self {
            location: location.to_path_buf(),
            generation_dir,
            manifest,
            vectors,
            payload,
        })
    }

    /// 게시된 인덱스 로드
    ///
    /// 아무것도 게시되지 않았으면 `Ok(None)`,
    /// `CURRENT`가 가리키는 세대가 없거나 손상됐으면 `RagError::Retrieval`.
    pub async fn load(location: &Path) -> Result<Option<Self>> {
        let generation = match read_current(location)? {
            Some(g) => g,
            None => return Ok(None),
        };

        let generation_dir = location.join(GENERATIONS_DIR).join(&generation);
        if !generation_dir.is_dir() {
            return Err(RagError::retrieval(format!(
                "published generation {} is missing",
                generation
            )));
        }

        let manifest = read_manifest(&generation_dir)?;
        if manifest.generation != generation {
            return Err(RagError::retrieval(format!(
                "manifest generation {} does not match CURRENT ({})",
                manifest.generation, generation
            )));
        }

        let payload = PayloadStore::open_read_only(&generation_dir.join(PAYLOAD_FILE))
            .map_err(|e| RagError::retrieval(format!("{:#}", e)))?;
        let stored = payload
            .count()
            .map_err(|e| RagError::retrieval(format!("{:#}", e)))?;
        if stored != manifest.chunk_count {
            return Err(RagError::retrieval(format!(
                "payload store holds {} chunks, manifest says {}",
                stored, manifest.chunk_count
            )));
        }

        let vectors = if manifest.chunk_count > 0 {
            let table =
                LanceVectorTable::open(&generation_dir.join(VECTORS_DIR), manifest.dimension)
                    .await
                    .map_err(|e| RagError::retrieval(format!("{:#}", e)))?;
            let rows = table
                .count()
                .await
                .map_err(|e| RagError::retrieval(format!("{:#}", e)))?;
            if rows != manifest.chunk_count {
                return Err(RagError::retrieval(format!(
                    "vector table holds {} rows, manifest says {}",
                    rows, manifest.chunk_count
                )));
            }
            Some(table)
        } else {
            None
        };

        tracing::debug!(
            "Loaded index generation {} ({} chunks)",
            generation,
            manifest.chunk_count
        );

        Ok(Some(Self {
            location: location.to_path_buf(),
            generation_dir,
            manifest,
            vectors,
            payload,
        }))
    }

    /// 코사인 유사도 상위 k개 청크
    ///
    /// 유사도 내림차순, 동점이면 빌드 시 삽입 순서입니다.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if query.len() != self.manifest.dimension {
            return Err(RagError::config(format!(
                "query embedding has dimension {}, index was built with {}",
                query.len(),
                self.manifest.dimension
            )));
        }

        let vectors = match &self.vectors {
            Some(v) if k > 0 => v,
            _ => return Ok(Vec::new()),
        };

        let mut hits = vectors
            .search(query, k.saturating_add(TIE_SLACK))
            .await
            .map_err(|e| RagError::retrieval(format!("{:#}", e)))?;

        rank_hits(&mut hits);
        hits.truncate(k);

        let ids: Vec<String> = hits.iter().map(|h| h.id.clone()).collect();
        let mut chunks = self
            .payload
            .get_chunks(&ids)
            .map_err(|e| RagError::retrieval(format!("{:#}", e)))?;

        hits.into_iter()
            .map(|hit| {
                chunks
                    .remove(&hit.id)
                    .map(|chunk| ScoredChunk {
                        chunk,
                        score: hit.similarity,
                    })
                    .ok_or_else(|| RagError::retrieval(format!("chunk {} missing", hit.id)))
            })
            .collect()
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    pub fn generation_dir(&self) -> &Path {
        &self.generation_dir
    }

    pub fn dimension(&self) -> usize {
        self.manifest.dimension
    }

    pub fn len(&self) -> usize {
        self.manifest.chunk_count
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.chunk_count == 0
    }
}

// ============================================================================
// Build helpers
// ============================================================================

/// 배치 단위 임베딩 - `buffered`로 입력 순서 유지
async fn embed_chunks(
    chunks: &[Chunk],
    embedder: &dyn EmbeddingProvider,
    options: &BuildOptions,
) -> Result<Vec<Vec<f32>>> {
    let batch_size = options.batch_size;
    let total_batches = chunks.len().div_ceil(batch_size);
    let dimension = embedder.dimension();

    let batches: Vec<Vec<Vec<f32>>> = stream::iter(chunks.chunks(batch_size).enumerate())
        .map(|(index, batch)| async move {
            let start = index * batch_size;
            let failed = FailedBatch {
                index,
                start,
                end: start + batch.len(),
            };
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();

            tracing::debug!("Embedding batch {}/{}", index + 1, total_batches);

            let vectors = embedder.embed_batch(&texts).await.map_err(|e| {
                RagError::IndexBuild {
                    message: format!("embedding failed for {}: {:#}", failed, e),
                    batch: Some(failed),
                }
            })?;

            if vectors.len() != batch.len() {
                return Err(RagError::IndexBuild {
                    message: format!(
                        "embedding provider returned {} vectors for {}",
                        vectors.len(),
                        failed
                    ),
                    batch: Some(failed),
                });
            }

            if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
                return Err(RagError::config(format!(
                    "embedding provider returned dimension {}, expected {}",
                    bad.len(),
                    dimension
                )));
            }

            Ok::<_, RagError>(vectors)
        })
        .buffered(options.concurrency)
        .try_collect()
        .await?;

    Ok(batches.into_iter().flatten().collect())
}

/// 세대 디렉토리 기록 - manifest는 마지막에 씀
async fn write_generation(
    generation_dir: &Path,
    chunks: &[Chunk],
    embeddings: Vec<Vec<f32>>,
    manifest: &IndexManifest,
) -> anyhow::Result<(Option<LanceVectorTable>, PayloadStore)> {
    use anyhow::Context;

    fs::create_dir_all(generation_dir)
        .with_context(|| format!("Failed to create {:?}", generation_dir))?;

    let payload = PayloadStore::create(&generation_dir.join(PAYLOAD_FILE))?;
    payload.insert_chunks(chunks)?;

    let vectors = if chunks.is_empty() {
        None
    } else {
        let records: Vec<VectorRecord> = chunks
            .iter()
            .zip(embeddings)
            .enumerate()
            .map(|(position, (chunk, embedding))| VectorRecord {
                id: chunk.id.clone(),
                position: position as i64,
                embedding,
            })
            .collect();

        Some(
            LanceVectorTable::create(
                &generation_dir.join(VECTORS_DIR),
                &records,
                manifest.dimension,
            )
            .await?,
        )
    };

    let json = serde_json::to_string_pretty(manifest).context("Failed to encode manifest")?;
    write_synced(&generation_dir.join(MANIFEST_FILE), json.as_bytes())
        .context("Failed to write manifest")?;

    Ok((vectors, payload))
}

/// `CURRENT.tmp` 기록 + fsync 후 `CURRENT`로 rename
fn publish_generation(location: &Path, generation: &str) -> Result<()> {
    let path = location.join(CURRENT_FILE);
    let tmp = path.with_extension("tmp");

    write_synced(&tmp, generation.as_bytes()).map_err(|e| {
        RagError::index_build(format!("failed to write {}: {}", tmp.display(), e))
    })?;

    fs::rename(&tmp, &path).map_err(|e| {
        RagError::index_build(format!(
            "failed to publish {} -> {}: {}",
            tmp.display(),
            path.display(),
            e
        ))
    })?;

    // rename 자체를 디스크에 남김 (디렉토리 fsync를 지원하지 않는 플랫폼은 무시)
    if let Ok(dir) = fs::File::open(location) {
        let _ = dir.sync_all();
    }

    Ok(())
}

/// 파일을 쓰고 내용이 디스크에 닿을 때까지 대기
fn write_synced(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

fn discard_generation(generation_dir: &Path) {
    if let Err(e) = fs::remove_dir_all(generation_dir) {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!("Failed to remove unfinished generation {:?}: {}", generation_dir, e);
        }
    }
}

/// 현재/직전 세대보다 오래된 세대만 삭제
///
/// 세대 이름은 시간순으로 정렬되므로 기준보다 뒤에 오는 이름은 다른 프로세스가
/// 아직 게시하지 않은 세대일 수 있어 남겨둡니다.
/// 직전 세대는 아직 그 세대를 들고 있는 reader를 위해 남겨둡니다.
fn prune_generations(location: &Path, current: &str, previous: Option<&str>) {
    let floor = previous.map_or(current, |p| p.min(current));

    let entries = match fs::read_dir(location.join(GENERATIONS_DIR)) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Failed to list generations: {}", e);
            return;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if *name >= *floor {
            continue;
        }

        match fs::remove_dir_all(entry.path()) {
            Ok(()) => tracing::debug!("Removed old generation {}", name),
            Err(e) => tracing::warn!("Failed to remove old generation {}: {}", name, e),
        }
    }
}

/// `CURRENT` 읽기 - 없으면 `None`
fn read_current(location: &Path) -> Result<Option<String>> {
    let path = location.join(CURRENT_FILE);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(RagError::retrieval(format!(
                "failed to read {}: {}",
                path.display(),
                e
            )))
        }
    };

    let generation = raw.trim();
    let valid = !generation.is_empty()
        && generation
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && generation != "."
        && generation != "..";

    if !valid {
        return Err(RagError::retrieval(format!(
            "{} does not name a generation",
            path.display()
        )));
    }

    Ok(Some(generation.to_string()))
}

fn read_manifest(generation_dir: &Path) -> Result<IndexManifest> {
    let path = generation_dir.join(MANIFEST_FILE);
    let raw = fs::read_to_string(&path)
        .map_err(|e| RagError::retrieval(format!("failed to read {}: {}", path.display(), e)))?;

    let manifest: IndexManifest = serde_json::from_str(&raw)
        .map_err(|e| RagError::retrieval(format!("corrupt manifest {}: {}", path.display(), e)))?;

    if manifest.format_version != FORMAT_VERSION {
        return Err(RagError::retrieval(format!(
            "unsupported index format version {} (expected {})",
            manifest.format_version, FORMAT_VERSION
        )));
    }

    Ok(manifest)
}

/// 정렬 가능한 세대 이름: UTC 타임스탬프 + uuid 앞 8자리
fn new_generation_id() -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S%3fZ"), &suffix[..8])
}

/// 청크 집합 + 임베딩 모델의 fingerprint (SHA-256 hex)
///
/// 같은 문서/청킹/모델이면 같은 값이 나옵니다.
pub fn corpus_fingerprint(chunks: &[Chunk], embedding_model: &str, dimension: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(embedding_model.as_bytes());
    hasher.update([0u8]);
    hasher.update(dimension.to_le_bytes());

    for chunk in chunks {
        hasher.update([0u8]);
        hasher.update(chunk.id.as_bytes());
        hasher.update([0u8]);
        hasher.update(chunk.content.as_bytes());
        for (key, value) in &chunk.metadata {
            hasher.update([0u8]);
            hasher.update(key.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
        }
    }

    format!("{:x}", hasher.finalize())
}

// ============================================================================
// IndexHandle
// ============================================================================

/// 핸들이 보고 있는 인덱스 상태
#[derive(Debug, Clone)]
enum IndexState {
    /// 게시된 인덱스 없음 (정상)
    Empty,
    Ready(Arc<VectorIndex>),
    /// `CURRENT`는 있으나 읽을 수 없음
    Unreadable(String),
}

/// 현재 게시된 인덱스에 대한 공유 핸들
///
/// 읽는 쪽은 `Arc`를 복제해 가져가고, 재빌드는 새 세대가 게시된 뒤에만
/// 상태를 교체하므로 절반만 만들어진 인덱스를 보는 일이 없습니다.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    location: PathBuf,
    state: Arc<RwLock<IndexState>>,
}

impl IndexHandle {
    /// 위치에서 게시된 인덱스를 열어 핸들 생성 (실패해도 핸들은 만들어짐)
    pub async fn open(location: impl Into<PathBuf>) -> Self {
        let location = location.into();
        let state = load_state(&location).await;
        Self {
            location,
            state: Arc::new(RwLock::new(state)),
        }
    }

    /// 디스크를 읽지 않은 빈 핸들
    pub fn empty(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
            state: Arc::new(RwLock::new(IndexState::Empty)),
        }
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// 현재 인덱스 스냅샷
    ///
    /// 게시본 없음 → `Ok(None)`, 손상 → `RagError::Retrieval`.
    pub async fn snapshot(&self) -> Result<Option<Arc<VectorIndex>>> {
        match &*self.state.read().await {
            IndexState::Empty => Ok(None),
            IndexState::Ready(index) => Ok(Some(Arc::clone(index))),
            IndexState::Unreadable(reason) => Err(RagError::retrieval(format!(
                "index at {} is unreadable: {}",
                self.location.display(),
                reason
            ))),
        }
    }

    /// 방금 빌드한 인덱스로 교체
    pub async fn publish(&self, index: VectorIndex) -> Arc<VectorIndex> {
        let index = Arc::new(index);
        *self.state.write().await = IndexState::Ready(Arc::clone(&index));
        index
    }

    /// 디스크에서 다시 읽기
    pub async fn reload(&self) -> Result<Option<Arc<VectorIndex>>> {
        let state = load_state(&self.location).await;
        *self.state.write().await = state;
        self.snapshot().await
    }
}

async fn load_state(location: &Path) -> IndexState {
    match VectorIndex::load(location).await {
        Ok(Some(index)) => IndexState::Ready(Arc::new(index)),
        Ok(None) => IndexState::Empty,
        Err(e) => {
            tracing::warn!("Index at {:?} is unreadable: {}", location, e);
            IndexState::Unreadable(e.to_string())
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
