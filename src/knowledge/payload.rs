//! Payload Store - rusqlite 기반 청크 본문 저장소
//!
//! 벡터 ID → 청크 본문 + 메타데이터 매핑을 보관합니다.
//! 세대(generation)마다 하나의 `payload.db` 파일을 사용하며,
//! 빌드 시 한 트랜잭션으로 기록한 뒤에는 읽기 전용으로만 엽니다.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};

use super::document::{Chunk, Metadata};

// ============================================================================
// PayloadStore
// ============================================================================

/// 청크 payload 저장소
pub struct PayloadStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl PayloadStore {
    /// 새 저장소 생성 (스키마 초기화)
    ///
    /// # Arguments
    /// * `path` - DB 파일 경로 (이미 있으면 실패)
    pub fn create(path: &Path) -> Result<Self> {
        if path.exists() {
            anyhow::bail!("Payload store already exists: {:?}", path);
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create payload directory")?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .context("Failed to create payload database")?;

        conn.execute(
            "CREATE TABLE chunks (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL UNIQUE,
                content TEXT NOT NULL,
                metadata TEXT NOT NULL
            )",
            [],
        )
        .context("Failed to create chunks table")?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        })
    }

    /// 기존 저장소를 읽기 전용으로 열기
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("Failed to open payload database: {:?}", path))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// 청크 전체 저장 (단일 트랜잭션)
    ///
    /// position은 슬라이스 순서를 따릅니다.
    pub fn insert_chunks(&self, chunks: &[Chunk]) -> Result<usize> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let tx = conn.transaction().context("Failed to begin transaction")?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO chunks (id, position, content, metadata) VALUES (?1, ?2, ?3, ?4)",
            )?;

            for (position, chunk) in chunks.iter().enumerate() {
                let metadata = serde_json::to_string(&chunk.metadata)
                    .context("Failed to encode chunk metadata")?;
                stmt.execute(params![chunk.id, position as i64, chunk.content, metadata])
                    .with_context(|| format!("Failed to insert chunk {}", chunk.id))?;
            }
        }
        tx.commit().context("Failed to commit payload")?;

        Ok(chunks.len())
    }

    /// ID 목록으로 청크 조회
    ///
    /// 없는 ID가 하나라도 있으면 에러입니다 (벡터와 payload 불일치 = 손상).
    pub fn get_chunks(&self, ids: &[String]) -> Result<HashMap<String, Chunk>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare("SELECT content, metadata FROM chunks WHERE id = ?1")?;
        let mut found = HashMap::with_capacity(ids.len());

        for id in ids {
            let row = stmt
                .query_row(params![id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .optional()
                .with_context(|| format!("Failed to read chunk {}", id))?;

            let (content, metadata) =
                row.ok_or_else(|| anyhow::anyhow!("Chunk {} missing from payload store", id))?;

            let metadata: Metadata = serde_json::from_str(&metadata)
                .with_context(|| format!("Failed to decode metadata for chunk {}", id))?;

            found.insert(
                id.clone(),
                Chunk {
                    id: id.clone(),
                    content,
                    metadata,
                },
            );
        }

        Ok(found)
    }

    /// 저장된 청크 수
    pub fn count(&self) -> Result<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .context("Failed to count chunks")?;

        Ok(count as usize)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chunk(id: &str, content: &str) -> Chunk {
        let mut metadata = Metadata::new();
        metadata.insert("source_file".to_string(), "policy.txt".to_string());
        Chunk {
            id: id.to_string(),
            content: content.to_string(),
            metadata,
        }
    }

    #[test]
    fn test_insert_and_get() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("payload.db");

        let store = PayloadStore::create(&path).unwrap();
        let inserted = store
            .insert_chunks(&[chunk("0-0", "first"), chunk("0-1", "second")])
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.count().unwrap(), 2);

        let reader = PayloadStore::open_read_only(&path).unwrap();
        let found = reader.get_chunks(&["0-1".to_string()]).unwrap();
        assert_eq!(found["0-1"].content, "second");
        assert_eq!(found["0-1"].source_file(), Some("policy.txt"));
    }

    #[test]
    fn test_missing_id_is_error() {
        let dir = TempDir::new().unwrap();
        let store = PayloadStore::create(&dir.path().join("payload.db")).unwrap();
        store.insert_chunks(&[chunk("0-0", "only")]).unwrap();

        assert!(store.get_chunks(&["9-9".to_string()]).is_err());
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let dir = TempDir::new().unwrap();
        let store = PayloadStore::create(&dir.path().join("payload.db")).unwrap();

        let result = store.insert_chunks(&[chunk("0-0", "a"), chunk("0-0", "b")]);
        assert!(result.is_err());
        assert_eq!(store.count().unwrap(), 0);
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("payload.db");
        PayloadStore::create(&path).unwrap();
        assert!(PayloadStore::create(&path).is_err());
    }

    #[test]
    fn test_open_missing_file_fails() {
        let dir = TempDir::new().unwrap();
        assert!(PayloadStore::open_read_only(&dir.path().join("nope.db")).is_err());
    }
}
