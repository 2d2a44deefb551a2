//! LanceDB Vector Table - 세대(generation)별 벡터 저장
//!
//! 한 세대의 벡터는 한 번에 기록되고 이후 변경되지 않습니다.
//! 재빌드는 새 세대 디렉토리에 새 테이블을 만듭니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::Table;
use lancedb::DistanceType;

use super::vector::{cosine_similarity, VectorHit, VectorRecord};

/// 벡터 테이블 이름
const TABLE_NAME: &str = "vectors";

// ============================================================================
// LanceVectorTable
// ============================================================================

/// 불변 LanceDB 벡터 테이블
pub struct LanceVectorTable {
    table: Table,
    dimension: usize,
}

impl LanceVectorTable {
    /// 레코드 전체로 새 테이블 생성
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로 (세대 디렉토리 내부)
    /// * `records` - 저장할 레코드 (비어있으면 안 됨)
    /// * `dimension` - 임베딩 차원
    pub async fn create(path: &Path, records: &[VectorRecord], dimension: usize) -> Result<Self> {
        let batch = Self::records_to_batch(records, dimension)?;
        let schema = batch.schema();

        let db = connect(path).await?;
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        let table = db
            .create_table(TABLE_NAME, batches)
            .execute()
            .await
            .context("Failed to create vector table")?;

        tracing::debug!("Created vector table at {:?} ({} rows)", path, records.len());
        Ok(Self { table, dimension })
    }

    /// 기존 테이블 열기
    pub async fn open(path: &Path, dimension: usize) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Vector table not found: {:?}", path);
        }

        let db = connect(path).await?;
        let table = db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open vector table")?;

        Ok(Self { table, dimension })
    }

    /// 벡터 테이블 스키마 생성
    fn create_schema(dimension: usize) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("position", DataType::Int64, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    dimension as i32,
                ),
                false,
            ),
        ])
    }

    /// 레코드들을 Arrow RecordBatch로 변환
    fn records_to_batch(records: &[VectorRecord], dimension: usize) -> Result<RecordBatch> {
        if records.is_empty() {
            anyhow::bail!("Cannot create batch from empty records");
        }

        if let Some(bad) = records.iter().find(|r| r.embedding.len() != dimension) {
            anyhow::bail!(
                "Embedding for chunk {} has dimension {}, expected {}",
                bad.id,
                bad.embedding.len(),
                dimension
            );
        }

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        let positions: Vec<i64> = records.iter().map(|r| r.position).collect();
        let flat: Vec<f32> = records
            .iter()
            .flat_map(|r| r.embedding.iter().copied())
            .collect();

        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings = FixedSizeListArray::try_new(
            field,
            dimension as i32,
            Arc::new(Float32Array::from(flat)) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(Int64Array::from(positions)),
                Arc::new(embeddings),
            ],
        )
        .context("Failed to create RecordBatch")
    }

    /// 코사인 거리 기반 벡터 검색
    ///
    /// 유사도는 반환된 임베딩으로 다시 계산하므로 `_distance` 표현에 의존하지 않습니다.
    pub async fn search(&self, query: &[f32], limit: usize) -> Result<Vec<VectorHit>> {
        if query.len() != self.dimension {
            anyhow::bail!(
                "Query dimension {} does not match table dimension {}",
                query.len(),
                self.dimension
            );
        }

        let stream = self
            .table
            .vector_search(query.to_vec())
            .context("Failed to create vector search")?
            .distance_type(DistanceType::Cosine)
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = stream
            .try_collect()
            .await
            .context("Failed to read search results")?;

        let mut hits = Vec::new();

        for batch in batches {
            let ids = batch
                .column_by_name("id")
                .and_then(|c| c.as_any().downcast_ref::<StringArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing id column"))?;

            let positions = batch
                .column_by_name("position")
                .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
                .ok_or_else(|| anyhow::anyhow!("Missing position column"))?;

            let embeddings = batch
                .column_by_name("embedding")
                .and_then(|c| c.as_any().downcast_ref::<FixedSizeListArray>())
                .ok_or_else(|| anyhow::anyhow!("Missing embedding column"))?;

            for i in 0..batch.num_rows() {
                let row = embeddings.value(i);
                let values = row
                    .as_any()
                    .downcast_ref::<Float32Array>()
                    .ok_or_else(|| anyhow::anyhow!("Embedding values are not Float32"))?;

                hits.push(VectorHit {
                    id: ids.value(i).to_string(),
                    position: positions.value(i),
                    similarity: cosine_similarity(query, values.values()),
                });
            }
        }

        Ok(hits)
    }

    /// 벡터 개수 조회
    pub async fn count(&self) -> Result<usize> {
        self.table
            .count_rows(None)
            .await
            .context("Failed to count rows")
    }
}

/// LanceDB 연결
async fn connect(path: &Path) -> Result<Connection> {
    let path_str = path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

    lancedb::connect(path_str)
        .execute()
        .await
        .context("Failed to connect to LanceDB")
}

// ============================================================================
// Tests
// ============================================================================
