//! Content-addressed run cache: one Parquet file per `Node.hash`, the same
//! write path the Dataframe Adapter already uses for output sinks. A node
//! whose hash is unchanged from a prior run and whose `cache_results` flag
//! is set reads its cached output back instead of re-running.

use std::path::PathBuf;

use dagflow_core::{DagflowError, Result};
use datafusion::dataframe::DataFrame;
use datafusion::prelude::{ParquetReadOptions, SessionContext};

#[derive(Clone)]
pub struct FsCache {
    base_dir: PathBuf,
}

impl FsCache {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Exposed so the worker's `/fetch` route can stream the cached blob
    /// directly without round-tripping through a `DataFrame`.
    pub fn path_for(&self, hash: u128) -> PathBuf {
        self.base_dir.join(format!("{hash:032x}.parquet"))
    }

    pub fn exists(&self, hash: u128) -> bool {
        self.path_for(hash).is_file()
    }

    pub async fn put(&self, frame: DataFrame, hash: u128) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir).map_err(|e| DagflowError::Other(e.into()))?;
        let path = self.path_for(hash);
        frame
            .write_parquet(
                path.to_str().expect("cache path is valid utf-8"),
                Default::default(),
                None,
            )
            .await
            .map_err(|e| DagflowError::Other(e.into()))?;
        Ok(())
    }

    pub async fn get(&self, ctx: &SessionContext, hash: u128) -> Result<DataFrame> {
        let path = self.path_for(hash);
        if !path.is_file() {
            return Err(DagflowError::MissingInputCache(format!("{hash:032x}")));
        }
        ctx.read_parquet(
            path.to_str().expect("cache path is valid utf-8"),
            ParquetReadOptions::default(),
        )
        .await
        .map_err(|e| DagflowError::Other(e.into()))
    }

    pub fn invalidate(&self, hash: u128) {
        let _ = std::fs::remove_file(self.path_for(hash));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datafusion::arrow::array::Int64Array;
    use datafusion::arrow::datatypes::{DataType, Field, Schema};
    use datafusion::arrow::record_batch::RecordBatch;
    use std::sync::Arc;

    fn sample_batch() -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, false)]));
        RecordBatch::try_new(schema, vec![Arc::new(Int64Array::from(vec![1, 2, 3]))]).unwrap()
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        let ctx = SessionContext::new();
        let frame = ctx.read_batch(sample_batch()).unwrap();

        assert!(!cache.exists(7));
        cache.put(frame, 7).await.unwrap();
        assert!(cache.exists(7));

        let restored = cache.get(&ctx, 7).await.unwrap();
        let batches = restored.collect().await.unwrap();
        let rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(rows, 3);
    }

    #[tokio::test]
    async fn missing_entry_is_reported_as_missing_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FsCache::new(dir.path());
        let ctx = SessionContext::new();
        let err = cache.get(&ctx, 123).await.unwrap_err();
        assert!(matches!(err, DagflowError::MissingInputCache(_)));
    }
}
