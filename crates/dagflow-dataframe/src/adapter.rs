//! The Dataframe Adapter: the one place node transforms touch a concrete
//! dataframe backend. Everything upstream (the graph model, the scheduler)
//! works against `DataFusion`'s lazy `DataFrame` so swapping the backend
//! later only touches this crate, the pattern `rde-tx`'s `SqlTransform`
//! already uses for ad hoc SQL steps.

use async_trait::async_trait;
use dagflow_core::{DagflowError, Result, Schema};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::dataframe::DataFrame;
use datafusion::prelude::{CsvReadOptions, NdJsonReadOptions, ParquetReadOptions, SessionContext};
use std::sync::Arc;
use tracing::warn;
use url::Url;

use crate::descriptor::{SinkDescriptor, SinkWriteMode, SourceDescriptor};
use crate::schema_convert::{arrow_to_schema, schema_to_arrow};

#[async_trait]
pub trait DataframeAdapter: Send + Sync {
    /// An empty frame with the given schema, used to seed a node that has
    /// no upstream input (e.g. `manual_input` with zero rows).
    async fn make_empty(&self, schema: &Schema) -> Result<DataFrame>;

    async fn lazy_read(&self, descriptor: &SourceDescriptor) -> Result<DataFrame>;

    async fn collect(&self, frame: DataFrame) -> Result<Vec<RecordBatch>>;

    async fn collect_schema(&self, frame: &DataFrame) -> Result<Schema>;

    async fn write(&self, frame: DataFrame, sink: &SinkDescriptor) -> Result<()>;

    /// Materialize only the first `n` rows — used for example-data preview
    /// and for the "does this produce any rows at all" probe the local
    /// executor runs before falling back off streaming.
    async fn sample_top_n(&self, frame: DataFrame, n: usize) -> Result<Vec<RecordBatch>>;
}

pub struct DataFusionAdapter {
    ctx: SessionContext,
}

impl Default for DataFusionAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DataFusionAdapter {
    pub fn new() -> Self {
        Self {
            ctx: SessionContext::new(),
        }
    }

    /// The session backing this adapter. Node execution registers scratch
    /// views on this same context so a `DataFrame` returned by `lazy_read`
    /// and a `DataFrame` built for a downstream transform resolve against
    /// one shared catalog.
    pub fn session_context(&self) -> &SessionContext {
        &self.ctx
    }

    fn register_cloud_store(&self, uri: &str) -> Result<Url> {
        let url = Url::parse(uri).map_err(|e| DagflowError::Other(e.into()))?;
        let (store, _path) =
            object_store::parse_url(&url).map_err(|e| DagflowError::Other(e.into()))?;
        self.ctx
            .runtime_env()
            .register_object_store(&url, Arc::new(store));
        Ok(url)
    }

    fn warn_if_append_unsupported(&self, write_mode: SinkWriteMode, sink_path: &str) {
        if write_mode == SinkWriteMode::Append {
            warn!(
                path = sink_path,
                "append write mode requested but this backend's writer always overwrites; \
                 treating as overwrite"
            );
        }
    }

    async fn read_inner(&self, descriptor: &SourceDescriptor) -> Result<DataFrame> {
        match descriptor {
            SourceDescriptor::Csv {
                path,
                has_header,
                delimiter,
            } => {
                let opts = CsvReadOptions::new()
                    .has_header(*has_header)
                    .delimiter(*delimiter);
                self.ctx
                    .read_csv(path, opts)
                    .await
                    .map_err(|e| DagflowError::Other(e.into()))
            }
            SourceDescriptor::Parquet { path } => self
                .ctx
                .read_parquet(path, ParquetReadOptions::default())
                .await
                .map_err(|e| DagflowError::Other(e.into())),
            SourceDescriptor::JsonNdjson { path } => self
                .ctx
                .read_json(path, NdJsonReadOptions::default())
                .await
                .map_err(|e| DagflowError::Other(e.into())),
            SourceDescriptor::Delta { .. } | SourceDescriptor::Iceberg { .. } => {
                Err(DagflowError::Other(anyhow::anyhow!(
                    "{} sources are not supported by this build's dataframe backend",
                    match descriptor {
                        SourceDescriptor::Delta { .. } => "delta",
                        _ => "iceberg",
                    }
                )))
            }
            SourceDescriptor::Excel { .. } => Err(DagflowError::Other(anyhow::anyhow!(
                "excel sources are not supported by this build's dataframe backend"
            ))),
            SourceDescriptor::CloudBlob { .. } => unreachable!("handled in lazy_read"),
        }
    }
}

#[async_trait]
impl DataframeAdapter for DataFusionAdapter {
    async fn make_empty(&self, schema: &Schema) -> Result<DataFrame> {
        let arrow_schema = schema_to_arrow(schema);
        self.ctx
            .read_batch(RecordBatch::new_empty(arrow_schema))
            .map_err(|e| DagflowError::Other(e.into()))
    }

    async fn lazy_read(&self, descriptor: &SourceDescriptor) -> Result<DataFrame> {
        if let SourceDescriptor::CloudBlob { uri, format } = descriptor {
            self.register_cloud_store(uri)?;
            return self.read_inner(format).await;
        }
        self.read_inner(descriptor).await
    }

    async fn collect(&self, frame: DataFrame) -> Result<Vec<RecordBatch>> {
        frame
            .collect()
            .await
            .map_err(|e| DagflowError::Other(e.into()))
    }

    async fn collect_schema(&self, frame: &DataFrame) -> Result<Schema> {
        Ok(arrow_to_schema(frame.schema().as_arrow()))
    }

    async fn write(&self, frame: DataFrame, sink: &SinkDescriptor) -> Result<()> {
        match sink {
            SinkDescriptor::Csv { path, write_mode } => {
                self.warn_if_append_unsupported(*write_mode, path);
                frame
                    .write_csv(path, Default::default(), None)
                    .await
                    .map_err(|e| DagflowError::Other(e.into()))?;
            }
            SinkDescriptor::Parquet { path, write_mode } => {
                self.warn_if_append_unsupported(*write_mode, path);
                frame
                    .write_parquet(path, Default::default(), None)
                    .await
                    .map_err(|e| DagflowError::Other(e.into()))?;
            }
            SinkDescriptor::JsonNdjson { path, write_mode } => {
                self.warn_if_append_unsupported(*write_mode, path);
                frame
                    .write_json(path, Default::default(), None)
                    .await
                    .map_err(|e| DagflowError::Other(e.into()))?;
            }
            SinkDescriptor::Delta { .. } | SinkDescriptor::Iceberg { .. } => {
                return Err(DagflowError::Other(anyhow::anyhow!(
                    "delta/iceberg sinks are not supported by this build's dataframe backend"
                )));
            }
            SinkDescriptor::CloudBlob {
                uri,
                write_mode,
                format,
            } => {
                self.register_cloud_store(uri)?;
                let inner = match format.as_ref() {
                    SinkDescriptor::Csv { path, .. } => {
                        SinkDescriptor::Csv { path: path.clone(), write_mode: *write_mode }
                    }
                    SinkDescriptor::Parquet { path, .. } => {
                        SinkDescriptor::Parquet { path: path.clone(), write_mode: *write_mode }
                    }
                    SinkDescriptor::JsonNdjson { path, .. } => SinkDescriptor::JsonNdjson {
                        path: path.clone(),
                        write_mode: *write_mode,
                    },
                    _ => {
                        return Err(DagflowError::Other(anyhow::anyhow!(
                            "unsupported cloud-blob sink format"
                        )))
                    }
                };
                return self.write(frame, &inner).await;
            }
        }
        Ok(())
    }

    async fn sample_top_n(&self, frame: DataFrame, n: usize) -> Result<Vec<RecordBatch>> {
        let limited = frame
            .limit(0, Some(n))
            .map_err(|e| DagflowError::Other(e.into()))?;
        self.collect(limited).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dagflow_core::{DType, SchemaField};
    use std::io::Write;

    fn write_csv_fixture() -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "id,name\n1,a\n2,b\n3,c").unwrap();
        file
    }

    #[tokio::test]
    async fn reads_csv_and_samples_rows() {
        let fixture = write_csv_fixture();
        let adapter = DataFusionAdapter::new();
        let descriptor = SourceDescriptor::Csv {
            path: fixture.path().to_str().unwrap().to_string(),
            has_header: true,
            delimiter: b',',
        };
        let frame = adapter.lazy_read(&descriptor).await.unwrap();
        let schema = adapter.collect_schema(&frame).await.unwrap();
        assert_eq!(schema.len(), 2);

        let batches = adapter.sample_top_n(frame, 2).await.unwrap();
        let total_rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total_rows, 2);
    }

    #[tokio::test]
    async fn make_empty_has_requested_schema_and_zero_rows() {
        let adapter = DataFusionAdapter::new();
        let schema = vec![
            SchemaField::new("id", DType::Int64),
            SchemaField::new("name", DType::Utf8),
        ];
        let frame = adapter.make_empty(&schema).await.unwrap();
        let batches = adapter.collect(frame).await.unwrap();
        let total_rows: usize = batches.iter().map(|b| b.num_rows()).sum();
        assert_eq!(total_rows, 0);
    }

    #[tokio::test]
    async fn delta_source_is_rejected_cleanly() {
        let adapter = DataFusionAdapter::new();
        let err = adapter
            .lazy_read(&SourceDescriptor::Delta {
                path: "/tmp/whatever".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DagflowError::Other(_)));
    }
}
