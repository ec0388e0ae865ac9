//! Source/sink descriptors for the formats a flow-file can reference.
//! `Csv`/`Parquet`/`JsonNdjson` are executed directly against DataFusion;
//! `Delta`/`Iceberg`/`Excel` are recognized shapes in the wire format but
//! have no in-process reader in this build (none of the corpus this engine
//! grew out of depends on a delta-rs/iceberg/calamine-equivalent crate) —
//! `DataFusionAdapter` returns `DagflowError::Other` for them rather than
//! silently misreading the file.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SourceDescriptor {
    Csv {
        path: String,
        has_header: bool,
        delimiter: u8,
    },
    Parquet {
        path: String,
    },
    JsonNdjson {
        path: String,
    },
    Delta {
        path: String,
    },
    Iceberg {
        catalog: String,
        table: String,
    },
    Excel {
        path: String,
        sheet: Option<String>,
    },
    /// `s3://`, `gs://`, or `https://...googleapis.com/...` prefixed path to
    /// one of the formats above, resolved through `object_store`.
    CloudBlob {
        uri: String,
        format: Box<SourceDescriptor>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkWriteMode {
    Overwrite,
    Append,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum SinkDescriptor {
    Csv {
        path: String,
        write_mode: SinkWriteMode,
    },
    Parquet {
        path: String,
        write_mode: SinkWriteMode,
    },
    JsonNdjson {
        path: String,
        write_mode: SinkWriteMode,
    },
    Delta {
        path: String,
        write_mode: SinkWriteMode,
    },
    Iceberg {
        catalog: String,
        table: String,
        write_mode: SinkWriteMode,
    },
    CloudBlob {
        uri: String,
        write_mode: SinkWriteMode,
        format: Box<SinkDescriptor>,
    },
}
