//! Dataframe Adapter: the lazy-frame boundary between the graph model and
//! a concrete columnar execution backend (DataFusion/Arrow).

pub mod adapter;
pub mod descriptor;
pub mod schema_convert;

pub use adapter::{DataFusionAdapter, DataframeAdapter};
pub use descriptor::{SinkDescriptor, SinkWriteMode, SourceDescriptor};
