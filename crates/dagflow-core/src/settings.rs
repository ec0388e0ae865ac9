//! Per-node-type settings, stored as a tagged sum ("Settings as a tagged
//! sum"). Serialization is by tag + payload via serde's externally-tagged
//! enum representation, which is also what the flow-file format
//! persists.

use crate::schema::DType;
use serde::{Deserialize, Serialize};

/// A single column reference/rename used by every node type that repairs
/// its settings against an upstream schema: `select`, `join`,
/// `cross_join`, `pivot`, `unpivot`, `group_by`, `fuzzy_match`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectInput {
    pub old_name: String,
    pub new_name: String,
    pub is_available: bool,
    pub keep: bool,
    #[serde(default)]
    pub join_key: bool,
}

impl SelectInput {
    pub fn new(old_name: impl Into<String>) -> Self {
        let old_name = old_name.into();
        Self {
            new_name: old_name.clone(),
            old_name,
            is_available: true,
            keep: true,
            join_key: false,
        }
    }
}

/// A side's (left or right) column-selection list, used by `join`,
/// `cross_join`, and `pivot`/`group_by` output mapping.
pub type SelectList = Vec<SelectInput>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinKeyMapping {
    pub left_col: String,
    pub right_col: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinHow {
    Inner,
    Left,
    Right,
    Outer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggFn {
    Sum,
    Mean,
    Min,
    Max,
    Count,
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupByAgg {
    pub column: String,
    pub agg: AggFn,
    pub output_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuzzyMatchMapping {
    pub left_col: String,
    pub right_col: String,
    pub threshold_score: u32, // fixed-point percent * 100, keeps the type Eq
}

/// The per-node-type settings payload, tagged by node type (/// `setting_input`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node_type")]
pub enum SettingsPayload {
    Placeholder,

    ManualInput {
        raw_data: Vec<serde_json::Map<String, serde_json::Value>>,
    },
    Read {
        source: String,
        format: String,
    },
    Output {
        sink: String,
        format: String,
        write_mode: WriteMode,
    },
    Select {
        select: SelectList,
    },
    Filter {
        predicate: String,
    },
    Formula {
        output_column: String,
        expression: String,
    },
    Sort {
        by: Vec<String>,
        descending: Vec<bool>,
    },
    Sample {
        n: usize,
    },
    Unique {
        subset: Vec<String>,
    },
    RecordId {
        output_column: String,
    },
    RecordCount {
        output_column: String,
    },
    GroupBy {
        group_by: Vec<String>,
        aggregations: Vec<GroupByAgg>,
    },
    Pivot {
        index: Vec<String>,
        pivot_column: String,
        value_column: String,
        agg: AggFn,
    },
    Unpivot {
        index: Vec<String>,
        value_columns: Vec<String>,
    },
    Join {
        left_select: SelectList,
        right_select: SelectList,
        join_mapping: Vec<JoinKeyMapping>,
        how: JoinHow,
    },
    CrossJoin {
        left_select: SelectList,
        right_select: SelectList,
    },
    FuzzyMatch {
        left_select: SelectList,
        right_select: SelectList,
        mapping: Vec<FuzzyMatchMapping>,
    },
    TextToRows {
        column: String,
        delimiter: String,
    },
    GraphSolver {
        from_column: String,
        to_column: String,
        output_column: String,
    },
    Union {},
    PolarsCode {
        code: String,
    },
    PythonScript {
        code: String,
        kernel_id: Option<String>,
        input_schema: Vec<(String, DType)>,
        packages: Vec<String>,
    },
    ExploreData {},
    ExternalSource {
        descriptor: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteMode {
    Overwrite,
    Append,
}

impl SettingsPayload {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, SettingsPayload::Placeholder)
    }
}
