//! The closed node-type registry.
//!
//! Source-language open polymorphism is replaced with a table keyed by node
//! type name. Adding a new node type is a new `NodeTypeId` variant plus one
//! `NodeTemplate` entry in `registry()` — there is no plugin mechanism
//! (arbitrary user-supplied operators are an explicit Non-goal).

use std::collections::HashMap;
use std::sync::OnceLock;

/// How many input slots a node type accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputArity {
    Zero,
    One,
    Two,
    /// "multi": any number of `main` inputs, order-insensitive for hashing.
    AtLeastOne,
}

/// Whether remote execution is recommended for this node type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformType {
    Narrow,
    Wide,
}

macro_rules! node_type_ids {
    ($($variant:ident => $tag:literal),+ $(,)?) => {
        /// One variant per entry in the closed node-type registry.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum NodeTypeId {
            $($variant),+
        }

        impl NodeTypeId {
            pub fn tag(&self) -> &'static str {
                match self {
                    $(NodeTypeId::$variant => $tag),+
                }
            }

            pub fn from_tag(tag: &str) -> Option<Self> {
                match tag {
                    $($tag => Some(NodeTypeId::$variant),)+
                    _ => None,
                }
            }

            pub fn all() -> &'static [NodeTypeId] {
                &[$(NodeTypeId::$variant),+]
            }
        }
    };
}

node_type_ids! {
    ManualInput => "manual_input",
    Read => "read",
    Output => "output",
    Select => "select",
    Filter => "filter",
    Formula => "formula",
    Sort => "sort",
    Sample => "sample",
    Unique => "unique",
    RecordId => "record_id",
    RecordCount => "record_count",
    GroupBy => "group_by",
    Pivot => "pivot",
    Unpivot => "unpivot",
    Join => "join",
    CrossJoin => "cross_join",
    FuzzyMatch => "fuzzy_match",
    TextToRows => "text_to_rows",
    GraphSolver => "graph_solver",
    Union => "union",
    PolarsCode => "polars_code",
    PythonScript => "python_script",
    ExploreData => "explore_data",
    ExternalSource => "external_source",
}

/// Static metadata for a node type: arity, start/wide flags, and whether a
/// default-settings factory exists. Transform execution, settings
/// generation/repair, and schema prediction are implemented by the
/// consuming crates (`dagflow-exec`, the `setting_repair` module here, and
/// `dagflow-dataframe`) keyed off this same `NodeTypeId`.
#[derive(Debug, Clone, Copy)]
pub struct NodeTemplate {
    pub type_id: NodeTypeId,
    pub input_arity: InputArity,
    pub can_be_start: bool,
    pub is_wide: bool,
    pub transform_type: TransformType,
    /// True when this node type references upstream column names by value
    /// and therefore needs a setting generator/updator.
    pub has_setting_repair: bool,
}

impl NodeTemplate {
    /// Number of filled input slots required for `is_correct` to hold,
    /// independent of the `AtLeastOne` (multi) case which only requires >=1.
    pub fn required_inputs(&self) -> usize {
        match self.input_arity {
            InputArity::Zero => 0,
            InputArity::One => 1,
            InputArity::Two => 2,
            InputArity::AtLeastOne => 1,
        }
    }

    pub fn is_multi(&self) -> bool {
        matches!(self.input_arity, InputArity::AtLeastOne)
    }
}

fn t(
    type_id: NodeTypeId,
    input_arity: InputArity,
    can_be_start: bool,
    is_wide: bool,
    has_setting_repair: bool,
) -> NodeTemplate {
    NodeTemplate {
        type_id,
        input_arity,
        can_be_start,
        is_wide,
        transform_type: if is_wide {
            TransformType::Wide
        } else {
            TransformType::Narrow
        },
        has_setting_repair,
    }
}

/// The registry table. Built once, behind a
/// `OnceLock`, so lookups are a plain map index rather than a match.
pub fn registry() -> &'static HashMap<NodeTypeId, NodeTemplate> {
    static REGISTRY: OnceLock<HashMap<NodeTypeId, NodeTemplate>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        use InputArity::*;
        use NodeTypeId::*;
        let entries = [
            t(ManualInput, Zero, true, false, false),
            t(Read, Zero, true, false, false),
            t(ExternalSource, Zero, true, true, false),
            t(Output, One, false, false, false),
            t(Select, One, false, false, true),
            t(Filter, One, false, false, false),
            t(Formula, One, false, false, false),
            t(Sort, One, false, false, false),
            t(Sample, One, false, false, false),
            t(Unique, One, false, false, false),
            t(RecordId, One, false, false, false),
            t(RecordCount, One, false, false, false),
            t(GroupBy, One, false, true, true),
            t(Pivot, One, false, true, true),
            t(Unpivot, One, false, false, true),
            t(Join, Two, false, true, true),
            t(CrossJoin, Two, false, true, true),
            t(FuzzyMatch, Two, false, true, true),
            t(TextToRows, One, false, false, false),
            t(GraphSolver, AtLeastOne, false, true, false),
            t(Union, AtLeastOne, false, false, false),
            t(PolarsCode, AtLeastOne, false, true, false),
            t(PythonScript, AtLeastOne, false, true, false),
            t(ExploreData, One, false, false, false),
        ];
        entries.into_iter().map(|e| (e.type_id, e)).collect()
    })
}

pub fn template_for(type_id: NodeTypeId) -> NodeTemplate {
    *registry()
        .get(&type_id)
        .expect("registry covers every NodeTypeId variant")
}
