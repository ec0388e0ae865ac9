use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier for a node within a single graph. Promises and committed
/// settings share the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub i64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a `Graph` (flow). Distinct from `GraphUuid`: this is the
/// user/catalog-facing id, the uuid is the internal salt used in hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowId(pub String);

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-graph random salt folded into every node hash so that two
/// otherwise-identical graphs never collide in a shared cache store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphUuid(pub uuid::Uuid);

impl GraphUuid {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for GraphUuid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GraphUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
