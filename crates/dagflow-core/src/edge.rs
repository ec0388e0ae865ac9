//! Edges and input slots. A node's inputs are addressed by
//! `SlotKind` rather than positional index: `Main` covers both "the one
//! input" of narrow node types and each member of a multi-input
//! (`AtLeastOne`) node type's input set, `Left`/`Right` cover the two-input
//! node types (`join`, `cross_join`, `fuzzy_match`).

use crate::ids::NodeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotKind {
    Main,
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub slot: SlotKind,
}

impl Edge {
    pub fn new(from: NodeId, to: NodeId, slot: SlotKind) -> Self {
        Self { from, to, slot }
    }
}
