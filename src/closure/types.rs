use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Core Types
// ============================================================================

/// Identifier of a node in a hierarchy (a place id, a note id, ...)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct NodeId(i64);

impl NodeId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw row id
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for NodeId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<NodeId> for i64 {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl FromStr for NodeId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(Self)
    }
}

/// One row of a closure table: `descendant` is reachable from `ancestor`
/// by a path of exactly `depth` parent links. Every node has `(id, id, 0)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
pub struct ClosureEdge {
    pub ancestor_id: NodeId,
    pub descendant_id: NodeId,
    pub depth: u32,
}

impl ClosureEdge {
    pub fn new(ancestor_id: NodeId, descendant_id: NodeId, depth: u32) -> Self {
        Self {
            ancestor_id,
            descendant_id,
            depth,
        }
    }

    pub fn self_edge(id: NodeId) -> Self {
        Self::new(id, id, 0)
    }

    pub fn is_self_edge(&self) -> bool {
        self.depth == 0
    }
}

/// A node related to the queried node, with its distance from it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Relative {
    pub id: NodeId,
    pub depth: u32,
}

impl Relative {
    pub fn new(id: NodeId, depth: u32) -> Self {
        Self { id, depth }
    }
}

impl From<(NodeId, u32)> for Relative {
    fn from((id, depth): (NodeId, u32)) -> Self {
        Self { id, depth }
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors reported by hierarchy operations. A failed mutation never leaves
/// partial edges behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HierarchyError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    #[error("Invalid parent: {0} does not exist")]
    InvalidParent(NodeId),

    #[error("Cycle detected: {parent} is {node} or one of its descendants")]
    CycleDetected { node: NodeId, parent: NodeId },

    #[error("Node already exists: {0}")]
    DuplicateNode(NodeId),

    #[error("Invalid closure table name: {0}")]
    InvalidTableName(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for HierarchyError {
    fn from(e: sqlx::Error) -> Self {
        HierarchyError::Storage(e.to_string())
    }
}

impl From<String> for HierarchyError {
    fn from(s: String) -> Self {
        HierarchyError::Storage(s)
    }
}
