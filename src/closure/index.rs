use super::types::{ClosureEdge, HierarchyError, NodeId, Relative};
use async_trait::async_trait;

/// A forest of nodes with its ancestor relation materialized as
/// `(ancestor, descendant, depth)` edges.
///
/// Implementations keep the edge set equal to the transitive closure of the
/// parent relation after every call. Mutations are atomic: when they return
/// an error the edge set is exactly what it was before the call.
#[async_trait]
pub trait HierarchyIndex: Send + Sync {
    /// Add `node` as a root, or as a child of `parent`.
    async fn insert(&self, node: NodeId, parent: Option<NodeId>) -> Result<(), HierarchyError>;

    /// Re-attach `node` (with its whole subtree) under `new_parent`, or make
    /// it a root when `new_parent` is `None`.
    async fn move_node(
        &self,
        node: NodeId,
        new_parent: Option<NodeId>,
    ) -> Result<(), HierarchyError>;

    /// Remove `node`. With `cascade` its descendants go too; without it the
    /// direct children are re-attached to the former parent of `node`.
    ///
    /// Returns the removed ids, `node` first.
    async fn delete(&self, node: NodeId, cascade: bool) -> Result<Vec<NodeId>, HierarchyError>;

    /// Proper ancestors of `node`, immediate parent first.
    async fn ancestors(&self, node: NodeId) -> Result<Vec<Relative>, HierarchyError>;

    /// Proper descendants of `node` in breadth-first order (depth, then id).
    async fn descendants(&self, node: NodeId) -> Result<Vec<Relative>, HierarchyError>;

    /// True iff `descendant` sits strictly below `ancestor`.
    async fn is_ancestor(
        &self,
        ancestor: NodeId,
        descendant: NodeId,
    ) -> Result<bool, HierarchyError>;

    async fn contains(&self, node: NodeId) -> Result<bool, HierarchyError>;

    async fn len(&self) -> Result<usize, HierarchyError>;

    /// Every edge, ordered by ancestor, depth, descendant.
    async fn edges(&self) -> Result<Vec<ClosureEdge>, HierarchyError>;

    async fn is_empty(&self) -> Result<bool, HierarchyError> {
        Ok(self.len().await? == 0)
    }

    async fn parent(&self, node: NodeId) -> Result<Option<NodeId>, HierarchyError> {
        let ancestors = self.ancestors(node).await?;
        Ok(ancestors.first().map(|r| r.id))
    }

    async fn children(&self, node: NodeId) -> Result<Vec<NodeId>, HierarchyError> {
        let descendants = self.descendants(node).await?;
        Ok(descendants
            .into_iter()
            .take_while(|r| r.depth == 1)
            .map(|r| r.id)
            .collect())
    }

    async fn roots(&self) -> Result<Vec<NodeId>, HierarchyError> {
        let edges = self.edges().await?;
        let mut roots: Vec<NodeId> = edges
            .iter()
            .filter(|e| e.is_self_edge())
            .map(|e| e.descendant_id)
            .filter(|id| !edges.iter().any(|e| e.descendant_id == *id && e.depth == 1))
            .collect();
        roots.sort();
        Ok(roots)
    }
}
