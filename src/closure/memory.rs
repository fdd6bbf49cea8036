use super::index::HierarchyIndex;
use super::types::{ClosureEdge, HierarchyError, NodeId, Relative};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Both directions of the closure relation. Every node has a self entry in
/// each map, so `up.len()` is the node count.
#[derive(Debug, Default)]
struct Edges {
    /// descendant -> { ancestor: depth }
    up: HashMap<NodeId, BTreeMap<NodeId, u32>>,
    /// ancestor -> { descendant: depth }
    down: HashMap<NodeId, BTreeMap<NodeId, u32>>,
}

impl Edges {
    fn contains(&self, node: NodeId) -> bool {
        self.up.contains_key(&node)
    }

    fn link(&mut self, ancestor: NodeId, descendant: NodeId, depth: u32) {
        self.down.entry(ancestor).or_default().insert(descendant, depth);
        self.up.entry(descendant).or_default().insert(ancestor, depth);
    }

    fn unlink(&mut self, ancestor: NodeId, descendant: NodeId) {
        if let Some(below) = self.down.get_mut(&ancestor) {
            below.remove(&descendant);
        }
        if let Some(above) = self.up.get_mut(&descendant) {
            above.remove(&ancestor);
        }
    }

    fn ancestors_of(&self, node: NodeId) -> Vec<(NodeId, u32)> {
        self.up
            .get(&node)
            .map(|m| m.iter().map(|(id, d)| (*id, *d)).collect())
            .unwrap_or_default()
    }

    fn descendants_of(&self, node: NodeId) -> Vec<(NodeId, u32)> {
        self.down
            .get(&node)
            .map(|m| m.iter().map(|(id, d)| (*id, *d)).collect())
            .unwrap_or_default()
    }
}

fn by_depth(mut relatives: Vec<(NodeId, u32)>) -> Vec<Relative> {
    relatives.sort_by_key(|(id, depth)| (*depth, *id));
    relatives.into_iter().map(Relative::from).collect()
}

/// Closure table held in process memory.
///
/// Useful for tests and for callers that rebuild the hierarchy at startup;
/// nothing is persisted.
#[derive(Debug, Default)]
pub struct MemoryClosureTable {
    edges: RwLock<Edges>,
}

impl MemoryClosureTable {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HierarchyIndex for MemoryClosureTable {
    async fn insert(&self, node: NodeId, parent: Option<NodeId>) -> Result<(), HierarchyError> {
        let mut edges = self.edges.write().await;

        if edges.contains(node) {
            return Err(HierarchyError::DuplicateNode(node));
        }
        let above = match parent {
            Some(p) if !edges.contains(p) => return Err(HierarchyError::InvalidParent(p)),
            Some(p) => edges.ancestors_of(p),
            None => Vec::new(),
        };

        edges.link(node, node, 0);
        for (ancestor, depth) in above {
            edges.link(ancestor, node, depth + 1);
        }

        tracing::debug!(node = %node, parent = ?parent, "Inserted node");
        Ok(())
    }

    async fn move_node(
        &self,
        node: NodeId,
        new_parent: Option<NodeId>,
    ) -> Result<(), HierarchyError> {
        let mut edges = self.edges.write().await;

        if !edges.contains(node) {
            return Err(HierarchyError::NodeNotFound(node));
        }
        let subtree = edges.descendants_of(node);
        if let Some(p) = new_parent {
            if !edges.contains(p) {
                return Err(HierarchyError::InvalidParent(p));
            }
            if subtree.iter().any(|(id, _)| *id == p) {
                return Err(HierarchyError::CycleDetected { node, parent: p });
            }
        }

        // Detach: drop every edge from an outside ancestor into the subtree.
        let outside: Vec<NodeId> = edges
            .ancestors_of(node)
            .into_iter()
            .filter(|(_, depth)| *depth > 0)
            .map(|(id, _)| id)
            .collect();
        for (member, _) in &subtree {
            for ancestor in &outside {
                edges.unlink(*ancestor, *member);
            }
        }

        // Attach: cross product of the new ancestor chain and the subtree.
        if let Some(p) = new_parent {
            for (ancestor, above) in edges.ancestors_of(p) {
                for (member, below) in &subtree {
                    edges.link(ancestor, *member, above + below + 1);
                }
            }
        }

        tracing::debug!(node = %node, parent = ?new_parent, "Moved node");
        Ok(())
    }

    async fn delete(&self, node: NodeId, cascade: bool) -> Result<Vec<NodeId>, HierarchyError> {
        let mut edges = self.edges.write().await;

        if !edges.contains(node) {
            return Err(HierarchyError::NodeNotFound(node));
        }

        let removed: Vec<NodeId> = if cascade {
            by_depth(edges.descendants_of(node))
                .into_iter()
                .map(|r| r.id)
                .collect()
        } else {
            let above: Vec<NodeId> = edges
                .ancestors_of(node)
                .into_iter()
                .filter(|(_, depth)| *depth > 0)
                .map(|(id, _)| id)
                .collect();
            let below: Vec<(NodeId, u32)> = edges
                .descendants_of(node)
                .into_iter()
                .filter(|(_, depth)| *depth > 0)
                .collect();
            // Paths that ran through `node` get one link shorter.
            for ancestor in &above {
                for (descendant, _) in &below {
                    let depth = edges.up.get(descendant).and_then(|m| m.get(ancestor)).copied();
                    if let Some(depth) = depth {
                        edges.link(*ancestor, *descendant, depth - 1);
                    }
                }
            }
            vec![node]
        };

        for id in &removed {
            for (ancestor, _) in edges.ancestors_of(*id) {
                edges.unlink(ancestor, *id);
            }
            for (descendant, _) in edges.descendants_of(*id) {
                edges.unlink(*id, descendant);
            }
            edges.up.remove(id);
            edges.down.remove(id);
        }

        tracing::debug!(node = %node, cascade, removed = removed.len(), "Deleted node");
        Ok(removed)
    }

    async fn ancestors(&self, node: NodeId) -> Result<Vec<Relative>, HierarchyError> {
        let edges = self.edges.read().await;
        if !edges.contains(node) {
            return Err(HierarchyError::NodeNotFound(node));
        }
        let above = edges
            .ancestors_of(node)
            .into_iter()
            .filter(|(_, depth)| *depth > 0)
            .collect();
        Ok(by_depth(above))
    }

    async fn descendants(&self, node: NodeId) -> Result<Vec<Relative>, HierarchyError> {
        let edges = self.edges.read().await;
        if !edges.contains(node) {
            return Err(HierarchyError::NodeNotFound(node));
        }
        let below = edges
            .descendants_of(node)
            .into_iter()
            .filter(|(_, depth)| *depth > 0)
            .collect();
        Ok(by_depth(below))
    }

    async fn is_ancestor(
        &self,
        ancestor: NodeId,
        descendant: NodeId,
    ) -> Result<bool, HierarchyError> {
        let edges = self.edges.read().await;
        Ok(edges
            .down
            .get(&ancestor)
            .and_then(|m| m.get(&descendant))
            .is_some_and(|depth| *depth > 0))
    }

    async fn contains(&self, node: NodeId) -> Result<bool, HierarchyError> {
        Ok(self.edges.read().await.contains(node))
    }

    async fn len(&self) -> Result<usize, HierarchyError> {
        Ok(self.edges.read().await.up.len())
    }

    async fn edges(&self) -> Result<Vec<ClosureEdge>, HierarchyError> {
        let edges = self.edges.read().await;
        let mut all: Vec<ClosureEdge> = edges
            .down
            .iter()
            .flat_map(|(ancestor, below)| {
                below
                    .iter()
                    .map(move |(descendant, depth)| ClosureEdge::new(*ancestor, *descendant, *depth))
            })
            .collect();
        all.sort_by_key(|e| (e.ancestor_id, e.depth, e.descendant_id));
        Ok(all)
    }

    async fn roots(&self) -> Result<Vec<NodeId>, HierarchyError> {
        let edges = self.edges.read().await;
        let mut roots: Vec<NodeId> = edges
            .up
            .iter()
            .filter(|(_, above)| above.len() == 1)
            .map(|(id, _)| *id)
            .collect();
        roots.sort();
        Ok(roots)
    }
}
