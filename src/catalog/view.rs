use crate::closure::{ClosureEdge, HierarchyError, HierarchyIndex, NodeId, Relative, SqliteClosureTable};

/// Which of the catalog's hierarchies an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HierarchyKind {
    Place,
    Note,
}

/// Read-only access to one of the catalog's closure tables.
///
/// Structural changes go through `CatalogStorage` so the record table and
/// the closure table never drift apart.
#[derive(Clone, Copy)]
pub struct HierarchyView<'a> {
    table: &'a SqliteClosureTable,
}

impl<'a> HierarchyView<'a> {
    pub(crate) fn new(table: &'a SqliteClosureTable) -> Self {
        Self { table }
    }

    pub fn table_name(&self) -> &str {
        self.table.table()
    }

    pub async fn ancestors(&self, node: NodeId) -> Result<Vec<Relative>, HierarchyError> {
        self.table.ancestors(node).await
    }

    pub async fn descendants(&self, node: NodeId) -> Result<Vec<Relative>, HierarchyError> {
        self.table.descendants(node).await
    }

    pub async fn is_ancestor(&self, ancestor: NodeId, descendant: NodeId) -> Result<bool, HierarchyError> {
        self.table.is_ancestor(ancestor, descendant).await
    }

    pub async fn contains(&self, node: NodeId) -> Result<bool, HierarchyError> {
        self.table.contains(node).await
    }

    pub async fn len(&self) -> Result<usize, HierarchyError> {
        self.table.len().await
    }

    pub async fn is_empty(&self) -> Result<bool, HierarchyError> {
        self.table.is_empty().await
    }

    pub async fn edges(&self) -> Result<Vec<ClosureEdge>, HierarchyError> {
        self.table.edges().await
    }

    pub async fn parent(&self, node: NodeId) -> Result<Option<NodeId>, HierarchyError> {
        self.table.parent(node).await
    }

    pub async fn children(&self, node: NodeId) -> Result<Vec<NodeId>, HierarchyError> {
        self.table.children(node).await
    }

    pub async fn roots(&self) -> Result<Vec<NodeId>, HierarchyError> {
        self.table.roots().await
    }
}
