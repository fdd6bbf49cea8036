use crate::closure::{HierarchyError, NodeId};

/// Error type for catalog operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CatalogError {
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: NodeId },

    #[error("Account {account_id} is not a member of chat {note_id}")]
    MembershipNotFound { account_id: i64, note_id: NodeId },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl CatalogError {
    pub(crate) fn place_not_found(id: NodeId) -> Self {
        CatalogError::NotFound { kind: "Place", id }
    }

    pub(crate) fn note_not_found(id: NodeId) -> Self {
        CatalogError::NotFound { kind: "Note", id }
    }
}

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db) = e.as_database_error() {
            if db.message().contains("UNIQUE constraint failed") {
                return CatalogError::Conflict(db.message().to_string());
            }
        }
        CatalogError::Storage(e.to_string())
    }
}

impl From<String> for CatalogError {
    fn from(s: String) -> Self {
        CatalogError::Storage(s)
    }
}
