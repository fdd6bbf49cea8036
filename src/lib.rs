//! Closure-table hierarchies for places and notes.
//!
//! `closure` holds the hierarchy index itself (in memory and on SQLite),
//! `catalog` stores place and note records beside their closure tables.

pub mod catalog;
pub mod closure;
pub mod config;
pub mod db;
pub mod models;

// Re-export commonly used items
pub use catalog::{CatalogError, CatalogStorage, HierarchyKind, HierarchyView};
pub use closure::{
    ClosureEdge, HierarchyError, HierarchyIndex, MemoryClosureTable, NodeId, Relative,
    SqliteClosureTable,
};
pub use config::HubConfig;
