//! Places and notes stored next to their closure tables.

mod storage;
mod types;
mod view;


pub use storage::{CatalogStorage, NOTE_CLOSURE_TABLE, PLACE_CLOSURE_TABLE};
pub use types::CatalogError;
pub use view::{HierarchyKind, HierarchyView};
