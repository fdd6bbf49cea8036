mod index;
pub mod integrity;
mod memory;
mod storage;
mod types;


pub use index::HierarchyIndex;
pub use integrity::Violation;
pub use memory::MemoryClosureTable;
pub use storage::{validate_table_name, SqliteClosureTable};
pub use types::{ClosureEdge, HierarchyError, NodeId, Relative};
