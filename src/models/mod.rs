//! Records stored by the catalog and the closure-decorated views of them.

mod account;
mod note;
mod place;

pub use account::{AccountPlaceRole, AccountPlaceRoleType};
pub use note::{ChatMembership, NewNote, Note, NoteType, NoteWithClosure};
pub use place::{slugify, NewPlace, OsmType, Place, PlaceLevel, PlaceWithClosure};

use crate::closure::{ClosureEdge, NodeId};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A record joined with one row of its hierarchy's closure table.
///
/// Serializes flat: the record's own fields followed by `ancestor_id`,
/// `descendant_id` and `depth`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct WithClosure<T> {
    #[serde(flatten)]
    pub record: T,
    pub ancestor_id: NodeId,
    pub descendant_id: NodeId,
    pub depth: u32,
}

impl<T> WithClosure<T> {
    pub fn new(record: T, edge: ClosureEdge) -> Self {
        Self {
            record,
            ancestor_id: edge.ancestor_id,
            descendant_id: edge.descendant_id,
            depth: edge.depth,
        }
    }

    pub fn edge(&self) -> ClosureEdge {
        ClosureEdge::new(self.ancestor_id, self.descendant_id, self.depth)
    }
}
