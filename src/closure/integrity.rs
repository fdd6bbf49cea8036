//! Offline consistency check for a closure edge set.
//!
//! The depth-1 edges define the forest; everything else must be exactly its
//! transitive closure.

use super::types::{ClosureEdge, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Violation {
    MissingSelfEdge {
        node: NodeId,
    },
    MultipleParents {
        node: NodeId,
        parents: Vec<NodeId>,
    },
    MissingEdge {
        ancestor: NodeId,
        descendant: NodeId,
        depth: u32,
    },
    UnexpectedEdge {
        ancestor: NodeId,
        descendant: NodeId,
        depth: u32,
    },
    WrongDepth {
        ancestor: NodeId,
        descendant: NodeId,
        expected: u32,
        actual: u32,
    },
}

/// Compare `edges` against the closure implied by their depth-1 subset.
/// An empty result means the set is consistent.
pub fn check(edges: &[ClosureEdge]) -> Vec<Violation> {
    let mut violations = Vec::new();

    let actual: BTreeMap<(NodeId, NodeId), u32> = edges
        .iter()
        .map(|e| ((e.ancestor_id, e.descendant_id), e.depth))
        .collect();

    let nodes: BTreeSet<NodeId> = edges
        .iter()
        .flat_map(|e| [e.ancestor_id, e.descendant_id])
        .collect();

    let mut parents: BTreeMap<NodeId, Vec<NodeId>> = BTreeMap::new();
    for e in edges.iter().filter(|e| e.depth == 1 && e.ancestor_id != e.descendant_id) {
        parents.entry(e.descendant_id).or_default().push(e.ancestor_id);
    }
    for (node, ps) in &mut parents {
        if ps.len() > 1 {
            ps.sort();
            violations.push(Violation::MultipleParents {
                node: *node,
                parents: ps.clone(),
            });
        }
    }

    let mut expected: BTreeMap<(NodeId, NodeId), u32> = BTreeMap::new();
    for node in &nodes {
        expected.insert((*node, *node), 0);

        let mut seen = HashSet::from([*node]);
        let mut current = *node;
        let mut depth = 0;
        while let Some(parent) = parents.get(&current).and_then(|ps| ps.first()).copied() {
            if !seen.insert(parent) {
                break;
            }
            depth += 1;
            expected.insert((parent, *node), depth);
            current = parent;
        }
    }

    for ((ancestor, descendant), depth) in &expected {
        match actual.get(&(*ancestor, *descendant)) {
            None if ancestor == descendant => {
                violations.push(Violation::MissingSelfEdge { node: *ancestor });
            }
            None => violations.push(Violation::MissingEdge {
                ancestor: *ancestor,
                descendant: *descendant,
                depth: *depth,
            }),
            Some(actual_depth) if actual_depth != depth => {
                violations.push(Violation::WrongDepth {
                    ancestor: *ancestor,
                    descendant: *descendant,
                    expected: *depth,
                    actual: *actual_depth,
                })
            }
            Some(_) => {}
        }
    }

    for ((ancestor, descendant), depth) in &actual {
        if !expected.contains_key(&(*ancestor, *descendant)) {
            violations.push(Violation::UnexpectedEdge {
                ancestor: *ancestor,
                descendant: *descendant,
                depth: *depth,
            });
        }
    }

    violations
}
