//! Random operation sequences against both closure tables, checked against a
//! plain parent map.

use hierarchy::closure::{integrity, ClosureEdge, HierarchyIndex, MemoryClosureTable, NodeId, SqliteClosureTable};
use hierarchy::db;
use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use tempfile::tempdir;

#[derive(Clone, Debug)]
enum PropOp {
    Insert(i64, Option<i64>),
    Move(i64, Option<i64>),
    Delete(i64, bool),
}

fn op_strategy() -> impl Strategy<Value = PropOp> {
    let node = 0i64..10;
    prop_oneof![
        3 => (node.clone(), prop::option::of(node.clone())).prop_map(|(n, p)| PropOp::Insert(n, p)),
        2 => (node.clone(), prop::option::of(node.clone())).prop_map(|(n, p)| PropOp::Move(n, p)),
        1 => (node, any::<bool>()).prop_map(|(n, c)| PropOp::Delete(n, c)),
    ]
}

/// node -> parent
#[derive(Debug, Default)]
struct Reference {
    parents: BTreeMap<i64, Option<i64>>,
}

impl Reference {
    fn is_below(&self, node: i64, ancestor: i64) -> bool {
        let mut cur = self.parents.get(&node).copied().flatten();
        while let Some(p) = cur {
            if p == ancestor {
                return true;
            }
            cur = self.parents.get(&p).copied().flatten();
        }
        false
    }

    fn subtree(&self, node: i64) -> BTreeSet<i64> {
        self.parents
            .keys()
            .copied()
            .filter(|n| *n == node || self.is_below(*n, node))
            .collect()
    }

    /// Apply `op`, returning the removed ids on success and `None` when the
    /// operation must be rejected.
    fn apply(&mut self, op: &PropOp) -> Option<BTreeSet<i64>> {
        match *op {
            PropOp::Insert(n, p) => {
                if self.parents.contains_key(&n) || p.is_some_and(|p| !self.parents.contains_key(&p)) {
                    return None;
                }
                self.parents.insert(n, p);
                Some(BTreeSet::new())
            }
            PropOp::Move(n, p) => {
                if !self.parents.contains_key(&n) {
                    return None;
                }
                if let Some(p) = p {
                    if !self.parents.contains_key(&p) || p == n || self.is_below(p, n) {
                        return None;
                    }
                }
                self.parents.insert(n, p);
                Some(BTreeSet::new())
            }
            PropOp::Delete(n, cascade) => {
                let parent = *self.parents.get(&n)?;
                if cascade {
                    let gone = self.subtree(n);
                    self.parents.retain(|k, _| !gone.contains(k));
                    Some(gone)
                } else {
                    self.parents.remove(&n);
                    for p in self.parents.values_mut() {
                        if *p == Some(n) {
                            *p = parent;
                        }
                    }
                    Some(BTreeSet::from([n]))
                }
            }
        }
    }

    fn closure(&self) -> BTreeSet<ClosureEdge> {
        let mut edges = BTreeSet::new();
        for &node in self.parents.keys() {
            let mut depth = 0;
            let mut cur = Some(node);
            while let Some(a) = cur {
                edges.insert(ClosureEdge::new(NodeId::new(a), NodeId::new(node), depth));
                depth += 1;
                cur = self.parents.get(&a).copied().flatten();
            }
        }
        edges
    }
}

async fn run_ops(index: &dyn HierarchyIndex, ops: &[PropOp]) -> Result<(), TestCaseError> {
    let mut reference = Reference::default();

    for op in ops {
        let before: BTreeSet<ClosureEdge> = index.edges().await.unwrap().into_iter().collect();
        let expected = reference.apply(op);

        let outcome = match *op {
            PropOp::Insert(n, p) => index
                .insert(NodeId::new(n), p.map(NodeId::new))
                .await
                .map(|_| BTreeSet::new()),
            PropOp::Move(n, p) => index
                .move_node(NodeId::new(n), p.map(NodeId::new))
                .await
                .map(|_| BTreeSet::new()),
            PropOp::Delete(n, cascade) => index
                .delete(NodeId::new(n), cascade)
                .await
                .map(|removed| removed.into_iter().map(i64::from).collect()),
        };

        let after: BTreeSet<ClosureEdge> = index.edges().await.unwrap().into_iter().collect();
        match expected {
            Some(removed) => {
                prop_assert_eq!(outcome.ok(), Some(removed), "{:?} should succeed", op);
            }
            None => {
                prop_assert!(outcome.is_err(), "{:?} should be rejected", op);
                prop_assert_eq!(&after, &before, "rejected {:?} changed the table", op);
            }
        }

        prop_assert_eq!(&after, &reference.closure(), "closure mismatch after {:?}", op);
        let edges: Vec<ClosureEdge> = after.into_iter().collect();
        prop_assert!(integrity::check(&edges).is_empty());
        prop_assert_eq!(index.len().await.unwrap(), reference.parents.len());
    }
    Ok(())
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]
    #[test]
    fn memory_table_matches_parent_map(ops in prop::collection::vec(op_strategy(), 1..40)) {
        runtime().block_on(async {
            let index = MemoryClosureTable::new();
            run_ops(&index, &ops).await
        })?;
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]
    #[test]
    fn sqlite_table_matches_parent_map(ops in prop::collection::vec(op_strategy(), 1..30)) {
        runtime().block_on(async {
            let dir = tempdir().expect("tempdir");
            let pool = db::connect(&dir.path().join("closure_prop.db"), 2).await.expect("connect");
            let index = SqliteClosureTable::new(pool, "prop_closure").await.expect("table");
            run_ops(&index, &ops).await
        })?;
    }
}
