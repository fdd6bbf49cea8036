use super::index::HierarchyIndex;
use super::types::{ClosureEdge, HierarchyError, NodeId, Relative};
use async_trait::async_trait;
use regex::Regex;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::Row;
use std::sync::OnceLock;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

fn table_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern"))
}

/// Closure table names end up spliced into SQL, so only plain identifiers pass.
pub fn validate_table_name(table: &str) -> Result<(), HierarchyError> {
    if table_name_pattern().is_match(table) {
        Ok(())
    } else {
        Err(HierarchyError::InvalidTableName(table.to_string()))
    }
}

fn depth_from(raw: i64) -> Result<u32, HierarchyError> {
    u32::try_from(raw).map_err(|_| HierarchyError::Storage(format!("Invalid depth in closure table: {}", raw)))
}

fn relative_from_row(row: &SqliteRow, id_column: &str) -> Result<Relative, HierarchyError> {
    let id: i64 = row.try_get(id_column)?;
    let depth: i64 = row.try_get("depth")?;
    Ok(Relative::new(NodeId::from(id), depth_from(depth)?))
}

/// SQLite-backed closure table.
///
/// One instance owns one table `(ancestor_id, descendant_id, depth)` keyed by
/// `(ancestor_id, descendant_id)` and indexed on each column. Several tables
/// can share a pool; the catalog keeps `place_closure` and `note_closure`
/// side by side.
///
/// Mutations hold the write half of `gate` for the whole transaction and
/// reads hold the read half, so no caller in this process ever sees a
/// half-applied move or delete.
pub struct SqliteClosureTable {
    pool: SqlitePool,
    table: String,
    gate: RwLock<()>,
}

impl SqliteClosureTable {
    /// Bind to `table` on `pool`, creating the table and its indexes if needed
    pub async fn new(pool: SqlitePool, table: &str) -> Result<Self, HierarchyError> {
        validate_table_name(table)?;

        let storage = Self {
            pool,
            table: table.to_string(),
            gate: RwLock::new(()),
        };
        storage.run_migrations().await?;

        Ok(storage)
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Exclusive access for callers composing their own transaction
    pub(crate) async fn write_gate(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().await
    }

    pub(crate) async fn read_gate(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().await
    }

    async fn run_migrations(&self) -> Result<(), HierarchyError> {
        let t = &self.table;
        let ddl = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {t} (
                ancestor_id INTEGER NOT NULL,
                descendant_id INTEGER NOT NULL,
                depth INTEGER NOT NULL CHECK (depth >= 0),
                PRIMARY KEY (ancestor_id, descendant_id)
            );

            CREATE INDEX IF NOT EXISTS idx_{t}_ancestor ON {t}(ancestor_id);
            CREATE INDEX IF NOT EXISTS idx_{t}_descendant ON {t}(descendant_id);
            "#
        );

        sqlx::query(&ddl)
            .execute(&self.pool)
            .await
            .map_err(|e| format!("Failed to create closure table {}: {}", t, e))?;

        tracing::info!(table = %t, "Closure table ready");
        Ok(())
    }

    // ========================================================================
    // Connection-level operations
    //
    // These run on whatever connection they are handed (usually an open
    // transaction) and take no lock. Callers hold the gate.
    // ========================================================================

    pub(crate) async fn contains_in(
        &self,
        conn: &mut SqliteConnection,
        node: NodeId,
    ) -> Result<bool, HierarchyError> {
        let sql = format!(
            "SELECT 1 AS found FROM {} WHERE ancestor_id = ? AND descendant_id = ? AND depth = 0",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(node.get())
            .bind(node.get())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.is_some())
    }

    async fn require_in(&self, conn: &mut SqliteConnection, node: NodeId) -> Result<(), HierarchyError> {
        if self.contains_in(conn, node).await? {
            Ok(())
        } else {
            Err(HierarchyError::NodeNotFound(node))
        }
    }

    pub(crate) async fn is_ancestor_in(
        &self,
        conn: &mut SqliteConnection,
        ancestor: NodeId,
        descendant: NodeId,
    ) -> Result<bool, HierarchyError> {
        let sql = format!(
            "SELECT 1 AS found FROM {} WHERE ancestor_id = ? AND descendant_id = ? AND depth > 0",
            self.table
        );
        let row = sqlx::query(&sql)
            .bind(ancestor.get())
            .bind(descendant.get())
            .fetch_optional(&mut *conn)
            .await?;
        Ok(row.is_some())
    }

    pub(crate) async fn insert_in(
        &self,
        conn: &mut SqliteConnection,
        node: NodeId,
        parent: Option<NodeId>,
    ) -> Result<(), HierarchyError> {
        if self.contains_in(conn, node).await? {
            return Err(HierarchyError::DuplicateNode(node));
        }
        if let Some(p) = parent {
            if !self.contains_in(conn, p).await? {
                return Err(HierarchyError::InvalidParent(p));
            }
        }

        let t = &self.table;
        sqlx::query(&format!(
            "INSERT INTO {t} (ancestor_id, descendant_id, depth) VALUES (?, ?, 0)"
        ))
        .bind(node.get())
        .bind(node.get())
        .execute(&mut *conn)
        .await?;

        if let Some(p) = parent {
            sqlx::query(&format!(
                "INSERT INTO {t} (ancestor_id, descendant_id, depth)
                 SELECT ancestor_id, ?, depth + 1 FROM {t} WHERE descendant_id = ?"
            ))
            .bind(node.get())
            .bind(p.get())
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    pub(crate) async fn move_in(
        &self,
        conn: &mut SqliteConnection,
        node: NodeId,
        new_parent: Option<NodeId>,
    ) -> Result<(), HierarchyError> {
        self.require_in(conn, node).await?;
        if let Some(p) = new_parent {
            if !self.contains_in(conn, p).await? {
                return Err(HierarchyError::InvalidParent(p));
            }
            if p == node || self.is_ancestor_in(conn, node, p).await? {
                return Err(HierarchyError::CycleDetected { node, parent: p });
            }
        }

        let t = &self.table;

        // Detach the subtree from every ancestor above `node`.
        sqlx::query(&format!(
            "DELETE FROM {t}
             WHERE descendant_id IN (SELECT descendant_id FROM {t} WHERE ancestor_id = ?)
               AND ancestor_id IN (SELECT ancestor_id FROM {t} WHERE descendant_id = ? AND depth > 0)"
        ))
        .bind(node.get())
        .bind(node.get())
        .execute(&mut *conn)
        .await?;

        // Graft it under the new ancestor chain.
        if let Some(p) = new_parent {
            sqlx::query(&format!(
                "INSERT INTO {t} (ancestor_id, descendant_id, depth)
                 SELECT above.ancestor_id, below.descendant_id, above.depth + below.depth + 1
                 FROM {t} AS above
                 CROSS JOIN {t} AS below
                 WHERE above.descendant_id = ? AND below.ancestor_id = ?"
            ))
            .bind(p.get())
            .bind(node.get())
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    pub(crate) async fn delete_in(
        &self,
        conn: &mut SqliteConnection,
        node: NodeId,
        cascade: bool,
    ) -> Result<Vec<NodeId>, HierarchyError> {
        self.require_in(conn, node).await?;
        let t = &self.table;

        if cascade {
            let mut removed = vec![node];
            removed.extend(self.descendants_in(conn, node).await?.into_iter().map(|r| r.id));

            sqlx::query(&format!(
                "DELETE FROM {t}
                 WHERE descendant_id IN (SELECT descendant_id FROM {t} WHERE ancestor_id = ?)"
            ))
            .bind(node.get())
            .execute(&mut *conn)
            .await?;

            return Ok(removed);
        }

        // Paths from the ancestors of `node` to its descendants lose one link.
        sqlx::query(&format!(
            "UPDATE {t} SET depth = depth - 1
             WHERE ancestor_id IN (SELECT ancestor_id FROM {t} WHERE descendant_id = ? AND depth > 0)
               AND descendant_id IN (SELECT descendant_id FROM {t} WHERE ancestor_id = ? AND depth > 0)"
        ))
        .bind(node.get())
        .bind(node.get())
        .execute(&mut *conn)
        .await?;

        sqlx::query(&format!(
            "DELETE FROM {t} WHERE ancestor_id = ? OR descendant_id = ?"
        ))
        .bind(node.get())
        .bind(node.get())
        .execute(&mut *conn)
        .await?;

        Ok(vec![node])
    }

    pub(crate) async fn ancestors_in(
        &self,
        conn: &mut SqliteConnection,
        node: NodeId,
    ) -> Result<Vec<Relative>, HierarchyError> {
        self.require_in(conn, node).await?;
        let sql = format!(
            "SELECT ancestor_id, depth FROM {}
             WHERE descendant_id = ? AND depth > 0
             ORDER BY depth",
            self.table
        );
        let rows = sqlx::query(&sql).bind(node.get()).fetch_all(&mut *conn).await?;
        rows.iter().map(|row| relative_from_row(row, "ancestor_id")).collect()
    }

    pub(crate) async fn descendants_in(
        &self,
        conn: &mut SqliteConnection,
        node: NodeId,
    ) -> Result<Vec<Relative>, HierarchyError> {
        self.require_in(conn, node).await?;
        let sql = format!(
            "SELECT descendant_id, depth FROM {}
             WHERE ancestor_id = ? AND depth > 0
             ORDER BY depth, descendant_id",
            self.table
        );
        let rows = sqlx::query(&sql).bind(node.get()).fetch_all(&mut *conn).await?;
        rows.iter().map(|row| relative_from_row(row, "descendant_id")).collect()
    }
}

#[async_trait]
impl HierarchyIndex for SqliteClosureTable {
    async fn insert(&self, node: NodeId, parent: Option<NodeId>) -> Result<(), HierarchyError> {
        let _guard = self.write_gate().await;
        let mut tx = self.pool.begin().await?;
        self.insert_in(&mut tx, node, parent).await?;
        tx.commit().await?;

        tracing::debug!(table = %self.table, node = %node, parent = ?parent, "Inserted node");
        Ok(())
    }

    async fn move_node(
        &self,
        node: NodeId,
        new_parent: Option<NodeId>,
    ) -> Result<(), HierarchyError> {
        let _guard = self.write_gate().await;
        let mut tx = self.pool.begin().await?;
        self.move_in(&mut tx, node, new_parent).await?;
        tx.commit().await?;

        tracing::debug!(table = %self.table, node = %node, parent = ?new_parent, "Moved node");
        Ok(())
    }

    async fn delete(&self, node: NodeId, cascade: bool) -> Result<Vec<NodeId>, HierarchyError> {
        let _guard = self.write_gate().await;
        let mut tx = self.pool.begin().await?;
        let removed = self.delete_in(&mut tx, node, cascade).await?;
        tx.commit().await?;

        tracing::debug!(
            table = %self.table,
            node = %node,
            cascade,
            removed = removed.len(),
            "Deleted node"
        );
        Ok(removed)
    }

    async fn ancestors(&self, node: NodeId) -> Result<Vec<Relative>, HierarchyError> {
        let _guard = self.read_gate().await;
        let mut conn = self.pool.acquire().await?;
        self.ancestors_in(&mut conn, node).await
    }

    async fn descendants(&self, node: NodeId) -> Result<Vec<Relative>, HierarchyError> {
        let _guard = self.read_gate().await;
        let mut conn = self.pool.acquire().await?;
        self.descendants_in(&mut conn, node).await
    }

    async fn is_ancestor(
        &self,
        ancestor: NodeId,
        descendant: NodeId,
    ) -> Result<bool, HierarchyError> {
        let _guard = self.read_gate().await;
        let mut conn = self.pool.acquire().await?;
        self.is_ancestor_in(&mut conn, ancestor, descendant).await
    }

    async fn contains(&self, node: NodeId) -> Result<bool, HierarchyError> {
        let _guard = self.read_gate().await;
        let mut conn = self.pool.acquire().await?;
        self.contains_in(&mut conn, node).await
    }

    async fn len(&self) -> Result<usize, HierarchyError> {
        let _guard = self.read_gate().await;
        let sql = format!("SELECT COUNT(*) AS count FROM {} WHERE depth = 0", self.table);
        let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("count")?;
        Ok(count as usize)
    }

    async fn edges(&self) -> Result<Vec<ClosureEdge>, HierarchyError> {
        let _guard = self.read_gate().await;
        let sql = format!(
            "SELECT ancestor_id, descendant_id, depth FROM {}
             ORDER BY ancestor_id, depth, descendant_id",
            self.table
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> Result<ClosureEdge, HierarchyError> {
                let ancestor: i64 = row.try_get("ancestor_id")?;
                let descendant: i64 = row.try_get("descendant_id")?;
                let depth: i64 = row.try_get("depth")?;
                Ok(ClosureEdge::new(
                    NodeId::from(ancestor),
                    NodeId::from(descendant),
                    depth_from(depth)?,
                ))
            })
            .collect()
    }

    async fn children(&self, node: NodeId) -> Result<Vec<NodeId>, HierarchyError> {
        let _guard = self.read_gate().await;
        let mut conn = self.pool.acquire().await?;
        self.require_in(&mut conn, node).await?;

        let sql = format!(
            "SELECT descendant_id FROM {} WHERE ancestor_id = ? AND depth = 1 ORDER BY descendant_id",
            self.table
        );
        let rows = sqlx::query(&sql).bind(node.get()).fetch_all(&mut *conn).await?;
        rows.iter()
            .map(|row| -> Result<NodeId, HierarchyError> {
                Ok(NodeId::from(row.try_get::<i64, _>("descendant_id")?))
            })
            .collect()
    }

    async fn roots(&self) -> Result<Vec<NodeId>, HierarchyError> {
        let _guard = self.read_gate().await;
        let t = &self.table;
        let sql = format!(
            "SELECT node.descendant_id FROM {t} AS node
             WHERE node.depth = 0
               AND NOT EXISTS (
                   SELECT 1 FROM {t} AS up
                   WHERE up.descendant_id = node.descendant_id AND up.depth = 1
               )
             ORDER BY node.descendant_id"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| -> Result<NodeId, HierarchyError> {
                Ok(NodeId::from(row.try_get::<i64, _>("descendant_id")?))
            })
            .collect()
    }
}
