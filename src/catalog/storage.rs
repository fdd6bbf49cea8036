use super::types::CatalogError;
use super::view::{HierarchyKind, HierarchyView};
use crate::closure::{ClosureEdge, NodeId, SqliteClosureTable};
use crate::config::HubConfig;
use crate::db;
use crate::models::{
    AccountPlaceRole, AccountPlaceRoleType, ChatMembership, NewNote, NewPlace, Note, NoteType,
    NoteWithClosure, OsmType, Place, PlaceLevel, PlaceWithClosure, WithClosure, slugify,
};
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::Row;
use tokio::sync::Mutex;

/// Closure table holding place ancestry (region > city > neighborhood)
pub const PLACE_CLOSURE_TABLE: &str = "place_closure";

/// Closure table holding note threads (a reply sits below the note it answers)
pub const NOTE_CLOSURE_TABLE: &str = "note_closure";

const PLACE_COLUMNS: &str = "p.id, p.name, p.slug, p.level, p.description, p.lat, p.lng, \
     p.osm_id, p.osm_type, p.osm_ref, p.country_id, p.region_id, p.active, p.hashtags, \
     p.created_at, p.updated_at";

const NOTE_COLUMNS: &str =
    "n.id, n.account_id, n.event_id, n.note_type, n.reposted_note_id, n.created_at";

const ROLE_COLUMNS: &str = "r.account_id, r.place_id, r.role, r.ambassador_request";

const MEMBERSHIP_COLUMNS: &str = "m.id, m.account_id, m.note_id, m.last_read_note_id";

/// SQLite storage for places and notes together with their hierarchies.
///
/// Each record table has a closure table beside it on the same pool, so a
/// record write and the matching closure write commit in one transaction.
/// Place operations serialize on the place hierarchy's gate and note
/// operations on the note hierarchy's gate. Every write also holds `writer`:
/// SQLite allows one writer per database, and a deferred transaction that
/// read before another one committed cannot upgrade. The closure tables are
/// only handed out as read-only views so nothing bypasses it.
pub struct CatalogStorage {
    pool: SqlitePool,
    places: SqliteClosureTable,
    notes: SqliteClosureTable,
    writer: Mutex<()>,
}

impl CatalogStorage {
    /// Open the database named by `config` and run migrations
    pub async fn new(config: &HubConfig) -> Result<Self, CatalogError> {
        let pool = db::connect(&config.db_path, config.max_connections).await?;
        Self::with_pool(pool).await
    }

    pub async fn with_pool(pool: SqlitePool) -> Result<Self, CatalogError> {
        Self::run_migrations(&pool).await?;

        let places = SqliteClosureTable::new(pool.clone(), PLACE_CLOSURE_TABLE).await?;
        let notes = SqliteClosureTable::new(pool.clone(), NOTE_CLOSURE_TABLE).await?;

        Ok(Self {
            pool,
            places,
            notes,
            writer: Mutex::new(()),
        })
    }

    /// Run database migrations
    async fn run_migrations(pool: &SqlitePool) -> Result<(), CatalogError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS places (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                slug TEXT NOT NULL,
                level TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                lat REAL NOT NULL DEFAULT 0,
                lng REAL NOT NULL DEFAULT 0,
                osm_id INTEGER,
                osm_type TEXT,
                osm_ref TEXT UNIQUE,
                country_id INTEGER,
                region_id INTEGER,
                active INTEGER NOT NULL DEFAULT 1,
                hashtags TEXT NOT NULL DEFAULT '[]',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS notes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                event_id INTEGER NOT NULL,
                note_type INTEGER NOT NULL,
                reposted_note_id INTEGER,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (reposted_note_id) REFERENCES notes(id) ON DELETE SET NULL
            );

            CREATE TABLE IF NOT EXISTS account_place_roles (
                account_id INTEGER NOT NULL,
                place_id INTEGER NOT NULL,
                role INTEGER NOT NULL,
                ambassador_request INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (account_id, place_id),
                FOREIGN KEY (place_id) REFERENCES places(id) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS chat_memberships (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                account_id INTEGER NOT NULL,
                note_id INTEGER NOT NULL,
                last_read_note_id INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE (account_id, note_id),
                FOREIGN KEY (note_id) REFERENCES notes(id) ON DELETE CASCADE,
                FOREIGN KEY (last_read_note_id) REFERENCES notes(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_places_name ON places(name);
            CREATE INDEX IF NOT EXISTS idx_places_slug ON places(slug);
            CREATE INDEX IF NOT EXISTS idx_places_country ON places(country_id);
            CREATE INDEX IF NOT EXISTS idx_places_region ON places(region_id);
            CREATE INDEX IF NOT EXISTS idx_notes_account ON notes(account_id);
            CREATE INDEX IF NOT EXISTS idx_notes_event ON notes(event_id);
            CREATE INDEX IF NOT EXISTS idx_notes_reposted ON notes(reposted_note_id);
            CREATE INDEX IF NOT EXISTS idx_account_place_roles_place ON account_place_roles(place_id);
            CREATE INDEX IF NOT EXISTS idx_chat_memberships_note ON chat_memberships(note_id);
            CREATE INDEX IF NOT EXISTS idx_chat_memberships_account ON chat_memberships(account_id);
            "#,
        )
        .execute(pool)
        .await
        .map_err(|e| format!("Failed to run catalog migrations: {}", e))?;

        tracing::info!("Catalog schema ready");
        Ok(())
    }

    /// Closure table behind the place hierarchy
    pub fn place_hierarchy(&self) -> HierarchyView<'_> {
        HierarchyView::new(&self.places)
    }

    /// Closure table behind the note threads
    pub fn note_hierarchy(&self) -> HierarchyView<'_> {
        HierarchyView::new(&self.notes)
    }

    pub fn hierarchy(&self, kind: HierarchyKind) -> HierarchyView<'_> {
        HierarchyView::new(self.table(kind))
    }

    fn table(&self, kind: HierarchyKind) -> &SqliteClosureTable {
        match kind {
            HierarchyKind::Place => &self.places,
            HierarchyKind::Note => &self.notes,
        }
    }

    /// Give a stored record that has no closure rows its place in the
    /// hierarchy. Records made through `place_create`/`note_create` already
    /// have them, so linking those is `DuplicateNode`.
    pub async fn link(
        &self,
        kind: HierarchyKind,
        id: NodeId,
        parent: Option<NodeId>,
    ) -> Result<(), CatalogError> {
        let table = self.table(kind);

        let _writer = self.writer.lock().await;
        let _gate = table.write_gate().await;
        let mut tx = self.pool.begin().await?;

        match kind {
            HierarchyKind::Place => self.place_row(&mut tx, id).await.map(|_| ())?,
            HierarchyKind::Note => self.note_row(&mut tx, id).await.map(|_| ())?,
        }
        table.insert_in(&mut tx, id, parent).await?;

        tx.commit().await?;

        tracing::debug!(table = %table.table(), node = %id, parent = ?parent, "Linked record");
        Ok(())
    }

    // ========================================================================
    // Place Operations
    // ========================================================================

    /// Create a place, optionally below `parent`
    pub async fn place_create(
        &self,
        new: NewPlace,
        parent: Option<NodeId>,
    ) -> Result<Place, CatalogError> {
        let now = current_timestamp();
        let slug = slugify(&new.name);
        let hashtags = serde_json::to_string(&new.hashtags)
            .map_err(|e| format!("Failed to serialize hashtags: {}", e))?;

        let _writer = self.writer.lock().await;
        let _gate = self.places.write_gate().await;
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO places (name, slug, level, description, lat, lng, osm_id, osm_type, osm_ref,
                                 country_id, region_id, active, hashtags, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 1, ?, ?, ?)",
        )
        .bind(&new.name)
        .bind(&slug)
        .bind(new.level.as_str())
        .bind(&new.description)
        .bind(new.lat)
        .bind(new.lng)
        .bind(new.osm_id)
        .bind(new.osm_type.map(|t| t.as_str()))
        .bind(&new.osm_ref)
        .bind(new.country_id)
        .bind(new.region_id)
        .bind(&hashtags)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let id = NodeId::from(result.last_insert_rowid());
        self.places.insert_in(&mut tx, id, parent).await?;

        tx.commit().await?;

        tracing::debug!(place = %id, parent = ?parent, name = %new.name, "Created place");

        Ok(Place {
            id,
            name: new.name,
            slug,
            level: new.level,
            description: new.description,
            lat: new.lat,
            lng: new.lng,
            osm_id: new.osm_id,
            osm_type: new.osm_type,
            osm_ref: new.osm_ref,
            country_id: new.country_id,
            region_id: new.region_id,
            active: true,
            hashtags: new.hashtags,
            descendants: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Get a place with its `descendants` populated, nearest first
    pub async fn place_get(&self, id: NodeId) -> Result<Place, CatalogError> {
        let _gate = self.places.read_gate().await;
        let mut conn = self.pool.acquire().await?;

        let mut place = self.place_row(&mut conn, id).await?;

        let sql = format!(
            "SELECT {PLACE_COLUMNS}, c.ancestor_id, c.descendant_id, c.depth
             FROM {PLACE_CLOSURE_TABLE} c
             JOIN places p ON p.id = c.descendant_id
             WHERE c.ancestor_id = ? AND c.depth > 0
             ORDER BY c.depth, p.id"
        );
        let rows = sqlx::query(&sql).bind(id.get()).fetch_all(&mut *conn).await?;
        place.descendants = rows
            .iter()
            .map(place_with_closure_from_row)
            .collect::<Result<_, _>>()?;

        Ok(place)
    }

    /// Find a place by its OpenStreetMap reference
    pub async fn place_get_by_osm_ref(&self, osm_ref: &str) -> Result<Option<Place>, CatalogError> {
        let sql = format!("SELECT {PLACE_COLUMNS} FROM places p WHERE p.osm_ref = ?");
        let row = sqlx::query(&sql)
            .bind(osm_ref)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(place_from_row).transpose()
    }

    /// Places above `id`, immediate parent first
    pub async fn place_ancestors(&self, id: NodeId) -> Result<Vec<PlaceWithClosure>, CatalogError> {
        let _gate = self.places.read_gate().await;
        let mut conn = self.pool.acquire().await?;
        self.place_row(&mut conn, id).await?;

        let sql = format!(
            "SELECT {PLACE_COLUMNS}, c.ancestor_id, c.descendant_id, c.depth
             FROM {PLACE_CLOSURE_TABLE} c
             JOIN places p ON p.id = c.ancestor_id
             WHERE c.descendant_id = ? AND c.depth > 0
             ORDER BY c.depth"
        );
        let rows = sqlx::query(&sql).bind(id.get()).fetch_all(&mut *conn).await?;
        rows.iter().map(place_with_closure_from_row).collect()
    }

    /// Direct children of `id`, by id
    pub async fn place_children(&self, id: NodeId) -> Result<Vec<Place>, CatalogError> {
        let _gate = self.places.read_gate().await;
        let mut conn = self.pool.acquire().await?;
        self.place_row(&mut conn, id).await?;

        let sql = format!(
            "SELECT {PLACE_COLUMNS}
             FROM {PLACE_CLOSURE_TABLE} c
             JOIN places p ON p.id = c.descendant_id
             WHERE c.ancestor_id = ? AND c.depth = 1
             ORDER BY p.id"
        );
        let rows = sqlx::query(&sql).bind(id.get()).fetch_all(&mut *conn).await?;
        rows.iter().map(place_from_row).collect()
    }

    /// Places with no parent, by id
    pub async fn place_roots(&self) -> Result<Vec<Place>, CatalogError> {
        let _gate = self.places.read_gate().await;

        let sql = format!(
            "SELECT {PLACE_COLUMNS}
             FROM places p
             WHERE NOT EXISTS (
                 SELECT 1 FROM {PLACE_CLOSURE_TABLE} c
                 WHERE c.descendant_id = p.id AND c.depth = 1
             )
             ORDER BY p.id"
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(place_from_row).collect()
    }

    /// Re-attach a place (and everything below it) under `new_parent`
    pub async fn place_move(
        &self,
        id: NodeId,
        new_parent: Option<NodeId>,
    ) -> Result<(), CatalogError> {
        let _writer = self.writer.lock().await;
        let _gate = self.places.write_gate().await;
        let mut tx = self.pool.begin().await?;

        self.place_row(&mut tx, id).await?;
        self.places.move_in(&mut tx, id, new_parent).await?;

        sqlx::query("UPDATE places SET updated_at = ? WHERE id = ?")
            .bind(current_timestamp())
            .bind(id.get())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::debug!(place = %id, parent = ?new_parent, "Moved place");
        Ok(())
    }

    /// Delete a place. See `HierarchyIndex::delete` for `cascade`.
    ///
    /// Returns the ids of every removed place.
    pub async fn place_delete(&self, id: NodeId, cascade: bool) -> Result<Vec<NodeId>, CatalogError> {
        let _writer = self.writer.lock().await;
        let _gate = self.places.write_gate().await;
        let mut tx = self.pool.begin().await?;

        self.place_row(&mut tx, id).await?;
        let removed = self.places.delete_in(&mut tx, id, cascade).await?;

        for place in &removed {
            sqlx::query("DELETE FROM places WHERE id = ?")
                .bind(place.get())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(place = %id, cascade, removed = removed.len(), "Deleted place");
        Ok(removed)
    }

    async fn place_row(&self, conn: &mut SqliteConnection, id: NodeId) -> Result<Place, CatalogError> {
        let sql = format!("SELECT {PLACE_COLUMNS} FROM places p WHERE p.id = ?");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| CatalogError::place_not_found(id))?;
        place_from_row(&row)
    }

    // ========================================================================
    // Place Roles
    // ========================================================================

    /// Give `account_id` a role on a place, replacing any previous role there
    pub async fn place_role_assign(
        &self,
        account_id: i64,
        place_id: NodeId,
        role: AccountPlaceRoleType,
        ambassador_request: bool,
    ) -> Result<AccountPlaceRole, CatalogError> {
        let _writer = self.writer.lock().await;
        let _gate = self.places.read_gate().await;
        let mut conn = self.pool.acquire().await?;
        self.place_row(&mut conn, place_id).await?;

        sqlx::query(
            "INSERT INTO account_place_roles (account_id, place_id, role, ambassador_request)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (account_id, place_id)
             DO UPDATE SET role = excluded.role, ambassador_request = excluded.ambassador_request",
        )
        .bind(account_id)
        .bind(place_id.get())
        .bind(role.code())
        .bind(ambassador_request)
        .execute(&mut *conn)
        .await?;

        Ok(AccountPlaceRole {
            account_id,
            place_id,
            role,
            ambassador_request,
        })
    }

    /// Roles held on `place_id` or on any place above it.
    ///
    /// Each role carries the closure edge from the place it was granted on
    /// down to `place_id`; the nearest grants come first.
    pub async fn place_roles_covering(
        &self,
        place_id: NodeId,
    ) -> Result<Vec<WithClosure<AccountPlaceRole>>, CatalogError> {
        let _gate = self.places.read_gate().await;
        let mut conn = self.pool.acquire().await?;
        self.place_row(&mut conn, place_id).await?;

        let sql = format!(
            "SELECT {ROLE_COLUMNS}, c.ancestor_id, c.descendant_id, c.depth
             FROM {PLACE_CLOSURE_TABLE} c
             JOIN account_place_roles r ON r.place_id = c.ancestor_id
             WHERE c.descendant_id = ?
             ORDER BY c.depth, r.account_id"
        );
        let rows = sqlx::query(&sql)
            .bind(place_id.get())
            .fetch_all(&mut *conn)
            .await?;

        rows.iter()
            .map(|row| -> Result<_, CatalogError> {
                Ok(WithClosure::new(role_from_row(row)?, edge_from_row(row)?))
            })
            .collect()
    }

    /// Ambassadors responsible for `place_id`, nearest first
    pub async fn place_ambassadors(&self, place_id: NodeId) -> Result<Vec<AccountPlaceRole>, CatalogError> {
        let covering = self.place_roles_covering(place_id).await?;
        Ok(covering
            .into_iter()
            .map(|r| r.record)
            .filter(|r| r.role == AccountPlaceRoleType::Ambassador)
            .collect())
    }

    // ========================================================================
    // Note Operations
    // ========================================================================

    /// Create a note, optionally as a reply below `parent`
    pub async fn note_create(&self, new: NewNote, parent: Option<NodeId>) -> Result<Note, CatalogError> {
        let now = current_timestamp();

        let _writer = self.writer.lock().await;
        let _gate = self.notes.write_gate().await;
        let mut tx = self.pool.begin().await?;

        if let Some(reposted) = new.reposted_note_id {
            self.note_row(&mut tx, reposted).await?;
        }

        let result = sqlx::query(
            "INSERT INTO notes (account_id, event_id, note_type, reposted_note_id, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(new.account_id)
        .bind(new.event_id)
        .bind(new.note_type.code())
        .bind(new.reposted_note_id.map(|n| n.get()))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let id = NodeId::from(result.last_insert_rowid());
        self.notes.insert_in(&mut tx, id, parent).await?;

        tx.commit().await?;

        tracing::debug!(note = %id, parent = ?parent, note_type = ?new.note_type, "Created note");

        Ok(Note {
            id,
            account_id: new.account_id,
            event_id: new.event_id,
            note_type: new.note_type,
            reposted_note_id: new.reposted_note_id,
            descendants: Vec::new(),
            created_at: now,
        })
    }

    /// Get a note with every reply below it in `descendants`
    pub async fn note_get(&self, id: NodeId) -> Result<Note, CatalogError> {
        let _gate = self.notes.read_gate().await;
        let mut conn = self.pool.acquire().await?;

        let mut note = self.note_row(&mut conn, id).await?;

        let sql = format!(
            "SELECT {NOTE_COLUMNS}, c.ancestor_id, c.descendant_id, c.depth
             FROM {NOTE_CLOSURE_TABLE} c
             JOIN notes n ON n.id = c.descendant_id
             WHERE c.ancestor_id = ? AND c.depth > 0
             ORDER BY c.depth, n.id"
        );
        let rows = sqlx::query(&sql).bind(id.get()).fetch_all(&mut *conn).await?;
        note.descendants = rows
            .iter()
            .map(note_with_closure_from_row)
            .collect::<Result<_, _>>()?;

        Ok(note)
    }

    /// Notes above `id` in its thread, the one it replies to first
    pub async fn note_ancestors(&self, id: NodeId) -> Result<Vec<NoteWithClosure>, CatalogError> {
        let _gate = self.notes.read_gate().await;
        let mut conn = self.pool.acquire().await?;
        self.note_row(&mut conn, id).await?;

        let sql = format!(
            "SELECT {NOTE_COLUMNS}, c.ancestor_id, c.descendant_id, c.depth
             FROM {NOTE_CLOSURE_TABLE} c
             JOIN notes n ON n.id = c.ancestor_id
             WHERE c.descendant_id = ? AND c.depth > 0
             ORDER BY c.depth"
        );
        let rows = sqlx::query(&sql).bind(id.get()).fetch_all(&mut *conn).await?;
        rows.iter().map(note_with_closure_from_row).collect()
    }

    /// Re-attach a note (and its replies) under `new_parent`
    pub async fn note_move(&self, id: NodeId, new_parent: Option<NodeId>) -> Result<(), CatalogError> {
        let _writer = self.writer.lock().await;
        let _gate = self.notes.write_gate().await;
        let mut tx = self.pool.begin().await?;

        self.note_row(&mut tx, id).await?;
        self.notes.move_in(&mut tx, id, new_parent).await?;

        tx.commit().await?;

        tracing::debug!(note = %id, parent = ?new_parent, "Moved note");
        Ok(())
    }

    /// Delete a note. Chat memberships on removed notes go with them.
    pub async fn note_delete(&self, id: NodeId, cascade: bool) -> Result<Vec<NodeId>, CatalogError> {
        let _writer = self.writer.lock().await;
        let _gate = self.notes.write_gate().await;
        let mut tx = self.pool.begin().await?;

        self.note_row(&mut tx, id).await?;
        let removed = self.notes.delete_in(&mut tx, id, cascade).await?;

        for note in &removed {
            sqlx::query("DELETE FROM notes WHERE id = ?")
                .bind(note.get())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(note = %id, cascade, removed = removed.len(), "Deleted note");
        Ok(removed)
    }

    async fn note_row(&self, conn: &mut SqliteConnection, id: NodeId) -> Result<Note, CatalogError> {
        let sql = format!("SELECT {NOTE_COLUMNS} FROM notes n WHERE n.id = ?");
        let row = sqlx::query(&sql)
            .bind(id.get())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| CatalogError::note_not_found(id))?;
        note_from_row(&row)
    }

    // ========================================================================
    // Chat Memberships
    // ========================================================================

    /// Join `account_id` to a chat note. Joining twice returns the existing
    /// membership.
    pub async fn chat_join(&self, account_id: i64, note_id: NodeId) -> Result<ChatMembership, CatalogError> {
        let _writer = self.writer.lock().await;
        let _gate = self.notes.read_gate().await;
        let mut conn = self.pool.acquire().await?;

        let note = self.note_row(&mut conn, note_id).await?;
        if !note.note_type.is_chat() {
            return Err(CatalogError::InvalidRecord(format!(
                "Note {} is a {:?} note, not a chat",
                note_id, note.note_type
            )));
        }

        let now = current_timestamp();
        sqlx::query(
            "INSERT OR IGNORE INTO chat_memberships (account_id, note_id, created_at, updated_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(account_id)
        .bind(note_id.get())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        self.membership_row(&mut conn, account_id, note_id).await
    }

    /// Record that `account_id` has read chat `note_id` up to `read_note_id`,
    /// which must be the chat note itself or a reply somewhere below it.
    pub async fn chat_mark_read(
        &self,
        account_id: i64,
        note_id: NodeId,
        read_note_id: NodeId,
    ) -> Result<ChatMembership, CatalogError> {
        let _writer = self.writer.lock().await;
        let _gate = self.notes.read_gate().await;
        let mut conn = self.pool.acquire().await?;

        self.membership_row(&mut conn, account_id, note_id).await?;

        let in_thread = read_note_id == note_id
            || self.notes.is_ancestor_in(&mut conn, note_id, read_note_id).await?;
        if !in_thread {
            return Err(CatalogError::InvalidRecord(format!(
                "Note {} is not part of chat {}",
                read_note_id, note_id
            )));
        }

        sqlx::query(
            "UPDATE chat_memberships SET last_read_note_id = ?, updated_at = ?
             WHERE account_id = ? AND note_id = ?",
        )
        .bind(read_note_id.get())
        .bind(current_timestamp())
        .bind(account_id)
        .bind(note_id.get())
        .execute(&mut *conn)
        .await?;

        self.membership_row(&mut conn, account_id, note_id).await
    }

    /// Members of a chat note, by account
    pub async fn chat_members(&self, note_id: NodeId) -> Result<Vec<ChatMembership>, CatalogError> {
        let _gate = self.notes.read_gate().await;
        let mut conn = self.pool.acquire().await?;
        self.note_row(&mut conn, note_id).await?;

        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM chat_memberships m
             WHERE m.note_id = ?
             ORDER BY m.account_id"
        );
        let rows = sqlx::query(&sql)
            .bind(note_id.get())
            .fetch_all(&mut *conn)
            .await?;
        rows.iter().map(membership_from_row).collect()
    }

    async fn membership_row(
        &self,
        conn: &mut SqliteConnection,
        account_id: i64,
        note_id: NodeId,
    ) -> Result<ChatMembership, CatalogError> {
        let sql = format!(
            "SELECT {MEMBERSHIP_COLUMNS} FROM chat_memberships m
             WHERE m.account_id = ? AND m.note_id = ?"
        );
        let row = sqlx::query(&sql)
            .bind(account_id)
            .bind(note_id.get())
            .fetch_optional(&mut *conn)
            .await?
            .ok_or(CatalogError::MembershipNotFound { account_id, note_id })?;
        membership_from_row(&row)
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn place_from_row(row: &SqliteRow) -> Result<Place, CatalogError> {
    let level: String = row.try_get("level")?;
    let level = PlaceLevel::parse(&level)
        .ok_or_else(|| CatalogError::InvalidRecord(format!("Unknown place level: {}", level)))?;

    let osm_type: Option<String> = row.try_get("osm_type")?;
    let osm_type = osm_type
        .map(|t| {
            OsmType::parse(&t)
                .ok_or_else(|| CatalogError::InvalidRecord(format!("Unknown OSM type: {}", t)))
        })
        .transpose()?;

    let hashtags: String = row.try_get("hashtags")?;
    let hashtags: Vec<String> = serde_json::from_str(&hashtags)
        .map_err(|e| CatalogError::InvalidRecord(format!("Invalid hashtags: {}", e)))?;

    Ok(Place {
        id: NodeId::from(row.try_get::<i64, _>("id")?),
        name: row.try_get("name")?,
        slug: row.try_get("slug")?,
        level,
        description: row.try_get("description")?,
        lat: row.try_get("lat")?,
        lng: row.try_get("lng")?,
        osm_id: row.try_get("osm_id")?,
        osm_type,
        osm_ref: row.try_get("osm_ref")?,
        country_id: row.try_get("country_id")?,
        region_id: row.try_get("region_id")?,
        active: row.try_get("active")?,
        hashtags,
        descendants: Vec::new(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn note_from_row(row: &SqliteRow) -> Result<Note, CatalogError> {
    let code: i64 = row.try_get("note_type")?;
    let note_type = NoteType::from_code(code)
        .ok_or_else(|| CatalogError::InvalidRecord(format!("Unknown note type: {}", code)))?;

    Ok(Note {
        id: NodeId::from(row.try_get::<i64, _>("id")?),
        account_id: row.try_get("account_id")?,
        event_id: row.try_get("event_id")?,
        note_type,
        reposted_note_id: row
            .try_get::<Option<i64>, _>("reposted_note_id")?
            .map(NodeId::from),
        descendants: Vec::new(),
        created_at: row.try_get("created_at")?,
    })
}

fn role_from_row(row: &SqliteRow) -> Result<AccountPlaceRole, CatalogError> {
    let code: i64 = row.try_get("role")?;
    let role = AccountPlaceRoleType::from_code(code)
        .ok_or_else(|| CatalogError::InvalidRecord(format!("Unknown place role: {}", code)))?;

    Ok(AccountPlaceRole {
        account_id: row.try_get("account_id")?,
        place_id: NodeId::from(row.try_get::<i64, _>("place_id")?),
        role,
        ambassador_request: row.try_get("ambassador_request")?,
    })
}

fn membership_from_row(row: &SqliteRow) -> Result<ChatMembership, CatalogError> {
    Ok(ChatMembership {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        note_id: NodeId::from(row.try_get::<i64, _>("note_id")?),
        last_read_note_id: row
            .try_get::<Option<i64>, _>("last_read_note_id")?
            .map(NodeId::from),
    })
}

fn edge_from_row(row: &SqliteRow) -> Result<ClosureEdge, CatalogError> {
    let depth: i64 = row.try_get("depth")?;
    let depth = u32::try_from(depth)
        .map_err(|_| CatalogError::InvalidRecord(format!("Invalid closure depth: {}", depth)))?;

    Ok(ClosureEdge::new(
        NodeId::from(row.try_get::<i64, _>("ancestor_id")?),
        NodeId::from(row.try_get::<i64, _>("descendant_id")?),
        depth,
    ))
}

fn place_with_closure_from_row(row: &SqliteRow) -> Result<PlaceWithClosure, CatalogError> {
    Ok(WithClosure::new(place_from_row(row)?, edge_from_row(row)?))
}

fn note_with_closure_from_row(row: &SqliteRow) -> Result<NoteWithClosure, CatalogError> {
    Ok(WithClosure::new(note_from_row(row)?, edge_from_row(row)?))
}

/// Get current Unix timestamp in seconds
fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}
