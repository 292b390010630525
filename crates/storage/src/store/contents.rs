#![forbid(unsafe_code)]

use super::{StoreError, StoreTx, content_id_from_row};
use crate::CreateContentRequest;
use cms_core::{ContentId, ContentKey, ContentNode, format_path, parse_path};
use rusqlite::{Connection, OptionalExtension, params};

const MAX_TREE_DEPTH: usize = 256;

const CONTENT_COLUMNS: &str = "id, key, content_type, parent_id, path, sort_order, trashed, published, created_at_ms, updated_at_ms";

fn read_content_row(row: &rusqlite::Row<'_>) -> Result<ContentNode, StoreError> {
    let id = content_id_from_row(row.get::<_, i64>(0)?)?;
    let key = ContentKey::try_new(row.get::<_, String>(1)?)
        .map_err(|_| StoreError::CorruptRow("invalid content key"))?;
    let parent_id = row
        .get::<_, Option<i64>>(3)?
        .map(content_id_from_row)
        .transpose()?;
    let path = parse_path(&row.get::<_, String>(4)?)
        .ok_or(StoreError::CorruptRow("invalid content path"))?;
    Ok(ContentNode {
        id,
        key,
        content_type: row.get(2)?,
        parent_id,
        path,
        sort_order: row.get(5)?,
        trashed: row.get::<_, i64>(6)? != 0,
        published: row.get::<_, i64>(7)? != 0,
        created_at_ms: row.get(8)?,
        updated_at_ms: row.get(9)?,
    })
}

pub(crate) fn load_content(
    conn: &Connection,
    id: ContentId,
) -> Result<Option<ContentNode>, StoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {CONTENT_COLUMNS} FROM contents WHERE id=?1"
    ))?;
    let mut rows = stmt.query(params![id.get()])?;
    match rows.next()? {
        Some(row) => Ok(Some(read_content_row(row)?)),
        None => Ok(None),
    }
}

fn query_contents(
    conn: &Connection,
    sql: &str,
    args: impl rusqlite::Params,
) -> Result<Vec<ContentNode>, StoreError> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(args)?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(read_content_row(row)?);
    }
    Ok(out)
}

impl StoreTx<'_> {
    pub fn insert_content(
        &self,
        request: CreateContentRequest,
    ) -> Result<ContentNode, StoreError> {
        let content_type = request.content_type.trim();
        if content_type.is_empty() {
            return Err(StoreError::InvalidInput("content_type must not be empty"));
        }

        let parent = match request.parent_id {
            Some(parent_id) => {
                let parent =
                    load_content(self.conn(), parent_id)?.ok_or(StoreError::UnknownContent)?;
                if parent.trashed {
                    return Err(StoreError::ContentTrashed);
                }
                if parent.path.len() >= MAX_TREE_DEPTH {
                    return Err(StoreError::InvalidInput("content tree depth exceeded"));
                }
                Some(parent)
            }
            None => None,
        };

        let sort_order = self.conn().query_row(
            "SELECT COALESCE(MAX(sort_order) + 1, 0) FROM contents WHERE parent_id IS ?1",
            params![request.parent_id.map(ContentId::get)],
            |row| row.get::<_, i64>(0),
        )?;

        let level = parent.as_ref().map_or(1, |p| p.path.len() + 1);
        self.conn().execute(
            "INSERT INTO contents(key, content_type, parent_id, path, level, sort_order, trashed, published, created_at_ms, updated_at_ms) \
             VALUES (?1, ?2, ?3, '', ?4, ?5, 0, 0, ?6, ?6)",
            params![
                request.key.as_str(),
                content_type,
                request.parent_id.map(ContentId::get),
                super::to_sqlite_i64(level)?,
                sort_order,
                request.created_at_ms,
            ],
        )?;
        let id = content_id_from_row(self.conn().last_insert_rowid())?;

        let mut path = parent.map(|p| p.path).unwrap_or_default();
        path.push(id);
        self.conn().execute(
            "UPDATE contents SET path=?2 WHERE id=?1",
            params![id.get(), format_path(&path)],
        )?;

        load_content(self.conn(), id)?.ok_or(StoreError::UnknownContent)
    }

    pub fn content(&self, id: ContentId) -> Result<Option<ContentNode>, StoreError> {
        load_content(self.conn(), id)
    }

    pub fn require_content(&self, id: ContentId) -> Result<ContentNode, StoreError> {
        self.content(id)?.ok_or(StoreError::UnknownContent)
    }

    pub fn children(&self, id: ContentId) -> Result<Vec<ContentNode>, StoreError> {
        query_contents(
            self.conn(),
            &format!(
                "SELECT {CONTENT_COLUMNS} FROM contents WHERE parent_id=?1 ORDER BY sort_order ASC, id ASC"
            ),
            params![id.get()],
        )
    }

    /// Every node below `node`, parents before children, siblings by sort order.
    pub fn descendants(&self, node: &ContentNode) -> Result<Vec<ContentNode>, StoreError> {
        query_contents(
            self.conn(),
            &format!(
                "SELECT {CONTENT_COLUMNS} FROM contents WHERE path LIKE ?1 \
                 ORDER BY level ASC, sort_order ASC, id ASC"
            ),
            params![format!("{},%", node.path_string())],
        )
    }

    pub fn all_contents(&self) -> Result<Vec<ContentNode>, StoreError> {
        query_contents(
            self.conn(),
            &format!("SELECT {CONTENT_COLUMNS} FROM contents ORDER BY level ASC, sort_order ASC, id ASC"),
            [],
        )
    }

    /// True when every ancestor is published and not trashed. Roots are always reachable.
    pub fn is_path_published(&self, node: &ContentNode) -> Result<bool, StoreError> {
        for ancestor_id in node.ancestors() {
            let reachable = self
                .conn()
                .query_row(
                    "SELECT published = 1 AND trashed = 0 FROM contents WHERE id=?1",
                    params![ancestor_id.get()],
                    |row| row.get::<_, bool>(0),
                )
                .optional()?;
            if reachable != Some(true) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub fn set_content_published(
        &self,
        id: ContentId,
        published: bool,
        now_ms: i64,
    ) -> Result<(), StoreError> {
        let changed = self.conn().execute(
            "UPDATE contents SET published=?2, updated_at_ms=MAX(updated_at_ms, ?3) WHERE id=?1",
            params![id.get(), published, now_ms],
        )?;
        if changed != 1 {
            return Err(StoreError::UnknownContent);
        }
        Ok(())
    }

    pub fn set_content_trashed(&self, id: ContentId, now_ms: i64) -> Result<(), StoreError> {
        let changed = self.conn().execute(
            "UPDATE contents SET trashed=1, published=0, updated_at_ms=MAX(updated_at_ms, ?2) WHERE id=?1",
            params![id.get(), now_ms],
        )?;
        if changed != 1 {
            return Err(StoreError::UnknownContent);
        }
        Ok(())
    }

    /// Removes the node and everything it owns. Children must be deleted first.
    pub fn delete_content(&self, id: ContentId) -> Result<(), StoreError> {
        let children = self.conn().query_row(
            "SELECT COUNT(1) FROM contents WHERE parent_id=?1",
            params![id.get()],
            |row| row.get::<_, i64>(0),
        )?;
        if children > 0 {
            return Err(StoreError::ContentHasChildren);
        }

        self.conn().execute(
            "DELETE FROM variant_states WHERE content_id=?1",
            params![id.get()],
        )?;
        self.conn().execute(
            "DELETE FROM schedule_entries WHERE content_id=?1",
            params![id.get()],
        )?;
        self.conn()
            .execute("DELETE FROM nucache WHERE node_id=?1", params![id.get()])?;
        self.conn().execute(
            "DELETE FROM nucache_counters WHERE node_id=?1",
            params![id.get()],
        )?;
        self.conn()
            .execute("DELETE FROM versions WHERE content_id=?1", params![id.get()])?;
        let deleted = self
            .conn()
            .execute("DELETE FROM contents WHERE id=?1", params![id.get()])?;
        if deleted != 1 {
            return Err(StoreError::UnknownContent);
        }
        Ok(())
    }
}
