#![forbid(unsafe_code)]

use super::{StoreError, StoreTx, content_id_from_row};
use cms_core::{ContentId, NuCacheRow};
use rusqlite::{Connection, params};

pub(crate) fn load_row(
    conn: &Connection,
    node_id: ContentId,
) -> Result<Option<NuCacheRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT node_id, published, data, data_hash, rv, updated_at_ms FROM nucache WHERE node_id=?1 AND published=1",
    )?;
    let mut rows = stmt.query(params![node_id.get()])?;
    let Some(row) = rows.next()? else {
        return Ok(None);
    };
    Ok(Some(NuCacheRow {
        node_id: content_id_from_row(row.get(0)?)?,
        published: row.get::<_, i64>(1)? != 0,
        data: row.get(2)?,
        data_hash: row.get(3)?,
        rv: row.get(4)?,
        updated_at_ms: row.get(5)?,
    }))
}

impl StoreTx<'_> {
    pub fn nucache_row(&self, node_id: ContentId) -> Result<Option<NuCacheRow>, StoreError> {
        load_row(self.conn(), node_id)
    }

    /// Writes the published row for a node.
    ///
    /// When the stored hash already matches, the row is left untouched so `rv`
    /// only moves on a real change. `rv` comes from a per-node counter that
    /// survives row deletion, keeping it monotonic across unpublish/republish.
    pub fn nucache_upsert(
        &self,
        node_id: ContentId,
        data: &[u8],
        data_hash: &str,
        now_ms: i64,
    ) -> Result<NuCacheRow, StoreError> {
        if let Some(existing) = self.nucache_row(node_id)? {
            if existing.data_hash == data_hash && existing.data == data {
                return Ok(existing);
            }
        }

        self.conn().execute(
            r#"
            INSERT INTO nucache_counters(node_id, last_rv) VALUES (?1, 1)
            ON CONFLICT(node_id) DO UPDATE SET last_rv=last_rv + 1
            "#,
            params![node_id.get()],
        )?;
        let rv = self.conn().query_row(
            "SELECT last_rv FROM nucache_counters WHERE node_id=?1",
            params![node_id.get()],
            |row| row.get::<_, i64>(0),
        )?;

        self.conn().execute(
            r#"
            INSERT INTO nucache(node_id, published, data, data_hash, rv, updated_at_ms)
            VALUES (?1, 1, ?2, ?3, ?4, ?5)
            ON CONFLICT(node_id, published) DO UPDATE SET
              data=excluded.data,
              data_hash=excluded.data_hash,
              rv=excluded.rv,
              updated_at_ms=excluded.updated_at_ms
            "#,
            params![node_id.get(), data, data_hash, rv, now_ms],
        )?;

        self.nucache_row(node_id)?
            .ok_or(StoreError::CorruptRow("cache row vanished after upsert"))
    }

    pub fn nucache_delete(&self, node_id: ContentId) -> Result<bool, StoreError> {
        let removed = self.conn().execute(
            "DELETE FROM nucache WHERE node_id=?1",
            params![node_id.get()],
        )?;
        Ok(removed > 0)
    }

    pub fn nucache_node_ids(&self) -> Result<Vec<ContentId>, StoreError> {
        let mut stmt = self
            .conn()
            .prepare("SELECT node_id FROM nucache WHERE published=1 ORDER BY node_id ASC")?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(content_id_from_row(row.get(0)?)?);
        }
        Ok(out)
    }
}
