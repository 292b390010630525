#![forbid(unsafe_code)]

use super::{StoreError, StoreTx, culture_from_row, version_id_from_row};
use cms_core::{ContentId, Culture, VariantState, VersionId};
use rusqlite::params;
use std::collections::BTreeMap;

impl StoreTx<'_> {
    /// Every culture row recorded for the node, keyed by culture.
    pub fn variant_states(
        &self,
        content_id: ContentId,
    ) -> Result<BTreeMap<Culture, VariantState>, StoreError> {
        let mut stmt = self.conn().prepare(
            r#"
            SELECT culture, name, available, published, edited, current_version_id,
                   published_version_id, published_at_ms, updated_at_ms
            FROM variant_states
            WHERE content_id=?1
            ORDER BY culture ASC
            "#,
        )?;
        let mut rows = stmt.query(params![content_id.get()])?;
        let mut out = BTreeMap::new();
        while let Some(row) = rows.next()? {
            let culture = culture_from_row(&row.get::<_, String>(0)?)?;
            let state = VariantState {
                culture: culture.clone(),
                name: row.get(1)?,
                available: row.get::<_, i64>(2)? != 0,
                published: row.get::<_, i64>(3)? != 0,
                edited: row.get::<_, i64>(4)? != 0,
                current_version_id: version_id_from_row(row.get(5)?)?,
                published_version_id: row
                    .get::<_, Option<i64>>(6)?
                    .map(version_id_from_row)
                    .transpose()?,
                published_at_ms: row.get(7)?,
                updated_at_ms: row.get(8)?,
            };
            out.insert(culture, state);
        }
        Ok(out)
    }

    /// Row-level upsert, last writer wins. Rejects states that break the
    /// published/available invariants or point at another node's versions.
    pub fn set_variant_state(
        &self,
        content_id: ContentId,
        state: &VariantState,
    ) -> Result<(), StoreError> {
        state
            .check()
            .map_err(|err| StoreError::InvariantViolation(err.message()))?;
        self.ensure_owned_version(content_id, state.current_version_id)?;
        if let Some(published_version_id) = state.published_version_id {
            self.ensure_owned_version(content_id, published_version_id)?;
        }

        self.conn().execute(
            r#"
            INSERT INTO variant_states(
              content_id, culture, name, available, published, edited,
              current_version_id, published_version_id, published_at_ms, updated_at_ms
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(content_id, culture) DO UPDATE SET
              name=excluded.name,
              available=excluded.available,
              published=excluded.published,
              edited=excluded.edited,
              current_version_id=excluded.current_version_id,
              published_version_id=excluded.published_version_id,
              published_at_ms=excluded.published_at_ms,
              updated_at_ms=excluded.updated_at_ms
            "#,
            params![
                content_id.get(),
                state.culture.as_str(),
                state.name,
                state.available,
                state.published,
                state.edited,
                state.current_version_id.get(),
                state.published_version_id.map(VersionId::get),
                state.published_at_ms,
                state.updated_at_ms,
            ],
        )?;
        Ok(())
    }

    pub fn available_cultures(&self, content_id: ContentId) -> Result<Vec<Culture>, StoreError> {
        let mut stmt = self.conn().prepare(
            "SELECT culture FROM variant_states WHERE content_id=?1 AND available=1 ORDER BY culture ASC",
        )?;
        let mut rows = stmt.query(params![content_id.get()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(culture_from_row(&row.get::<_, String>(0)?)?);
        }
        Ok(out)
    }

    fn ensure_owned_version(
        &self,
        content_id: ContentId,
        version_id: VersionId,
    ) -> Result<(), StoreError> {
        match self.version_owner(version_id)? {
            Some(owner) if owner == content_id => Ok(()),
            Some(_) => Err(StoreError::VersionContentMismatch),
            None => Err(StoreError::UnknownVersion),
        }
    }
}
