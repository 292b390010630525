#![forbid(unsafe_code)]

use super::{StoreError, StoreTx, content_id_from_row, culture_from_row, version_id_from_row};
use crate::AppendVersionRequest;
use cms_core::{ContentId, PropertyKey, PropertyValue, Version, VersionId};
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;

fn load_version(conn: &Connection, id: VersionId) -> Result<Option<Version>, StoreError> {
    let header = conn
        .query_row(
            "SELECT content_id, created_at_ms, creator, rolled_back_from FROM versions WHERE id=?1",
            params![id.get()],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((content_id, created_at_ms, creator, rolled_back_from)) = header else {
        return Ok(None);
    };

    let mut names = BTreeMap::new();
    let mut stmt =
        conn.prepare("SELECT culture, name FROM version_names WHERE version_id=?1")?;
    let mut rows = stmt.query(params![id.get()])?;
    while let Some(row) = rows.next()? {
        names.insert(
            culture_from_row(&row.get::<_, String>(0)?)?,
            row.get::<_, String>(1)?,
        );
    }

    let mut values = BTreeMap::new();
    let mut stmt = conn.prepare(
        "SELECT culture, segment, alias, kind, value FROM version_values WHERE version_id=?1",
    )?;
    let mut rows = stmt.query(params![id.get()])?;
    while let Some(row) = rows.next()? {
        let key = PropertyKey {
            culture: culture_from_row(&row.get::<_, String>(0)?)?,
            segment: row.get(1)?,
            alias: row.get(2)?,
        };
        let kind = row.get::<_, String>(3)?;
        let value = PropertyValue::from_stored(&kind, row.get(4)?)
            .ok_or(StoreError::CorruptRow("invalid property value"))?;
        values.insert(key, value);
    }

    Ok(Some(Version {
        id,
        content_id: content_id_from_row(content_id)?,
        created_at_ms,
        creator,
        names,
        values,
        rolled_back_from: rolled_back_from.map(version_id_from_row).transpose()?,
    }))
}

impl StoreTx<'_> {
    /// Appends an immutable version. Existing versions are never modified.
    pub fn append_version(&self, request: AppendVersionRequest) -> Result<Version, StoreError> {
        if request.creator.trim().is_empty() {
            return Err(StoreError::InvalidInput("creator must not be empty"));
        }
        if let Some(source) = request.rolled_back_from {
            let owner = self.version_owner(source)?;
            if owner != Some(request.content_id) {
                return Err(StoreError::VersionContentMismatch);
            }
        }

        self.conn().execute(
            "INSERT INTO versions(content_id, created_at_ms, creator, rolled_back_from) VALUES (?1, ?2, ?3, ?4)",
            params![
                request.content_id.get(),
                request.created_at_ms,
                request.creator.trim(),
                request.rolled_back_from.map(VersionId::get),
            ],
        )?;
        let id = version_id_from_row(self.conn().last_insert_rowid())?;

        for (culture, name) in &request.names {
            self.conn().execute(
                "INSERT INTO version_names(version_id, culture, name) VALUES (?1, ?2, ?3)",
                params![id.get(), culture.as_str(), name],
            )?;
        }
        for (key, value) in &request.values {
            if key.alias.trim().is_empty() {
                return Err(StoreError::InvalidInput("property alias must not be empty"));
            }
            self.conn().execute(
                "INSERT INTO version_values(version_id, culture, segment, alias, kind, value) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    id.get(),
                    key.culture.as_str(),
                    key.segment,
                    key.alias,
                    value.kind(),
                    value.to_stored(),
                ],
            )?;
        }

        Ok(Version {
            id,
            content_id: request.content_id,
            created_at_ms: request.created_at_ms,
            creator: request.creator.trim().to_string(),
            names: request.names,
            values: request.values,
            rolled_back_from: request.rolled_back_from,
        })
    }

    pub fn version(&self, id: VersionId) -> Result<Option<Version>, StoreError> {
        load_version(self.conn(), id)
    }

    pub fn require_version(&self, id: VersionId) -> Result<Version, StoreError> {
        self.version(id)?.ok_or(StoreError::UnknownVersion)
    }

    pub fn version_owner(&self, id: VersionId) -> Result<Option<ContentId>, StoreError> {
        self.conn()
            .query_row(
                "SELECT content_id FROM versions WHERE id=?1",
                params![id.get()],
                |row| row.get::<_, i64>(0),
            )
            .optional()?
            .map(content_id_from_row)
            .transpose()
    }

    /// The newest version holds the draft values of every culture.
    pub fn latest_version(&self, content_id: ContentId) -> Result<Option<Version>, StoreError> {
        let id = self
            .conn()
            .query_row(
                "SELECT MAX(id) FROM versions WHERE content_id=?1",
                params![content_id.get()],
                |row| row.get::<_, Option<i64>>(0),
            )?
            .map(version_id_from_row)
            .transpose()?;
        match id {
            Some(id) => self.version(id),
            None => Ok(None),
        }
    }

    /// Version ids for a node, newest first.
    pub fn version_ids(&self, content_id: ContentId) -> Result<Vec<VersionId>, StoreError> {
        let mut stmt = self
            .conn()
            .prepare("SELECT id FROM versions WHERE content_id=?1 ORDER BY id DESC")?;
        let mut rows = stmt.query(params![content_id.get()])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(version_id_from_row(row.get(0)?)?);
        }
        Ok(out)
    }

    pub fn list_versions(&self, content_id: ContentId) -> Result<Vec<Version>, StoreError> {
        let mut out = Vec::new();
        for id in self.version_ids(content_id)? {
            out.push(self.require_version(id)?);
        }
        Ok(out)
    }

    /// Deletes versions older than the newest `keep_latest`, sparing any version
    /// a variant state still points at. Returns the number removed.
    pub fn prune_versions(
        &self,
        content_id: ContentId,
        keep_latest: usize,
    ) -> Result<usize, StoreError> {
        let keep_latest = super::to_sqlite_i64(keep_latest.max(1))?;
        let deleted = self.conn().execute(
            r#"
            DELETE FROM versions
            WHERE content_id=?1
              AND id NOT IN (
                SELECT id FROM versions WHERE content_id=?1 ORDER BY id DESC LIMIT ?2
              )
              AND id NOT IN (
                SELECT current_version_id FROM variant_states WHERE content_id=?1
              )
              AND id NOT IN (
                SELECT published_version_id FROM variant_states
                WHERE content_id=?1 AND published_version_id IS NOT NULL
              )
            "#,
            params![content_id.get(), keep_latest],
        )?;
        Ok(deleted)
    }
}
