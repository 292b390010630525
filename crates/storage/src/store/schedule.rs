#![forbid(unsafe_code)]

use super::{StoreError, StoreTx, content_id_from_row, culture_from_row};
use crate::ScheduleFailure;
use cms_core::{ContentId, Culture, ScheduleAction, ScheduleEntry};
use rusqlite::{OptionalExtension, params};

const ENTRY_COLUMNS: &str =
    "content_id, culture, action, due_at_ms, seq, attempts, last_error, parked";

fn read_entry_row(row: &rusqlite::Row<'_>) -> Result<ScheduleEntry, StoreError> {
    let action = ScheduleAction::parse(&row.get::<_, String>(2)?)
        .ok_or(StoreError::CorruptRow("invalid schedule action"))?;
    let attempts = u32::try_from(row.get::<_, i64>(5)?)
        .map_err(|_| StoreError::CorruptRow("invalid schedule attempts"))?;
    Ok(ScheduleEntry {
        content_id: content_id_from_row(row.get(0)?)?,
        culture: culture_from_row(&row.get::<_, String>(1)?)?,
        action,
        due_at_ms: row.get(3)?,
        seq: row.get(4)?,
        attempts,
        last_error: row.get(6)?,
        parked: row.get::<_, i64>(7)? != 0,
    })
}

impl StoreTx<'_> {
    /// Inserts or replaces the pending entry for (content, culture, action).
    /// A replacement is a new insertion: fresh `seq`, cleared failure state.
    pub fn schedule_upsert(
        &self,
        content_id: ContentId,
        culture: &Culture,
        action: ScheduleAction,
        due_at_ms: i64,
    ) -> Result<ScheduleEntry, StoreError> {
        let seq = self.next_schedule_seq()?;
        self.conn().execute(
            r#"
            INSERT INTO schedule_entries(content_id, culture, action, due_at_ms, seq, attempts, last_error, parked)
            VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, 0)
            ON CONFLICT(content_id, culture, action) DO UPDATE SET
              due_at_ms=excluded.due_at_ms,
              seq=excluded.seq,
              attempts=0,
              last_error=NULL,
              parked=0
            "#,
            params![content_id.get(), culture.as_str(), action.as_str(), due_at_ms, seq],
        )?;
        self.schedule_entry(content_id, culture, action)?
            .ok_or(StoreError::CorruptRow("schedule entry vanished after upsert"))
    }

    /// Store-wide insertion counter. Never reused, even after the entry holding
    /// the highest value is cancelled or completed.
    fn next_schedule_seq(&self) -> Result<i64, StoreError> {
        let bumped = self.conn().execute(
            "UPDATE store_state SET schedule_seq=schedule_seq + 1 WHERE singleton=1",
            [],
        )?;
        if bumped != 1 {
            return Err(StoreError::CorruptRow("schema state row is missing"));
        }
        Ok(self.conn().query_row(
            "SELECT schedule_seq FROM store_state WHERE singleton=1",
            [],
            |row| row.get::<_, i64>(0),
        )?)
    }

    pub fn schedule_entry(
        &self,
        content_id: ContentId,
        culture: &Culture,
        action: ScheduleAction,
    ) -> Result<Option<ScheduleEntry>, StoreError> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM schedule_entries WHERE content_id=?1 AND culture=?2 AND action=?3"
        ))?;
        let mut rows = stmt.query(params![content_id.get(), culture.as_str(), action.as_str()])?;
        match rows.next()? {
            Some(row) => Ok(Some(read_entry_row(row)?)),
            None => Ok(None),
        }
    }

    /// Removes matching entries; every action when `action` is `None`.
    pub fn schedule_cancel(
        &self,
        content_id: ContentId,
        culture: &Culture,
        action: Option<ScheduleAction>,
    ) -> Result<usize, StoreError> {
        let removed = match action {
            Some(action) => self.conn().execute(
                "DELETE FROM schedule_entries WHERE content_id=?1 AND culture=?2 AND action=?3",
                params![content_id.get(), culture.as_str(), action.as_str()],
            )?,
            None => self.conn().execute(
                "DELETE FROM schedule_entries WHERE content_id=?1 AND culture=?2",
                params![content_id.get(), culture.as_str()],
            )?,
        };
        Ok(removed)
    }

    pub fn schedule_cancel_all(&self, content_id: ContentId) -> Result<usize, StoreError> {
        Ok(self.conn().execute(
            "DELETE FROM schedule_entries WHERE content_id=?1",
            params![content_id.get()],
        )?)
    }

    pub fn schedule_for_content(
        &self,
        content_id: ContentId,
    ) -> Result<Vec<ScheduleEntry>, StoreError> {
        self.query_entries(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM schedule_entries WHERE content_id=?1 ORDER BY due_at_ms ASC, seq ASC"
            ),
            params![content_id.get()],
        )
    }

    /// Unparked entries with `due_at_ms <= now_ms`, oldest first, ties by insertion order.
    pub fn due_entries(&self, now_ms: i64, limit: usize) -> Result<Vec<ScheduleEntry>, StoreError> {
        self.query_entries(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM schedule_entries \
                 WHERE parked=0 AND due_at_ms<=?1 \
                 ORDER BY due_at_ms ASC, seq ASC \
                 LIMIT ?2"
            ),
            params![now_ms, super::to_sqlite_i64(limit)?],
        )
    }

    pub fn parked_entries(&self) -> Result<Vec<ScheduleEntry>, StoreError> {
        self.query_entries(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM schedule_entries WHERE parked=1 ORDER BY due_at_ms ASC, seq ASC"
            ),
            [],
        )
    }

    /// Deletes the entry only if it has not been replaced since it was read.
    pub fn schedule_complete(&self, entry: &ScheduleEntry) -> Result<bool, StoreError> {
        let removed = self.conn().execute(
            "DELETE FROM schedule_entries WHERE content_id=?1 AND culture=?2 AND action=?3 AND seq=?4",
            params![
                entry.content_id.get(),
                entry.culture.as_str(),
                entry.action.as_str(),
                entry.seq
            ],
        )?;
        Ok(removed == 1)
    }

    /// Records a failed attempt. Returns the updated entry, or `None` if it was
    /// replaced or cancelled meanwhile.
    pub fn schedule_record_failure(
        &self,
        entry: &ScheduleEntry,
        failure: ScheduleFailure,
    ) -> Result<Option<ScheduleEntry>, StoreError> {
        let changed = self.conn().execute(
            r#"
            UPDATE schedule_entries
            SET attempts=attempts + 1, last_error=?5, parked=?6
            WHERE content_id=?1 AND culture=?2 AND action=?3 AND seq=?4
            "#,
            params![
                entry.content_id.get(),
                entry.culture.as_str(),
                entry.action.as_str(),
                entry.seq,
                failure.error,
                failure.park,
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        self.schedule_entry(entry.content_id, &entry.culture, entry.action)
    }

    /// Re-arms a parked entry for the next tick.
    pub fn schedule_unpark(
        &self,
        content_id: ContentId,
        culture: &Culture,
        action: ScheduleAction,
    ) -> Result<bool, StoreError> {
        let changed = self.conn().execute(
            "UPDATE schedule_entries SET parked=0, attempts=0 WHERE content_id=?1 AND culture=?2 AND action=?3 AND parked=1",
            params![content_id.get(), culture.as_str(), action.as_str()],
        )?;
        Ok(changed == 1)
    }

    /// Latest pending release for a culture that is still in the future.
    pub fn pending_release_after(
        &self,
        content_id: ContentId,
        culture: &Culture,
        now_ms: i64,
    ) -> Result<Option<i64>, StoreError> {
        Ok(self
            .conn()
            .query_row(
                "SELECT due_at_ms FROM schedule_entries \
                 WHERE content_id=?1 AND culture=?2 AND action='publish' AND due_at_ms>?3",
                params![content_id.get(), culture.as_str(), now_ms],
                |row| row.get::<_, i64>(0),
            )
            .optional()?)
    }

    fn query_entries(
        &self,
        sql: &str,
        args: impl rusqlite::Params,
    ) -> Result<Vec<ScheduleEntry>, StoreError> {
        let mut stmt = self.conn().prepare(sql)?;
        let mut rows = stmt.query(args)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(read_entry_row(row)?);
        }
        Ok(out)
    }
}
