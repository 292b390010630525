#![forbid(unsafe_code)]

use super::{PublishEngine, PublishRequest, UnpublishRequest, load_live_node, load_node, store_status};
use crate::locks::CancellationToken;
use cms_core::{ContentId, Culture, OperationStatus, PublishOutcome, ScheduleAction, ScheduleEntry};
use cms_storage::ScheduleFailure;

impl PublishEngine {
    /// Adds or replaces the pending entry for (content, culture, action).
    pub fn schedule(
        &self,
        content_id: ContentId,
        culture: Culture,
        action: ScheduleAction,
        due_at_ms: i64,
    ) -> Result<ScheduleEntry, OperationStatus> {
        let _guard = self
            .locks
            .acquire(content_id, &CancellationToken::default())?;
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.write().map_err(store_status)?;
        let node = load_live_node(&tx, content_id)?;
        let cultures = self
            .policy
            .resolve_cultures(&node, std::slice::from_ref(&culture), Vec::new)?;
        let Some(culture) = cultures.into_iter().next() else {
            return Err(OperationStatus::CultureMissing);
        };
        let entry = tx
            .schedule_upsert(content_id, &culture, action, due_at_ms)
            .map_err(store_status)?;
        tx.commit().map_err(store_status)?;
        tracing::info!(
            %content_id,
            culture = %culture,
            action = action.as_str(),
            due_at_ms,
            "schedule entry stored"
        );
        Ok(entry)
    }

    /// Removes pending entries for one culture; every action when `action` is `None`.
    pub fn cancel_schedule(
        &self,
        content_id: ContentId,
        culture: &Culture,
        action: Option<ScheduleAction>,
    ) -> Result<usize, OperationStatus> {
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.write().map_err(store_status)?;
        load_node(&tx, content_id)?;
        let removed = tx
            .schedule_cancel(content_id, culture, action)
            .map_err(store_status)?;
        tx.commit().map_err(store_status)?;
        tracing::debug!(%content_id, culture = %culture, removed, "schedule cancelled");
        Ok(removed)
    }

    pub fn schedule_for(&self, content_id: ContentId) -> Result<Vec<ScheduleEntry>, OperationStatus> {
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.read().map_err(store_status)?;
        tx.schedule_for_content(content_id).map_err(store_status)
    }

    /// Entries due at the engine clock's `now`, oldest first.
    pub fn due_entries(&self, limit: usize) -> Result<Vec<ScheduleEntry>, OperationStatus> {
        let now_ms = self.clock.now_ms();
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.read().map_err(store_status)?;
        tx.due_entries(now_ms, limit).map_err(store_status)
    }

    pub fn parked_entries(&self) -> Result<Vec<ScheduleEntry>, OperationStatus> {
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.read().map_err(store_status)?;
        tx.parked_entries().map_err(store_status)
    }

    /// Operator action: clears the attempt counter of a parked entry.
    pub fn retry_parked(
        &self,
        content_id: ContentId,
        culture: &Culture,
        action: ScheduleAction,
    ) -> Result<bool, OperationStatus> {
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.write().map_err(store_status)?;
        let unparked = tx
            .schedule_unpark(content_id, culture, action)
            .map_err(store_status)?;
        tx.commit().map_err(store_status)?;
        if unparked {
            tracing::info!(%content_id, culture = %culture, action = action.as_str(), "parked entry re-armed");
        }
        Ok(unparked)
    }

    /// Executes one entry through the regular publish/unpublish path.
    ///
    /// Returns `Ok(None)` when the entry was replaced or cancelled after it
    /// was read.
    pub fn run_entry(
        &self,
        entry: &ScheduleEntry,
    ) -> Result<Option<PublishOutcome>, OperationStatus> {
        {
            let mut store = self.pool.acquire().map_err(store_status)?;
            let tx = store.read().map_err(store_status)?;
            let current = tx
                .schedule_entry(entry.content_id, &entry.culture, entry.action)
                .map_err(store_status)?;
            if current.is_none_or(|current| current.seq != entry.seq) {
                return Ok(None);
            }
        }
        let outcome = match entry.action {
            ScheduleAction::Publish => {
                self.publish(PublishRequest::new(entry.content_id, [entry.culture.clone()]))?
            }
            ScheduleAction::Unpublish => {
                self.unpublish(UnpublishRequest::new(entry.content_id, [entry.culture.clone()]))?
            }
        };
        Ok(Some(outcome))
    }

    /// Removes a processed entry unless it was replaced meanwhile.
    pub fn complete_entry(&self, entry: &ScheduleEntry) -> Result<bool, OperationStatus> {
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.write().map_err(store_status)?;
        let removed = tx.schedule_complete(entry).map_err(store_status)?;
        tx.commit().map_err(store_status)?;
        Ok(removed)
    }

    pub fn record_entry_failure(
        &self,
        entry: &ScheduleEntry,
        failure: ScheduleFailure,
    ) -> Result<Option<ScheduleEntry>, OperationStatus> {
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.write().map_err(store_status)?;
        let updated = tx
            .schedule_record_failure(entry, failure)
            .map_err(store_status)?;
        tx.commit().map_err(store_status)?;
        Ok(updated)
    }
}
