#![forbid(unsafe_code)]

use super::{
    PublishEngine, PublishRequest, load_live_node, log_rejected, projection_status, store_status,
};
use crate::hooks::{HookContext, HookOperation};
use cms_core::{
    ContentId, Culture, OperationStatus, PublishOutcome, PublishResultKind, ScheduleAction, VariantState,
    aggregate_published,
};
use cms_storage::StoreTx;

impl PublishEngine {
    /// Publishes the requested cultures of one node, all or nothing.
    ///
    /// With a future `release_at_ms` nothing is published; schedule entries are
    /// written instead and the outcome is `Scheduled`.
    pub fn publish(&self, request: PublishRequest) -> Result<PublishOutcome, OperationStatus> {
        let content_id = request.content_id;
        self.publish_inner(request)
            .inspect_err(|status| log_rejected("publish", content_id, status))
    }

    fn publish_inner(&self, request: PublishRequest) -> Result<PublishOutcome, OperationStatus> {
        let content_id = request.content_id;
        let _guard = self.locks.acquire(content_id, &request.cancel)?;
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.write().map_err(store_status)?;
        let now_ms = self.clock.now_ms();

        let node = load_live_node(&tx, content_id)?;
        let states = tx.variant_states(content_id).map_err(store_status)?;
        let cultures = self.policy.resolve_cultures(&node, &request.cultures, || {
            states
                .values()
                .filter(|state| state.available)
                .map(|state| state.culture.clone())
                .collect()
        })?;
        if cultures.is_empty() {
            return Err(OperationStatus::CultureMissing);
        }
        request
            .window
            .validate()
            .map_err(|err| OperationStatus::failed(err.message()))?;

        if let Some(release_at_ms) = request.window.release_at_ms.filter(|at| *at > now_ms) {
            return self.schedule_release(tx, content_id, &cultures, release_at_ms, &request);
        }

        for culture in &cultures {
            let pending = tx
                .pending_release_after(content_id, culture, now_ms)
                .map_err(store_status)?;
            if pending.is_some() {
                return Err(OperationStatus::AwaitingRelease);
            }
        }

        let mut targets: Vec<&VariantState> = Vec::with_capacity(cultures.len());
        for culture in &cultures {
            match states.get(culture) {
                Some(state) if state.available => targets.push(state),
                _ => return Err(OperationStatus::CultureMissing),
            }
        }

        for (culture, expected) in &request.expected_versions {
            if let Some(state) = states.get(culture) {
                if state.current_version_id != *expected {
                    return Err(OperationStatus::ConcurrencyViolation);
                }
            }
        }

        if !tx.is_path_published(&node).map_err(store_status)? {
            return Err(OperationStatus::PathNotPublished);
        }
        self.policy.check_mandatory(&node, &cultures, &states)?;

        let mut missing = Vec::new();
        for state in &targets {
            let version = tx
                .require_version(state.current_version_id)
                .map_err(store_status)?;
            for alias in self.policy.missing_properties(&node, &version, &state.culture) {
                if !missing.contains(&alias) {
                    missing.push(alias);
                }
            }
        }
        if !missing.is_empty() {
            missing.sort();
            return Err(OperationStatus::ContentInvalid { aliases: missing });
        }

        let changing: Vec<&VariantState> = targets
            .iter()
            .copied()
            .filter(|state| request.force || !state.is_publish_noop())
            .collect();
        if changing.is_empty() {
            self.schedule_expiry(&tx, content_id, &cultures, &request)?;
            let rv = tx
                .nucache_row(content_id)
                .map_err(store_status)?
                .map(|row| row.rv);
            tx.commit().map_err(store_status)?;
            tracing::debug!(%content_id, cultures = ?cultures, "publish skipped, nothing changed");
            return Ok(PublishOutcome {
                kind: PublishResultKind::PublishedAlready,
                cultures: Vec::new(),
                rv,
            });
        }
        let changed: Vec<Culture> = changing.iter().map(|state| state.culture.clone()).collect();

        let ctx = HookContext {
            operation: HookOperation::Publish,
            content_id,
            cultures: &changed,
        };
        self.before_commit(&ctx)?;

        let mut published_states = states.clone();
        for state in &changing {
            request.cancel.check()?;
            let promoted = VariantState {
                published: true,
                edited: false,
                published_version_id: Some(state.current_version_id),
                published_at_ms: Some(now_ms),
                updated_at_ms: now_ms,
                ..(*state).clone()
            };
            tx.set_variant_state(content_id, &promoted)
                .map_err(store_status)?;
            published_states.insert(promoted.culture.clone(), promoted);
        }

        tx.set_content_published(content_id, aggregate_published(published_states.values()), now_ms)
            .map_err(store_status)?;
        self.schedule_expiry(&tx, content_id, &cultures, &request)?;

        let row = self
            .projector
            .resnapshot(&tx, content_id, now_ms)
            .map_err(projection_status)?;
        // Cancelling here still rolls back state and row together.
        request.cancel.check()?;
        tx.commit().map_err(store_status)?;
        self.hooks.after_commit(&ctx);

        tracing::info!(%content_id, cultures = ?changed, rv = ?row.as_ref().map(|r| r.rv), "published");
        Ok(PublishOutcome {
            kind: PublishResultKind::Published,
            cultures: changed,
            rv: row.map(|row| row.rv),
        })
    }

    fn schedule_release(
        &self,
        tx: StoreTx<'_>,
        content_id: ContentId,
        cultures: &[Culture],
        release_at_ms: i64,
        request: &PublishRequest,
    ) -> Result<PublishOutcome, OperationStatus> {
        for culture in cultures {
            tx.schedule_upsert(content_id, culture, ScheduleAction::Publish, release_at_ms)
                .map_err(store_status)?;
        }
        self.schedule_expiry(&tx, content_id, cultures, request)?;
        let rv = tx
            .nucache_row(content_id)
            .map_err(store_status)?
            .map(|row| row.rv);
        tx.commit().map_err(store_status)?;
        tracing::info!(%content_id, cultures = ?cultures, release_at_ms, "publish scheduled");
        Ok(PublishOutcome {
            kind: PublishResultKind::Scheduled,
            cultures: cultures.to_vec(),
            rv,
        })
    }

    fn schedule_expiry(
        &self,
        tx: &StoreTx<'_>,
        content_id: ContentId,
        cultures: &[Culture],
        request: &PublishRequest,
    ) -> Result<(), OperationStatus> {
        let Some(expire_at_ms) = request.window.expire_at_ms else {
            return Ok(());
        };
        for culture in cultures {
            tx.schedule_upsert(content_id, culture, ScheduleAction::Unpublish, expire_at_ms)
                .map_err(store_status)?;
        }
        Ok(())
    }
}
