#![forbid(unsafe_code)]

use super::{
    PublishEngine, UnpublishRequest, load_node, log_rejected, projection_status, store_status,
    withdraw_node,
};
use crate::config::CascadePolicy;
use crate::hooks::{HookContext, HookOperation};
use cms_core::{ContentId, ContentNode, OperationStatus, PublishOutcome, PublishResultKind};
use cms_storage::StoreTx;

impl PublishEngine {
    /// Unpublishes cultures of one node.
    ///
    /// Withdrawing a mandatory culture withdraws them all. When nothing stays
    /// published the cache row is deleted, and under the `cascade` policy the
    /// published descendants are withdrawn in the same transaction.
    pub fn unpublish(&self, request: UnpublishRequest) -> Result<PublishOutcome, OperationStatus> {
        let content_id = request.content_id;
        self.unpublish_inner(request)
            .inspect_err(|status| log_rejected("unpublish", content_id, status))
    }

    fn unpublish_inner(&self, request: UnpublishRequest) -> Result<PublishOutcome, OperationStatus> {
        let content_id = request.content_id;
        let _guard = self.locks.acquire(content_id, &request.cancel)?;
        let cascade = self.config.unpublish_cascade == CascadePolicy::Cascade;
        let descendants = if cascade {
            self.subtree_ids(content_id)?
        } else {
            Vec::new()
        };
        let _descendant_guards = self.locks.acquire_all(&descendants, &request.cancel)?;

        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.write().map_err(store_status)?;
        let now_ms = self.clock.now_ms();

        let node = load_node(&tx, content_id)?;
        let states = tx.variant_states(content_id).map_err(store_status)?;
        let requested = self.policy.resolve_cultures(&node, &request.cultures, || {
            states
                .values()
                .filter(|state| state.published)
                .map(|state| state.culture.clone())
                .collect()
        })?;

        let mut targets: Vec<_> = requested
            .iter()
            .filter(|culture| states.get(*culture).is_some_and(|state| state.published))
            .cloned()
            .collect();
        if targets.is_empty() {
            tx.commit().map_err(store_status)?;
            return Ok(PublishOutcome {
                kind: PublishResultKind::UnpublishedAlready,
                cultures: Vec::new(),
                rv: None,
            });
        }

        let mandatory_hit = self.policy.is_variant(&node)
            && targets
                .iter()
                .any(|culture| self.policy.is_mandatory(&node, culture));
        if mandatory_hit {
            targets = states
                .values()
                .filter(|state| state.published)
                .map(|state| state.culture.clone())
                .collect();
        }

        let ctx = HookContext {
            operation: HookOperation::Unpublish,
            content_id,
            cultures: &targets,
        };
        self.before_commit(&ctx)?;

        request.cancel.check()?;
        let withdrawn = withdraw_node(&tx, &node, Some(targets.as_slice()), now_ms)?;
        let still_published = states
            .values()
            .any(|state| state.published && !withdrawn.contains(&state.culture));

        let (kind, rv) = if still_published {
            let row = self
                .projector
                .resnapshot(&tx, content_id, now_ms)
                .map_err(projection_status)?;
            (PublishResultKind::Unpublished, row.map(|row| row.rv))
        } else {
            tx.set_content_published(content_id, false, now_ms)
                .map_err(store_status)?;
            self.projector
                .invalidate(&tx, content_id)
                .map_err(store_status)?;
            if cascade {
                self.cascade_withdraw(&tx, &node, now_ms)?;
            }
            let kind = if mandatory_hit {
                PublishResultKind::UnpublishedMandatoryCulture
            } else if self.policy.is_variant(&node) {
                PublishResultKind::UnpublishedLastCulture
            } else {
                PublishResultKind::Unpublished
            };
            (kind, None)
        };

        request.cancel.check()?;
        tx.commit().map_err(store_status)?;
        self.hooks.after_commit(&ctx);

        tracing::info!(%content_id, cultures = ?withdrawn, kind = ?kind, "unpublished");
        Ok(PublishOutcome {
            kind,
            cultures: withdrawn,
            rv,
        })
    }

    fn cascade_withdraw(
        &self,
        tx: &StoreTx<'_>,
        node: &ContentNode,
        now_ms: i64,
    ) -> Result<(), OperationStatus> {
        for descendant in tx.descendants(node).map_err(store_status)? {
            if !descendant.published {
                continue;
            }
            let withdrawn = withdraw_node(tx, &descendant, None, now_ms)?;
            tx.set_content_published(descendant.id, false, now_ms)
                .map_err(store_status)?;
            self.projector
                .invalidate(tx, descendant.id)
                .map_err(store_status)?;
            tracing::info!(
                content_id = %descendant.id,
                ancestor = %node.id,
                cultures = ?withdrawn,
                "descendant unpublished by cascade"
            );
        }
        Ok(())
    }

    /// Descendant ids top-down, read outside any write transaction so locks
    /// can be taken before the store is.
    pub(crate) fn subtree_ids(&self, content_id: ContentId) -> Result<Vec<ContentId>, OperationStatus> {
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.read().map_err(store_status)?;
        let node = load_node(&tx, content_id)?;
        Ok(tx
            .descendants(&node)
            .map_err(store_status)?
            .into_iter()
            .map(|descendant| descendant.id)
            .collect())
    }
}
