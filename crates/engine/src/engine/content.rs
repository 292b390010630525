#![forbid(unsafe_code)]

use super::{
    ContentCreated, CreateContent, PublishEngine, RollbackRequest, SaveRequest, TrashOutcome,
    load_live_node, load_node, log_rejected, record_draft, store_status, withdraw_node,
};
use crate::hooks::{HookContext, HookOperation};
use crate::locks::CancellationToken;
use cms_core::{
    ContentId, ContentKey, ContentNode, Culture, OperationStatus, SaveOutcome, Version,
};
use cms_storage::{AppendVersionRequest, CreateContentRequest, StoreError};
use std::collections::BTreeSet;

impl PublishEngine {
    /// Creates a node together with its initial (unpublished) version.
    pub fn create_content(&self, request: CreateContent) -> Result<ContentCreated, OperationStatus> {
        let content_type = request.content_type.trim().to_string();
        self.policy.ensure_content_type(&content_type)?;
        for culture in request.names.keys() {
            self.policy.check_name_culture(&content_type, culture)?;
        }
        for key in request.values.keys() {
            self.policy.check_value_culture(&content_type, &key.culture)?;
        }
        let key = match request.key {
            Some(key) => key,
            None => ContentKey::try_new(uuid::Uuid::new_v4().to_string())
                .map_err(|err| OperationStatus::failed(err.message()))?,
        };

        let cancel = CancellationToken::default();
        let _parent_guard = match request.parent_id {
            Some(parent_id) => Some(self.locks.acquire(parent_id, &cancel)?),
            None => None,
        };
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.write().map_err(store_status)?;
        let now_ms = self.clock.now_ms();

        let node = tx
            .insert_content(CreateContentRequest {
                key,
                content_type,
                parent_id: request.parent_id,
                created_at_ms: now_ms,
            })
            .map_err(store_status)?;
        let version = tx
            .append_version(AppendVersionRequest {
                content_id: node.id,
                creator: request.creator,
                names: request.names,
                values: request.values,
                rolled_back_from: None,
                created_at_ms: now_ms,
            })
            .map_err(store_status)?;

        let cultures = self.initial_cultures(&node, &version);
        let (written, _) = record_draft(&tx, &version, &cultures, now_ms)?;
        tx.commit().map_err(store_status)?;

        tracing::info!(content_id = %node.id, key = node.key.as_str(), cultures = ?written, "content created");
        Ok(ContentCreated {
            node,
            version_id: version.id,
            cultures: written,
        })
    }

    /// Appends a version carrying the overrides and recomputes `edited` for
    /// every culture the overrides touch.
    pub fn save(&self, request: SaveRequest) -> Result<SaveOutcome, OperationStatus> {
        let content_id = request.content_id;
        self.save_inner(request)
            .inspect_err(|status| log_rejected("save", content_id, status))
    }

    fn save_inner(&self, request: SaveRequest) -> Result<SaveOutcome, OperationStatus> {
        let content_id = request.content_id;
        let _guard = self.locks.acquire(content_id, &request.cancel)?;
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.write().map_err(store_status)?;
        let now_ms = self.clock.now_ms();

        let node = load_live_node(&tx, content_id)?;
        self.policy.ensure_content_type(&node.content_type)?;
        for culture in request.names.keys() {
            self.policy.check_name_culture(&node.content_type, culture)?;
        }
        for key in request.values.keys() {
            self.policy.check_value_culture(&node.content_type, &key.culture)?;
        }

        let base = tx.latest_version(content_id).map_err(store_status)?;
        let mut names = base.as_ref().map(|v| v.names.clone()).unwrap_or_default();
        let mut values = base.as_ref().map(|v| v.values.clone()).unwrap_or_default();

        let mut explicit: BTreeSet<Culture> = request.names.keys().cloned().collect();
        explicit.extend(request.values.keys().map(|key| key.culture.clone()));
        let shared_changed = request.values.keys().any(|key| key.culture.is_invariant());
        names.extend(request.names);
        values.extend(request.values);

        let existing: Vec<Culture> = tx
            .variant_states(content_id)
            .map_err(store_status)?
            .into_keys()
            .collect();
        let mut touched = explicit.clone();
        if shared_changed {
            touched.extend(existing);
        }
        touched.retain(|culture| culture.is_invariant() != self.policy.is_variant(&node));
        let touched: Vec<Culture> = touched.into_iter().collect();

        let ctx = HookContext {
            operation: HookOperation::Save,
            content_id,
            cultures: &touched,
        };
        self.before_commit(&ctx)?;

        request.cancel.check()?;
        let version = tx
            .append_version(AppendVersionRequest {
                content_id,
                creator: request.creator,
                names,
                values,
                rolled_back_from: None,
                created_at_ms: now_ms,
            })
            .map_err(store_status)?;
        request.cancel.check()?;
        let (written, edited) = record_draft(&tx, &version, &touched, now_ms)?;
        tx.commit().map_err(store_status)?;
        self.hooks.after_commit(&ctx);

        tracing::info!(%content_id, version_id = %version.id, cultures = ?written, edited = ?edited, "saved");
        Ok(SaveOutcome {
            version_id: version.id,
            touched_cultures: written,
            edited_cultures: edited,
        })
    }

    /// Copies a past version forward as a new draft. History is never rewound
    /// and nothing is published.
    pub fn rollback(&self, request: RollbackRequest) -> Result<SaveOutcome, OperationStatus> {
        let content_id = request.content_id;
        self.rollback_inner(request)
            .inspect_err(|status| log_rejected("rollback", content_id, status))
    }

    fn rollback_inner(&self, request: RollbackRequest) -> Result<SaveOutcome, OperationStatus> {
        let content_id = request.content_id;
        let _guard = self.locks.acquire(content_id, &request.cancel)?;
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.write().map_err(store_status)?;
        let now_ms = self.clock.now_ms();

        let node = load_live_node(&tx, content_id)?;
        let target = tx
            .version(request.target)
            .map_err(store_status)?
            .filter(|version| version.content_id == content_id)
            .ok_or(OperationStatus::NotFound)?;
        let states = tx.variant_states(content_id).map_err(store_status)?;

        let whole = request.cultures.is_empty() || !self.policy.is_variant(&node);
        let cultures = self.policy.resolve_cultures(&node, &request.cultures, || {
            target
                .touched_cultures()
                .into_iter()
                .filter(|culture| !culture.is_invariant())
                .collect()
        })?;

        let base = tx.latest_version(content_id).map_err(store_status)?;
        let mut names = base.as_ref().map(|v| v.names.clone()).unwrap_or_default();
        let mut values = base.as_ref().map(|v| v.values.clone()).unwrap_or_default();
        let mut replaced: BTreeSet<Culture> = cultures.iter().cloned().collect();
        if whole {
            replaced.insert(Culture::invariant());
        }
        names.retain(|culture, _| !replaced.contains(culture));
        values.retain(|key, _| !replaced.contains(&key.culture));
        for (culture, name) in &target.names {
            if replaced.contains(culture) {
                names.insert(culture.clone(), name.clone());
            }
        }
        for (key, value) in &target.values {
            if replaced.contains(&key.culture) {
                values.insert(key.clone(), value.clone());
            }
        }

        let mut touched: BTreeSet<Culture> = cultures.iter().cloned().collect();
        if whole && self.policy.is_variant(&node) {
            touched.extend(states.keys().cloned());
        }
        let touched: Vec<Culture> = touched.into_iter().collect();

        let ctx = HookContext {
            operation: HookOperation::Rollback,
            content_id,
            cultures: &touched,
        };
        self.before_commit(&ctx)?;

        request.cancel.check()?;
        let version = tx
            .append_version(AppendVersionRequest {
                content_id,
                creator: request.creator,
                names,
                values,
                rolled_back_from: Some(target.id),
                created_at_ms: now_ms,
            })
            .map_err(store_status)?;
        request.cancel.check()?;
        let (written, edited) = record_draft(&tx, &version, &touched, now_ms)?;
        tx.commit().map_err(store_status)?;
        self.hooks.after_commit(&ctx);

        tracing::info!(
            %content_id,
            target = %target.id,
            version_id = %version.id,
            cultures = ?written,
            "rolled back"
        );
        Ok(SaveOutcome {
            version_id: version.id,
            touched_cultures: written,
            edited_cultures: edited,
        })
    }

    /// Unpublishes and trashes a node and its whole subtree.
    pub fn move_to_trash(&self, content_id: ContentId) -> Result<TrashOutcome, OperationStatus> {
        self.move_to_trash_inner(content_id)
            .inspect_err(|status| log_rejected("move_to_trash", content_id, status))
    }

    fn move_to_trash_inner(&self, content_id: ContentId) -> Result<TrashOutcome, OperationStatus> {
        let cancel = CancellationToken::default();
        let _guard = self.locks.acquire(content_id, &cancel)?;
        let descendants = self.subtree_ids(content_id)?;
        let _descendant_guards = self.locks.acquire_all(&descendants, &cancel)?;

        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.write().map_err(store_status)?;
        let now_ms = self.clock.now_ms();

        let root = load_node(&tx, content_id)?;
        if root.trashed {
            tx.commit().map_err(store_status)?;
            return Ok(TrashOutcome::default());
        }
        let mut nodes: Vec<ContentNode> = vec![root.clone()];
        nodes.extend(tx.descendants(&root).map_err(store_status)?);

        let ctx = HookContext {
            operation: HookOperation::MoveToTrash,
            content_id,
            cultures: &[],
        };
        self.before_commit(&ctx)?;

        let mut trashed = Vec::with_capacity(nodes.len());
        for node in &nodes {
            withdraw_node(&tx, node, None, now_ms)?;
            tx.set_content_trashed(node.id, now_ms)
                .map_err(store_status)?;
            self.projector
                .invalidate(&tx, node.id)
                .map_err(store_status)?;
            tx.schedule_cancel_all(node.id).map_err(store_status)?;
            trashed.push(node.id);
        }
        tx.commit().map_err(store_status)?;
        self.hooks.after_commit(&ctx);

        tracing::info!(%content_id, nodes = trashed.len(), "moved to trash");
        Ok(TrashOutcome { trashed })
    }

    /// Removes a leaf node with its versions, states, schedules and cache row.
    pub fn delete_content(&self, content_id: ContentId) -> Result<(), OperationStatus> {
        self.delete_content_inner(content_id)
            .inspect_err(|status| log_rejected("delete_content", content_id, status))
    }

    fn delete_content_inner(&self, content_id: ContentId) -> Result<(), OperationStatus> {
        let cancel = CancellationToken::default();
        let _guard = self.locks.acquire(content_id, &cancel)?;
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.write().map_err(store_status)?;

        load_node(&tx, content_id)?;
        let ctx = HookContext {
            operation: HookOperation::Delete,
            content_id,
            cultures: &[],
        };
        self.before_commit(&ctx)?;

        tx.delete_content(content_id).map_err(|err| match err {
            StoreError::ContentHasChildren => {
                OperationStatus::failed("content has children; delete them first")
            }
            other => store_status(other),
        })?;
        tx.commit().map_err(store_status)?;
        self.hooks.after_commit(&ctx);

        tracing::info!(%content_id, "content deleted");
        Ok(())
    }

    /// Version history, newest first.
    pub fn list_versions(&self, content_id: ContentId) -> Result<Vec<Version>, OperationStatus> {
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.read().map_err(store_status)?;
        load_node(&tx, content_id)?;
        tx.list_versions(content_id).map_err(store_status)
    }

    /// Retention hook: drops versions beyond the newest `keep_latest` that no
    /// culture points at. Never called by the engine itself.
    pub fn prune_versions(
        &self,
        content_id: ContentId,
        keep_latest: usize,
    ) -> Result<usize, OperationStatus> {
        let _guard = self
            .locks
            .acquire(content_id, &CancellationToken::default())?;
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.write().map_err(store_status)?;
        load_node(&tx, content_id)?;
        let removed = tx
            .prune_versions(content_id, keep_latest)
            .map_err(store_status)?;
        tx.commit().map_err(store_status)?;
        tracing::info!(%content_id, keep_latest, removed, "versions pruned");
        Ok(removed)
    }

    /// Cultures whose rows the first version of a node writes.
    fn initial_cultures(&self, node: &ContentNode, version: &Version) -> Vec<Culture> {
        if !self.policy.is_variant(node) {
            return vec![Culture::invariant()];
        }
        version
            .touched_cultures()
            .into_iter()
            .filter(|culture| !culture.is_invariant())
            .collect()
    }
}
