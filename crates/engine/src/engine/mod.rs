#![forbid(unsafe_code)]

mod branch;
mod cache;
mod content;
mod publish;
mod requests;
mod schedule;
mod unpublish;

pub use requests::*;

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::hooks::{HookContext, HookDecision, HookList, PublishHook};
use crate::locks::ContentLocks;
use crate::policy::{ContentOperationPolicy, ContentTypeProvider};
use crate::projector::{NuCacheProjector, ProjectionError};
use crate::serializer::{CacheSerializer, JsonCacheSerializer};
use cms_core::{
    ContentId, ContentNode, Culture, NuCacheRow, OperationStatus, VariantState, Version,
};
use cms_storage::{StoreError, StorePool, StoreTx};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Orchestrates every draft/publish transition for content nodes.
///
/// Each mutating call takes the node's exclusive lock, borrows one pooled
/// connection and runs a single SQLite transaction covering versions,
/// variant states, schedules and the cache row.
pub struct PublishEngine {
    pool: StorePool,
    locks: ContentLocks,
    policy: ContentOperationPolicy,
    projector: NuCacheProjector,
    clock: Arc<dyn Clock>,
    hooks: HookList,
    config: EngineConfig,
}

impl std::fmt::Debug for PublishEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishEngine")
            .field("storage_dir", &self.pool.storage_dir())
            .field("config", &self.config)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl PublishEngine {
    pub fn open(
        storage_dir: impl AsRef<Path>,
        config: EngineConfig,
        content_types: Arc<dyn ContentTypeProvider>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        let pool = StorePool::open(storage_dir, config.pool_max_idle)?;
        Ok(Self {
            pool,
            locks: ContentLocks::new(config.lock_timeout()),
            policy: ContentOperationPolicy::new(content_types),
            projector: NuCacheProjector::new(Arc::new(JsonCacheSerializer)),
            clock,
            hooks: HookList::default(),
            config,
        })
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn CacheSerializer>) -> Self {
        self.projector = NuCacheProjector::new(serializer);
        self
    }

    pub fn with_hook(mut self, hook: Arc<dyn PublishHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pool(&self) -> &StorePool {
        &self.pool
    }

    pub fn locks(&self) -> &ContentLocks {
        &self.locks
    }

    pub fn policy(&self) -> &ContentOperationPolicy {
        &self.policy
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    pub fn content(&self, content_id: ContentId) -> Result<ContentNode, OperationStatus> {
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.read().map_err(store_status)?;
        tx.content(content_id)
            .map_err(store_status)?
            .ok_or(OperationStatus::NotFound)
    }

    pub fn children(&self, content_id: ContentId) -> Result<Vec<ContentNode>, OperationStatus> {
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.read().map_err(store_status)?;
        load_node(&tx, content_id)?;
        tx.children(content_id).map_err(store_status)
    }

    pub fn variant_states(
        &self,
        content_id: ContentId,
    ) -> Result<BTreeMap<Culture, VariantState>, OperationStatus> {
        let mut store = self.pool.acquire().map_err(store_status)?;
        let tx = store.read().map_err(store_status)?;
        load_node(&tx, content_id)?;
        tx.variant_states(content_id).map_err(store_status)
    }

    /// Public-site read: no content lock, whatever `rv` is committed.
    pub fn cache_row(&self, content_id: ContentId) -> Result<Option<NuCacheRow>, OperationStatus> {
        let store = self.pool.acquire().map_err(store_status)?;
        store.nucache_row(content_id).map_err(store_status)
    }

    fn before_commit(&self, ctx: &HookContext<'_>) -> Result<(), OperationStatus> {
        match self.hooks.before_commit(ctx) {
            HookDecision::Allow => Ok(()),
            HookDecision::Deny { reason } => {
                tracing::info!(
                    content_id = %ctx.content_id,
                    operation = ctx.operation.as_str(),
                    reason = %reason,
                    "operation denied by hook"
                );
                Err(OperationStatus::CancelledByHook)
            }
        }
    }
}

/// Maps storage failures onto the status taxonomy.
pub(crate) fn store_status(err: StoreError) -> OperationStatus {
    match err {
        StoreError::UnknownContent | StoreError::UnknownVersion => OperationStatus::NotFound,
        StoreError::ContentTrashed => OperationStatus::InTrash,
        other => OperationStatus::failed(other.to_string()),
    }
}

pub(crate) fn projection_status(err: ProjectionError) -> OperationStatus {
    match err {
        ProjectionError::Store(err) => store_status(err),
        ProjectionError::Serialize(err) => OperationStatus::failed(err.to_string()),
    }
}

pub(crate) fn load_node(
    tx: &StoreTx<'_>,
    content_id: ContentId,
) -> Result<ContentNode, OperationStatus> {
    tx.content(content_id)
        .map_err(store_status)?
        .ok_or(OperationStatus::NotFound)
}

/// Loads a node that may still be edited or published.
pub(crate) fn load_live_node(
    tx: &StoreTx<'_>,
    content_id: ContentId,
) -> Result<ContentNode, OperationStatus> {
    let node = load_node(tx, content_id)?;
    if node.trashed {
        return Err(OperationStatus::InTrash);
    }
    Ok(node)
}

pub(crate) fn log_rejected(operation: &'static str, content_id: ContentId, status: &OperationStatus) {
    match status {
        OperationStatus::Failed { reason } => {
            tracing::error!(%content_id, operation, code = status.code(), reason = %reason, "operation failed")
        }
        _ => tracing::debug!(%content_id, operation, code = status.code(), "operation rejected"),
    }
}

/// Points the given cultures at `version` and recomputes their flags.
///
/// Rows are created for cultures that become available; cultures with
/// nothing saved and no row are skipped. Returns (written, edited).
pub(crate) fn record_draft(
    tx: &StoreTx<'_>,
    version: &Version,
    cultures: &[Culture],
    now_ms: i64,
) -> Result<(Vec<Culture>, Vec<Culture>), OperationStatus> {
    let states = tx.variant_states(version.content_id).map_err(store_status)?;
    let mut published_versions: BTreeMap<_, Version> = BTreeMap::new();
    let mut written = Vec::new();
    let mut edited = Vec::new();

    for culture in cultures {
        let existing = states.get(culture);
        let has_content = version.names.contains_key(culture)
            || version.values.keys().any(|key| &key.culture == culture);
        let available = existing.is_some_and(|state| state.available) || has_content;
        if !available && existing.is_none() {
            continue;
        }

        let published_version_id = existing.and_then(|state| state.published_version_id);
        let is_edited = match published_version_id {
            Some(id) => {
                if !published_versions.contains_key(&id) {
                    let loaded = tx.require_version(id).map_err(store_status)?;
                    published_versions.insert(id, loaded);
                }
                published_versions
                    .get(&id)
                    .is_none_or(|published| !version.same_for_culture(published, culture))
            }
            None => true,
        };

        let state = VariantState {
            culture: culture.clone(),
            name: version
                .names
                .get(culture)
                .cloned()
                .or_else(|| existing.and_then(|state| state.name.clone())),
            available,
            published: existing.is_some_and(|state| state.published),
            edited: is_edited,
            current_version_id: version.id,
            published_version_id,
            published_at_ms: existing.and_then(|state| state.published_at_ms),
            updated_at_ms: now_ms,
        };
        tx.set_variant_state(version.content_id, &state)
            .map_err(store_status)?;
        written.push(culture.clone());
        if is_edited {
            edited.push(culture.clone());
        }
    }
    Ok((written, edited))
}

/// Unpublishes every published culture of `node` and drops its cache row.
pub(crate) fn withdraw_node(
    tx: &StoreTx<'_>,
    node: &ContentNode,
    only: Option<&[Culture]>,
    now_ms: i64,
) -> Result<Vec<Culture>, OperationStatus> {
    let states = tx.variant_states(node.id).map_err(store_status)?;
    let mut withdrawn = Vec::new();
    for state in states.values() {
        if !state.published {
            continue;
        }
        if only.is_some_and(|cultures| !cultures.contains(&state.culture)) {
            continue;
        }
        let reset = VariantState {
            published: false,
            edited: true,
            published_version_id: None,
            published_at_ms: None,
            updated_at_ms: now_ms,
            ..state.clone()
        };
        tx.set_variant_state(node.id, &reset).map_err(store_status)?;
        withdrawn.push(state.culture.clone());
    }
    Ok(withdrawn)
}
