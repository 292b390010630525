#![forbid(unsafe_code)]

use cms_core::{ContentId, Culture};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookOperation {
    Save,
    Publish,
    Unpublish,
    Rollback,
    MoveToTrash,
    Delete,
}

impl HookOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Publish => "publish",
            Self::Unpublish => "unpublish",
            Self::Rollback => "rollback",
            Self::MoveToTrash => "move_to_trash",
            Self::Delete => "delete",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HookContext<'a> {
    pub operation: HookOperation,
    pub content_id: ContentId,
    pub cultures: &'a [Culture],
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HookDecision {
    Allow,
    Deny { reason: String },
}

/// Synchronous two-phase hook around every engine mutation.
///
/// `before_commit` runs after validation and before the first write; a deny
/// aborts the operation with `CancelledByHook`. `after_commit` runs once the
/// transaction is durable and cannot influence the outcome.
pub trait PublishHook: Send + Sync {
    fn before_commit(&self, _ctx: &HookContext<'_>) -> HookDecision {
        HookDecision::Allow
    }

    fn after_commit(&self, _ctx: &HookContext<'_>) {}
}

#[derive(Clone, Default)]
pub struct HookList {
    hooks: Vec<Arc<dyn PublishHook>>,
}

impl std::fmt::Debug for HookList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookList")
            .field("len", &self.hooks.len())
            .finish()
    }
}

impl HookList {
    pub fn push(&mut self, hook: Arc<dyn PublishHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// First deny wins; later hooks are not consulted.
    pub fn before_commit(&self, ctx: &HookContext<'_>) -> HookDecision {
        for hook in &self.hooks {
            if let HookDecision::Deny { reason } = hook.before_commit(ctx) {
                return HookDecision::Deny { reason };
            }
        }
        HookDecision::Allow
    }

    pub fn after_commit(&self, ctx: &HookContext<'_>) {
        for hook in &self.hooks {
            hook.after_commit(ctx);
        }
    }
}
