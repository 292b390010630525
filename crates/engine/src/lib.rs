#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod hooks;
pub mod locks;
pub mod policy;
pub mod projector;
pub mod serializer;

mod engine;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, CascadePolicy, ConfigError, EngineConfig, SchedulerConfig};
pub use engine::{
    BranchFilter, BranchReport, ContentCreated, CreateContent, PublishEngine, PublishRequest,
    RollbackRequest, SaveRequest, TrashOutcome, UnpublishRequest,
};
pub use hooks::{HookContext, HookDecision, HookOperation, PublishHook};
pub use locks::{CancellationToken, ContentLocks};
pub use policy::{ContentOperationPolicy, ContentTypeProvider, StaticContentTypes};
pub use projector::{CacheDiscrepancy, CacheDiscrepancyKind, RebuildReport};
pub use serializer::{CacheSerializer, JsonCacheSerializer};

#[cfg(test)]
mod tests;
