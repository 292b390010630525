#![forbid(unsafe_code)]

use cms_core::{
    ContentId, Culture, PropertyKey, PropertyValue, PublishResultKind, ScheduleAction,
    ScheduleWindow,
};
use cms_engine::{
    CancellationToken, CreateContent, EngineConfig, HookContext, HookOperation, ManualClock,
    PublishEngine, PublishHook, PublishRequest, SchedulerConfig, StaticContentTypes,
};
use cms_scheduler::{SchedulerRunner, TickReport};
use cms_storage::SqliteStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tempfile::TempDir;

const T0: i64 = 1_700_000_000_000;

struct Setup {
    _dir: TempDir,
    clock: Arc<ManualClock>,
    engine: Arc<PublishEngine>,
    runner: SchedulerRunner,
}

fn setup(engine_config: EngineConfig, scheduler: SchedulerConfig) -> Setup {
    setup_with(engine_config, scheduler, |_| None)
}

fn setup_with(
    engine_config: EngineConfig,
    scheduler: SchedulerConfig,
    hook: impl FnOnce(&TempDir) -> Option<Arc<dyn PublishHook>>,
) -> Setup {
    let dir = TempDir::new().expect("temp dir");
    let clock = Arc::new(ManualClock::new(T0));
    let types = StaticContentTypes::default()
        .language(culture("en"), false)
        .language(culture("fr"), false)
        .content_type("page", true)
        .require("page", "title", None);
    let mut engine = PublishEngine::open(dir.path(), engine_config, Arc::new(types), clock.clone())
        .expect("open engine");
    if let Some(hook) = hook(&dir) {
        engine = engine.with_hook(hook);
    }
    let engine = Arc::new(engine);
    let runner = SchedulerRunner::new(engine.clone(), &scheduler);
    Setup {
        _dir: dir,
        clock,
        engine,
        runner,
    }
}

fn culture(code: &str) -> Culture {
    Culture::try_new(code).expect("culture")
}

fn page(engine: &PublishEngine, parent: Option<ContentId>, codes: &[&str]) -> ContentId {
    let mut request = CreateContent::new("page", "editor");
    if let Some(parent) = parent {
        request = request.parent(parent);
    }
    for code in codes {
        request = request.name(culture(code), format!("page {code}")).value(
            PropertyKey::cultured(culture(code), "title"),
            PropertyValue::Text(format!("title {code}")),
        );
    }
    engine.create_content(request).expect("create").node.id
}

#[test]
fn release_and_expiry_run_when_due() {
    let s = setup(EngineConfig::default(), SchedulerConfig::default());
    let id = page(&s.engine, None, &["en"]);
    let scheduled = s
        .engine
        .publish(PublishRequest::new(id, [culture("en")]).window(ScheduleWindow {
            release_at_ms: Some(T0 + 1_000),
            expire_at_ms: Some(T0 + 3_000),
        }))
        .expect("schedule");
    assert_eq!(scheduled.kind, PublishResultKind::Scheduled);

    let cancel = CancellationToken::new();
    assert_eq!(s.runner.tick(&cancel).expect("early tick"), TickReport::default());

    s.clock.set(T0 + 1_000);
    let report = s.runner.tick(&cancel).expect("release tick");
    assert_eq!(report.completed, 1);
    assert!(s.engine.cache_row(id).expect("read").is_some());
    assert_eq!(s.engine.schedule_for(id).expect("entries").len(), 1);

    s.clock.set(T0 + 3_000);
    let report = s.runner.tick(&cancel).expect("expiry tick");
    assert_eq!(report.completed, 1);
    assert!(s.engine.cache_row(id).expect("read").is_none());
    assert!(s.engine.schedule_for(id).expect("entries").is_empty());
}

#[test]
fn deterministic_failures_are_parked_until_retried() {
    let s = setup(EngineConfig::default(), SchedulerConfig::default());
    let parent = page(&s.engine, None, &["en"]);
    let child = page(&s.engine, Some(parent), &["en"]);
    s.engine
        .schedule(child, culture("en"), ScheduleAction::Publish, T0)
        .expect("schedule");

    let cancel = CancellationToken::new();
    let report = s.runner.tick(&cancel).expect("tick");
    assert_eq!(report.parked, 1);
    let parked = s.engine.parked_entries().expect("parked");
    assert_eq!(parked.len(), 1);
    assert_eq!(parked[0].last_error.as_deref(), Some("PATH_NOT_PUBLISHED"));
    assert_eq!(s.runner.tick(&cancel).expect("idle tick").processed(), 0);

    s.engine
        .publish(PublishRequest::new(parent, [culture("en")]))
        .expect("publish parent");
    assert!(
        s.engine
            .retry_parked(child, &culture("en"), ScheduleAction::Publish)
            .expect("retry")
    );
    let report = s.runner.tick(&cancel).expect("tick after retry");
    assert_eq!(report.completed, 1);
    assert!(s.engine.content(child).expect("child").published);
}

#[test]
fn transient_failures_retry_then_park() {
    let s = setup(
        EngineConfig {
            lock_timeout_ms: 20,
            ..EngineConfig::default()
        },
        SchedulerConfig {
            max_attempts: 2,
            ..SchedulerConfig::default()
        },
    );
    let id = page(&s.engine, None, &["en"]);
    s.engine
        .schedule(id, culture("en"), ScheduleAction::Publish, T0)
        .expect("schedule");
    let guard = s
        .engine
        .locks()
        .acquire(id, &CancellationToken::new())
        .expect("hold lock");

    let cancel = CancellationToken::new();
    let first = s.runner.tick(&cancel).expect("first tick");
    assert_eq!(first.retried, 1);
    let entry = &s.engine.schedule_for(id).expect("entries")[0];
    assert_eq!(entry.attempts, 1);
    assert!(!entry.parked);

    let second = s.runner.tick(&cancel).expect("second tick");
    assert_eq!(second.parked, 1);
    assert!(s.engine.due_entries(10).expect("due").is_empty());
    drop(guard);
}

/// Cancels and re-creates the release entry from a second connection right
/// after the scheduled publish commits, before the tick completes the entry.
struct RescheduleOnPublish {
    storage_dir: PathBuf,
    fired: AtomicBool,
}

impl PublishHook for RescheduleOnPublish {
    fn after_commit(&self, ctx: &HookContext<'_>) {
        if ctx.operation != HookOperation::Publish || self.fired.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut store = SqliteStore::open(&self.storage_dir).expect("second connection");
        let tx = store.write().expect("begin");
        tx.schedule_cancel(ctx.content_id, &culture("en"), Some(ScheduleAction::Publish))
            .expect("cancel");
        tx.schedule_upsert(ctx.content_id, &culture("en"), ScheduleAction::Publish, T0 + 5_000)
            .expect("reschedule");
        tx.commit().expect("commit");
    }
}

#[test]
fn reschedule_racing_the_tick_is_kept() {
    let s = setup_with(EngineConfig::default(), SchedulerConfig::default(), |dir| {
        let hook: Arc<dyn PublishHook> = Arc::new(RescheduleOnPublish {
            storage_dir: dir.path().to_path_buf(),
            fired: AtomicBool::new(false),
        });
        Some(hook)
    });
    let id = page(&s.engine, None, &["en"]);
    let stale = s
        .engine
        .schedule(id, culture("en"), ScheduleAction::Publish, T0)
        .expect("schedule");

    let report = s.runner.tick(&CancellationToken::new()).expect("tick");
    assert_eq!(report.completed, 1);
    let entries = s.engine.schedule_for(id).expect("entries");
    assert_eq!(entries.len(), 1, "rescheduled entry survives");
    assert_eq!(entries[0].due_at_ms, T0 + 5_000);
    assert!(entries[0].seq > stale.seq);
}

#[test]
fn batch_limit_caps_one_tick() {
    let s = setup(
        EngineConfig::default(),
        SchedulerConfig {
            batch_limit: 1,
            ..SchedulerConfig::default()
        },
    );
    let id = page(&s.engine, None, &["en", "fr"]);
    for code in ["en", "fr"] {
        s.engine
            .schedule(id, culture(code), ScheduleAction::Publish, T0)
            .expect("schedule");
    }

    let cancel = CancellationToken::new();
    assert_eq!(s.runner.tick(&cancel).expect("tick").completed, 1);
    assert_eq!(s.runner.tick(&cancel).expect("tick").completed, 1);
    assert_eq!(s.runner.tick(&cancel).expect("tick").processed(), 0);
    let states = s.engine.variant_states(id).expect("states");
    assert!(states.values().all(|state| state.published));
}

#[test]
fn cancelled_runner_stops_without_ticking() {
    let s = setup(EngineConfig::default(), SchedulerConfig::default());
    let id = page(&s.engine, None, &["en"]);
    s.engine
        .schedule(id, culture("en"), ScheduleAction::Publish, T0)
        .expect("schedule");

    let cancel = CancellationToken::new();
    cancel.cancel();
    s.runner.run(std::time::Duration::from_millis(10), &cancel);
    assert_eq!(s.engine.due_entries(10).expect("due").len(), 1);
    assert_eq!(s.runner.tick(&cancel).expect("tick").processed(), 0);
}
