#![forbid(unsafe_code)]

use crate::locks::{CancellationToken, ContentLocks};
use crate::policy::{ContentOperationPolicy, StaticContentTypes};
use cms_core::{
    ContentId, ContentKey, ContentNode, Culture, OperationStatus, VariantState, VersionId,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn id(value: i64) -> ContentId {
    ContentId::try_new(value).expect("content id")
}

fn culture(code: &str) -> Culture {
    Culture::try_new(code).expect("culture")
}

fn node(content_type: &str) -> ContentNode {
    ContentNode {
        id: id(1),
        key: ContentKey::try_new("0b6e8f3c-2a41-4c7e-9d55-6f1a2b3c4d5e").expect("key"),
        content_type: content_type.to_string(),
        parent_id: None,
        path: vec![id(1)],
        sort_order: 0,
        trashed: false,
        published: false,
        created_at_ms: 0,
        updated_at_ms: 0,
    }
}

fn policy() -> ContentOperationPolicy {
    let types = StaticContentTypes::default()
        .language(culture("en"), true)
        .language(culture("fr"), false)
        .content_type("page", true)
        .content_type("folder", false);
    ContentOperationPolicy::new(Arc::new(types))
}

#[test]
fn lock_slots_are_released_after_use() {
    let locks = ContentLocks::new(Duration::from_millis(20));
    let cancel = CancellationToken::new();
    {
        let guards = locks.acquire_all(&[id(1), id(2)], &cancel).expect("lock both");
        assert_eq!(guards.len(), 2);
        assert!(locks.is_locked(id(2)));
        assert_eq!(
            locks.acquire(id(1), &cancel).expect_err("held"),
            OperationStatus::ConcurrencyViolation
        );
    }
    assert!(!locks.is_locked(id(1)));
    assert_eq!(locks.tracked(), 0);
}

#[test]
fn cancelled_token_fails_before_waiting() {
    let locks = ContentLocks::new(Duration::from_secs(5));
    let cancel = CancellationToken::new();
    cancel.cancel();
    assert_eq!(
        locks.acquire(id(7), &cancel).expect_err("cancelled"),
        OperationStatus::Cancelled
    );
    assert_eq!(locks.tracked(), 0);
}

#[test]
fn culture_requests_follow_the_content_variance() {
    let policy = policy();
    let page = node("page");
    let folder = node("folder");

    assert_eq!(
        policy
            .resolve_cultures(&page, &[culture("fr"), culture("en"), culture("fr")], Vec::new)
            .expect("variant"),
        vec![culture("en"), culture("fr")]
    );
    assert_eq!(
        policy
            .resolve_cultures(&page, &[], || vec![culture("fr")])
            .expect("fallback"),
        vec![culture("fr")]
    );
    assert_eq!(
        policy.resolve_cultures(&page, &[Culture::invariant()], Vec::new),
        Err(OperationStatus::CannotPublishInvariantWhenVariant)
    );
    assert_eq!(
        policy.resolve_cultures(&page, &[culture("de")], Vec::new),
        Err(OperationStatus::InvalidCulture)
    );
    assert_eq!(
        policy.resolve_cultures(&folder, &[], Vec::new).expect("invariant"),
        vec![Culture::invariant()]
    );
    assert_eq!(
        policy.resolve_cultures(&folder, &[culture("en")], Vec::new),
        Err(OperationStatus::InvalidCulture)
    );
    assert_eq!(
        policy.resolve_cultures(&node("gallery"), &[], Vec::new),
        Err(OperationStatus::NotFound)
    );
}

#[test]
fn names_and_values_respect_variance() {
    let policy = policy();
    assert!(policy.check_name_culture("page", &culture("en")).is_ok());
    assert!(policy.check_name_culture("page", &Culture::invariant()).is_err());
    assert!(policy.check_name_culture("folder", &Culture::invariant()).is_ok());
    assert!(policy.check_value_culture("page", &Culture::invariant()).is_ok());
    assert_eq!(
        policy.check_value_culture("folder", &culture("en")),
        Err(OperationStatus::InvalidCulture)
    );
}

#[test]
fn mandatory_culture_may_already_be_published() {
    let policy = policy();
    let page = node("page");
    let mut states = BTreeMap::new();

    assert_eq!(
        policy.check_mandatory(&page, &[culture("fr")], &states),
        Err(OperationStatus::MandatoryCultureMissing)
    );
    assert!(policy.check_mandatory(&page, &[culture("en")], &states).is_ok());

    let version = VersionId::try_new(3).expect("version id");
    states.insert(
        culture("en"),
        VariantState {
            culture: culture("en"),
            name: Some("Home".to_string()),
            available: true,
            published: true,
            edited: false,
            current_version_id: version,
            published_version_id: Some(version),
            published_at_ms: Some(0),
            updated_at_ms: 0,
        },
    );
    assert!(policy.check_mandatory(&page, &[culture("fr")], &states).is_ok());
    assert!(policy.is_mandatory(&page, &culture("en")));
    assert!(!policy.is_mandatory(&node("folder"), &culture("en")));
}
