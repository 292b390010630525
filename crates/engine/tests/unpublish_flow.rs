#![forbid(unsafe_code)]

mod support;

use cms_core::{OperationStatus, PublishResultKind};
use cms_engine::{
    CascadePolicy, EngineConfig, PublishRequest, StaticContentTypes, UnpublishRequest,
};
use support::*;

#[test]
fn unpublishing_the_last_culture_deletes_the_row() {
    let h = Harness::new();
    let id = h.page(None, &[("en", "Home")]);
    h.engine
        .publish(PublishRequest::new(id, cultures(&["en"])))
        .expect("publish");
    assert!(h.row(id).is_some());

    let outcome = h
        .engine
        .unpublish(UnpublishRequest::new(id, cultures(&["en"])))
        .expect("unpublish");
    assert_eq!(outcome.kind, PublishResultKind::UnpublishedLastCulture);
    assert_eq!(outcome.cultures, cultures(&["en"]));
    assert_eq!(outcome.rv, None);

    assert!(h.row(id).is_none());
    assert!(!h.engine.content(id).expect("node").published);
    let en = &h.engine.variant_states(id).expect("states")[&culture("en")];
    assert!(!en.published);
    assert!(en.edited);
    assert_eq!(en.published_version_id, None);
    assert!(en.available);
}

#[test]
fn unpublishing_one_of_two_cultures_reprojects_the_row() {
    let h = Harness::new();
    let id = h.page(None, &[("en", "Home"), ("fr", "Accueil")]);
    let published = h
        .engine
        .publish(PublishRequest::new(id, []))
        .expect("publish both");

    let outcome = h
        .engine
        .unpublish(UnpublishRequest::new(id, cultures(&["fr"])))
        .expect("unpublish fr");
    assert_eq!(outcome.kind, PublishResultKind::Unpublished);
    assert!(outcome.rv > published.rv);

    let doc = h.row_json(id);
    assert_eq!(row_cultures(&doc), vec!["en".to_string()]);
    assert_eq!(row_value(&doc, "title", "fr"), None);
    assert!(h.engine.content(id).expect("node").published);
}

#[test]
fn unpublishing_unpublished_cultures_changes_nothing() {
    let h = Harness::new();
    let id = h.page(None, &[("en", "Home"), ("fr", "Accueil")]);
    h.engine
        .publish(PublishRequest::new(id, cultures(&["en"])))
        .expect("publish en");
    let row = h.row(id).expect("row");

    let outcome = h
        .engine
        .unpublish(UnpublishRequest::new(id, cultures(&["fr"])))
        .expect("unpublish fr");
    assert_eq!(outcome.kind, PublishResultKind::UnpublishedAlready);
    assert!(outcome.cultures.is_empty());
    assert_eq!(h.row(id), Some(row));
}

#[test]
fn unpublishing_a_mandatory_culture_unpublishes_the_node() {
    let types = StaticContentTypes::default()
        .language(culture("en"), true)
        .language(culture("fr"), false)
        .content_type("page", true);
    let h = Harness::builder().types(types).build();
    let id = h.page(None, &[("en", "Home"), ("fr", "Accueil")]);
    h.engine
        .publish(PublishRequest::new(id, []))
        .expect("publish both");

    let outcome = h
        .engine
        .unpublish(UnpublishRequest::new(id, cultures(&["en"])))
        .expect("unpublish en");
    assert_eq!(outcome.kind, PublishResultKind::UnpublishedMandatoryCulture);
    assert_eq!(outcome.cultures, cultures(&["en", "fr"]));
    assert!(h.row(id).is_none());
    assert!(
        h.engine
            .variant_states(id)
            .expect("states")
            .values()
            .all(|state| !state.published)
    );
}

#[test]
fn invariant_content_unpublishes_its_single_slot() {
    let h = Harness::new();
    let id = h.folder(None, "Media");
    h.engine
        .publish(PublishRequest::new(id, []))
        .expect("publish");

    let outcome = h
        .engine
        .unpublish(UnpublishRequest::new(id, []))
        .expect("unpublish");
    assert_eq!(outcome.kind, PublishResultKind::Unpublished);
    assert!(h.row(id).is_none());

    assert_eq!(
        h.engine
            .unpublish(UnpublishRequest::new(id, cultures(&["en"])))
            .expect_err("cultures are not allowed"),
        OperationStatus::InvalidCulture
    );
}

#[test]
fn orphan_policy_leaves_descendants_published_but_unreachable() {
    let h = Harness::new();
    let parent = h.page(None, &[("en", "Home")]);
    let child = h.page(Some(parent), &[("en", "About")]);
    h.engine
        .publish(PublishRequest::new(parent, cultures(&["en"])))
        .expect("publish parent");
    h.engine
        .publish(PublishRequest::new(child, cultures(&["en"])))
        .expect("publish child");

    h.engine
        .unpublish(UnpublishRequest::new(parent, []))
        .expect("unpublish parent");

    assert!(h.engine.content(child).expect("child").published);
    assert!(h.row(child).is_some());
    assert_eq!(
        h.engine
            .publish(PublishRequest::new(child, cultures(&["en"])))
            .expect_err("path is broken"),
        OperationStatus::PathNotPublished
    );
}

#[test]
fn cascade_policy_unpublishes_descendants_in_the_same_call() {
    let h = Harness::builder()
        .config(EngineConfig {
            unpublish_cascade: CascadePolicy::Cascade,
            ..EngineConfig::default()
        })
        .build();
    let parent = h.page(None, &[("en", "Home")]);
    let child = h.page(Some(parent), &[("en", "About")]);
    let grandchild = h.folder(Some(child), "Team");
    h.engine
        .publish(PublishRequest::new(parent, cultures(&["en"])))
        .expect("publish parent");
    h.engine
        .publish(PublishRequest::new(child, cultures(&["en"])))
        .expect("publish child");
    h.engine
        .publish(PublishRequest::new(grandchild, []))
        .expect("publish grandchild");

    h.engine
        .unpublish(UnpublishRequest::new(parent, []))
        .expect("unpublish parent");

    for id in [parent, child, grandchild] {
        assert!(!h.engine.content(id).expect("node").published, "{id}");
        assert!(h.row(id).is_none(), "{id}");
    }
    assert!(!h.engine.locks().is_locked(child));
}
