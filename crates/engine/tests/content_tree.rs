#![forbid(unsafe_code)]

mod support;

use cms_core::{
    ContentKey, Culture, OperationStatus, PropertyKey, PropertyValue, PublishResultKind,
    ScheduleAction,
};
use cms_engine::{
    BranchFilter, CancellationToken, CreateContent, PublishRequest, RollbackRequest, SaveRequest,
};
use support::*;

#[test]
fn create_content_builds_paths_and_sort_order() {
    let h = Harness::new();
    let root = h.page(None, &[("en", "Home")]);
    let first = h.page(Some(root), &[("en", "About")]);
    let second = h.page(Some(root), &[("en", "Contact")]);

    let root_node = h.engine.content(root).expect("root");
    let second_node = h.engine.content(second).expect("second");
    assert_eq!(root_node.level(), 1);
    assert_eq!(second_node.path, vec![root, second]);
    assert_eq!(second_node.level(), 2);
    assert_eq!(h.engine.content(first).expect("first").sort_order, 0);
    assert_eq!(second_node.sort_order, 1);
    assert_eq!(root_node.key.as_str().len(), 36);

    let children: Vec<_> = h
        .engine
        .children(root)
        .expect("children")
        .into_iter()
        .map(|node| node.id)
        .collect();
    assert_eq!(children, vec![first, second]);
}

#[test]
fn create_content_validates_type_and_cultures() {
    let h = Harness::new();
    let key = ContentKey::try_new("6f1c2a34-0d5e-4b7a-9c1d-2e3f4a5b6c7d").expect("key");
    let created = h
        .engine
        .create_content(
            CreateContent::new("page", "editor")
                .key(key.clone())
                .name(culture("en"), "Home"),
        )
        .expect("create with key");
    assert_eq!(created.node.key, key);
    assert_eq!(created.cultures, cultures(&["en"]));

    assert_eq!(
        h.engine
            .create_content(CreateContent::new("gallery", "editor"))
            .expect_err("unknown type"),
        OperationStatus::NotFound
    );
    assert_eq!(
        h.engine
            .create_content(CreateContent::new("page", "editor").name(Culture::invariant(), "Home"))
            .expect_err("variant names need a culture"),
        OperationStatus::InvalidCulture
    );
    assert_eq!(
        h.engine
            .create_content(CreateContent::new("folder", "editor").name(culture("en"), "Media"))
            .expect_err("invariant names have no culture"),
        OperationStatus::InvalidCulture
    );
}

#[test]
fn cultures_only_become_available_once_they_have_content() {
    let h = Harness::new();
    let id = h.page(None, &[("en", "Home")]);
    let states = h.engine.variant_states(id).expect("states");
    assert_eq!(states.keys().cloned().collect::<Vec<_>>(), cultures(&["en"]));

    let saved = h
        .engine
        .save(SaveRequest::new(id, "editor").name(culture("fr"), "Accueil"))
        .expect("save fr");
    assert_eq!(saved.touched_cultures, cultures(&["fr"]));
    let states = h.engine.variant_states(id).expect("states");
    assert!(states[&culture("fr")].available);
    assert_eq!(states[&culture("fr")].name.as_deref(), Some("Accueil"));
    // en still points at the version it was last saved with.
    assert_ne!(
        states[&culture("en")].current_version_id,
        states[&culture("fr")].current_version_id
    );
}

#[test]
fn saving_shared_values_touches_every_culture() {
    let h = Harness::new();
    let id = h.page(None, &[("en", "Home"), ("fr", "Accueil")]);
    h.engine
        .publish(PublishRequest::new(id, []))
        .expect("publish");

    let saved = h
        .engine
        .save(
            SaveRequest::new(id, "editor").value(
                PropertyKey::invariant("theme"),
                PropertyValue::Text("dark".to_string()),
            ),
        )
        .expect("save shared");
    assert_eq!(saved.touched_cultures, cultures(&["en", "fr"]));
    assert_eq!(saved.edited_cultures, cultures(&["en", "fr"]));
}

#[test]
fn saving_identical_values_does_not_mark_edited() {
    let h = Harness::new();
    let id = h.page(None, &[("en", "Home")]);
    h.engine
        .publish(PublishRequest::new(id, cultures(&["en"])))
        .expect("publish");

    h.retitle(id, "en", "Home");
    let en = &h.engine.variant_states(id).expect("states")[&culture("en")];
    assert!(!en.edited);
    assert!(en.published);
}

#[test]
fn rollback_appends_a_copy_of_the_target() {
    let h = Harness::new();
    let created = h
        .engine
        .create_content(
            CreateContent::new("page", "editor")
                .name(culture("en"), "Home")
                .value(
                    PropertyKey::cultured(culture("en"), "title"),
                    PropertyValue::Text("v1".to_string()),
                ),
        )
        .expect("create");
    let id = created.node.id;
    h.retitle(id, "en", "v2");
    h.engine
        .publish(PublishRequest::new(id, cultures(&["en"])))
        .expect("publish v2");
    let row = h.row(id).expect("row");

    let outcome = h
        .engine
        .rollback(RollbackRequest::new(id, created.version_id, cultures(&["en"]), "editor"))
        .expect("rollback");
    assert_eq!(outcome.edited_cultures, cultures(&["en"]));

    let versions = h.engine.list_versions(id).expect("versions");
    assert_eq!(versions.len(), 3);
    let latest = &versions[0];
    assert_eq!(latest.id, outcome.version_id);
    assert_eq!(latest.rolled_back_from, Some(created.version_id));
    assert_eq!(
        latest.value(&culture("en"), "title"),
        Some(&PropertyValue::Text("v1".to_string()))
    );

    // Rolling back never publishes.
    assert_eq!(h.row(id), Some(row));
    let en = &h.engine.variant_states(id).expect("states")[&culture("en")];
    assert_eq!(en.current_version_id, outcome.version_id);
    assert!(en.edited);
}

#[test]
fn rollback_of_one_culture_keeps_the_others() {
    let h = Harness::new();
    let created = h
        .engine
        .create_content(
            CreateContent::new("page", "editor")
                .name(culture("en"), "Home")
                .name(culture("fr"), "Accueil")
                .value(
                    PropertyKey::cultured(culture("en"), "title"),
                    PropertyValue::Text("en v1".to_string()),
                )
                .value(
                    PropertyKey::cultured(culture("fr"), "title"),
                    PropertyValue::Text("fr v1".to_string()),
                ),
        )
        .expect("create");
    let id = created.node.id;
    h.retitle(id, "en", "en v2");
    h.retitle(id, "fr", "fr v2");

    h.engine
        .rollback(RollbackRequest::new(id, created.version_id, cultures(&["fr"]), "editor"))
        .expect("rollback fr");
    let latest = &h.engine.list_versions(id).expect("versions")[0];
    assert_eq!(
        latest.value(&culture("fr"), "title"),
        Some(&PropertyValue::Text("fr v1".to_string()))
    );
    assert_eq!(
        latest.value(&culture("en"), "title"),
        Some(&PropertyValue::Text("en v2".to_string()))
    );
}

#[test]
fn rollback_rejects_versions_of_other_content() {
    let h = Harness::new();
    let a = h
        .engine
        .create_content(CreateContent::new("page", "editor").name(culture("en"), "A"))
        .expect("create a");
    let b = h.page(None, &[("en", "B")]);

    assert_eq!(
        h.engine
            .rollback(RollbackRequest::new(b, a.version_id, [], "editor"))
            .expect_err("foreign version"),
        OperationStatus::NotFound
    );
}

#[test]
fn move_to_trash_withdraws_the_whole_subtree() {
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
        .schedule(child, culture("en"), ScheduleAction::Unpublish, T0 + 60_000)
        .expect("schedule");

    let outcome = h.engine.move_to_trash(parent).expect("trash");
    assert_eq!(outcome.trashed, vec![parent, child]);
    for id in [parent, child] {
        let node = h.engine.content(id).expect("node");
        assert!(node.trashed);
        assert!(!node.published);
        assert!(h.row(id).is_none());
        assert!(h.engine.schedule_for(id).expect("schedule").is_empty());
    }

    assert_eq!(
        h.engine
            .save(SaveRequest::new(child, "editor").name(culture("en"), "Renamed"))
            .expect_err("trashed"),
        OperationStatus::InTrash
    );
    assert_eq!(
        h.engine
            .create_content(CreateContent::new("page", "editor").parent(parent))
            .expect_err("trashed parent"),
        OperationStatus::InTrash
    );
}

#[test]
fn delete_requires_children_to_go_first() {
    let h = Harness::new();
    let parent = h.page(None, &[("en", "Home")]);
    let child = h.page(Some(parent), &[("en", "About")]);

    assert!(matches!(
        h.engine.delete_content(parent),
        Err(OperationStatus::Failed { .. })
    ));
    h.engine.delete_content(child).expect("delete child");
    assert_eq!(h.engine.content(child), Err(OperationStatus::NotFound));
    h.engine.delete_content(parent).expect("delete parent");
    assert_eq!(h.engine.content(parent), Err(OperationStatus::NotFound));
}

#[test]
fn prune_keeps_pointed_versions() {
    let h = Harness::new();
    let id = h.page(None, &[("en", "v1")]);
    h.retitle(id, "en", "v2");
    h.retitle(id, "en", "v3");
    h.engine
        .publish(PublishRequest::new(id, cultures(&["en"])))
        .expect("publish v3");
    h.retitle(id, "en", "v4");
    h.retitle(id, "en", "v5");

    let removed = h.engine.prune_versions(id, 1).expect("prune");
    assert_eq!(removed, 3);
    let remaining: Vec<_> = h
        .engine
        .list_versions(id)
        .expect("versions")
        .iter()
        .map(|version| version.value(&culture("en"), "title").cloned())
        .collect();
    assert_eq!(
        remaining,
        vec![
            Some(PropertyValue::Text("v5".to_string())),
            Some(PropertyValue::Text("v3".to_string())),
        ]
    );
    assert!(h.row(id).is_some());
}

#[test]
fn branch_publish_goes_top_down_and_stops_below_failures() {
    let h = Harness::new();
    let root = h.page(None, &[("en", "Home"), ("fr", "Accueil")]);
    let docs = h.page(Some(root), &[("en", "Docs")]);
    let media = h.folder(Some(root), "Media");
    let broken = h
        .engine
        .create_content(
            CreateContent::new("page", "editor")
                .parent(root)
                .name(culture("en"), "Untitled"),
        )
        .expect("create broken")
        .node
        .id;
    let below_broken = h.page(Some(broken), &[("en", "Leaf")]);

    let report = h
        .engine
        .publish_branch(
            root,
            &cultures(&["en", "fr"]),
            BranchFilter {
                include_unpublished: true,
                force_republish: false,
            },
            &CancellationToken::new(),
        )
        .expect("branch");

    let root_result = report.result(root).expect("root visited").as_ref().expect("root ok");
    assert_eq!(root_result.cultures, cultures(&["en", "fr"]));
    let docs_result = report.result(docs).expect("docs visited").as_ref().expect("docs ok");
    assert_eq!(docs_result.cultures, cultures(&["en"]));
    assert!(report.result(media).expect("media visited").is_ok());
    assert_eq!(
        report.result(broken),
        Some(&Err(OperationStatus::ContentInvalid {
            aliases: vec!["title".to_string()]
        }))
    );
    assert_eq!(
        report.result(below_broken),
        Some(&Err(OperationStatus::PathNotPublished))
    );
    assert_eq!(report.results[0].0, root);
    assert_eq!(report.failed().count(), 2);
}

#[test]
fn branch_publish_skips_unpublished_descendants_by_default() {
    let h = Harness::new();
    let root = h.page(None, &[("en", "Home")]);
    let child = h.page(Some(root), &[("en", "About")]);
    let grandchild = h.page(Some(child), &[("en", "Team")]);

    let report = h
        .engine
        .publish_branch(root, &[], BranchFilter::default(), &CancellationToken::new())
        .expect("branch");
    assert_eq!(report.results.len(), 1);
    assert!(report.result(child).is_none());
    assert!(report.result(grandchild).is_none());
    assert!(!h.engine.content(child).expect("child").published);

    h.engine
        .publish(PublishRequest::new(child, []))
        .expect("publish child");
    h.retitle(child, "en", "About us");
    let report = h
        .engine
        .publish_branch(root, &[], BranchFilter::default(), &CancellationToken::new())
        .expect("branch again");
    assert_eq!(
        report.result(root).expect("root").as_ref().expect("root ok").kind,
        PublishResultKind::PublishedAlready
    );
    assert_eq!(
        report.result(child).expect("child").as_ref().expect("child ok").kind,
        PublishResultKind::Published
    );
    assert!(report.result(grandchild).is_none());
}

#[test]
fn branch_node_without_requested_cultures_skips_its_subtree() {
    let h = Harness::new();
    let root = h.page(None, &[("en", "Home")]);
    h.engine
        .publish(PublishRequest::new(root, cultures(&["en"])))
        .expect("publish root");
    let french_only = h.page(Some(root), &[("fr", "Actualités")]);
    let below = h.page(Some(french_only), &[("en", "Story")]);
    let sibling = h.page(Some(root), &[("en", "About")]);

    let report = h
        .engine
        .publish_branch(
            root,
            &cultures(&["en"]),
            BranchFilter {
                include_unpublished: true,
                force_republish: false,
            },
            &CancellationToken::new(),
        )
        .expect("branch");

    assert!(report.result(french_only).is_none());
    assert!(report.result(below).is_none());
    assert_eq!(report.failed().count(), 0);
    assert!(report.result(sibling).expect("sibling visited").is_ok());
    assert!(!h.engine.content(below).expect("below").published);
}

#[test]
fn cancelled_branch_publish_reports_the_rest_as_cancelled() {
    let h = Harness::new();
    let root = h.page(None, &[("en", "Home")]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert_eq!(
        h.engine
            .publish_branch(root, &[], BranchFilter::default(), &cancel)
            .expect_err("cancelled up front"),
        OperationStatus::Cancelled
    );
}
