#![forbid(unsafe_code)]

use crate::locks::CancellationToken;
use cms_core::{
    ContentId, ContentKey, ContentNode, Culture, OperationStatus, PropertyKey, PropertyValue,
    PublishOutcome, ScheduleWindow, VersionId,
};
use std::collections::BTreeMap;

#[derive(Clone, Debug)]
pub struct CreateContent {
    /// Generated when absent.
    pub key: Option<ContentKey>,
    pub content_type: String,
    pub parent_id: Option<ContentId>,
    pub creator: String,
    pub names: BTreeMap<Culture, String>,
    pub values: BTreeMap<PropertyKey, PropertyValue>,
}

impl CreateContent {
    pub fn new(content_type: impl Into<String>, creator: impl Into<String>) -> Self {
        Self {
            key: None,
            content_type: content_type.into(),
            parent_id: None,
            creator: creator.into(),
            names: BTreeMap::new(),
            values: BTreeMap::new(),
        }
    }

    pub fn key(mut self, key: ContentKey) -> Self {
        self.key = Some(key);
        self
    }

    pub fn parent(mut self, parent_id: ContentId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn name(mut self, culture: Culture, name: impl Into<String>) -> Self {
        self.names.insert(culture, name.into());
        self
    }

    pub fn value(mut self, key: PropertyKey, value: PropertyValue) -> Self {
        self.values.insert(key, value);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentCreated {
    pub node: ContentNode,
    pub version_id: VersionId,
    /// Cultures that became available with the initial version.
    pub cultures: Vec<Culture>,
}

/// Property overrides applied on top of the newest version.
#[derive(Clone, Debug)]
pub struct SaveRequest {
    pub content_id: ContentId,
    pub creator: String,
    pub names: BTreeMap<Culture, String>,
    pub values: BTreeMap<PropertyKey, PropertyValue>,
    pub cancel: CancellationToken,
}

impl SaveRequest {
    pub fn new(content_id: ContentId, creator: impl Into<String>) -> Self {
        Self {
            content_id,
            creator: creator.into(),
            names: BTreeMap::new(),
            values: BTreeMap::new(),
            cancel: CancellationToken::default(),
        }
    }

    pub fn name(mut self, culture: Culture, name: impl Into<String>) -> Self {
        self.names.insert(culture, name.into());
        self
    }

    pub fn value(mut self, key: PropertyKey, value: PropertyValue) -> Self {
        self.values.insert(key, value);
        self
    }

    pub fn cancel_with(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Clone, Debug)]
pub struct PublishRequest {
    pub content_id: ContentId,
    /// Empty means every available culture (or the invariant slot).
    pub cultures: Vec<Culture>,
    pub window: ScheduleWindow,
    /// Optimistic check: the culture's current version must still be this one.
    pub expected_versions: BTreeMap<Culture, VersionId>,
    /// Rewrites already-published cultures instead of reporting `PublishedAlready`.
    pub force: bool,
    pub cancel: CancellationToken,
}

impl PublishRequest {
    pub fn new(content_id: ContentId, cultures: impl IntoIterator<Item = Culture>) -> Self {
        Self {
            content_id,
            cultures: cultures.into_iter().collect(),
            window: ScheduleWindow::default(),
            expected_versions: BTreeMap::new(),
            force: false,
            cancel: CancellationToken::default(),
        }
    }

    pub fn window(mut self, window: ScheduleWindow) -> Self {
        self.window = window;
        self
    }

    pub fn expect_version(mut self, culture: Culture, version_id: VersionId) -> Self {
        self.expected_versions.insert(culture, version_id);
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn cancel_with(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Clone, Debug)]
pub struct UnpublishRequest {
    pub content_id: ContentId,
    /// Empty means every published culture (or the invariant slot).
    pub cultures: Vec<Culture>,
    pub cancel: CancellationToken,
}

impl UnpublishRequest {
    pub fn new(content_id: ContentId, cultures: impl IntoIterator<Item = Culture>) -> Self {
        Self {
            content_id,
            cultures: cultures.into_iter().collect(),
            cancel: CancellationToken::default(),
        }
    }

    pub fn cancel_with(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Clone, Debug)]
pub struct RollbackRequest {
    pub content_id: ContentId,
    pub target: VersionId,
    /// Empty means every culture of the target, shared values included.
    pub cultures: Vec<Culture>,
    pub creator: String,
    pub cancel: CancellationToken,
}

impl RollbackRequest {
    pub fn new(
        content_id: ContentId,
        target: VersionId,
        cultures: impl IntoIterator<Item = Culture>,
        creator: impl Into<String>,
    ) -> Self {
        Self {
            content_id,
            target,
            cultures: cultures.into_iter().collect(),
            creator: creator.into(),
            cancel: CancellationToken::default(),
        }
    }

    pub fn cancel_with(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BranchFilter {
    /// Also publish descendants that are not published yet.
    pub include_unpublished: bool,
    /// Republish cultures that have no pending edits.
    pub force_republish: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BranchReport {
    /// Per-node result in the order nodes were visited (top-down).
    pub results: Vec<(ContentId, Result<PublishOutcome, OperationStatus>)>,
}

impl BranchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = ContentId> + '_ {
        self.results
            .iter()
            .filter(|(_, result)| result.is_ok())
            .map(|(id, _)| *id)
    }

    pub fn failed(&self) -> impl Iterator<Item = (ContentId, &OperationStatus)> + '_ {
        self.results
            .iter()
            .filter_map(|(id, result)| result.as_ref().err().map(|status| (*id, status)))
    }

    pub fn result(&self, content_id: ContentId) -> Option<&Result<PublishOutcome, OperationStatus>> {
        self.results
            .iter()
            .find(|(id, _)| *id == content_id)
            .map(|(_, result)| result)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TrashOutcome {
    /// The node and every descendant, top-down.
    pub trashed: Vec<ContentId>,
}
