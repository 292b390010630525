#![forbid(unsafe_code)]
#![allow(dead_code)]

use cms_core::{ContentId, Culture, NuCacheRow, PropertyKey, PropertyValue};
use cms_engine::{
    CreateContent, EngineConfig, ManualClock, PublishEngine, PublishHook, SaveRequest,
    StaticContentTypes,
};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;

pub(crate) const T0: i64 = 1_700_000_000_000;

pub(crate) struct Harness {
    pub(crate) dir: TempDir,
    pub(crate) clock: Arc<ManualClock>,
    pub(crate) engine: PublishEngine,
}

pub(crate) struct HarnessBuilder {
    config: EngineConfig,
    types: StaticContentTypes,
    hooks: Vec<Arc<dyn PublishHook>>,
}

impl HarnessBuilder {
    pub(crate) fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub(crate) fn types(mut self, types: StaticContentTypes) -> Self {
        self.types = types;
        self
    }

    pub(crate) fn hook(mut self, hook: Arc<dyn PublishHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub(crate) fn build(self) -> Harness {
        let dir = TempDir::new().expect("temp dir");
        let clock = Arc::new(ManualClock::new(T0));
        let mut engine = PublishEngine::open(
            dir.path(),
            self.config,
            Arc::new(self.types),
            clock.clone(),
        )
        .expect("open engine");
        for hook in self.hooks {
            engine = engine.with_hook(hook);
        }
        Harness { dir, clock, engine }
    }
}

impl Harness {
    pub(crate) fn builder() -> HarnessBuilder {
        HarnessBuilder {
            config: EngineConfig::default(),
            types: default_types(),
            hooks: Vec::new(),
        }
    }

    pub(crate) fn new() -> Self {
        Self::builder().build()
    }

    /// Variant `page` with a name and a `title` value per culture.
    pub(crate) fn page(&self, parent: Option<ContentId>, titles: &[(&str, &str)]) -> ContentId {
        let mut request = CreateContent::new("page", "editor");
        if let Some(parent) = parent {
            request = request.parent(parent);
        }
        for (code, title) in titles {
            request = request
                .name(culture(code), *title)
                .value(
                    PropertyKey::cultured(culture(code), "title"),
                    PropertyValue::Text(title.to_string()),
                );
        }
        self.engine.create_content(request).expect("create page").node.id
    }

    /// Invariant `folder` with a single name and `title`.
    pub(crate) fn folder(&self, parent: Option<ContentId>, title: &str) -> ContentId {
        let mut request = CreateContent::new("folder", "editor")
            .name(Culture::invariant(), title)
            .value(
                PropertyKey::invariant("title"),
                PropertyValue::Text(title.to_string()),
            );
        if let Some(parent) = parent {
            request = request.parent(parent);
        }
        self.engine
            .create_content(request)
            .expect("create folder")
            .node
            .id
    }

    pub(crate) fn retitle(&self, content_id: ContentId, code: &str, title: &str) {
        let key = if code.is_empty() {
            PropertyKey::invariant("title")
        } else {
            PropertyKey::cultured(culture(code), "title")
        };
        self.engine
            .save(SaveRequest::new(content_id, "editor").value(key, PropertyValue::Text(title.to_string())))
            .expect("save");
    }

    pub(crate) fn row(&self, content_id: ContentId) -> Option<NuCacheRow> {
        self.engine.cache_row(content_id).expect("read cache row")
    }

    pub(crate) fn row_json(&self, content_id: ContentId) -> Value {
        let row = self.row(content_id).expect("cache row present");
        serde_json::from_slice(&row.data).expect("cache row is json")
    }
}

pub(crate) fn culture(code: &str) -> Culture {
    Culture::try_new(code).expect("culture")
}

pub(crate) fn cultures(codes: &[&str]) -> Vec<Culture> {
    codes.iter().map(|code| culture(code)).collect()
}

/// en, fr and de; `page` varies by culture and requires `title`; `folder` is invariant.
pub(crate) fn default_types() -> StaticContentTypes {
    StaticContentTypes::default()
        .language(culture("en"), false)
        .language(culture("fr"), false)
        .language(culture("de"), false)
        .content_type("page", true)
        .require("page", "title", None)
        .content_type("folder", false)
}

/// Published culture codes listed in a decoded cache row.
pub(crate) fn row_cultures(doc: &Value) -> Vec<String> {
    doc["cultures"]
        .as_object()
        .map(|map| map.keys().cloned().collect())
        .unwrap_or_default()
}

/// Value of a property for one culture code ("" for the invariant slot).
pub(crate) fn row_value<'a>(doc: &'a Value, alias: &str, code: &str) -> Option<&'a Value> {
    doc["properties"][alias]
        .as_array()?
        .iter()
        .find(|item| item["culture"] == code)
        .map(|item| &item["value"])
}
