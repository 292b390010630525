#![forbid(unsafe_code)]

use cms_core::{ContentId, ContentKey, Culture, PropertyKey, PropertyValue, VersionId};
use std::collections::BTreeMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CreateContentRequest {
    pub key: ContentKey,
    pub content_type: String,
    pub parent_id: Option<ContentId>,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendVersionRequest {
    pub content_id: ContentId,
    pub creator: String,
    pub names: BTreeMap<Culture, String>,
    pub values: BTreeMap<PropertyKey, PropertyValue>,
    pub rolled_back_from: Option<VersionId>,
    pub created_at_ms: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleFailure {
    pub error: String,
    pub park: bool,
}
