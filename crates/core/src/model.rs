#![forbid(unsafe_code)]

use crate::{ContentId, ContentKey, Culture, VersionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Address of one property value: culture slot, optional segment, alias.
///
/// An empty `segment` means "no segment".
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyKey {
    pub culture: Culture,
    pub segment: String,
    pub alias: String,
}

impl PropertyKey {
    pub fn invariant(alias: impl Into<String>) -> Self {
        Self {
            culture: Culture::invariant(),
            segment: String::new(),
            alias: alias.into(),
        }
    }

    pub fn cultured(culture: Culture, alias: impl Into<String>) -> Self {
        Self {
            culture,
            segment: String::new(),
            alias: alias.into(),
        }
    }

    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.segment = segment.into();
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
    /// Milliseconds since the unix epoch, UTC.
    DateTime(i64),
    /// Raw JSON document; validated only when projected into the cache.
    Json(String),
}

impl PropertyValue {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Integer(_) => "integer",
            Self::Boolean(_) => "boolean",
            Self::DateTime(_) => "datetime",
            Self::Json(_) => "json",
        }
    }

    pub fn to_stored(&self) -> String {
        match self {
            Self::Text(value) | Self::Json(value) => value.clone(),
            Self::Integer(value) | Self::DateTime(value) => value.to_string(),
            Self::Boolean(value) => if *value { "1" } else { "0" }.to_string(),
        }
    }

    pub fn from_stored(kind: &str, raw: String) -> Option<Self> {
        match kind {
            "text" => Some(Self::Text(raw)),
            "json" => Some(Self::Json(raw)),
            "integer" => raw.parse().ok().map(Self::Integer),
            "datetime" => raw.parse().ok().map(Self::DateTime),
            "boolean" => match raw.as_str() {
                "1" => Some(Self::Boolean(true)),
                "0" => Some(Self::Boolean(false)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Blank values do not satisfy a required property.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Text(value) | Self::Json(value) => value.trim().is_empty(),
            _ => false,
        }
    }
}

/// Immutable snapshot of every culture's names and property values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Version {
    pub id: VersionId,
    pub content_id: ContentId,
    pub created_at_ms: i64,
    pub creator: String,
    pub names: BTreeMap<Culture, String>,
    pub values: BTreeMap<PropertyKey, PropertyValue>,
    pub rolled_back_from: Option<VersionId>,
}

impl Version {
    /// Values visible to `culture`: its own slot plus the shared invariant slot.
    pub fn culture_values<'a>(
        &'a self,
        culture: &'a Culture,
    ) -> impl Iterator<Item = (&'a PropertyKey, &'a PropertyValue)> + 'a {
        self.values
            .iter()
            .filter(move |(key, _)| &key.culture == culture || key.culture.is_invariant())
    }

    /// Property-by-property equality of what `culture` would publish.
    pub fn same_for_culture(&self, other: &Version, culture: &Culture) -> bool {
        self.names.get(culture) == other.names.get(culture)
            && self.culture_values(culture).eq(other.culture_values(culture))
    }

    pub fn value(&self, culture: &Culture, alias: &str) -> Option<&PropertyValue> {
        self.values
            .get(&PropertyKey::cultured(culture.clone(), alias))
            .or_else(|| self.values.get(&PropertyKey::invariant(alias)))
    }

    /// Cultures with a name or at least one culture-specific value.
    pub fn touched_cultures(&self) -> Vec<Culture> {
        let mut out: Vec<Culture> = self.names.keys().cloned().collect();
        for key in self.values.keys() {
            if !out.contains(&key.culture) {
                out.push(key.culture.clone());
            }
        }
        out.sort();
        out
    }
}

/// Per (content, culture) publication flags and version pointers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariantState {
    pub culture: Culture,
    pub name: Option<String>,
    pub available: bool,
    pub published: bool,
    pub edited: bool,
    pub current_version_id: VersionId,
    pub published_version_id: Option<VersionId>,
    pub published_at_ms: Option<i64>,
    pub updated_at_ms: i64,
}

impl VariantState {
    pub fn check(&self) -> Result<(), VariantStateError> {
        if self.published && !self.available {
            return Err(VariantStateError::PublishedButUnavailable);
        }
        if self.published != self.published_version_id.is_some() {
            return Err(VariantStateError::PublishedPointerMismatch);
        }
        Ok(())
    }

    /// Publishing this culture again would change nothing.
    pub fn is_publish_noop(&self) -> bool {
        self.published && !self.edited && self.published_version_id == Some(self.current_version_id)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VariantStateError {
    PublishedButUnavailable,
    PublishedPointerMismatch,
}

impl VariantStateError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::PublishedButUnavailable => "a culture cannot be published unless it is available",
            Self::PublishedPointerMismatch => {
                "published flag and published version pointer disagree"
            }
        }
    }
}

pub fn aggregate_published<'a>(states: impl IntoIterator<Item = &'a VariantState>) -> bool {
    states.into_iter().any(|state| state.published)
}

/// Tree node. `path` lists ancestor ids root-first and ends with the node itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContentNode {
    pub id: ContentId,
    pub key: ContentKey,
    pub content_type: String,
    pub parent_id: Option<ContentId>,
    pub path: Vec<ContentId>,
    pub sort_order: i64,
    pub trashed: bool,
    pub published: bool,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

impl ContentNode {
    pub fn level(&self) -> usize {
        self.path.len()
    }

    pub fn ancestors(&self) -> &[ContentId] {
        match self.path.split_last() {
            Some((_, ancestors)) => ancestors,
            None => &[],
        }
    }

    pub fn path_string(&self) -> String {
        format_path(&self.path)
    }
}

pub fn format_path(path: &[ContentId]) -> String {
    path.iter()
        .map(|id| id.get().to_string())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn parse_path(raw: &str) -> Option<Vec<ContentId>> {
    raw.split(',')
        .map(|part| part.parse::<i64>().ok().and_then(|v| ContentId::try_new(v).ok()))
        .collect()
}

/// Denormalized published view of one node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NuCacheRow {
    pub node_id: ContentId,
    pub published: bool,
    pub data: Vec<u8>,
    pub data_hash: String,
    pub rv: i64,
    pub updated_at_ms: i64,
}
