#![forbid(unsafe_code)]

use crate::clock::ts_ms_to_rfc3339;
use cms_core::{ContentNode, Culture, PropertyValue, Version};
use serde_json::{Map, Value, json};

/// One published culture as handed to the serializer.
#[derive(Clone, Debug)]
pub struct PublishedCulture<'a> {
    pub culture: &'a Culture,
    pub name: Option<&'a str>,
    pub published_at_ms: Option<i64>,
    pub version: &'a Version,
}

/// Everything the cache row for one node is built from.
#[derive(Clone, Debug)]
pub struct CacheDocument<'a> {
    pub node: &'a ContentNode,
    pub cultures: Vec<PublishedCulture<'a>>,
    /// Source of shared (invariant) property values.
    pub invariant_source: &'a Version,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheSerializeError {
    pub alias: String,
    pub message: String,
}

impl std::fmt::Display for CacheSerializeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "property {}: {}", self.alias, self.message)
    }
}

impl std::error::Error for CacheSerializeError {}

/// Turns a node's published view into the opaque cache blob.
/// Must be deterministic: equal documents produce equal bytes.
pub trait CacheSerializer: Send + Sync {
    fn serialize(&self, doc: &CacheDocument<'_>) -> Result<Vec<u8>, CacheSerializeError>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCacheSerializer;

impl CacheSerializer for JsonCacheSerializer {
    fn serialize(&self, doc: &CacheDocument<'_>) -> Result<Vec<u8>, CacheSerializeError> {
        let mut cultures = Map::new();
        let mut properties: Map<String, Value> = Map::new();

        for published in &doc.cultures {
            cultures.insert(
                published.culture.as_str().to_string(),
                json!({
                    "name": published.name,
                    "published_at": published.published_at_ms.map(ts_ms_to_rfc3339),
                    "version_id": published.version.id.get(),
                }),
            );
            if published.culture.is_invariant() {
                continue;
            }
            for (key, value) in &published.version.values {
                if &key.culture != published.culture {
                    continue;
                }
                push_property(&mut properties, published.culture, &key.segment, &key.alias, value)?;
            }
        }

        let invariant = Culture::invariant();
        for (key, value) in &doc.invariant_source.values {
            if key.culture.is_invariant() {
                push_property(&mut properties, &invariant, &key.segment, &key.alias, value)?;
            }
        }

        let document = json!({
            "id": doc.node.id.get(),
            "key": doc.node.key.as_str(),
            "content_type": doc.node.content_type,
            "path": doc.node.path_string(),
            "level": doc.node.level(),
            "sort_order": doc.node.sort_order,
            "cultures": cultures,
            "properties": properties,
        });
        serde_json::to_vec(&document).map_err(|err| CacheSerializeError {
            alias: "*".to_string(),
            message: err.to_string(),
        })
    }
}

fn push_property(
    properties: &mut Map<String, Value>,
    culture: &Culture,
    segment: &str,
    alias: &str,
    value: &PropertyValue,
) -> Result<(), CacheSerializeError> {
    let rendered = render_value(alias, value)?;
    let entry = properties
        .entry(alias.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if let Value::Array(items) = entry {
        items.push(json!({
            "culture": culture.as_str(),
            "segment": segment,
            "value": rendered,
        }));
    }
    Ok(())
}

fn render_value(alias: &str, value: &PropertyValue) -> Result<Value, CacheSerializeError> {
    Ok(match value {
        PropertyValue::Text(text) => Value::String(text.clone()),
        PropertyValue::Integer(n) => json!(n),
        PropertyValue::Boolean(b) => Value::Bool(*b),
        PropertyValue::DateTime(ms) => Value::String(ts_ms_to_rfc3339(*ms)),
        PropertyValue::Json(raw) => {
            serde_json::from_str::<Value>(raw).map_err(|err| CacheSerializeError {
                alias: alias.to_string(),
                message: format!("stored json is not valid: {err}"),
            })?
        }
    })
}
