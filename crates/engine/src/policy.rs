#![forbid(unsafe_code)]

use crate::config::AppConfig;
use crate::config::ConfigError;
use cms_core::{ContentNode, Culture, OperationStatus, VariantState, Version};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Content-type metadata the engine reads but never mutates.
pub trait ContentTypeProvider: Send + Sync {
    fn exists(&self, content_type: &str) -> bool;
    fn is_culture_variant(&self, content_type: &str) -> bool;
    fn mandatory_cultures(&self, content_type: &str) -> BTreeSet<Culture>;
    fn required_properties(&self, content_type: &str, culture: &Culture) -> BTreeSet<String>;
    fn known_cultures(&self) -> Vec<Culture>;
}

#[derive(Clone, Debug, Default)]
struct StaticContentType {
    varies_by_culture: bool,
    required_everywhere: BTreeSet<String>,
    required_by_culture: BTreeMap<Culture, BTreeSet<String>>,
}

/// Provider backed by the `languages` and `content_types` config sections.
#[derive(Clone, Debug, Default)]
pub struct StaticContentTypes {
    languages: Vec<Culture>,
    mandatory: BTreeSet<Culture>,
    types: BTreeMap<String, StaticContentType>,
}

impl StaticContentTypes {
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let languages = config.known_cultures()?;
        let mandatory = config
            .languages
            .iter()
            .zip(&languages)
            .filter(|(language, _)| language.mandatory)
            .map(|(_, culture)| culture.clone())
            .collect();

        let mut types = BTreeMap::new();
        for content_type in &config.content_types {
            let mut entry = StaticContentType {
                varies_by_culture: content_type.varies_by_culture,
                ..StaticContentType::default()
            };
            for required in &content_type.required {
                let alias = required.alias.trim().to_string();
                match &required.culture {
                    Some(code) => {
                        let culture = Culture::try_new(code.as_str()).map_err(|err| {
                            ConfigError::Invalid(err.message().to_string())
                        })?;
                        entry
                            .required_by_culture
                            .entry(culture)
                            .or_default()
                            .insert(alias);
                    }
                    None => {
                        entry.required_everywhere.insert(alias);
                    }
                }
            }
            types.insert(content_type.alias.trim().to_string(), entry);
        }

        Ok(Self {
            languages,
            mandatory,
            types,
        })
    }

    pub fn language(mut self, culture: Culture, mandatory: bool) -> Self {
        if mandatory {
            self.mandatory.insert(culture.clone());
        }
        if !self.languages.contains(&culture) {
            self.languages.push(culture);
        }
        self
    }

    pub fn content_type(mut self, alias: &str, varies_by_culture: bool) -> Self {
        self.types.insert(
            alias.to_string(),
            StaticContentType {
                varies_by_culture,
                ..StaticContentType::default()
            },
        );
        self
    }

    pub fn require(mut self, content_type: &str, alias: &str, culture: Option<Culture>) -> Self {
        let entry = self.types.entry(content_type.to_string()).or_default();
        match culture {
            Some(culture) => {
                entry
                    .required_by_culture
                    .entry(culture)
                    .or_default()
                    .insert(alias.to_string());
            }
            None => {
                entry.required_everywhere.insert(alias.to_string());
            }
        }
        self
    }
}

impl ContentTypeProvider for StaticContentTypes {
    fn exists(&self, content_type: &str) -> bool {
        self.types.contains_key(content_type)
    }

    fn is_culture_variant(&self, content_type: &str) -> bool {
        self.types
            .get(content_type)
            .is_some_and(|entry| entry.varies_by_culture)
    }

    fn mandatory_cultures(&self, content_type: &str) -> BTreeSet<Culture> {
        if self.is_culture_variant(content_type) {
            self.mandatory.clone()
        } else {
            BTreeSet::new()
        }
    }

    fn required_properties(&self, content_type: &str, culture: &Culture) -> BTreeSet<String> {
        let Some(entry) = self.types.get(content_type) else {
            return BTreeSet::new();
        };
        let mut out = entry.required_everywhere.clone();
        if let Some(extra) = entry.required_by_culture.get(culture) {
            out.extend(extra.iter().cloned());
        }
        out
    }

    fn known_cultures(&self) -> Vec<Culture> {
        self.languages.clone()
    }
}

/// Culture-variance and mandatory-field rules applied by the engine.
#[derive(Clone)]
pub struct ContentOperationPolicy {
    provider: Arc<dyn ContentTypeProvider>,
}

impl std::fmt::Debug for ContentOperationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentOperationPolicy").finish_non_exhaustive()
    }
}

impl ContentOperationPolicy {
    pub fn new(provider: Arc<dyn ContentTypeProvider>) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &dyn ContentTypeProvider {
        self.provider.as_ref()
    }

    pub fn ensure_content_type(&self, content_type: &str) -> Result<(), OperationStatus> {
        if self.provider.exists(content_type) {
            Ok(())
        } else {
            Err(OperationStatus::NotFound)
        }
    }

    pub fn is_variant(&self, node: &ContentNode) -> bool {
        self.provider.is_culture_variant(&node.content_type)
    }

    /// Normalizes a culture request for `node`.
    ///
    /// Invariant content only accepts its single slot (or an empty list).
    /// Variant content rejects the invariant slot and unknown languages; an
    /// empty list expands to `fallback`.
    pub fn resolve_cultures(
        &self,
        node: &ContentNode,
        requested: &[Culture],
        fallback: impl FnOnce() -> Vec<Culture>,
    ) -> Result<Vec<Culture>, OperationStatus> {
        self.ensure_content_type(&node.content_type)?;
        if !self.is_variant(node) {
            if requested.iter().all(Culture::is_invariant) {
                return Ok(vec![Culture::invariant()]);
            }
            return Err(OperationStatus::InvalidCulture);
        }

        if requested.iter().any(Culture::is_invariant) {
            return Err(OperationStatus::CannotPublishInvariantWhenVariant);
        }
        let known = self.provider.known_cultures();
        if requested.iter().any(|culture| !known.contains(culture)) {
            return Err(OperationStatus::InvalidCulture);
        }

        let mut cultures = if requested.is_empty() {
            fallback()
        } else {
            requested.to_vec()
        };
        cultures.sort();
        cultures.dedup();
        Ok(cultures)
    }

    /// Cultures a save may write values to: the invariant slot always,
    /// languages only on variant types.
    pub fn check_value_culture(
        &self,
        content_type: &str,
        culture: &Culture,
    ) -> Result<(), OperationStatus> {
        if culture.is_invariant() {
            return Ok(());
        }
        if !self.provider.is_culture_variant(content_type)
            || !self.provider.known_cultures().contains(culture)
        {
            return Err(OperationStatus::InvalidCulture);
        }
        Ok(())
    }

    /// Names live in the invariant slot on invariant types and per language otherwise.
    pub fn check_name_culture(
        &self,
        content_type: &str,
        culture: &Culture,
    ) -> Result<(), OperationStatus> {
        if self.provider.is_culture_variant(content_type) == culture.is_invariant() {
            return Err(OperationStatus::InvalidCulture);
        }
        self.check_value_culture(content_type, culture)
    }

    pub fn is_mandatory(&self, node: &ContentNode, culture: &Culture) -> bool {
        self.provider
            .mandatory_cultures(&node.content_type)
            .contains(culture)
    }

    /// Every mandatory culture must be in the request or already published.
    pub fn check_mandatory(
        &self,
        node: &ContentNode,
        requested: &[Culture],
        states: &BTreeMap<Culture, VariantState>,
    ) -> Result<(), OperationStatus> {
        for mandatory in self.provider.mandatory_cultures(&node.content_type) {
            let requested_now = requested.contains(&mandatory);
            let already = states.get(&mandatory).is_some_and(|state| state.published);
            if !requested_now && !already {
                return Err(OperationStatus::MandatoryCultureMissing);
            }
        }
        Ok(())
    }

    /// Required aliases that are absent or blank in `version` for `culture`.
    pub fn missing_properties(
        &self,
        node: &ContentNode,
        version: &Version,
        culture: &Culture,
    ) -> Vec<String> {
        self.provider
            .required_properties(&node.content_type, culture)
            .into_iter()
            .filter(|alias| {
                version
                    .value(culture, alias)
                    .is_none_or(|value| value.is_blank())
            })
            .collect()
    }
}
