#![forbid(unsafe_code)]

use cms_core::Culture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_STORAGE_DIR: &str = ".cms";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "config io: {err}"),
            Self::Yaml(err) => write!(f, "config yaml: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Yaml(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Yaml(value)
    }
}

/// What happens to published descendants when their ancestor stops being published.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CascadePolicy {
    /// Descendants keep their flags and become path-unreachable.
    #[default]
    Orphan,
    /// Descendants are unpublished in the same operation.
    Cascade,
}

impl CascadePolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "orphan" => Some(Self::Orphan),
            "cascade" => Some(Self::Cascade),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub lock_timeout_ms: u64,
    pub unpublish_cascade: CascadePolicy,
    pub pool_max_idle: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout_ms: 5_000,
            unpublish_cascade: CascadePolicy::Orphan,
            pool_max_idle: 4,
        }
    }
}

impl EngineConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub poll_ms: u64,
    pub max_attempts: u32,
    pub batch_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_ms: 60_000,
            max_attempts: 5,
            batch_limit: 100,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LanguageConfig {
    pub code: String,
    #[serde(default)]
    pub mandatory: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequiredPropertyConfig {
    pub alias: String,
    /// Limits the requirement to one culture; `None` applies it everywhere.
    #[serde(default)]
    pub culture: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContentTypeConfig {
    pub alias: String,
    #[serde(default)]
    pub varies_by_culture: bool,
    #[serde(default)]
    pub required: Vec<RequiredPropertyConfig>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub storage_dir: PathBuf,
    pub log_level: String,
    pub engine: EngineConfig,
    pub scheduler: SchedulerConfig,
    pub languages: Vec<LanguageConfig>,
    pub content_types: Vec<ContentTypeConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from(DEFAULT_STORAGE_DIR),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            engine: EngineConfig::default(),
            scheduler: SchedulerConfig::default(),
            languages: Vec::new(),
            content_types: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = if raw.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(raw)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Applies `CMS_*` environment overrides on top of the file values.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(env_var)
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(dir) = lookup("CMS_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Some(raw) = lookup("CMS_LOCK_TIMEOUT_MS") {
            self.engine.lock_timeout_ms = parse_number("CMS_LOCK_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("CMS_UNPUBLISH_CASCADE") {
            self.engine.unpublish_cascade = CascadePolicy::parse(&raw).ok_or_else(|| {
                ConfigError::Invalid("CMS_UNPUBLISH_CASCADE must be orphan or cascade".to_string())
            })?;
        }
        if let Some(raw) = lookup("CMS_POLL_MS") {
            self.scheduler.poll_ms = parse_number("CMS_POLL_MS", &raw)?;
        }
        if let Some(raw) = lookup("CMS_MAX_ATTEMPTS") {
            self.scheduler.max_attempts = parse_number("CMS_MAX_ATTEMPTS", &raw)?;
        }
        if let Some(level) = lookup("CMS_LOG_LEVEL") {
            self.log_level = level;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("storage_dir must not be empty".to_string()));
        }
        if self.engine.lock_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "engine.lock_timeout_ms must be positive".to_string(),
            ));
        }
        if self.scheduler.poll_ms == 0 {
            return Err(ConfigError::Invalid("scheduler.poll_ms must be positive".to_string()));
        }
        if self.scheduler.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.scheduler.batch_limit == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.batch_limit must be at least 1".to_string(),
            ));
        }

        let known = self.known_cultures()?;
        let known: BTreeSet<&Culture> = known.iter().collect();

        let mut aliases = BTreeSet::new();
        for content_type in &self.content_types {
            let alias = content_type.alias.trim();
            if alias.is_empty() {
                return Err(ConfigError::Invalid(
                    "content_types[].alias must not be empty".to_string(),
                ));
            }
            if !aliases.insert(alias) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate content type alias: {alias}"
                )));
            }
            for required in &content_type.required {
                if required.alias.trim().is_empty() {
                    return Err(ConfigError::Invalid(format!(
                        "content type {alias}: required alias must not be empty"
                    )));
                }
                let Some(code) = &required.culture else {
                    continue;
                };
                let culture = parse_culture(code)?;
                if !content_type.varies_by_culture {
                    return Err(ConfigError::Invalid(format!(
                        "content type {alias} is invariant; required.culture is not allowed"
                    )));
                }
                if !known.contains(&culture) {
                    return Err(ConfigError::Invalid(format!(
                        "content type {alias}: unknown culture {culture}"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Configured languages as validated cultures, rejecting duplicates.
    pub fn known_cultures(&self) -> Result<Vec<Culture>, ConfigError> {
        let mut out = Vec::with_capacity(self.languages.len());
        for language in &self.languages {
            let culture = parse_culture(&language.code)?;
            if out.contains(&culture) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate language: {culture}"
                )));
            }
            out.push(culture);
        }
        Ok(out)
    }
}

fn parse_culture(code: &str) -> Result<Culture, ConfigError> {
    Culture::try_new(code)
        .map_err(|err| ConfigError::Invalid(format!("language {code:?}: {}", err.message())))
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ConfigError::Invalid(format!("{name} must be an integer")))
}

pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
