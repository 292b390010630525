#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(i64);

impl ContentId {
    pub fn try_new(value: i64) -> Result<Self, IdError> {
        validate_row_id(value)?;
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for ContentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionId(i64);

impl VersionId {
    pub fn try_new(value: i64) -> Result<Self, IdError> {
        validate_row_id(value)?;
        Ok(Self(value))
    }

    pub fn get(self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable GUID-shaped key assigned at creation (`8-4-4-4-12` lowercase hex).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentKey(String);

impl ContentKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, IdError> {
        let value = value.into().trim().to_ascii_lowercase();
        validate_key(&value)?;
        Ok(Self(value))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IdError {
    NotPositive,
    InvalidKey,
}

impl IdError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::NotPositive => "id must be a positive integer",
            Self::InvalidKey => "key must be a hyphenated 128-bit hex guid",
        }
    }
}

fn validate_row_id(value: i64) -> Result<(), IdError> {
    if value <= 0 {
        return Err(IdError::NotPositive);
    }
    Ok(())
}

fn validate_key(value: &str) -> Result<(), IdError> {
    let groups: Vec<&str> = value.split('-').collect();
    let lengths = [8usize, 4, 4, 4, 12];
    if groups.len() != lengths.len() {
        return Err(IdError::InvalidKey);
    }
    for (group, len) in groups.iter().zip(lengths) {
        if group.len() != len || !group.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(IdError::InvalidKey);
        }
    }
    Ok(())
}
