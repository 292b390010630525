#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// A language/locale dimension, or the single invariant slot.
///
/// Codes are normalized to lowercase (`en-us`). The invariant slot is stored
/// as the empty string so that it sorts ahead of every real culture.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Culture(String);

impl Culture {
    pub fn invariant() -> Self {
        Self(String::new())
    }

    pub fn try_new(value: impl Into<String>) -> Result<Self, CultureError> {
        let value = value.into().trim().to_ascii_lowercase();
        validate_culture(&value)?;
        Ok(Self(value))
    }

    pub fn is_invariant(&self) -> bool {
        self.0.is_empty()
    }

    /// Storage form: empty for the invariant slot.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reverse of [`Culture::as_str`].
    pub fn from_stored(value: &str) -> Result<Self, CultureError> {
        if value.is_empty() {
            Ok(Self::invariant())
        } else {
            Self::try_new(value)
        }
    }
}

impl std::fmt::Display for Culture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_invariant() {
            f.write_str("invariant")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl TryFrom<String> for Culture {
    type Error = CultureError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_stored(&value)
    }
}

impl From<Culture> for String {
    fn from(value: Culture) -> Self {
        value.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CultureError {
    Empty,
    TooLong,
    InvalidFirstChar,
    InvalidChar { ch: char, index: usize },
}

impl CultureError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "culture code must not be empty",
            Self::TooLong => "culture code is too long",
            Self::InvalidFirstChar => "culture code must start with a letter",
            Self::InvalidChar { .. } => "culture code may only contain letters, digits and '-'",
        }
    }
}

impl std::fmt::Display for CultureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

impl std::error::Error for CultureError {}

fn validate_culture(value: &str) -> Result<(), CultureError> {
    let Some(first) = value.chars().next() else {
        return Err(CultureError::Empty);
    };
    if value.len() > 16 {
        return Err(CultureError::TooLong);
    }
    if !first.is_ascii_alphabetic() {
        return Err(CultureError::InvalidFirstChar);
    }
    for (index, ch) in value.chars().enumerate().skip(1) {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            continue;
        }
        return Err(CultureError::InvalidChar { ch, index });
    }
    Ok(())
}
