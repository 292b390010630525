#![forbid(unsafe_code)]

use crate::{ContentId, Culture};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleAction {
    Publish,
    Unpublish,
}

impl ScheduleAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Publish => "publish",
            Self::Unpublish => "unpublish",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "publish" => Some(Self::Publish),
            "unpublish" => Some(Self::Unpublish),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleEntry {
    pub content_id: ContentId,
    pub culture: Culture,
    pub action: ScheduleAction,
    pub due_at_ms: i64,
    /// Insertion order; a replacing upsert receives a fresh value.
    pub seq: i64,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub parked: bool,
}

/// Deferred transitions requested alongside a publish call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScheduleWindow {
    pub release_at_ms: Option<i64>,
    pub expire_at_ms: Option<i64>,
}

impl ScheduleWindow {
    /// Expiry, when both ends are set, must fall strictly after release.
    pub fn validate(&self) -> Result<(), ScheduleWindowError> {
        match (self.release_at_ms, self.expire_at_ms) {
            (Some(release), Some(expire)) if expire <= release => {
                Err(ScheduleWindowError::ExpiresBeforeRelease)
            }
            _ => Ok(()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScheduleWindowError {
    ExpiresBeforeRelease,
}

impl ScheduleWindowError {
    pub fn message(&self) -> &'static str {
        match self {
            Self::ExpiresBeforeRelease => "expire_at_ms must be after release_at_ms",
        }
    }
}
