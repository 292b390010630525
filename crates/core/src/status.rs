#![forbid(unsafe_code)]

use crate::{Culture, VersionId};

/// Expected business-rule failures, returned as values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OperationStatus {
    NotFound,
    CultureMissing,
    MandatoryCultureMissing,
    ContentInvalid { aliases: Vec<String> },
    PathNotPublished,
    ConcurrencyViolation,
    Failed { reason: String },
    InvalidCulture,
    CannotPublishInvariantWhenVariant,
    InTrash,
    AwaitingRelease,
    CancelledByHook,
    Cancelled,
}

impl OperationStatus {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::CultureMissing => "CULTURE_MISSING",
            Self::MandatoryCultureMissing => "MANDATORY_CULTURE_MISSING",
            Self::ContentInvalid { .. } => "CONTENT_INVALID",
            Self::PathNotPublished => "PATH_NOT_PUBLISHED",
            Self::ConcurrencyViolation => "CONCURRENCY_VIOLATION",
            Self::Failed { .. } => "FAILED",
            Self::InvalidCulture => "INVALID_CULTURE",
            Self::CannotPublishInvariantWhenVariant => "CANNOT_PUBLISH_INVARIANT_WHEN_VARIANT",
            Self::InTrash => "IN_TRASH",
            Self::AwaitingRelease => "AWAITING_RELEASE",
            Self::CancelledByHook => "CANCELLED_BY_HOOK",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Re-running the same request against the same state fails the same way.
    pub fn is_deterministic(&self) -> bool {
        !matches!(
            self,
            Self::ConcurrencyViolation | Self::Failed { .. } | Self::Cancelled
        )
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContentInvalid { aliases } => {
                write!(f, "{} (aliases={})", self.code(), aliases.join(","))
            }
            Self::Failed { reason } => write!(f, "{} ({reason})", self.code()),
            other => f.write_str(other.code()),
        }
    }
}

impl std::error::Error for OperationStatus {}

impl From<crate::VariantStateError> for OperationStatus {
    fn from(value: crate::VariantStateError) -> Self {
        Self::failed(value.message())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PublishResultKind {
    Published,
    PublishedAlready,
    Scheduled,
    Unpublished,
    UnpublishedAlready,
    UnpublishedLastCulture,
    UnpublishedMandatoryCulture,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublishOutcome {
    pub kind: PublishResultKind,
    /// Cultures whose publication state changed in this call.
    pub cultures: Vec<Culture>,
    /// Cache row version after the call, when a row exists.
    pub rv: Option<i64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveOutcome {
    pub version_id: VersionId,
    pub touched_cultures: Vec<Culture>,
    pub edited_cultures: Vec<Culture>,
}
