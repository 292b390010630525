#![forbid(unsafe_code)]

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Sql(rusqlite::Error),
    InvalidInput(&'static str),
    UnknownContent,
    UnknownVersion,
    VersionContentMismatch,
    ContentHasChildren,
    ContentTrashed,
    InvariantViolation(&'static str),
    CorruptRow(&'static str),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO",
            Self::Sql(_) => "SQLITE",
            Self::InvalidInput(message) if message.starts_with("RESET_REQUIRED") => {
                "RESET_REQUIRED"
            }
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::UnknownContent => "UNKNOWN_CONTENT",
            Self::UnknownVersion => "UNKNOWN_VERSION",
            Self::VersionContentMismatch => "VERSION_CONTENT_MISMATCH",
            Self::ContentHasChildren => "CONTENT_HAS_CHILDREN",
            Self::ContentTrashed => "CONTENT_TRASHED",
            Self::InvariantViolation(_) => "INVARIANT_VIOLATION",
            Self::CorruptRow(_) => "CORRUPT_ROW",
        }
    }

    /// Busy/locked database errors clear up on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Sql(rusqlite::Error::SqliteFailure(code, _)) => matches!(
                code.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            Self::Io(_) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "io: {err}"),
            Self::Sql(err) => write!(f, "sqlite: {err}"),
            Self::InvalidInput(message) => write!(f, "invalid input: {message}"),
            Self::UnknownContent => write!(f, "unknown content"),
            Self::UnknownVersion => write!(f, "unknown version"),
            Self::VersionContentMismatch => write!(f, "version belongs to another content node"),
            Self::ContentHasChildren => write!(f, "content has children"),
            Self::ContentTrashed => write!(f, "content is trashed"),
            Self::InvariantViolation(message) => write!(f, "invariant violation: {message}"),
            Self::CorruptRow(message) => write!(f, "corrupt row: {message}"),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<std::io::Error> for StoreError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sql(value)
    }
}
