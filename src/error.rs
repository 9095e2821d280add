// src/error.rs
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("login rejected: invalid email or password")]
    InvalidCredentials,
    #[error("could not reach the marketplace: {0}")]
    Network(String),
    #[error("unrecognized login response: {0}")]
    UnexpectedResponse(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("could not reach the marketplace: {0}")]
    Network(String),
    #[error("session expired")]
    SessionExpired,
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("field '{0}' not found on page")]
    FieldMissing(String),
    #[error("field '{0}' has a malformed value: '{1}'")]
    MalformedValue(String, String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(String),
    #[error("conflicting write: {0}")]
    Conflict(String),
    #[error("stored value could not be read back: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                let busy = db_err.code().as_deref().map_or(false, is_busy_code);
                if busy || db_err.is_unique_violation() || db_err.is_foreign_key_violation() {
                    StoreError::Conflict(db_err.message().to_string())
                } else {
                    StoreError::Unavailable(err.to_string())
                }
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                StoreError::Corrupt(err.to_string())
            }
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

/// SQLITE_BUSY or SQLITE_LOCKED, including extended codes such as
/// SQLITE_BUSY_SNAPSHOT (517) that WAL mode reports.
fn is_busy_code(code: &str) -> bool {
    match code.parse::<i32>() {
        Ok(code) => matches!(code & 0xff, 5 | 6),
        Err(_) => false,
    }
}

/// Terminal failure of a retrieval. The first underlying error is kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetrievalError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("a retrieval for {0} is already in progress")]
    AlreadyInFlight(String),
    #[error("retrieval interrupted: {0}")]
    Interrupted(String),
}

/// What the user has to do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Retry with different credentials.
    BadCredentials,
    /// Retry later.
    SiteUnreachable,
    /// The site's pages changed; report a bug.
    SiteChanged,
    /// Another retrieval for the same user is running.
    Busy,
    /// Data was retrieved but could not be saved locally.
    CouldNotSave,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::BadCredentials => "invalid_credentials",
            FailureKind::SiteUnreachable => "site_unreachable",
            FailureKind::SiteChanged => "site_changed",
            FailureKind::Busy => "busy",
            FailureKind::CouldNotSave => "storage",
        }
    }
}

impl RetrievalError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RetrievalError::Auth(AuthError::InvalidCredentials) => FailureKind::BadCredentials,
            RetrievalError::Auth(AuthError::Network(_)) => FailureKind::SiteUnreachable,
            RetrievalError::Auth(AuthError::UnexpectedResponse(_)) => FailureKind::SiteChanged,
            RetrievalError::Fetch(FetchError::Network(_)) => FailureKind::SiteUnreachable,
            // an expired session mid-operation means the site dropped us; try again later
            RetrievalError::Fetch(FetchError::SessionExpired) => FailureKind::SiteUnreachable,
            RetrievalError::Fetch(FetchError::UnexpectedStatus(code)) if *code >= 500 => {
                FailureKind::SiteUnreachable
            }
            RetrievalError::Fetch(FetchError::UnexpectedStatus(_)) => FailureKind::SiteChanged,
            RetrievalError::Parse(_) => FailureKind::SiteChanged,
            RetrievalError::AlreadyInFlight(_) => FailureKind::Busy,
            RetrievalError::Interrupted(_) => FailureKind::SiteChanged,
        }
    }
}

impl StoreError {
    pub fn kind(&self) -> FailureKind {
        FailureKind::CouldNotSave
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failures_map_to_distinct_user_actions() {
        assert_eq!(
            RetrievalError::from(AuthError::InvalidCredentials).kind(),
            FailureKind::BadCredentials
        );
        assert_eq!(
            RetrievalError::from(AuthError::Network("refused".into())).kind(),
            FailureKind::SiteUnreachable
        );
        assert_eq!(
            RetrievalError::from(ParseError::FieldMissing("Account Value".into())).kind(),
            FailureKind::SiteChanged
        );
        assert_eq!(
            RetrievalError::from(FetchError::UnexpectedStatus(503)).kind(),
            FailureKind::SiteUnreachable
        );
        assert_eq!(
            StoreError::Unavailable("disk full".into()).kind(),
            FailureKind::CouldNotSave
        );
    }

    #[test]
    fn wrapped_errors_keep_their_message() {
        let err = RetrievalError::from(ParseError::MalformedValue("Available Cash".into(), "n/a".into()));
        assert_eq!(err.to_string(), "field 'Available Cash' has a malformed value: 'n/a'");
    }

    #[test]
    fn extended_busy_codes_count_as_busy() {
        for code in ["5", "6", "261", "262", "517"] {
            assert!(is_busy_code(code), "{code} should be busy");
        }
        for code in ["1", "14", "19", "2067", "SQLITE_BUSY"] {
            assert!(!is_busy_code(code), "{code} should not be busy");
        }
    }
}
