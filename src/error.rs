use thiserror::Error;

use crate::models::ApplicationStatus;

/// Errors surfaced by the store, scorer and pipeline.
///
/// Every variant is recoverable at the caller boundary and names the
/// offending identifier or value.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{entity} #{id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("job '{title}' at '{company}' ({url}) already stored as #{existing_id}")]
    Duplicate {
        title: String,
        company: String,
        url: String,
        existing_id: i64,
    },

    #[error("application #{application_id}: cannot move from {from} to {to}")]
    InvalidTransition {
        application_id: i64,
        from: ApplicationStatus,
        to: ApplicationStatus,
    },

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("application #{application_id}: expected status {expected}, found {actual}")]
    Conflict {
        application_id: i64,
        expected: ApplicationStatus,
        actual: ApplicationStatus,
    },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("external collaborator failed: {0}")]
    External(#[from] anyhow::Error),
}

impl Error {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Error::NotFound { entity, id }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Stable short code for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound { .. } => "not_found",
            Error::Duplicate { .. } => "duplicate",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::Validation(_) => "validation",
            Error::Conflict { .. } => "conflict",
            Error::Database(_) => "database",
            Error::Encoding(_) => "encoding",
            Error::External(_) => "external",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_offending_values() {
        let err = Error::not_found("job", 42);
        assert_eq!(err.to_string(), "job #42 not found");
        assert_eq!(err.kind(), "not_found");

        let err = Error::InvalidTransition {
            application_id: 7,
            from: ApplicationStatus::Found,
            to: ApplicationStatus::Interview,
        };
        assert!(err.to_string().contains("found"));
        assert!(err.to_string().contains("interview"));
        assert_eq!(err.kind(), "invalid_transition");
    }

    #[test]
    fn test_conflict_reports_both_states() {
        let err = Error::Conflict {
            application_id: 3,
            expected: ApplicationStatus::Found,
            actual: ApplicationStatus::Applied,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected status found"));
        assert!(msg.contains("found applied"));
    }
}
