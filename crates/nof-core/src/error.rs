use thiserror::Error;
use uuid::Uuid;

use crate::activity::ActionKind;

#[derive(Debug, Error)]
pub enum NofError {
    #[error("unknown action: {0}")]
    UnknownAction(String),

    #[error("no handler registered for action: {0}")]
    UnregisteredAction(ActionKind),

    #[error("activity already exists: {0}")]
    DuplicateActivity(Uuid),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("invalid task template type: {0}")]
    InvalidTemplateType(String),

    #[error("invalid output pattern: {0}")]
    InvalidPattern(String),

    #[error("host not found: {0}")]
    HostNotFound(Uuid),

    #[error("task template not found: {0}")]
    TaskTemplateNotFound(Uuid),

    #[error("task not found: {0}")]
    TaskNotFound(Uuid),

    #[error("{kind} already exists: {uuid}")]
    EntityExists { kind: &'static str, uuid: Uuid },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl NofError {
    /// True when the store itself failed, as opposed to refusing one
    /// operation. Constraint violations are refusals.
    pub fn is_storage_failure(&self) -> bool {
        match self {
            NofError::Storage(rusqlite::Error::SqliteFailure(e, _)) => {
                e.code != rusqlite::ErrorCode::ConstraintViolation
            }
            NofError::Storage(_) | NofError::Io(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, NofError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> NofError {
        NofError::Storage(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(code),
            None,
        ))
    }

    #[test]
    fn constraint_violations_are_not_storage_failures() {
        assert!(!sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE).is_storage_failure());
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_IOERR).is_storage_failure());
        assert!(NofError::Io(std::io::Error::other("disk")).is_storage_failure());
        assert!(!NofError::EntityExists {
            kind: "host",
            uuid: Uuid::nil()
        }
        .is_storage_failure());
    }
}
