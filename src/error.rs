//! Error types for rotation operations
//!
//! Errors are classified by how the caller should react:
//! - Validation: malformed week or reminder configuration, surface and stop
//! - Retryable: persistence races (duplicate week record, busy database)
//! - Everything else is a storage or configuration failure
//!
//! Not-found and no-op conditions are not errors; they come back as negative
//! results from the operations themselves.

use rusqlite::ErrorCode;
use thiserror::Error;

use crate::db::DbError;
use crate::week::WeekKey;

/// Error types for rotation operations
#[derive(Debug, Error)]
pub enum RotationError {
    // Validation errors
    #[error("Invalid week: {0}")]
    InvalidWeek(String),

    #[error("Invalid reminder day '{0}'. Use Monday-Sunday.")]
    InvalidReminderDay(String),

    #[error("Invalid reminder time '{0}'. Use HH:MM 24h format.")]
    InvalidReminderTime(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid cron expression '{expr}': {reason}")]
    InvalidCron { expr: String, reason: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    // Retryable
    #[error("Week {0} was assigned concurrently")]
    DuplicateAssignment(WeekKey),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl RotationError {
    /// Returns true if the caller should re-read and try again.
    pub fn is_retryable(&self) -> bool {
        match self {
            RotationError::DuplicateAssignment(_) => true,
            RotationError::Database(DbError::Sqlite(rusqlite::Error::SqliteFailure(err, _))) => {
                matches!(
                    err.code,
                    ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
                )
            }
            _ => false,
        }
    }

    /// Returns true for malformed caller input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            RotationError::InvalidWeek(_)
                | RotationError::InvalidReminderDay(_)
                | RotationError::InvalidReminderTime(_)
                | RotationError::InvalidTimezone(_)
                | RotationError::InvalidCron { .. }
                | RotationError::Configuration(_)
        )
    }

    /// Get a user-friendly recovery suggestion
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            RotationError::InvalidWeek(_) => "Use YYYY-MM-DD, for example 2026-03-02.",
            RotationError::InvalidReminderDay(_) => "Use a weekday name such as Monday.",
            RotationError::InvalidReminderTime(_) => "Use 24h HH:MM, for example 09:00.",
            RotationError::InvalidTimezone(_) => "Use an IANA timezone such as America/New_York.",
            RotationError::InvalidCron { .. } => "Check the reminder day and time settings.",
            RotationError::Configuration(_) => {
                "Check your configuration in ~/.oncall-rotation/config.json"
            }
            RotationError::DuplicateAssignment(_) => "Re-read the schedule and try again.",
            RotationError::Database(_) => "Check database permissions and disk space.",
        }
    }
}

impl From<rusqlite::Error> for RotationError {
    fn from(err: rusqlite::Error) -> Self {
        RotationError::Database(DbError::Sqlite(err))
    }
}

/// True when a storage error is a UNIQUE or primary-key violation. Foreign
/// key and CHECK failures are not.
pub(crate) fn is_unique_violation(err: &DbError) -> bool {
    matches!(
        err,
        DbError::Sqlite(rusqlite::Error::SqliteFailure(e, _))
            if e.code == ErrorCode::ConstraintViolation
                && matches!(
                    e.extended_code,
                    rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        | rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                )
    )
}

/// Serializable error representation for callers rendering results
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    pub message: String,
    pub error_type: ErrorType,
    pub can_retry: bool,
    pub recovery_suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorType {
    Validation,
    Retryable,
    Storage,
}

impl From<&RotationError> for ErrorReport {
    fn from(err: &RotationError) -> Self {
        let error_type = if err.is_validation() {
            ErrorType::Validation
        } else if err.is_retryable() {
            ErrorType::Retryable
        } else {
            ErrorType::Storage
        };

        ErrorReport {
            message: err.to_string(),
            error_type,
            can_retry: err.is_retryable(),
            recovery_suggestion: err.recovery_suggestion().to_string(),
        }
    }
}
