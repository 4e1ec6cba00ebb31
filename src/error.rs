// Domain error taxonomy with HTTP status mapping
// Every service function returns these; the server binary translates them
// into the JSON error envelope at the boundary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Group or referenced entity absent
    #[error("{0}")]
    NotFound(String),

    /// Caller is not a group member, or not the creator for
    /// member-management actions
    #[error("{0}")]
    Forbidden(String),

    /// Split sums/percentages out of tolerance, non-positive amounts,
    /// unknown split type, empty split list, bad request fields
    #[error("{0}")]
    Validation(String),

    /// Missing or invalid bearer credential
    #[error("{0}")]
    Unauthorized(String),

    /// Storage-layer transaction conflict (SQLITE_BUSY / locked).
    /// Surfaced as failure, not retried.
    #[error("{0}")]
    Conflict(String),

    /// Anything else the storage layer reports
    #[error("storage error: {0}")]
    Storage(rusqlite::Error),

    /// Unexpected internal failure (password hashing, token issuance)
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        AppError::NotFound(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    /// HTTP status code this error maps to at the API boundary
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::NotFound(_) => 404,
            AppError::Forbidden(_) => 403,
            AppError::Validation(_) => 400,
            AppError::Unauthorized(_) => 401,
            AppError::Conflict(_) => 409,
            AppError::Storage(_) | AppError::Internal(_) => 500,
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(e, _) = &err {
            match e.code {
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked => {
                    return AppError::Conflict(format!("storage conflict: {}", err));
                }
                _ => {}
            }
        }
        AppError::Storage(err)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::not_found("x").status_code(), 404);
        assert_eq!(AppError::forbidden("x").status_code(), 403);
        assert_eq!(AppError::validation("x").status_code(), 400);
        assert_eq!(AppError::unauthorized("x").status_code(), 401);
        assert_eq!(AppError::Conflict("x".into()).status_code(), 409);
    }

    #[test]
    fn test_busy_maps_to_conflict() {
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            Some("database is locked".to_string()),
        );

        let err: AppError = busy.into();
        assert_eq!(err.status_code(), 409, "SQLITE_BUSY should surface as Conflict");
    }

    #[test]
    fn test_other_sqlite_errors_map_to_storage() {
        let err: AppError = rusqlite::Error::QueryReturnedNoRows.into();
        assert_eq!(err.status_code(), 500);
    }
}
