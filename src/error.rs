use serde::Serialize;
use thiserror::Error;

/// Shard error types
///
/// Every entry point returns one of these instead of letting a store failure
/// escape. Absence of data (an unknown date, a URL with no history) is never
/// an error: those operations return zero or empty values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ShardError {
    /// Caller supplied an invalid level, message, context, date or URL
    #[error("Validation error: {0}")]
    Validation(String),
    /// Embedded store failure, carrying the original diagnostic
    #[error("Internal error: {0}")]
    Internal(String),
    /// The shard mailbox is closed (evicted or shut down)
    #[error("Shard unavailable: {0}")]
    Unavailable(String),
}

impl ShardError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Internal(_) => "internal_error",
            Self::Unavailable(_) => "shard_unavailable",
        }
    }

    /// Message without the variant prefix
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(msg) | Self::Internal(msg) | Self::Unavailable(msg) => msg,
        }
    }
}

impl From<sqlx::Error> for ShardError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for ShardError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Internal(format!("schema initialization failed: {}", err))
    }
}

impl From<serde_json::Error> for ShardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON error: {}", err))
    }
}

pub type ShardResult<T> = Result<T, ShardError>;

/// Error payload of a failed [`Outcome`]
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

/// Tagged success/failure result handed back to the routing layer
///
/// Serializes as `{"success": true, "data": ...}` or
/// `{"success": false, "error": {"code": ..., "message": ...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

impl<T> From<ShardResult<T>> for Outcome<T> {
    fn from(result: ShardResult<T>) -> Self {
        match result {
            Ok(data) => Self {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(err) => Self {
                success: false,
                data: None,
                error: Some(ErrorBody {
                    code: err.code(),
                    message: err.message().to_string(),
                }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_display() {
        let error = ShardError::validation("level is required");
        assert_eq!(error.to_string(), "Validation error: level is required");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ShardError::validation("x").code(), "validation_error");
        assert_eq!(ShardError::internal("x").code(), "internal_error");
        assert_eq!(
            ShardError::Unavailable("x".to_string()).code(),
            "shard_unavailable"
        );
    }

    #[test]
    fn test_sqlx_error_becomes_internal() {
        let err: ShardError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.code(), "internal_error");
        assert!(err.message().contains("no rows"));
    }

    #[test]
    fn test_outcome_success_shape() {
        let outcome: Outcome<u64> = Ok(3).into();
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value, json!({"success": true, "data": 3}));
    }

    #[test]
    fn test_outcome_failure_shape() {
        let outcome: Outcome<u64> = Err(ShardError::validation("bad level")).into();
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            value,
            json!({
                "success": false,
                "error": {"code": "validation_error", "message": "bad level"}
            })
        );
    }
}
