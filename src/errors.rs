//! Application error model with MCP error mapping
//!
//! Defines a typed error hierarchy using `thiserror`. Structural lookup
//! failures are hard errors surfaced to the caller; lifecycle races with the
//! UI (destroyed surfaces, missing windows) and unknown action names are soft
//! and are turned into no-ops by the component that detects them.

use rmcp::model::ErrorData;
use serde_json::json;
use thiserror::Error;

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid user input (validation failed, malformed payload)
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Mailbox or service id does not exist
    #[error("not found: {0}")]
    NotFound(String),
    /// Request conflicts with current state (duplicate id, capability not allowed)
    #[error("conflict: {0}")]
    Conflict(String),
    /// No reducer in the resolved chain defines the action
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),
    /// Click handler fired against a content surface that no longer exists
    #[error("content surface destroyed: {0}")]
    DestroyedSurface(String),
    /// Context-menu event for a surface without a resolvable owning window
    #[error("no owning window for surface: {0}")]
    MissingWindowContext(String),
    /// Internal error (unexpected failure, external crate error)
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Convenience constructor for `InvalidInput`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Convenience constructor for `NotFound`
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether this error is an expected race/mismatch that callers treat
    /// as a no-op rather than a failure
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedAction(_) | Self::DestroyedSurface(_) | Self::MissingWindowContext(_)
        )
    }

    /// Convert to MCP `ErrorData`
    ///
    /// # Mappings
    ///
    /// - `InvalidInput` → `invalid_params`
    /// - `NotFound` → `resource_not_found`
    /// - `Conflict` → `invalid_request`
    /// - `UnsupportedAction` → `invalid_request`
    /// - `DestroyedSurface` → `invalid_request`
    /// - `MissingWindowContext` → `invalid_request`
    /// - `Internal` → `internal_error`
    pub fn to_error_data(&self) -> ErrorData {
        match self {
            Self::InvalidInput(msg) => {
                ErrorData::invalid_params(msg.clone(), Some(json!({ "code": "invalid_input" })))
            }
            Self::NotFound(msg) => {
                ErrorData::resource_not_found(msg.clone(), Some(json!({ "code": "not_found" })))
            }
            Self::Conflict(msg) => {
                ErrorData::invalid_request(msg.clone(), Some(json!({ "code": "conflict" })))
            }
            Self::UnsupportedAction(msg) => ErrorData::invalid_request(
                msg.clone(),
                Some(json!({ "code": "unsupported_action" })),
            ),
            Self::DestroyedSurface(msg) => ErrorData::invalid_request(
                msg.clone(),
                Some(json!({ "code": "destroyed_surface" })),
            ),
            Self::MissingWindowContext(msg) => ErrorData::invalid_request(
                msg.clone(),
                Some(json!({ "code": "missing_window_context" })),
            ),
            Self::Internal(msg) => {
                ErrorData::internal_error(msg.clone(), Some(json!({ "code": "internal" })))
            }
        }
    }
}

/// Type alias for fallible return values
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::AppError;

    #[test]
    fn lifecycle_races_are_soft() {
        assert!(AppError::DestroyedSurface("s1".to_owned()).is_soft());
        assert!(AppError::MissingWindowContext("s1".to_owned()).is_soft());
        assert!(AppError::UnsupportedAction("x.y".to_owned()).is_soft());
    }

    #[test]
    fn lookup_failures_are_hard() {
        assert!(!AppError::not_found("mailbox 'm1'").is_soft());
        assert!(!AppError::invalid("bad").is_soft());
    }
}
