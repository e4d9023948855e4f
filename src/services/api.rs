//! Request and response types for the operator API.

use serde::{Deserialize, Serialize};

use crate::control_point::RouteDenied;
use crate::dispatcher::SwitchRequestError;

// ============================================================================
// Response Types
// ============================================================================

/// API response wrapper for consistent JSON structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the request was successful
    pub success: bool,
    /// Response data (present when success=true)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message (present when success=false)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response with data
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Result of an operator request (route, cancel, throw).
///
/// A refused request is still a well-formed answer: `accepted` is false
/// and `reason` says why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOutcome {
    pub accepted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl RequestOutcome {
    pub fn accepted() -> Self {
        Self {
            accepted: true,
            reason: None,
        }
    }

    pub fn refused(reason: impl Into<String>) -> Self {
        Self {
            accepted: false,
            reason: Some(reason.into()),
        }
    }
}

impl From<Result<(), RouteDenied>> for RequestOutcome {
    fn from(result: Result<(), RouteDenied>) -> Self {
        match result {
            Ok(()) => Self::accepted(),
            Err(e) => Self::refused(e.to_string()),
        }
    }
}

impl From<Result<(), SwitchRequestError>> for RequestOutcome {
    fn from(result: Result<(), SwitchRequestError>) -> Self {
        match result {
            Ok(()) => Self::accepted(),
            Err(e) => Self::refused(e.to_string()),
        }
    }
}
