//! # Dispatch Error Types
//!
//! Error types for the dispatch and fulfillment engines.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Dispatch Error Categories                          │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Client errors  │  │   Providers     │  │     Infrastructure      │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  NotFound       │  │  RoutingProvider│  │  Configuration          │ │
//! │  │  Validation     │  │  PaymentProvider│  │  Db                     │ │
//! │  │  InvalidInput   │  │                 │  │  ConcurrentModification │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  NotFound/Validation/InvalidInput surface to callers as client errors; │
//! │  provider errors keep the provider's stated reason for diagnostics;    │
//! │  ConcurrentModification means an optimistic write lost its race after  │
//! │  the engine's single internal retry - callers may retry the call.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use rutero_core::ValidationError;
use rutero_db::DbError;

/// Result type alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Dispatch error type covering engine and provider failures.
#[derive(Debug, Error)]
pub enum DispatchError {
    // =========================================================================
    // Client Errors
    // =========================================================================
    /// Referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Caller input failed validation (missing coordinates, non-positive
    /// amount, unsupported method/status, ...).
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    /// Caller input is well-formed but not applicable to the entity's
    /// current state.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // =========================================================================
    // Provider Errors
    // =========================================================================
    /// The routing provider failed or returned a non-success status.
    ///
    /// Not retried automatically; the caller may retry.
    #[error("Routing provider error ({status}): {reason}")]
    RoutingProvider { status: String, reason: String },

    /// The payment gateway call failed.
    #[error("Payment gateway error: {0}")]
    PaymentProvider(String),

    // =========================================================================
    // Infrastructure Errors
    // =========================================================================
    /// A required external credential or setting is absent. Fatal to the
    /// call, not to the process.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An optimistic write lost its race even after the engine's single
    /// internal retry. Callers should retry the operation.
    #[error("Concurrent modification of {entity} {id}")]
    ConcurrentModification { entity: &'static str, id: String },

    /// Database failure.
    #[error("Database error: {0}")]
    Db(#[from] DbError),
}

impl DispatchError {
    /// Shorthand for a missing order.
    pub fn order_not_found(id: impl Into<String>) -> Self {
        DispatchError::NotFound {
            entity: "Order",
            id: id.into(),
        }
    }

    /// Shorthand for a missing distributor.
    pub fn distributor_not_found(id: impl Into<String>) -> Self {
        DispatchError::NotFound {
            entity: "Distributor",
            id: id.into(),
        }
    }

    /// Returns true if retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DispatchError::ConcurrentModification { .. })
    }

    /// Returns true if this is the caller's fault (HTTP 4xx territory).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            DispatchError::NotFound { .. }
                | DispatchError::Validation(_)
                | DispatchError::InvalidInput(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorization() {
        assert!(DispatchError::order_not_found("o-1").is_client_error());
        assert!(DispatchError::InvalidInput("already delivered".into()).is_client_error());
        assert!(!DispatchError::Configuration("missing key".into()).is_client_error());

        assert!(DispatchError::ConcurrentModification {
            entity: "Order",
            id: "o-1".into()
        }
        .is_retryable());
        assert!(!DispatchError::PaymentProvider("boom".into()).is_retryable());
    }

    #[test]
    fn test_provider_error_keeps_status_and_reason() {
        let err = DispatchError::RoutingProvider {
            status: "ZERO_RESULTS".into(),
            reason: "no route between points".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ZERO_RESULTS"));
        assert!(msg.contains("no route between points"));
    }
}
