//! Error types for the HTTP layer.
//!
//! Maps `DispatchError` onto HTTP statuses:
//!
//! | DispatchError            | Status |
//! |--------------------------|--------|
//! | NotFound                 | 404    |
//! | Validation, InvalidInput | 400    |
//! | ConcurrentModification   | 409    |
//! | RoutingProvider          | 502    |
//! | PaymentProvider          | 502    |
//! | Configuration            | 500    |
//! | Db                       | 500    |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::{error, warn};

use rutero_dispatch::DispatchError;

/// HTTP-facing error wrapper.
#[derive(Debug)]
pub struct ApiError(pub DispatchError);

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
            DispatchError::Validation(_) | DispatchError::InvalidInput(_) => {
                StatusCode::BAD_REQUEST
            }
            DispatchError::ConcurrentModification { .. } => StatusCode::CONFLICT,
            DispatchError::RoutingProvider { .. } | DispatchError::PaymentProvider(_) => {
                StatusCode::BAD_GATEWAY
            }
            DispatchError::Configuration(_) | DispatchError::Db(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        } else {
            warn!(error = %self.0, "Request rejected");
        }

        // The provider's stated reason stays in the body for diagnostics.
        (status, Json(json!({ "message": self.0.to_string() }))).into_response()
    }
}
