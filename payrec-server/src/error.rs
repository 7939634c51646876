//! HTTP error mapping for the payment API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use payrec::error::PayError;

/// Wrapper mapping core errors onto HTTP responses.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub PayError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            PayError::Validation(_) | PayError::DuplicateTrackId(_) => StatusCode::BAD_REQUEST,
            PayError::Authentication => StatusCode::UNAUTHORIZED,
            PayError::NotFound(_) => StatusCode::NOT_FOUND,
            PayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            PayError::InconsistentLedger(_)
            | PayError::Journal(_)
            | PayError::JournalEncoding(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.to_string() });
        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use payrec::error::ProviderError;
    use payrec::record::PaymentId;

    fn status_for(err: PayError) -> StatusCode {
        ApiError(err).into_response().status()
    }

    #[test]
    fn taxonomy_maps_to_status_codes() {
        assert_eq!(
            status_for(PayError::Validation("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_for(PayError::Authentication),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(PayError::NotFound("p1".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_for(PayError::Upstream(ProviderError::Unavailable(
                "down".into()
            ))),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            status_for(PayError::InconsistentLedger(PaymentId::from("p1"))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
