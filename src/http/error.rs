use crate::error::Error;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// A failed request: what was being attempted plus the underlying error.
#[derive(Debug)]
pub struct ApiError {
    context: &'static str,
    error: Error,
}

impl ApiError {
    pub fn new(context: &'static str, error: Error) -> Self {
        Self { context, error }
    }

    pub fn status(&self) -> StatusCode {
        match &self.error {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    call_id: Option<&'a str>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self.error {
            Error::Validation(e) => e.to_string(),
            Error::Transport(e) => e.message.clone(),
            other => other.to_string(),
        };
        let body = ErrorBody {
            error: self.context,
            message,
            call_id: self.error.call_id(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{TransportError, TransportOperation, ValidationError};

    #[test]
    fn status_per_error_kind() {
        assert_eq!(
            ApiError::new("x", ValidationError::MissingTarget.into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::new("x", Error::NotConnected).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::new(
                "x",
                TransportError::new(TransportOperation::Offer, "boom").into()
            )
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
