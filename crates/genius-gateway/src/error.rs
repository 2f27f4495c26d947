use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use genius_core::{ErrorKind, GeniusError};
use tracing::{error, warn};

/// A [`GeniusError`] on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub GeniusError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::NotReady => StatusCode::CONFLICT,
            ErrorKind::TransientAgent
            | ErrorKind::AgentUnavailable
            | ErrorKind::PermanentFailure
            | ErrorKind::Aggregation
            | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<GeniusError> for ApiError {
    fn from(err: GeniusError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self.0, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self.0, "Request rejected");
        }
        let body = serde_json::json!({
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (GeniusError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (GeniusError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (
                GeniusError::NotReady {
                    id: "x".into(),
                    status: "running".into(),
                },
                StatusCode::CONFLICT,
            ),
            (GeniusError::Aggregation("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (GeniusError::Store("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError(err).status(), expected);
        }
    }
}
