use axum::{
    response::{IntoResponse, Response},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid wallet address: {0}")]
    InvalidAddress(String),

    #[error("Unknown time window: {0}")]
    InvalidWindow(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Timed out after {0}s")]
    Timeout(u64),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    code: u16,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidAddress(_) | ApiError::InvalidWindow(_) => StatusCode::BAD_REQUEST,
            ApiError::Rpc(_) => StatusCode::BAD_GATEWAY,
            ApiError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }

        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::InvalidAddress("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::InvalidWindow("2w".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Rpc("down".into()).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ApiError::Timeout(120).status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ApiError::Timeout(120).into_response().status(), StatusCode::GATEWAY_TIMEOUT);
    }
}
