use std::collections::HashMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// The message of the not yet implemented networks.
pub const ADMOB_SSO_NOT_IMPLEMENTED: &str = "AdMob SSO endpoint is not yet implemented.";

#[derive(Debug)]
pub enum ResponseError {
    NotFound,
    NotImplemented(String),
    /// Any failure of the adapter, returned with its source chain.
    Adapter(adapter::Error),
}

/// The body of a failed poll.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub trace: Vec<String>,
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> Response {
        match self {
            ResponseError::NotFound => {
                (StatusCode::NOT_FOUND, "Not found".to_string()).into_response()
            }
            ResponseError::NotImplemented(message) => {
                let error_response = [("message", message)]
                    .into_iter()
                    .collect::<HashMap<_, _>>();

                (StatusCode::NOT_IMPLEMENTED, Json(error_response)).into_response()
            }
            ResponseError::Adapter(error) => {
                let error_response = ErrorResponse {
                    error: error.to_string(),
                    trace: error.trace(),
                };

                (StatusCode::INTERNAL_SERVER_ERROR, Json(error_response)).into_response()
            }
        }
    }
}

impl From<adapter::Error> for ResponseError {
    fn from(error: adapter::Error) -> Self {
        ResponseError::Adapter(error)
    }
}
