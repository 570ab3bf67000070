//! Mapping of the network HTTP responses onto the [`Error`] taxonomy.
use reqwest::{Response, StatusCode};
use serde_json::Value as Json;
use thiserror::Error;

use crate::Error;

/// How much of a non-JSON error body ends up in the error message.
const MAX_BODY_IN_MESSAGE: usize = 500;

#[derive(Debug, Error)]
#[error("{network} API responded with {status}: {message}")]
pub struct StatusError {
    pub network: &'static str,
    pub status: StatusCode,
    pub message: String,
}

#[derive(Debug, Error)]
#[error("{network} request failed")]
pub struct RequestError {
    pub network: &'static str,
    #[source]
    pub source: reqwest::Error,
}

#[derive(Debug, Error)]
#[error("{network} returned invalid JSON")]
pub struct InvalidJson {
    pub network: &'static str,
    #[source]
    pub source: serde_json::Error,
}

/// Which statuses, apart from `400`, the network uses for rejecting the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusPolicy {
    Default,
    /// `404` means that the requested object (e.g. the app) doesn't exist.
    NotFoundIsBadRequest,
}

/// Classifies a non-successful status.
///
/// - `400` (and `404` with [`StatusPolicy::NotFoundIsBadRequest`]) - [`Kind::BadRequest`]
/// - `401` & `403` - [`Kind::Authentication`]
/// - everything else - [`Kind::Connection`]
///
/// [`Kind::BadRequest`]: crate::Kind::BadRequest
/// [`Kind::Authentication`]: crate::Kind::Authentication
/// [`Kind::Connection`]: crate::Kind::Connection
pub fn status_error(
    network: &'static str,
    status: StatusCode,
    body: &str,
    policy: StatusPolicy,
) -> Error {
    let error = StatusError {
        network,
        status,
        message: error_message(body),
    };

    match status {
        StatusCode::BAD_REQUEST => Error::bad_request(error),
        StatusCode::NOT_FOUND if policy == StatusPolicy::NotFoundIsBadRequest => {
            Error::bad_request(error)
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::authentication(error),
        _ => Error::connection(error),
    }
}

/// Transport failures (DNS, refused connections, timeouts, interrupted bodies).
pub fn request_error(network: &'static str, source: reqwest::Error) -> Error {
    Error::connection(RequestError { network, source })
}

/// Reads the whole body of a successful response as text,
/// any other status is classified with [`status_error`].
pub async fn read_text(
    network: &'static str,
    response: Response,
    policy: StatusPolicy,
) -> Result<String, Error> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| request_error(network, err))?;

    if status.is_success() {
        Ok(body)
    } else {
        Err(status_error(network, status, &body, policy))
    }
}

/// Reads the body of a successful response as JSON.
pub async fn read_json(
    network: &'static str,
    response: Response,
    policy: StatusPolicy,
) -> Result<Json, Error> {
    let body = read_text(network, response, policy).await?;

    parse_json(network, &body)
}

pub fn parse_json(network: &'static str, body: &str) -> Result<Json, Error> {
    serde_json::from_str(body).map_err(|source| Error::parse(InvalidJson { network, source }))
}

/// The most descriptive message an error body offers.
///
/// Networks report errors as `{"error": {"message"}}`, `{"message"}`,
/// `{"errorList": [{"message"}]}` or `{"error": "..."}`,
/// otherwise the (truncated) body is used.
pub fn error_message(body: &str) -> String {
    let from_json = serde_json::from_str::<Json>(body)
        .ok()
        .and_then(|json| json_error_message(&json));

    match from_json {
        Some(message) => message,
        None if body.trim().is_empty() => "empty response body".to_string(),
        None => body.trim().chars().take(MAX_BODY_IN_MESSAGE).collect(),
    }
}

/// The name of the JSON type, for errors about unexpected response shapes.
pub fn json_type(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

pub(crate) fn json_error_message(json: &Json) -> Option<String> {
    [
        json.pointer("/error/message"),
        json.get("message"),
        json.pointer("/errorList/0/message"),
        json.get("error"),
    ]
    .into_iter()
    .flatten()
    .find_map(|message| match message {
        Json::String(message) => Some(message.clone()),
        _ => None,
    })
}
