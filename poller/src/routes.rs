//! `POST /api/poll/:network`
//!
//! The body is the flat JSON object of the query and the network credentials:
//!
//! ```json
//! {
//!     "start_date": "2024-01-01",
//!     "end_date": "2024-01-31",
//!     "dimensions": ["DATE", "COUNTRY"],
//!     "metrics": ["ESTIMATED_EARNINGS"],
//!     "client_id": "...",
//!     "client_secret": "...",
//!     "refresh_token": "...",
//!     "publisher_id": "pub-..."
//! }
//! ```
use std::{str::FromStr, sync::Arc};

use adapter::Error;
use axum::{body::Bytes, extract::Path, Extension, Json};
use primitives::{Network, Query, Report};
use serde_json::Value;
use slog::{error, info, o};

use crate::{
    response::{ResponseError, ADMOB_SSO_NOT_IMPLEMENTED},
    Application,
};

/// Runs a single report request against the network of the route.
///
/// The adapter is constructed for this request only, nothing is retried here.
pub async fn poll(
    Extension(app): Extension<Arc<Application>>,
    Path(network): Path<String>,
    body: Bytes,
) -> Result<Json<Report>, ResponseError> {
    let network = Network::from_str(&network).map_err(|_| ResponseError::NotFound)?;

    if network == Network::AdmobSso {
        return Err(ResponseError::NotImplemented(
            ADMOB_SSO_NOT_IMPLEMENTED.to_string(),
        ));
    }

    let constructor = app.registry.get(network).ok_or(ResponseError::NotFound)?;
    let logger = app.logger.new(o!("route" => network.to_string()));

    let result = async {
        let body = parse_body(&body)?;
        let query = serde_json::from_value::<Query>(body.clone()).map_err(Error::bad_request)?;

        let mut context = app.context.clone();
        context.logger = logger.clone();

        let mut adapter = constructor(body, context)?;
        info!(&logger, "Polling"; "start_date" => query.start(), "end_date" => query.end(), "dimensions" => ?query.dimensions, "metrics" => ?query.metrics);

        adapter.get_report(&query).await
    }
    .await;

    match result {
        Ok(report) => {
            info!(&logger, "Poll succeeded"; "rows" => report.len());

            Ok(Json(report))
        }
        Err(err) => {
            error!(&logger, "Poll failed: {}", err; "trace" => ?err.trace());

            Err(ResponseError::Adapter(err))
        }
    }
}

/// The body has to be a JSON object.
fn parse_body(body: &[u8]) -> Result<Value, Error> {
    match serde_json::from_slice::<Value>(body).map_err(Error::bad_request)? {
        object @ Value::Object(_) => Ok(object),
        other => Err(Error::bad_request(format!(
            "the request body should be a JSON object, got: {}",
            adapter::http::json_type(&other)
        ))),
    }
}
