//! InMobi publisher reporting API, authenticated with a session.
use async_trait::async_trait;
use once_cell::sync::Lazy;
use primitives::{ApiUrl, Network, NormalizedRow, Query, Report, Secret};
use serde::Deserialize;
use serde_json::{json, Value as Json};
use slog::{info, o, warn, Logger};
use thiserror::Error;

use crate::{
    http::{self, StatusPolicy},
    mapping::{Fallback, Field, FieldKind, FieldMapping, Selection},
    Adapter, Context, Credential, Error, Init,
};

const NETWORK: &str = "InMobi";

pub static API_URL: Lazy<ApiUrl> =
    Lazy::new(|| "https://api.inmobi.com/".parse().expect("Valid InMobi API url"));

pub static MAPPING: FieldMapping = FieldMapping {
    network: NETWORK,
    dimensions: &[
        Field::new("country", "country", "country", FieldKind::Dimension),
        Field::new("country", "countryId", "countryId", FieldKind::Integer),
        Field::new("placement", "placementId", "placementId", FieldKind::Integer),
        Field::new("placement", "placementName", "placementName", FieldKind::Dimension),
    ],
    metrics: &[Field::same("earnings", FieldKind::Float)],
    // without a `groupBy` the totals of the whole period are reported
    default_dimensions: &[],
    default_metrics: &["earnings"],
    fallback: Fallback::Verbatim,
    fallback_dimension: FieldKind::Dimension,
    fallback_metric: FieldKind::Float,
};

#[derive(Debug, Error)]
#[error("InMobi: session id or account id not found in the session response")]
pub struct MissingSession;

#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    pub username: String,
    pub secret_key: Secret,
    /// Comma separated placement ids.
    #[serde(default)]
    pub filter_placement_ids: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Session {
    session_id: Secret,
    account_id: String,
}

#[derive(Debug)]
pub struct InMobi {
    options: Options,
    api_url: ApiUrl,
    context: Context,
    logger: Logger,
    session: Option<Session>,
}

impl InMobi {
    pub fn with_api_url(mut self, api_url: ApiUrl) -> Self {
        self.api_url = api_url;
        self
    }

    async fn session(&mut self) -> Result<Session, Error> {
        if let Some(session) = &self.session {
            return Ok(session.clone());
        }

        let url = self
            .api_url
            .join("v1.0/generatesession/generate")
            .map_err(Error::authentication)?;
        info!(&self.logger, "Requesting session"; "url" => %url);

        let response = self
            .context
            .client
            .get(url)
            .header("userName", self.options.username.trim())
            .header("secretKey", self.options.secret_key.expose())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| http::request_error(NETWORK, err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| http::request_error(NETWORK, err))?;

        if !status.is_success() {
            return Err(Error::authentication(http::StatusError {
                network: NETWORK,
                status,
                message: http::error_message(&body),
            }));
        }

        let json = serde_json::from_str::<Json>(&body).map_err(|source| {
            Error::authentication(http::InvalidJson {
                network: NETWORK,
                source,
            })
        })?;
        let session = parse_session(&json).ok_or_else(|| Error::authentication(MissingSession))?;

        info!(&self.logger, "Session created"; "account_id" => &session.account_id);
        self.session = Some(session.clone());

        Ok(session)
    }
}

fn parse_session(response: &Json) -> Option<Session> {
    let first = response.pointer("/respList/0")?;
    let text = |key: &str| match first.get(key)? {
        Json::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Json::Number(number) => Some(number.to_string()),
        _ => None,
    };

    Some(Session {
        session_id: Secret::new(text("sessionId")?),
        account_id: text("accountId")?,
    })
}

impl Init for InMobi {
    type Options = Options;

    fn init(options: Options, context: Context) -> Self {
        let logger = context.logger.new(o!("network" => NETWORK));

        Self {
            options,
            api_url: API_URL.clone(),
            context,
            logger,
            session: None,
        }
    }
}

/// The numeric placement ids of the filter, anything else is ignored.
pub fn placement_ids(filter: Option<&str>) -> Vec<u64> {
    filter
        .into_iter()
        .flat_map(|filter| filter.split(','))
        .map(str::trim)
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
        .filter_map(|id| id.parse().ok())
        .collect()
}

/// Resolves the query, a placement filter also groups by the placement.
pub fn select(logger: &Logger, query: &Query, placement_ids: &[u64]) -> Selection {
    let is_grouped = query.dimensions.iter().any(|dimension| dimension.trim() == "placement");

    if placement_ids.is_empty() || is_grouped {
        return MAPPING.select(logger, query);
    }

    info!(logger, "Grouping by placement for the placement filter");
    let mut query = query.clone();
    query.dimensions.push("placement".to_string());

    MAPPING.select(logger, &query)
}

pub fn report_request(query: &Query, selection: &Selection, placement_ids: &[u64]) -> Json {
    json!({
        "reportRequest": {
            "metrics": selection.metric_selectors(),
            "groupBy": selection.dimension_selectors(),
            "timeFrame": format!("{}:{}", query.start(), query.end()),
            "filterBy": {
                "filterName": "placementId",
                "filterValue": placement_ids,
            },
        }
    })
}

#[async_trait]
impl Adapter for InMobi {
    fn network(&self) -> Network {
        Network::Inmobi
    }

    async fn ensure_credential(&mut self) -> Result<Credential, Error> {
        self.session().await.map(|session| Credential::Session {
            session_id: session.session_id,
            account_id: session.account_id,
        })
    }

    async fn get_report(&mut self, query: &Query) -> Result<Report, Error> {
        let session = self.session().await?;

        let placement_ids = placement_ids(self.options.filter_placement_ids.as_deref());
        let selection = select(&self.logger, query, &placement_ids);
        let body = report_request(query, &selection, &placement_ids);

        let url = self
            .api_url
            .join("v3.0/reporting/publisher")
            .map_err(Error::bad_request)?;
        info!(&self.logger, "Requesting report"; "url" => %url, "request" => %body);

        let response = self
            .context
            .client
            .post(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .header("accountId", session.account_id.as_str())
            .header("secretKey", self.options.secret_key.expose())
            .header("sessionID", session.session_id.expose())
            .json(&body)
            .send()
            .await
            .map_err(|err| http::request_error(NETWORK, err))?;
        let json = http::read_json(NETWORK, response, StatusPolicy::Default).await?;

        let rows = normalize(&self.logger, &selection, &json)?;
        info!(&self.logger, "Processed report"; "rows" => rows.len());

        Ok(Report::Rows(rows))
    }
}

/// Normalizes the `respList` of the report.
pub fn normalize(
    logger: &Logger,
    selection: &Selection,
    response: &Json,
) -> Result<Vec<NormalizedRow>, Error> {
    let rows = response
        .get("respList")
        .and_then(Json::as_array)
        .filter(|rows| !rows.is_empty());

    let rows = match rows {
        Some(rows) => rows,
        None if is_truthy(response.get("error")) => {
            let message = response
                .pointer("/errorList/0/message")
                .and_then(Json::as_str)
                .unwrap_or("Unknown error");

            return Err(Error::bad_request(format!(
                "{} API error: {}",
                NETWORK, message
            )));
        }
        None => {
            warn!(logger, "The report is empty");
            return Ok(vec![]);
        }
    };

    Ok(rows
        .iter()
        .filter(|row| {
            let is_object = row.is_object();
            if !is_object {
                warn!(logger, "Skipping a row which is not an object"; "row" => %row);
            }
            is_object
        })
        .filter_map(|row| selection.build_row(logger, |field| row.get(field.native.as_ref())))
        .collect())
}

fn is_truthy(value: Option<&Json>) -> bool {
    match value {
        None | Some(Json::Null) | Some(Json::Bool(false)) => false,
        Some(Json::String(string)) => !string.is_empty(),
        Some(_) => true,
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use primitives::util::logging::discard_logger;

    use super::*;
    use crate::Kind;

    fn query(dimensions: &[&str], metrics: &[&str]) -> Query {
        Query::new("2024-01-01", "2024-01-31", dimensions, metrics).expect("Valid query")
    }

    #[test]
    fn placement_filter_groups_by_placement() {
        let ids = placement_ids(Some("1234, abc,5678,,-1"));
        assert_eq!(vec![1234, 5678], ids);

        let query = query(&["country"], &[]);
        let selection = select(&discard_logger(), &query, &ids);

        assert_eq!(
            json!({
                "reportRequest": {
                    "metrics": ["earnings"],
                    "groupBy": ["country", "placement"],
                    "timeFrame": "2024-01-01:2024-01-31",
                    "filterBy": { "filterName": "placementId", "filterValue": [1234, 5678] },
                }
            }),
            report_request(&query, &selection, &ids)
        );

        let selection = select(&discard_logger(), &query, &[]);
        assert_eq!(
            json!([]),
            report_request(&query, &selection, &[])["reportRequest"]["filterBy"]["filterValue"]
        );
        assert_eq!(vec!["country"], selection.dimension_selectors());
    }

    #[test]
    fn expands_the_dimensions() {
        let selection = MAPPING.select(&discard_logger(), &query(&["country", "placement"], &["earnings"]));
        let response = json!({
            "respList": [
                {
                    "country": "India",
                    "countryId": "94",
                    "placementId": 1234.0,
                    "placementName": "Interstitial",
                    "earnings": "0.75",
                },
                { "country": "", "earnings": 0 },
            ],
            "error": false,
        });

        let rows = normalize(&discard_logger(), &selection, &response).expect("Should normalize");

        assert_eq!(
            json!([{
                "country": "India",
                "countryId": 94,
                "placementId": 1234,
                "placementName": "Interstitial",
                "earnings": 0.75,
            }]),
            serde_json::to_value(&rows).expect("Should serialize")
        );
    }

    #[test]
    fn errors_and_empty_reports() {
        let selection = MAPPING.select(&discard_logger(), &query(&[], &[]));

        let error = normalize(
            &discard_logger(),
            &selection,
            &json!({ "error": true, "errorList": [{ "code": 5001, "message": "Invalid timeFrame" }] }),
        )
        .expect_err("Should fail");
        assert_eq!(Kind::BadRequest, error.kind());
        assert_eq!("Bad request: InMobi API error: Invalid timeFrame", error.to_string());

        let rows = normalize(&discard_logger(), &selection, &json!({ "respList": [], "error": false }))
            .expect("Empty report");
        assert!(rows.is_empty());
    }

    #[test]
    fn session_fields() {
        let session = parse_session(&json!({
            "respList": [{ "sessionId": "abc123", "accountId": 42 }],
            "error": false,
        }))
        .expect("Should parse");

        assert_eq!("abc123", session.session_id.expose());
        assert_eq!("42", session.account_id);
        assert_eq!(None, parse_session(&json!({ "respList": [{ "sessionId": "abc123" }] })));
        assert_eq!(None, parse_session(&json!({ "respList": [] })));
    }
}
