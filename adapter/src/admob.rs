//! AdMob Network Report API.
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use primitives::{ApiUrl, Network, NormalizedRow, Query, Report, Secret};
use serde::Deserialize;
use serde_json::{json, Value as Json};
use slog::{debug, info, o, Logger};
use url::Url;

use crate::{
    http::{self, StatusPolicy},
    mapping::{Fallback, Field, FieldKind, FieldMapping, Selection},
    oauth2::{self, RefreshCredentials},
    Adapter, Context, Credential, Error, Init,
};

const NETWORK: &str = "AdMob";

pub static API_URL: Lazy<ApiUrl> = Lazy::new(|| {
    "https://admob.googleapis.com/"
        .parse()
        .expect("Valid AdMob API url")
});

pub static TOKEN_URL: Lazy<Url> =
    Lazy::new(|| Url::parse(oauth2::GOOGLE_TOKEN_URL).expect("Valid Google token url"));

pub static MAPPING: FieldMapping = FieldMapping {
    network: NETWORK,
    dimensions: &[
        Field::new("DATE", "DATE", "Date", FieldKind::Dimension),
        Field::new("AD_UNIT", "AD_UNIT", "Ad Unit Name", FieldKind::Label),
        Field::new("AD_UNIT", "AD_UNIT", "Ad Unit ID", FieldKind::Dimension),
        Field::new("APP", "APP", "App Name", FieldKind::Label),
        Field::new("APP", "APP", "App ID", FieldKind::Dimension),
        Field::new("FORMAT", "FORMAT", "Format", FieldKind::Dimension),
        Field::new("COUNTRY", "COUNTRY", "Country", FieldKind::Dimension),
    ],
    metrics: &[
        Field::new(
            "ESTIMATED_EARNINGS",
            "ESTIMATED_EARNINGS",
            "Estimated Earnings",
            FieldKind::Micros,
        ),
        Field::new("IMPRESSIONS", "IMPRESSIONS", "Impressions", FieldKind::Integer),
        Field::new(
            "IMPRESSION_RPM",
            "IMPRESSION_RPM",
            "Impression RPM",
            FieldKind::Float,
        ),
    ],
    default_dimensions: &["DATE"],
    default_metrics: &["ESTIMATED_EARNINGS"],
    fallback: Fallback::TitleCase,
    fallback_dimension: FieldKind::Label,
    fallback_metric: FieldKind::Number,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    #[serde(flatten)]
    pub credentials: RefreshCredentials,
    pub publisher_id: String,
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub token: Url,
    pub api: ApiUrl,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token: TOKEN_URL.clone(),
            api: API_URL.clone(),
        }
    }
}

#[derive(Debug)]
pub struct AdMob {
    options: Options,
    endpoints: Endpoints,
    context: Context,
    logger: Logger,
    access_token: Option<Secret>,
}

impl AdMob {
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    async fn access_token(&mut self) -> Result<Secret, Error> {
        if let Some(token) = &self.access_token {
            return Ok(token.clone());
        }

        let token = oauth2::refresh_access_token(
            NETWORK,
            &self.context.client,
            &self.endpoints.token,
            &self.options.credentials,
            &self.logger,
        )
        .await?;
        self.access_token = Some(token.clone());

        Ok(token)
    }
}

impl Init for AdMob {
    type Options = Options;

    fn init(mut options: Options, context: Context) -> Self {
        // refresh tokens pasted from JSON exports come with escaped slashes
        options.credentials.refresh_token =
            Secret::new(options.credentials.refresh_token.expose().replace('\\', ""));
        let logger = context.logger.new(o!("network" => NETWORK));

        Self {
            options,
            endpoints: Endpoints::default(),
            context,
            logger,
            access_token: None,
        }
    }
}

#[async_trait]
impl Adapter for AdMob {
    fn network(&self) -> Network {
        Network::AdmobNonsso
    }

    async fn ensure_credential(&mut self) -> Result<Credential, Error> {
        self.access_token().await.map(Credential::OAuth2Token)
    }

    async fn get_report(&mut self, query: &Query) -> Result<Report, Error> {
        let access_token = self.access_token().await?;
        let selection = MAPPING.select(&self.logger, query);

        let url = self
            .endpoints
            .api
            .join(&format!(
                "v1/accounts/{}/networkReport:generate",
                self.options.publisher_id.trim()
            ))
            .map_err(Error::bad_request)?;
        let body = report_request(query, &selection, &self.context.config.currency_code);

        info!(&self.logger, "Requesting report"; "url" => %url, "dimensions" => ?selection.native_dimensions(), "metrics" => ?selection.native_metrics());

        let response = self
            .context
            .client
            .post(url)
            .bearer_auth(access_token.expose())
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

fn date(date: NaiveDate) -> Json {
    json!({
        "year": date.year(),
        "month": date.month(),
        "day": date.day(),
    })
}

/// The `networkReport:generate` request body.
pub fn report_request(query: &Query, selection: &Selection, currency_code: &str) -> Json {
    json!({
        "reportSpec": {
            "dateRange": {
                "startDate": date(query.start_date),
                "endDate": date(query.end_date),
            },
            "dimensions": selection.native_dimensions(),
            "metrics": selection.native_metrics(),
            "localizationSettings": {
                "currencyCode": currency_code,
            },
        }
    })
}

/// Normalizes the streamed `[{header}, {row}.., {footer}]` response.
pub fn normalize(
    logger: &Logger,
    selection: &Selection,
    response: &Json,
) -> Result<Vec<NormalizedRow>, Error> {
    let items = response.as_array().ok_or_else(|| {
        Error::parse(format!(
            "{} report is expected to be a list, got: {}",
            NETWORK,
            http::json_type(response)
        ))
    })?;

    let rows = items
        .iter()
        .filter_map(|item| {
            let content = match item.get("row") {
                Some(row) if row.is_object() => row,
                _ if item.get("header").is_some() || item.get("footer").is_some() => return None,
                _ => item,
            };

            let dimension_values = content.get("dimensionValues");
            let metric_values = content.get("metricValues");
            if is_empty_object(dimension_values) && is_empty_object(metric_values) {
                debug!(logger, "Skipping item without dimension & metric values");
                return None;
            }

            selection.build_row(logger, |field| {
                let values = match field.kind {
                    FieldKind::Dimension | FieldKind::Label => dimension_values,
                    _ => metric_values,
                }?;

                extract(field, values.get(field.native.as_ref())?)
            })
        })
        .collect();

    Ok(rows)
}

fn extract<'a>(field: &Field, value: &'a Json) -> Option<&'a Json> {
    let first_of = |keys: &[&str]| keys.iter().find_map(|key| value.get(*key));

    match field.kind {
        FieldKind::Dimension => value.get("value"),
        FieldKind::Label => first_of(&["displayLabel", "value"]),
        FieldKind::Micros => value.get("microsValue"),
        FieldKind::Integer => value.get("integerValue"),
        FieldKind::Float => value.get("doubleValue"),
        FieldKind::Number => first_of(&["value", "doubleValue", "integerValue"]),
        FieldKind::Unavailable => None,
    }
}

fn is_empty_object(value: Option<&Json>) -> bool {
    value
        .and_then(Json::as_object)
        .map_or(true, |object| object.is_empty())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use primitives::util::logging::discard_logger;

    use super::*;
    use crate::Kind;

    fn select(dimensions: &[&str], metrics: &[&str]) -> (Query, Selection) {
        let query =
            Query::new("2024-01-01", "2024-01-31", dimensions, metrics).expect("Valid query");
        let selection = MAPPING.select(&discard_logger(), &query);

        (query, selection)
    }

    #[test]
    fn builds_the_report_spec() {
        let (query, selection) = select(&["DATE", "AD_UNIT", "PLATFORM"], &[]);

        assert_eq!(
            json!({
                "reportSpec": {
                    "dateRange": {
                        "startDate": { "year": 2024, "month": 1, "day": 1 },
                        "endDate": { "year": 2024, "month": 1, "day": 31 },
                    },
                    "dimensions": ["DATE", "AD_UNIT", "PLATFORM"],
                    "metrics": ["ESTIMATED_EARNINGS"],
                    "localizationSettings": { "currencyCode": "USD" },
                }
            }),
            report_request(&query, &selection, "USD")
        );
    }

    #[test]
    fn missing_dimensions_are_not_available() {
        let (_, selection) = select(&["DATE", "COUNTRY"], &["ESTIMATED_EARNINGS"]);
        let response = json!([
            { "header": { "dateRange": {} } },
            { "row": {
                "dimensionValues": { "DATE": { "value": "20240115" } },
                "metricValues": { "ESTIMATED_EARNINGS": { "microsValue": "2500000" } },
            } },
            { "footer": { "matchingRowCount": "1" } },
        ]);

        let rows = normalize(&discard_logger(), &selection, &response).expect("Should normalize");

        assert_eq!(
            json!([{ "Date": "20240115", "Country": "N/A", "Estimated Earnings": 2.5 }]),
            serde_json::to_value(&rows).expect("Should serialize")
        );
    }

    #[test]
    fn expands_labels_and_unknown_identifiers() {
        let (_, selection) = select(&["AD_UNIT", "PLATFORM"], &["IMPRESSIONS", "CLICKS"]);
        let response = json!([
            { "row": {
                "dimensionValues": {
                    "AD_UNIT": { "value": "ca-app-pub-1/2", "displayLabel": "Banner" },
                    "PLATFORM": { "value": "Android" },
                },
                "metricValues": {
                    "IMPRESSIONS": { "integerValue": "120" },
                    "CLICKS": { "integerValue": "3" },
                },
            } },
            // rows without any values are skipped
            { "row": { "dimensionValues": {}, "metricValues": {} } },
            { "row": {
                "dimensionValues": { "PLATFORM": { "value": "" } },
                "metricValues": { "IMPRESSIONS": { "integerValue": "0" } },
            } },
        ]);

        let rows = normalize(&discard_logger(), &selection, &response).expect("Should normalize");

        assert_eq!(
            json!([{
                "Ad Unit Name": "Banner",
                "Ad Unit ID": "ca-app-pub-1/2",
                "Platform": "Android",
                "Impressions": 120,
                "Clicks": 3,
            }]),
            serde_json::to_value(&rows).expect("Should serialize")
        );
    }

    #[test]
    fn non_list_response_is_a_parse_error() {
        let (_, selection) = select(&[], &[]);

        let error = normalize(&discard_logger(), &selection, &json!({ "error": "nope" }))
            .expect_err("Should fail");

        assert_eq!(Kind::Parse, error.kind());
    }
}
