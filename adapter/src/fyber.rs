//! Fyber (Digital Turbine) revenue desk performance API, signed with OAuth1.
use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use primitives::{query::DATE_FORMAT, ApiUrl, Network, NormalizedRow, Query, Report, Secret};
use serde::Deserialize;
use serde_json::{Map, Value as Json};
use slog::{info, o, warn, Logger};

use crate::{
    http::{self, StatusPolicy},
    mapping::{Fallback, Field, FieldKind, FieldMapping, Selection},
    oauth1::{self, Nonce},
    Adapter, Context, Credential, Error, Init,
};

const NETWORK: &str = "Fyber";

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

pub static API_URL: Lazy<ApiUrl> = Lazy::new(|| {
    "https://revenuedesk.fyber.com/"
        .parse()
        .expect("Valid Fyber API url")
});

pub static MAPPING: FieldMapping = FieldMapping {
    network: NETWORK,
    dimensions: &[
        Field::output("day", "date", FieldKind::Dimension),
        Field::output("country_code", "country", FieldKind::Dimension),
        Field::output("content_id", "contentId", FieldKind::Dimension),
        Field::output("content_name", "contentName", FieldKind::Dimension),
        Field::output("app_name", "applicationName", FieldKind::Dimension),
        Field::output("distributor_name", "distributorName", FieldKind::Dimension),
        Field::output("content_categories", "contentCategories", FieldKind::Dimension),
        // carried down from the app & the spot of the unit
        Field::same("app_id", FieldKind::Dimension),
        Field::same("spot_id", FieldKind::Dimension),
    ],
    metrics: &[
        Field::output("ad_requests", "adRequests", FieldKind::Integer),
        Field::same("impressions", FieldKind::Integer),
        Field::output("fill_rate", "fillRate", FieldKind::Float),
        Field::same("clicks", FieldKind::Integer),
        Field::same("ctr", FieldKind::Float),
        Field::same("ecpm", FieldKind::Float),
        Field::same("revenue", FieldKind::Float),
    ],
    default_dimensions: &["day", "app_id"],
    default_metrics: &["revenue", "impressions"],
    fallback: Fallback::Verbatim,
    fallback_dimension: FieldKind::Dimension,
    fallback_metric: FieldKind::Float,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    pub consumer_key: Secret,
    pub consumer_secret: Secret,
    pub publisher_id: String,
}

#[derive(Debug)]
pub struct Fyber {
    options: Options,
    api_url: ApiUrl,
    context: Context,
    logger: Logger,
}

impl Fyber {
    pub fn with_api_url(mut self, api_url: ApiUrl) -> Self {
        self.api_url = api_url;
        self
    }
}

impl Init for Fyber {
    type Options = Options;

    fn init(options: Options, context: Context) -> Self {
        let logger = context.logger.new(o!("network" => NETWORK));

        Self {
            options,
            api_url: API_URL.clone(),
            context,
            logger,
        }
    }
}

/// The UTC midnight of the `start_date` and the last second of the `end_date`.
pub fn epoch_range(query: &Query) -> (i64, i64) {
    let midnight = |date: NaiveDate| {
        date.and_hms_opt(0, 0, 0)
            .map_or(0, |midnight| Utc.from_utc_datetime(&midnight).timestamp())
    };

    (
        midnight(query.start_date),
        midnight(query.end_date) + SECONDS_PER_DAY - 1,
    )
}

#[async_trait]
impl Adapter for Fyber {
    fn network(&self) -> Network {
        Network::Fyber
    }

    async fn ensure_credential(&mut self) -> Result<Credential, Error> {
        Ok(Credential::OAuth1Signature {
            consumer_key: self.options.consumer_key.expose().to_string(),
            consumer_secret: self.options.consumer_secret.clone(),
        })
    }

    async fn get_report(&mut self, query: &Query) -> Result<Report, Error> {
        let selection = MAPPING.select(&self.logger, query);
        let (start, end) = epoch_range(query);

        let url = self
            .api_url
            .join(&format!(
                "iamp/services/performance/{}/vamp/{}/{}",
                self.options.publisher_id.trim(),
                start,
                end
            ))
            .map_err(Error::bad_request)?;

        let oauth_params = oauth1::authorize(
            "GET",
            &url,
            self.options.consumer_key.expose(),
            self.options.consumer_secret.expose(),
            &Nonce::generate(),
        )?;
        // the signature is part of the query, only the endpoint is logged
        info!(&self.logger, "Requesting report"; "url" => %url);

        let response = self
            .context
            .client
            .get(url)
            .query(&oauth_params)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|err| http::request_error(NETWORK, err))?;
        let json = http::read_json(NETWORK, response, StatusPolicy::Default).await?;

        let rows = normalize(&self.logger, &selection, &json)?;
        info!(&self.logger, "Processed report"; "rows" => rows.len());

        Ok(Report::Rows(rows))
    }
}

/// Normalizes the `apps[].spots[].units[]` tree, every unit is a row.
pub fn normalize(
    logger: &Logger,
    selection: &Selection,
    response: &Json,
) -> Result<Vec<NormalizedRow>, Error> {
    if response.get("error").is_some() {
        let message = http::json_error_message(response).unwrap_or_else(|| response.to_string());

        return Err(Error::bad_request(format!(
            "{} API error: {}",
            NETWORK, message
        )));
    }

    let apps = response
        .get("apps")
        .and_then(Json::as_array)
        .ok_or_else(|| Error::missing_data(format!("{} report has no `apps` list", NETWORK)))?;

    let mut rows = vec![];
    for app in apps {
        let app_id = app.get("appId");

        for spot in children(app, "spots") {
            let spot_id = spot.get("spotId");

            for unit in children(spot, "units") {
                let unit = match unit.as_object() {
                    Some(unit) => unit,
                    None => {
                        warn!(logger, "Skipping a unit which is not an object"; "unit" => %unit);
                        continue;
                    }
                };

                let flat = flatten(logger, unit, app_id, spot_id);
                rows.extend(selection.build_row(logger, |field| flat.get(field.native.as_ref())));
            }
        }
    }

    Ok(rows)
}

fn children<'a>(parent: &'a Json, key: &str) -> impl Iterator<Item = &'a Json> {
    parent
        .get(key)
        .and_then(Json::as_array)
        .into_iter()
        .flatten()
}

/// The unit with its epoch `date` formatted and the non-empty ids of its parents.
fn flatten(
    logger: &Logger,
    unit: &Map<String, Json>,
    app_id: Option<&Json>,
    spot_id: Option<&Json>,
) -> Map<String, Json> {
    let mut flat = unit.clone();

    if let Some(date) = unit.get("date").filter(|date| !date.is_null()) {
        let day = date
            .as_i64()
            .or_else(|| date.as_str().and_then(|date| date.trim().parse().ok()))
            .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single());

        match day {
            Some(day) => {
                flat.insert("date".into(), Json::from(day.format(DATE_FORMAT).to_string()));
            }
            None => warn!(logger, "Unexpected unit date, keeping it as it is"; "date" => %date),
        }
    }

    let parents = [("app_id", app_id), ("spot_id", spot_id)];
    for (key, id) in parents {
        match id {
            Some(id) if !is_blank(id) => {
                flat.insert(key.into(), id.clone());
            }
            _ => {}
        }
    }

    flat
}

fn is_blank(json: &Json) -> bool {
    match json {
        Json::Null => true,
        Json::String(string) => string.trim().is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use primitives::util::logging::discard_logger;
    use serde_json::json;

    use super::*;
    use crate::Kind;

    fn query(dimensions: &[&str], metrics: &[&str]) -> Query {
        Query::new("2024-01-01", "2024-01-31", dimensions, metrics).expect("Valid query")
    }

    #[test]
    fn epochs_are_utc() {
        assert_eq!((1_704_067_200, 1_706_745_599), epoch_range(&query(&[], &[])));
    }

    #[test]
    fn carries_the_parent_ids_down() {
        let selection = MAPPING.select(
            &discard_logger(),
            &query(&["day", "app_id", "spot_id", "country_code"], &["revenue", "impressions"]),
        );
        let response = json!({
            "apps": [
                {
                    "appId": "app-1",
                    "spots": [
                        {
                            "spotId": 111,
                            "units": [
                                {
                                    "date": 1_704_153_600,
                                    "country": "US",
                                    "spotId": "",
                                    "revenue": "1.75",
                                    "impressions": "350",
                                },
                                { "date": null, "revenue": 0, "impressions": 0 },
                            ]
                        }
                    ]
                },
                { "appId": "app-2", "spots": [{ "spotId": 222 }] },
            ]
        });

        let rows = normalize(&discard_logger(), &selection, &response).expect("Should normalize");

        assert_eq!(
            json!([
                {
                    "day": "2024-01-02",
                    "app_id": "app-1",
                    "spot_id": 111,
                    "country_code": "US",
                    "revenue": 1.75,
                    "impressions": 350,
                },
                {
                    "day": "N/A",
                    "app_id": "app-1",
                    "spot_id": 111,
                    "country_code": "N/A",
                    "revenue": 0.0,
                    "impressions": 0,
                },
            ]),
            serde_json::to_value(&rows).expect("Should serialize")
        );
    }

    #[test]
    fn structural_errors() {
        let selection = MAPPING.select(&discard_logger(), &query(&[], &[]));

        let error = normalize(
            &discard_logger(),
            &selection,
            &json!({ "error": "unauthorized", "message": "Invalid publisher" }),
        )
        .expect_err("Should fail");
        assert_eq!(Kind::BadRequest, error.kind());
        assert_eq!("Bad request: Fyber API error: Invalid publisher", error.to_string());

        let error = normalize(&discard_logger(), &selection, &json!({ "publisher": 1 }))
            .expect_err("Should fail");
        assert_eq!(Kind::MissingData, error.kind());
    }
}
