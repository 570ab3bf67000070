//! Facebook Audience Network analytics (Graph API `adnetworkanalytics`).
use async_trait::async_trait;
use once_cell::sync::Lazy;
use primitives::{ApiUrl, Network, NormalizedRow, Query, Report, Secret};
use serde::Deserialize;
use serde_json::{Map, Value as Json};
use slog::{info, o, warn, Logger};

use crate::{
    http::{self, StatusPolicy},
    mapping::{Fallback, Field, FieldKind, FieldMapping, Selection},
    Adapter, Context, Credential, Error, Init,
};

const NETWORK: &str = "Facebook";

pub const API_VERSION: &str = "v13.0";

pub static API_URL: Lazy<ApiUrl> = Lazy::new(|| {
    "https://graph.facebook.com/"
        .parse()
        .expect("Valid Graph API url")
});

static DAY: Field = Field::output("day", "time", FieldKind::Dimension);

pub static MAPPING: FieldMapping = FieldMapping {
    network: NETWORK,
    dimensions: &[
        Field::same("placement", FieldKind::Dimension),
        Field::same("country", FieldKind::Dimension),
        Field::output("day", "time", FieldKind::Dimension),
    ],
    metrics: &[Field::output("revenue", "fb_ad_network_revenue", FieldKind::Float)],
    default_dimensions: &[],
    default_metrics: &["revenue"],
    fallback: Fallback::Verbatim,
    fallback_dimension: FieldKind::Dimension,
    fallback_metric: FieldKind::Float,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    pub app_id: String,
    pub access_token: Secret,
}

#[derive(Debug)]
pub struct Facebook {
    options: Options,
    api_url: ApiUrl,
    context: Context,
    logger: Logger,
}

impl Facebook {
    pub fn with_api_url(mut self, api_url: ApiUrl) -> Self {
        self.api_url = api_url;
        self
    }
}

impl Init for Facebook {
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

/// The selection of the query, the `day` is part of every report.
pub fn select(logger: &Logger, query: &Query) -> Selection {
    let mut selection = MAPPING.select(logger, query);
    selection.push_dimension(DAY.clone());

    selection
}

/// The query parameters apart from the access token.
pub fn report_params(query: &Query, selection: &Selection) -> Vec<(String, String)> {
    let metrics = selection
        .native_metrics()
        .iter()
        .map(|metric| format!("'{}'", metric))
        .collect::<Vec<_>>()
        .join(",");

    let mut params = vec![("metrics".to_string(), format!("[{}]", metrics))];

    params.extend(
        selection
            .native_dimensions()
            .into_iter()
            .filter(|dimension| *dimension != DAY.native)
            .enumerate()
            .map(|(index, breakdown)| (format!("breakdowns[{}]", index), breakdown.to_string())),
    );

    params.extend([
        ("since".to_string(), query.start()),
        ("until".to_string(), query.end()),
        ("ordering_column".to_string(), "value".to_string()),
    ]);

    params
}

#[async_trait]
impl Adapter for Facebook {
    fn network(&self) -> Network {
        Network::Facebook
    }

    async fn ensure_credential(&mut self) -> Result<Credential, Error> {
        Ok(Credential::StaticKey(self.options.access_token.clone()))
    }

    async fn get_report(&mut self, query: &Query) -> Result<Report, Error> {
        let selection = select(&self.logger, query);
        let params = report_params(query, &selection);

        let url = self
            .api_url
            .join(&format!(
                "{}/{}/adnetworkanalytics/",
                API_VERSION,
                self.options.app_id.trim()
            ))
            .map_err(Error::bad_request)?;
        // the access token is part of the query, only the endpoint is logged
        info!(&self.logger, "Requesting report"; "url" => %url, "params" => ?params);

        let response = self
            .context
            .client
            .get(url)
            .query(&params)
            .query(&[("access_token", self.options.access_token.expose())])
            .send()
            .await
            .map_err(|err| http::request_error(NETWORK, err))?;
        let json = http::read_json(NETWORK, response, StatusPolicy::NotFoundIsBadRequest).await?;

        let rows = normalize(&self.logger, &selection, &json)?;
        info!(&self.logger, "Processed report"; "rows" => rows.len());

        Ok(Report::Rows(rows))
    }
}

/// Normalizes the `data[].results[]` of the response.
///
/// Every result carries a single metric in `value`, the dimensions are in `breakdowns`
/// and the day is the date part of `time`.
pub fn normalize(
    logger: &Logger,
    selection: &Selection,
    response: &Json,
) -> Result<Vec<NormalizedRow>, Error> {
    if let Some(error) = response.get("error") {
        let code = error
            .get("code")
            .map_or_else(|| "N/A".to_string(), ToString::to_string);
        let message = error
            .get("message")
            .and_then(Json::as_str)
            .unwrap_or("Unknown error");

        return Err(Error::bad_request(format!(
            "{} API error ({}): {}",
            NETWORK, code, message
        )));
    }

    let data = response
        .get("data")
        .and_then(Json::as_array)
        .ok_or_else(|| Error::missing_data(format!("{} report has no `data` list", NETWORK)))?;

    let mut rows = vec![];
    for item in data {
        let results = match item.get("results").and_then(Json::as_array) {
            Some(results) => results,
            None => {
                warn!(logger, "Skipping data item without a `results` list");
                continue;
            }
        };

        for result in results {
            let flat = match flatten(result) {
                Some(flat) => flat,
                None => {
                    warn!(logger, "Skipping a result which is not an object"; "result" => %result);
                    continue;
                }
            };

            rows.extend(selection.build_row(logger, |field| flat.get(field.native.as_ref())));
        }
    }

    Ok(rows)
}

/// `{time, metric, value, breakdowns: [{key, value}]}` into `{time: day, <metric>: value, <key>: value}`
fn flatten(result: &Json) -> Option<Map<String, Json>> {
    let result = result.as_object()?;
    let mut flat = Map::new();

    if let Some(time) = result.get("time").and_then(Json::as_str) {
        let day = time.split('T').next().unwrap_or(time);
        flat.insert(DAY.native.to_string(), Json::from(day));
    }

    if let Some(value) = result.get("value") {
        let metric = result
            .get("metric")
            .and_then(Json::as_str)
            .unwrap_or("fb_ad_network_revenue");
        flat.insert(metric.to_string(), value.clone());
    }

    let breakdowns = result.get("breakdowns").and_then(Json::as_array);
    for breakdown in breakdowns.into_iter().flatten() {
        if let (Some(key), Some(value)) = (
            breakdown.get("key").and_then(Json::as_str),
            breakdown.get("value"),
        ) {
            flat.insert(key.to_string(), value.clone());
        }
    }

    Some(flat)
}
