//! HyprMX publisher reporting API.
use async_trait::async_trait;
use once_cell::sync::Lazy;
use primitives::{ApiUrl, Network, NormalizedRow, Query, Report, Secret};
use serde::Deserialize;
use serde_json::Value as Json;
use slog::{info, o, warn, Logger};

use crate::{
    http::{self, StatusPolicy},
    mapping::{Fallback, Field, FieldKind, FieldMapping, Selection},
    Adapter, Context, Credential, Error, Init,
};

const NETWORK: &str = "HyprMX";

pub static API_URL: Lazy<ApiUrl> = Lazy::new(|| {
    "https://live.hyprmx.com/"
        .parse()
        .expect("Valid HyprMX API url")
});

/// The metrics are always reported, only the dimensions can be selected.
const METRICS: &[&str] = &["revenue", "impressions", "ecpm"];

pub static MAPPING: FieldMapping = FieldMapping {
    network: NETWORK,
    dimensions: &[
        Field::same("date", FieldKind::Dimension),
        Field::same("placement", FieldKind::Dimension),
        Field::same("country", FieldKind::Dimension),
        Field::same("ad_type", FieldKind::Dimension),
    ],
    metrics: &[
        Field::same("revenue", FieldKind::Float),
        Field::same("impressions", FieldKind::Integer),
        Field::same("ecpm", FieldKind::Float),
    ],
    default_dimensions: &["date"],
    default_metrics: METRICS,
    fallback: Fallback::Lowercase,
    fallback_dimension: FieldKind::Dimension,
    fallback_metric: FieldKind::Float,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    pub api_key: Secret,
    pub app_id: String,
}

#[derive(Debug)]
pub struct HyprMx {
    options: Options,
    api_url: ApiUrl,
    context: Context,
    logger: Logger,
}

impl HyprMx {
    pub fn with_api_url(mut self, api_url: ApiUrl) -> Self {
        self.api_url = api_url;
        self
    }
}

impl Init for HyprMx {
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

/// Selects the requested dimensions and the fixed metrics.
pub fn select(logger: &Logger, query: &Query) -> Selection {
    if !query.metrics.is_empty() {
        warn!(logger, "Metrics can't be selected, the fixed metrics are reported"; "metrics" => ?query.metrics);
    }

    let mut query = query.clone();
    query.metrics = METRICS.iter().map(ToString::to_string).collect();

    MAPPING.select(logger, &query)
}

#[async_trait]
impl Adapter for HyprMx {
    fn network(&self) -> Network {
        Network::Hyprmx
    }

    async fn ensure_credential(&mut self) -> Result<Credential, Error> {
        Ok(Credential::StaticKey(self.options.api_key.clone()))
    }

    async fn get_report(&mut self, query: &Query) -> Result<Report, Error> {
        let selection = select(&self.logger, query);
        let group_by = selection.native_dimensions().join(",");

        let url = self
            .api_url
            .join(&format!("api/v1/apps/{}/reports", self.options.app_id.trim()))
            .map_err(Error::bad_request)?;
        info!(&self.logger, "Requesting report"; "url" => %url, "group_by" => &group_by);

        let (start, end) = (query.start(), query.end());
        let response = self
            .context
            .client
            .get(url)
            .bearer_auth(self.options.api_key.expose())
            .query(&[
                ("start_date", start.as_str()),
                ("end_date", end.as_str()),
                ("group_by", group_by.as_str()),
            ])
            .send()
            .await
            .map_err(|err| http::request_error(NETWORK, err))?;
        let json = http::read_json(NETWORK, response, StatusPolicy::Default).await?;

        let rows = normalize(&self.logger, &selection, &json)?;
        info!(&self.logger, "Processed report"; "rows" => rows.len());

        Ok(Report::Rows(rows))
    }
}

/// Normalizes the rows in `data`.
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

    let rows = response
        .get("data")
        .and_then(Json::as_array)
        .ok_or_else(|| Error::missing_data(format!("{} report has no `data` list", NETWORK)))?;

    Ok(rows
        .iter()
        .filter_map(|row| selection.build_row(logger, |field| row.get(field.native.as_ref())))
        .collect())
}
