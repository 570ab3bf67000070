//! Chartboost Analytics API (`/v3/metrics/appcountry`).
use async_trait::async_trait;
use once_cell::sync::Lazy;
use primitives::{ApiUrl, Network, NormalizedRow, Query, Report, Secret};
use serde::{Deserialize, Deserializer};
use serde_json::Value as Json;
use slog::{info, o, warn, Logger};

use crate::{
    http::{self, StatusPolicy},
    mapping::{Fallback, Field, FieldKind, FieldMapping, Selection},
    Adapter, Context, Credential, Error, Init,
};

const NETWORK: &str = "Chartboost";

pub static API_URL: Lazy<ApiUrl> = Lazy::new(|| {
    "https://analytics.chartboost.com/"
        .parse()
        .expect("Valid Chartboost API url")
});

pub static MAPPING: FieldMapping = FieldMapping {
    network: NETWORK,
    dimensions: &[
        Field::output("day", "dt", FieldKind::Dimension),
        Field::output("app_id", "appId", FieldKind::Dimension),
        Field::output("app_name", "app", FieldKind::Dimension),
        Field::output("country_code", "countryCode", FieldKind::Dimension),
        Field::same("platform", FieldKind::Dimension),
        Field::output("ad_location", "adLocation", FieldKind::Dimension),
        Field::output("ad_type", "adType", FieldKind::Dimension),
        Field::output("campaign_type", "campaignType", FieldKind::Dimension),
    ],
    metrics: &[
        Field::output("revenue", "moneyEarned", FieldKind::Float),
        Field::output("impressions", "impressionsDelivered", FieldKind::Integer),
        Field::output("clicks", "clicksDelivered", FieldKind::Integer),
        Field::output("installs", "installsDelivered", FieldKind::Integer),
        Field::output("ecpm", "ecpmEarned", FieldKind::Float),
        Field::output("cpcv", "cpcvEarned", FieldKind::Float),
        Field::output("ctr", "ctrDelivered", FieldKind::Float),
        Field::output("install_rate", "installRateDelivered", FieldKind::Float),
        Field::output("video_completed", "videoCompletedDelivered", FieldKind::Integer),
    ],
    default_dimensions: &["day", "app_name", "country_code"],
    default_metrics: &["revenue", "impressions"],
    fallback: Fallback::Verbatim,
    fallback_dimension: FieldKind::Dimension,
    fallback_metric: FieldKind::Float,
};

/// The `adTypeIds` of an `ad_type` selection, every ad type when it's unknown.
pub fn ad_type_ids(logger: &Logger, ad_type: Option<&str>) -> &'static str {
    match ad_type.map(str::trim) {
        Some("rewarded_video") => "4",
        Some("interstitial") => "1",
        Some("all") => "5",
        Some("rv_is_all") => "4,1,5",
        other => {
            warn!(logger, "Unexpected ad type, defaulting to all"; "ad_type" => ?other);
            "5"
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    /// Either a comma separated string or a list of ids.
    #[serde(deserialize_with = "comma_separated")]
    pub app_ids: String,
    pub user_id: String,
    pub user_signature: Secret,
    #[serde(default)]
    pub ad_type: Option<String>,
}

fn comma_separated<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Ids {
        Joined(String),
        List(Vec<Json>),
    }

    Ok(match Ids::deserialize(deserializer)? {
        Ids::Joined(ids) => ids.trim().to_string(),
        Ids::List(ids) => ids
            .iter()
            .map(|id| match id {
                Json::String(id) => id.trim().to_string(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join(","),
    })
}

#[derive(Debug)]
pub struct Chartboost {
    options: Options,
    api_url: ApiUrl,
    context: Context,
    logger: Logger,
}

impl Chartboost {
    pub fn with_api_url(mut self, api_url: ApiUrl) -> Self {
        self.api_url = api_url;
        self
    }
}

impl Init for Chartboost {
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

#[async_trait]
impl Adapter for Chartboost {
    fn network(&self) -> Network {
        Network::Chartboost
    }

    async fn ensure_credential(&mut self) -> Result<Credential, Error> {
        Ok(Credential::StaticKey(self.options.user_signature.clone()))
    }

    async fn get_report(&mut self, query: &Query) -> Result<Report, Error> {
        let selection = MAPPING.select(&self.logger, query);
        let ad_type_ids = ad_type_ids(&self.logger, self.options.ad_type.as_deref());

        let url = self
            .api_url
            .join("v3/metrics/appcountry")
            .map_err(Error::bad_request)?;
        info!(&self.logger, "Requesting report"; "url" => %url, "app_ids" => &self.options.app_ids, "ad_type_ids" => ad_type_ids);

        let (start, end) = (query.start(), query.end());
        let response = self
            .context
            .client
            .get(url)
            .query(&[
                ("appIds", self.options.app_ids.as_str()),
                ("userId", self.options.user_id.as_str()),
                ("userSignature", self.options.user_signature.expose()),
                ("dateMin", start.as_str()),
                ("dateMax", end.as_str()),
                ("adLocation", "all"),
                ("campaignType", "network,direct_deal"),
                ("adTypeIds", ad_type_ids),
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

pub fn normalize(
    logger: &Logger,
    selection: &Selection,
    response: &Json,
) -> Result<Vec<NormalizedRow>, Error> {
    let rows = match response {
        Json::Array(rows) => rows,
        Json::Object(object) if object.contains_key("error") => {
            let message = http::json_error_message(response).unwrap_or_else(|| response.to_string());

            return Err(Error::bad_request(format!(
                "{} API error: {}",
                NETWORK, message
            )));
        }
        other => {
            return Err(Error::parse(format!(
                "{} report is expected to be a list, got: {}",
                NETWORK,
                http::json_type(other)
            )))
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

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use primitives::util::logging::discard_logger;
    use serde_json::json;

    use super::*;
    use crate::Kind;

    fn select(dimensions: &[&str], metrics: &[&str]) -> Selection {
        let query =
            Query::new("2024-01-01", "2024-01-31", dimensions, metrics).expect("Valid query");

        MAPPING.select(&discard_logger(), &query)
    }

    #[test]
    fn app_ids_are_joined() {
        let options = serde_json::from_value::<Options>(json!({
            "app_ids": [" 5f1a ", 42],
            "user_id": "user",
            "user_signature": "signature",
        }))
        .expect("Should deserialize");

        assert_eq!("5f1a,42", options.app_ids);
        assert_eq!(None, options.ad_type);

        let options = serde_json::from_value::<Options>(json!({
            "app_ids": "5f1a,5f1b",
            "user_id": "user",
            "user_signature": "signature",
            "ad_type": "interstitial",
        }))
        .expect("Should deserialize");

        assert_eq!("5f1a,5f1b", options.app_ids);
    }

    #[test]
    fn ad_types() {
        let logger = discard_logger();

        assert_eq!("4", ad_type_ids(&logger, Some("rewarded_video")));
        assert_eq!("1", ad_type_ids(&logger, Some("interstitial")));
        assert_eq!("4,1,5", ad_type_ids(&logger, Some("rv_is_all")));
        assert_eq!("5", ad_type_ids(&logger, Some("banner")));
        assert_eq!("5", ad_type_ids(&logger, None));
    }

    #[test]
    fn normalizes_the_rows() {
        let selection = select(
            &["day", "app_name", "country_code", "app_version"],
            &["revenue", "impressions", "clicks"],
        );
        let response = json!([
            {
                "dt": "2024-01-02",
                "app": "Puzzle",
                "countryCode": "US",
                "moneyEarned": "3.5",
                "impressionsDelivered": "1500.0",
            },
            { "dt": "", "app": "", "moneyEarned": 0, "impressionsDelivered": "abc" },
        ]);

        let rows = normalize(&discard_logger(), &selection, &response).expect("Should normalize");

        assert_eq!(
            json!([{
                "day": "2024-01-02",
                "app_name": "Puzzle",
                "country_code": "US",
                "app_version": "N/A",
                "revenue": 3.5,
                "impressions": 1500,
                "clicks": 0,
            }]),
            serde_json::to_value(&rows).expect("Should serialize")
        );
    }

    #[test]
    fn error_objects_and_unexpected_shapes() {
        let selection = select(&[], &[]);

        let error = normalize(
            &discard_logger(),
            &selection,
            &json!({ "error": true, "message": "Invalid signature" }),
        )
        .expect_err("Should fail");
        assert_eq!(Kind::BadRequest, error.kind());
        assert_eq!(
            "Bad request: Chartboost API error: Invalid signature",
            error.to_string()
        );

        let error = normalize(&discard_logger(), &selection, &json!({ "data": [] }))
            .expect_err("Should fail");
        assert_eq!(Kind::Parse, error.kind());
    }
}
