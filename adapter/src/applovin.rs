//! AppLovin MAX publisher reporting API.
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

const NETWORK: &str = "AppLovin";

pub static API_URL: Lazy<ApiUrl> =
    Lazy::new(|| "https://r.applovin.com/".parse().expect("Valid AppLovin API url"));

pub static MAPPING: FieldMapping = FieldMapping {
    network: NETWORK,
    dimensions: &[
        Field::new("DATE", "day", "day", FieldKind::Dimension),
        Field::new("AD_UNIT", "zone_id", "zone_id", FieldKind::Dimension),
        Field::new("APP", "application", "application", FieldKind::Dimension),
        Field::new("APP", "package_name", "package_name", FieldKind::Dimension),
        Field::new("FORMAT", "size", "size", FieldKind::Dimension),
        Field::same("country", FieldKind::Dimension),
        Field::same("platform", FieldKind::Dimension),
        Field::same("ad_type", FieldKind::Dimension),
    ],
    metrics: &[
        Field::new("ESTIMATED_EARNINGS", "revenue", "revenue", FieldKind::Float),
        Field::new("IMPRESSIONS", "impressions", "impressions", FieldKind::Integer),
        Field::new("CLICKS", "clicks", "clicks", FieldKind::Integer),
        Field::same("views", FieldKind::Integer),
        Field::new(
            "IMPRESSION_RPM",
            "IMPRESSION_RPM",
            "IMPRESSION_RPM",
            FieldKind::Unavailable,
        ),
    ],
    default_dimensions: &["day", "application", "country"],
    default_metrics: &["revenue", "impressions"],
    fallback: Fallback::Lowercase,
    fallback_dimension: FieldKind::Dimension,
    fallback_metric: FieldKind::Float,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    pub api_key: Secret,
}

#[derive(Debug)]
pub struct AppLovin {
    options: Options,
    api_url: ApiUrl,
    context: Context,
    logger: Logger,
}

impl AppLovin {
    pub fn with_api_url(mut self, api_url: ApiUrl) -> Self {
        self.api_url = api_url;
        self
    }
}

impl Init for AppLovin {
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
impl Adapter for AppLovin {
    fn network(&self) -> Network {
        Network::Applovin
    }

    async fn ensure_credential(&mut self) -> Result<Credential, Error> {
        Ok(Credential::StaticKey(self.options.api_key.clone()))
    }

    async fn get_report(&mut self, query: &Query) -> Result<Report, Error> {
        let selection = MAPPING.select(&self.logger, query);
        let columns = columns(&selection);

        let url = self.api_url.join("report").map_err(Error::bad_request)?;
        // the api key is part of the query, only the endpoint is logged
        info!(&self.logger, "Requesting report"; "url" => %url, "columns" => &columns);

        let (start, end) = (query.start(), query.end());
        let response = self
            .context
            .client
            .get(url)
            .query(&[
                ("api_key", self.options.api_key.expose()),
                ("start", start.as_str()),
                ("end", end.as_str()),
                ("columns", columns.as_str()),
                ("format", "json"),
                ("report_type", "publisher"),
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

/// The `columns` query parameter.
pub fn columns(selection: &Selection) -> String {
    selection
        .native_dimensions()
        .into_iter()
        .chain(selection.native_metrics())
        .collect::<Vec<_>>()
        .join(",")
}

/// Normalizes either a list of rows or the rows wrapped in `{"results": [..]}`.
pub fn normalize(
    logger: &Logger,
    selection: &Selection,
    response: &Json,
) -> Result<Vec<NormalizedRow>, Error> {
    let rows = match response {
        Json::Array(rows) => rows,
        Json::Object(object) => match object.get("results") {
            Some(Json::Array(rows)) => rows,
            _ => {
                return Err(Error::parse(format!(
                    "{} report is expected to be a list or to have a `results` list",
                    NETWORK
                )))
            }
        },
        other => {
            return Err(Error::parse(format!(
                "{} report is expected to be a list, got: {}",
                NETWORK,
                http::json_type(other)
            )))
        }
    };

    let rows = rows
        .iter()
        .filter(|row| {
            let is_object = row.is_object();
            if !is_object {
                warn!(logger, "Skipping a row which is not an object"; "row" => %row);
            }
            is_object
        })
        .filter_map(|row| selection.build_row(logger, |field| row.get(field.native.as_ref())))
        .collect();

    Ok(rows)
}
