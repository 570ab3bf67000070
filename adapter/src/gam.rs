//! Google Ad Manager `ReportService` over SOAP.
//!
//! A report takes three requests: the report job is run, the download url of the
//! finished job is requested (retried on server errors) and the CSV export is downloaded.
//! The CSV is returned as a [`Report::Table`] with the raw header of the export.
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use primitives::{Config, Network, Query, Report, Secret};
use reqwest::StatusCode;
use serde::Deserialize;
use slog::{info, o, warn, Logger};
use thiserror::Error;
use url::Url;

use crate::{
    http::{self, StatusPolicy},
    mapping::{Fallback, Field, FieldKind, FieldMapping, Selection},
    oauth2::{self, RefreshCredentials},
    Adapter, Context, Credential, Error, Init,
};

pub use soap::{ReportQuery, RequestHeader};

pub mod soap;
pub mod table;

const NETWORK: &str = "GAM";

const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

pub static REPORT_SERVICE_URL: Lazy<Url> = Lazy::new(|| {
    Url::parse(&format!(
        "https://ads.google.com/apis/ads/publisher/{}/ReportService",
        soap::API_VERSION
    ))
    .expect("Valid GAM ReportService url")
});

pub static TOKEN_URL: Lazy<Url> =
    Lazy::new(|| Url::parse(oauth2::GOOGLE_TOKEN_URL).expect("Valid Google token url"));

pub static MAPPING: FieldMapping = FieldMapping {
    network: NETWORK,
    dimensions: &[
        Field::output("date", "DATE", FieldKind::Dimension),
        Field::output("ad_unit_name", "AD_UNIT_NAME", FieldKind::Dimension),
        Field::output("ad_unit_id", "AD_UNIT_ID", FieldKind::Dimension),
        Field::output("parent_ad_unit_id", "PARENT_AD_UNIT_ID", FieldKind::Dimension),
        Field::output("country_name", "COUNTRY_NAME", FieldKind::Dimension),
        Field::output("country_criteria_id", "COUNTRY_CRITERIA_ID", FieldKind::Dimension),
    ],
    metrics: &[
        Field::output(
            "impressions",
            "TOTAL_LINE_ITEM_LEVEL_IMPRESSIONS",
            FieldKind::Integer,
        ),
        Field::output(
            "revenue",
            "TOTAL_LINE_ITEM_LEVEL_CPM_AND_CPC_REVENUE",
            FieldKind::Float,
        ),
    ],
    default_dimensions: &["date"],
    default_metrics: &["impressions", "revenue"],
    fallback: Fallback::Uppercase,
    fallback_dimension: FieldKind::Dimension,
    fallback_metric: FieldKind::Number,
};

#[derive(Debug, Error)]
#[error("GAM download url still unavailable after {attempts} attempts, last status {status}: {message}")]
pub struct RetriesExhausted {
    pub attempts: u32,
    pub status: StatusCode,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    #[serde(flatten)]
    pub credentials: RefreshCredentials,
    pub network_code: String,
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub token: Url,
    pub report_service: Url,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token: TOKEN_URL.clone(),
            report_service: REPORT_SERVICE_URL.clone(),
        }
    }
}

/// How the download url request is retried on server errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of requests, including the first one.
    pub attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            attempts: config.gam_download_url_attempts.max(1),
            base_delay: config.gam_download_url_base_delay(),
        }
    }

    /// The delay after the failed attempt `retry` (0-based), doubled for every retry.
    pub fn delay(&self, retry: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(retry))
    }
}

#[derive(Debug)]
pub struct Gam {
    options: Options,
    endpoints: Endpoints,
    retry_policy: RetryPolicy,
    context: Context,
    logger: Logger,
    access_token: Option<Secret>,
}

impl Gam {
    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
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

    fn request_header(&self) -> RequestHeader<'_> {
        RequestHeader {
            network_code: self.options.network_code.trim(),
            application_name: &self.context.config.gam_application_name,
        }
    }

    /// POSTs the envelope, returning the status & the body.
    async fn post_soap(
        &self,
        access_token: &Secret,
        envelope: String,
    ) -> Result<(StatusCode, String), Error> {
        let response = self
            .context
            .client
            .post(self.endpoints.report_service.clone())
            .bearer_auth(access_token.expose())
            .header(reqwest::header::CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(envelope)
            .send()
            .await
            .map_err(|err| http::request_error(NETWORK, err))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| http::request_error(NETWORK, err))?;

        Ok((status, body))
    }

    async fn run_report_job(&self, access_token: &Secret, query: &ReportQuery) -> Result<String, Error> {
        let envelope = soap::run_report_job(self.request_header(), query)?;
        info!(&self.logger, "Running report job"; "url" => %self.endpoints.report_service, "dimensions" => ?query.dimensions, "columns" => ?query.columns);

        let (status, body) = self.post_soap(access_token, envelope).await?;
        if !status.is_success() {
            return Err(soap_error(status, &body));
        }

        let job_id = soap::parse_report_job_id(&body)?;
        info!(&self.logger, "Report job started"; "job_id" => &job_id);

        Ok(job_id)
    }

    async fn download_url(&self, access_token: &Secret, job_id: &str) -> Result<String, Error> {
        let policy = self.retry_policy;
        let mut attempt = 0;

        loop {
            attempt += 1;

            let envelope = soap::get_report_download_url(self.request_header(), job_id)?;
            let (status, body) = self.post_soap(access_token, envelope).await?;

            if status.is_success() {
                return soap::parse_download_url(&body);
            }

            if !status.is_server_error() {
                return Err(soap_error(status, &body));
            }

            if attempt >= policy.attempts {
                return Err(Error::connection(RetriesExhausted {
                    attempts: attempt,
                    status,
                    message: soap::fault(&body).unwrap_or_else(|| http::error_message(&body)),
                }));
            }

            let delay = policy.delay(attempt - 1);
            warn!(&self.logger, "Server error for the download url, retrying"; "status" => %status, "attempt" => attempt, "delay" => ?delay);
            tokio::time::sleep(delay).await;
        }
    }

    async fn download(&self, url: &str, query: &ReportQuery) -> Result<Report, Error> {
        let url = Url::parse(url).map_err(Error::parse)?;
        info!(&self.logger, "Downloading report"; "host" => url.host_str().unwrap_or_default());

        let response = self
            .context
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| http::request_error(NETWORK, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    warn!(&self.logger, "Failed to read the download error body"; "status" => %status, "error" => %err);
                    String::new()
                }
            };
            return Err(http::status_error(NETWORK, status, &body, StatusPolicy::Default));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| http::request_error(NETWORK, err))?;

        let requested = query
            .dimensions
            .iter()
            .chain(&query.columns)
            .cloned()
            .collect::<Vec<_>>();

        table::parse(&self.logger, &table::decode(&self.logger, &bytes), &requested)
    }
}

/// A SOAP fault in a non-authentication error response is a rejected query.
fn soap_error(status: StatusCode, body: &str) -> Error {
    match soap::fault(body) {
        Some(fault) if status != StatusCode::UNAUTHORIZED && status != StatusCode::FORBIDDEN => {
            Error::bad_request(soap::Fault(fault))
        }
        _ => http::status_error(NETWORK, status, body, StatusPolicy::Default),
    }
}

/// The `reportQuery` of the selection.
pub fn report_query(query: &Query, selection: &Selection) -> ReportQuery {
    ReportQuery {
        dimensions: selection
            .native_dimensions()
            .into_iter()
            .map(ToString::to_string)
            .collect(),
        columns: selection
            .native_metrics()
            .into_iter()
            .map(ToString::to_string)
            .collect(),
        start_date: query.start_date,
        end_date: query.end_date,
    }
}

impl Init for Gam {
    type Options = Options;

    fn init(options: Options, context: Context) -> Self {
        let logger = context.logger.new(o!("network" => NETWORK));

        Self {
            options,
            endpoints: Endpoints::default(),
            retry_policy: RetryPolicy::from_config(&context.config),
            context,
            logger,
            access_token: None,
        }
    }
}

#[async_trait]
impl Adapter for Gam {
    fn network(&self) -> Network {
        Network::Gam
    }

    async fn ensure_credential(&mut self) -> Result<Credential, Error> {
        self.access_token().await.map(Credential::OAuth2Token)
    }

    async fn get_report(&mut self, query: &Query) -> Result<Report, Error> {
        let access_token = self.access_token().await?;
        let selection = MAPPING.select(&self.logger, query);
        let report_query = report_query(query, &selection);

        let job_id = self.run_report_job(&access_token, &report_query).await?;
        let url = self.download_url(&access_token, &job_id).await?;
        let report = self.download(&url, &report_query).await?;

        info!(&self.logger, "Processed report"; "rows" => report.len());

        Ok(report)
    }
}
