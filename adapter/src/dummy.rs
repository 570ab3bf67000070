//! The [`Dummy`] adapter for testing the dispatcher without any network.
//!
use async_trait::async_trait;
use primitives::{Network, NormalizedRow, Query, Report, Secret, Value};
use serde::Deserialize;
use serde_json::{Map, Value as Json};
use slog::{info, o, Logger};

use crate::{Adapter, Context, Credential, Error, Init};

/// The [`Error`] kind the [`Dummy`] fails with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailWith {
    Authentication,
    BadRequest,
    Connection,
    Parse,
    MissingData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DummyError {
    pub kind: FailWith,
    pub message: String,
}

impl From<DummyError> for Error {
    fn from(error: DummyError) -> Self {
        let DummyError { kind, message } = error;

        match kind {
            FailWith::Authentication => Error::authentication(message),
            FailWith::BadRequest => Error::bad_request(message),
            FailWith::Connection => Error::connection(message),
            FailWith::Parse => Error::parse(message),
            FailWith::MissingData => Error::missing_data(message),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Options {
    /// The identity the dummy reports as, the route it's registered for.
    #[serde(default = "default_network")]
    pub dummy_network: Network,
    /// Returned as they are from [`Adapter::get_report`].
    #[serde(default)]
    pub dummy_rows: Vec<Map<String, Json>>,
    /// When set, every call fails with it instead.
    #[serde(default)]
    pub dummy_error: Option<DummyError>,
}

fn default_network() -> Network {
    Network::Applovin
}

/// Dummy adapter implementation intended for testing.
#[derive(Debug)]
pub struct Dummy {
    options: Options,
    logger: Logger,
}

impl Init for Dummy {
    type Options = Options;

    fn init(options: Options, context: Context) -> Self {
        let logger = context.logger.new(o!("network" => "dummy"));

        Self { options, logger }
    }
}

#[async_trait]
impl Adapter for Dummy {
    fn network(&self) -> Network {
        self.options.dummy_network
    }

    async fn ensure_credential(&mut self) -> Result<Credential, Error> {
        match &self.options.dummy_error {
            Some(error) => Err(error.clone().into()),
            None => Ok(Credential::StaticKey(Secret::new("dummy"))),
        }
    }

    async fn get_report(&mut self, query: &Query) -> Result<Report, Error> {
        self.ensure_credential().await?;
        info!(&self.logger, "Returning the dummy rows"; "start_date" => query.start(), "end_date" => query.end());

        let rows = self
            .options
            .dummy_rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|(key, value)| (key.clone(), Value::from_json(value)))
                    .collect::<NormalizedRow>()
            })
            .collect();

        Ok(Report::Rows(rows))
    }
}
