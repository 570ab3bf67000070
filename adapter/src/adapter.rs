use async_trait::async_trait;
use primitives::{Config, Network, Query, Report, Secret};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use slog::Logger;

use crate::Error;

/// Everything an adapter needs from its host.
#[derive(Debug, Clone)]
pub struct Context {
    pub client: Client,
    pub config: Config,
    pub logger: Logger,
}

impl Context {
    /// Builds the HTTP client with the `fetch_timeout` of the [`Config`]
    /// applied to every outbound request.
    pub fn new(config: Config, logger: Logger) -> Result<Self, Error> {
        let client = Client::builder()
            .timeout(config.fetch_timeout())
            .build()
            .map_err(Error::connection)?;

        Ok(Self {
            client,
            config,
            logger,
        })
    }
}

/// The access credential of a network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    /// Short-lived OAuth2 access token obtained with a refresh token.
    OAuth2Token(Secret),
    StaticKey(Secret),
    /// The material every request is signed with, see [`crate::oauth1`].
    OAuth1Signature {
        consumer_key: String,
        consumer_secret: Secret,
    },
    Session {
        session_id: Secret,
        account_id: String,
    },
}

#[async_trait]
/// A single ad network.
///
/// An adapter is constructed for a single request, the credential it obtains
/// is cached for its lifetime and never refreshed.
pub trait Adapter: Send {
    fn network(&self) -> Network;

    /// Returns the cached credential, performing the exchange on the first call.
    async fn ensure_credential(&mut self) -> Result<Credential, Error>;

    async fn get_report(&mut self, query: &Query) -> Result<Report, Error>;
}

/// Constructs an adapter from the flat request body.
pub trait Init: Adapter + Sized + 'static {
    /// The credentials & network specific filters.
    type Options: DeserializeOwned;

    fn init(options: Self::Options, context: Context) -> Self;

    /// Deserializes the [`Init::Options`] from the request body,
    /// a body without the required fields is a bad request.
    fn from_body(body: Json, context: Context) -> Result<Box<dyn Adapter>, Error> {
        let options = serde_json::from_value::<Self::Options>(body).map_err(Error::bad_request)?;

        Ok(Box::new(Self::init(options, context)))
    }
}
