use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
};

use adapter::{
    AdMob, Adapter, AppLovin, Chartboost, Context, Error, Facebook, Fyber, Gam, HyprMx, InMobi,
    Init,
};
use axum::{routing::post, Extension, Router, Server};
use primitives::{config::Environment, Network};
use serde::Deserialize;
use serde_json::Value as Json;
use slog::{error, info, Logger};

/// an error used when deserializing a [`EnvConfig`] instance from environment variables
/// see [`EnvConfig::from_env()`]
pub use envy::Error as EnvError;

use crate::routes::poll;

pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_IP_ADDR: IpAddr = IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0));

#[derive(Debug, Deserialize, Clone)]
pub struct EnvConfig {
    /// Defaults to `Development`: [`Environment::default()`]
    #[serde(default)]
    pub env: Environment,
    /// The port on which the poller will be accessible.
    #[serde(default = "default_port")]
    /// Defaults to `5001`: [`DEFAULT_PORT`]
    pub port: u16,
    /// The address on which the poller will be accessible.
    /// `0.0.0.0` can be used for Docker.
    /// `127.0.0.1` can be used for locally running servers.
    #[serde(default = "default_ip_addr")]
    /// Defaults to `0.0.0.0`: [`DEFAULT_IP_ADDR`]
    pub ip_addr: IpAddr,
}

impl EnvConfig {
    /// Deserialize the application [`EnvConfig`] from Environment variables.
    pub fn from_env() -> Result<Self, EnvError> {
        envy::from_env()
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_ip_addr() -> IpAddr {
    DEFAULT_IP_ADDR
}

/// Builds the adapter of a network from the flat request body.
pub type Constructor = fn(Json, Context) -> Result<Box<dyn Adapter>, Error>;

/// The networks which can be polled and how their adapters are built.
#[derive(Debug, Clone, Default)]
pub struct Registry(HashMap<Network, Constructor>);

impl Registry {
    /// Every network with a production adapter.
    pub fn production() -> Self {
        Self::default()
            .with(Network::AdmobNonsso, <AdMob as Init>::from_body)
            .with(Network::Gam, <Gam as Init>::from_body)
            .with(Network::Applovin, <AppLovin as Init>::from_body)
            .with(Network::Chartboost, <Chartboost as Init>::from_body)
            .with(Network::Facebook, <Facebook as Init>::from_body)
            .with(Network::Fyber, <Fyber as Init>::from_body)
            .with(Network::Hyprmx, <HyprMx as Init>::from_body)
            .with(Network::Inmobi, <InMobi as Init>::from_body)
    }

    /// Registers (or replaces) the constructor of the network.
    pub fn with(mut self, network: Network, constructor: Constructor) -> Self {
        self.0.insert(network, constructor);
        self
    }

    pub fn get(&self, network: Network) -> Option<Constructor> {
        self.0.get(&network).copied()
    }
}

/// The poller application: the adapter [`Registry`] and
/// the [`Context`] shared by every adapter instance.
#[derive(Debug)]
pub struct Application {
    pub registry: Registry,
    pub context: Context,
    pub logger: Logger,
}

impl Application {
    pub fn new(registry: Registry, context: Context) -> Self {
        let logger = context.logger.clone();

        Self {
            registry,
            context,
            logger,
        }
    }

    /// The `/api/poll/:network` routes.
    pub fn router(self: Arc<Self>) -> Router {
        Router::new()
            .route("/api/poll/:network", post(poll))
            .layer(Extension(self))
    }

    /// Starts the `axum` `Server`.
    pub async fn run(self, socket_addr: SocketAddr) {
        let logger = self.logger.clone();
        info!(&logger, "Listening on socket address: {}!", socket_addr);

        let router = Arc::new(self).router();
        let server = Server::bind(&socket_addr).serve(router.into_make_service());

        if let Err(e) = server.await {
            error!(&logger, "server error: {}", e; "main" => "run");
        }
    }
}
