#![deny(rust_2018_idioms)]
#![deny(clippy::all)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! The domain types shared by the ad network adapters and the poller.

pub mod config;
pub mod network;
pub mod query;
pub mod report;
pub mod secret;
pub mod util {
    pub use api::ApiUrl;

    pub mod api;

    pub mod logging;
}

pub use self::{
    config::Config,
    network::Network,
    query::Query,
    report::{NormalizedRow, Report, Value},
    secret::Secret,
    util::ApiUrl,
};
