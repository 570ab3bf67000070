#![deny(rust_2018_idioms)]
#![deny(clippy::all)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! The HTTP dispatcher of the ad network adapters.
//!
//! Every `POST /api/poll/:network` request builds a new adapter of the network
//! from the request body, fetches a single report and returns it normalized.

pub use self::application::{Application, EnvConfig, Registry};

pub mod application;
pub mod response;
pub mod routes;
