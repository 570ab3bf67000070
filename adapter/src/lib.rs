#![deny(rust_2018_idioms)]
#![deny(clippy::all)]
#![cfg_attr(docsrs, feature(doc_cfg))]
//! The ad network adapters.
//!
//! Every network implements the [`Adapter`] trait: it obtains a [`Credential`],
//! translates the [`Query`](primitives::Query) into its own request and normalizes
//! the response into a [`Report`](primitives::Report).

pub use self::{
    adapter::{Adapter, Context, Credential, Init},
    admob::AdMob,
    applovin::AppLovin,
    chartboost::Chartboost,
    error::{Error, Kind},
    facebook::Facebook,
    fyber::Fyber,
    gam::Gam,
    hyprmx::HyprMx,
    inmobi::InMobi,
};

mod adapter;
pub mod error;

pub mod coerce;
pub mod http;
pub mod mapping;
pub mod oauth1;
pub mod oauth2;

pub mod admob;
pub mod applovin;
pub mod chartboost;
pub mod facebook;
pub mod fyber;
pub mod gam;
pub mod hyprmx;
pub mod inmobi;

#[cfg(any(test, feature = "test-util"))]
#[cfg_attr(docsrs, doc(cfg(feature = "test-util")))]
pub mod dummy;
