use parse_display::{Display, FromStr};
use serde::{Deserialize, Serialize};

/// The ad networks (and their variants) which can be polled for reports.
///
/// The `snake_case` representation is used as the route segment of the dispatcher,
/// e.g. `POST /api/poll/admob_nonsso`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromStr, Serialize, Deserialize)]
#[display(style = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Network {
    /// AdMob authenticated with a user supplied OAuth2 refresh token.
    AdmobNonsso,
    /// AdMob authenticated through Single Sign-On.
    AdmobSso,
    /// Google Ad Manager
    Gam,
    Applovin,
    Chartboost,
    /// Facebook Audience Network
    Facebook,
    Fyber,
    Hyprmx,
    Inmobi,
}

impl Network {
    pub const ALL: [Network; 9] = [
        Network::AdmobNonsso,
        Network::AdmobSso,
        Network::Gam,
        Network::Applovin,
        Network::Chartboost,
        Network::Facebook,
        Network::Fyber,
        Network::Hyprmx,
        Network::Inmobi,
    ];
}
