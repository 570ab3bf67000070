//! OAuth2 refresh-token exchange, shared by the Google networks (AdMob & GAM).
use primitives::Secret;
use reqwest::Client;
use serde::Deserialize;
use slog::{info, Logger};
use thiserror::Error;
use url::Url;

use crate::{http, Error};

pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

#[derive(Debug, Error)]
#[error("{network}: `access_token` not found in the token response")]
pub struct MissingAccessToken {
    pub network: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RefreshCredentials {
    pub client_id: Secret,
    pub client_secret: Secret,
    pub refresh_token: Secret,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Exchanges the refresh token for a short-lived access token.
///
/// A rejected exchange or an unusable token response is an authentication error,
/// a transport failure is a connection error. The token response is never logged.
pub async fn refresh_access_token(
    network: &'static str,
    client: &Client,
    token_url: &Url,
    credentials: &RefreshCredentials,
    logger: &Logger,
) -> Result<Secret, Error> {
    info!(logger, "Requesting access token"; "token_url" => %token_url);

    let form = [
        ("client_id", credentials.client_id.expose()),
        ("client_secret", credentials.client_secret.expose()),
        ("refresh_token", credentials.refresh_token.expose()),
        ("grant_type", "refresh_token"),
    ];

    let response = client
        .post(token_url.clone())
        .form(&form)
        .send()
        .await
        .map_err(|err| http::request_error(network, err))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| http::request_error(network, err))?;

    if !status.is_success() {
        return Err(Error::authentication(http::StatusError {
            network,
            status,
            message: http::error_message(&body),
        }));
    }

    let token = serde_json::from_str::<TokenResponse>(&body)
        .map_err(|source| Error::authentication(http::InvalidJson { network, source }))?
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or_else(|| Error::authentication(MissingAccessToken { network }))?;

    info!(logger, "Access token received");

    Ok(Secret::new(token))
}
