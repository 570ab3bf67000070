//! OAuth 1.0 request signing (`HMAC-SHA1`) as used by Fyber.
use hmac::{Hmac, Mac};
use sha1::Sha1;
use url::{Position, Url};

use crate::Error;

type HmacSha1 = Hmac<Sha1>;

pub const SIGNATURE_METHOD: &str = "HMAC-SHA1";
pub const VERSION: &str = "1.0";

/// The values which make a signature unique, generated for every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nonce {
    pub nonce: String,
    /// Unix timestamp in seconds
    pub timestamp: i64,
}

impl Nonce {
    /// A random UUID v4 nonce with the current timestamp.
    pub fn generate() -> Self {
        Self {
            nonce: uuid::Uuid::new_v4().to_string(),
            timestamp: chrono::Utc::now().timestamp(),
        }
    }
}

/// RFC 3986 percent-encoding, only `A-Z a-z 0-9 - . _ ~` are left as they are.
pub fn percent_encode(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

/// `METHOD&encoded(base url)&encoded(sorted & encoded parameters)`
///
/// The base url is the url without its query & fragment.
pub fn signature_base_string(method: &str, url: &Url, params: &[(&str, &str)]) -> String {
    let mut pairs = params
        .iter()
        .map(|(key, value)| (percent_encode(key), percent_encode(value)))
        .collect::<Vec<_>>();
    pairs.sort();

    let normalized = pairs
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("&");

    [
        percent_encode(&method.to_uppercase()),
        percent_encode(&url[..Position::AfterPath]),
        percent_encode(&normalized),
    ]
    .join("&")
}

/// Base64 encoded `HMAC-SHA1` of the signature base string,
/// keyed with `encoded(consumer secret)&` (there is no token secret).
pub fn sign(
    method: &str,
    url: &Url,
    params: &[(&str, &str)],
    consumer_secret: &str,
) -> Result<String, Error> {
    let signing_key = format!("{}&", percent_encode(consumer_secret));
    let mut mac = HmacSha1::new_from_slice(signing_key.as_bytes())
        .map_err(|_| Error::authentication("invalid HMAC-SHA1 signing key"))?;
    mac.update(signature_base_string(method, url, params).as_bytes());

    Ok(base64::encode(mac.finalize().into_bytes()))
}

/// The `oauth_*` query parameters, including `oauth_signature`, for a request
/// without parameters of its own.
pub fn authorize(
    method: &str,
    url: &Url,
    consumer_key: &str,
    consumer_secret: &str,
    nonce: &Nonce,
) -> Result<Vec<(&'static str, String)>, Error> {
    let timestamp = nonce.timestamp.to_string();
    let mut params = vec![
        ("oauth_consumer_key", consumer_key.to_string()),
        ("oauth_signature_method", SIGNATURE_METHOD.to_string()),
        ("oauth_timestamp", timestamp),
        ("oauth_nonce", nonce.nonce.clone()),
        ("oauth_version", VERSION.to_string()),
    ];

    let signature = {
        let to_sign = params
            .iter()
            .map(|(key, value)| (*key, value.as_str()))
            .collect::<Vec<_>>();

        sign(method, url, &to_sign, consumer_secret)?
    };
    params.push(("oauth_signature", signature));

    Ok(params)
}
