use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub use toml::de::Error as TomlError;

pub static PRODUCTION_CONFIG: Lazy<Config> = Lazy::new(|| {
    Config::try_toml(include_str!("../../docs/config/prod.toml"))
        .expect("Failed to parse prod.toml config file")
});

pub static DEVELOPMENT_CONFIG: Lazy<Config> = Lazy::new(|| {
    Config::try_toml(include_str!("../../docs/config/dev.toml"))
        .expect("Failed to parse dev.toml config file")
});

#[derive(Debug, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "camelCase")]
/// The environment in which the application is running
/// Defaults to [`Environment::Development`]
pub enum Environment {
    Development,
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        Self::Development
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all(serialize = "SCREAMING_SNAKE_CASE"))]
pub struct Config {
    /// in milliseconds
    /// Set's the Client timeout for all requests made to the ad networks.
    pub fetch_timeout: u32,
    /// How many times we request the download url of a finished GAM report job.
    pub gam_download_url_attempts: u32,
    /// In milliseconds
    /// The delay before the second attempt, doubled for every following one.
    pub gam_download_url_base_delay: u32,
    /// The `applicationName` sent in every GAM SOAP `RequestHeader`.
    pub gam_application_name: String,
    /// ISO 4217 code for the reported earnings (AdMob `localizationSettings`).
    pub currency_code: String,
}

impl Config {
    /// Utility method that will deserialize a Toml file content into a [`Config`].
    ///
    /// Instead of relying on the `toml` crate directly, use this method instead.
    pub fn try_toml(toml: &str) -> Result<Self, TomlError> {
        toml::from_str(toml)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout.into())
    }

    pub fn gam_download_url_base_delay(&self) -> Duration {
        Duration::from_millis(self.gam_download_url_base_delay.into())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Toml parsing: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("File reading: {0}")]
    InvalidFile(#[from] std::io::Error),
}

/// If no `config_file` path is provided it will load the [`Environment`] configuration.
/// If `config_file` path is provided it will try to read and parse the file in Toml format.
pub fn configuration(
    environment: Environment,
    config_file: Option<&str>,
) -> Result<Config, ConfigError> {
    match config_file {
        Some(config_file) => {
            let content = std::fs::read(config_file)?;

            Ok(toml::from_slice(&content)?)
        }
        None => match environment {
            Environment::Production => Ok(PRODUCTION_CONFIG.clone()),
            Environment::Development => Ok(DEVELOPMENT_CONFIG.clone()),
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn embedded_configs_are_valid() {
        let production = configuration(Environment::Production, None).expect("Should parse");
        let development = configuration(Environment::Development, None).expect("Should parse");

        assert_eq!(5, production.gam_download_url_attempts);
        assert_eq!(Duration::from_secs(5), production.gam_download_url_base_delay());
        assert_eq!("USD", production.currency_code);
        assert_eq!(Duration::from_secs(60), production.fetch_timeout());

        assert_eq!(
            production.gam_application_name,
            development.gam_application_name
        );
    }

    #[test]
    fn environment() {
        let development = serde_json::from_value::<Environment>(serde_json::json!("development"))
            .expect("Should deserialize");
        let production = serde_json::from_value::<Environment>(serde_json::json!("production"))
            .expect("Should deserialize");

        assert_eq!(Environment::Development, development);
        assert_eq!(Environment::Production, production);
    }

    #[test]
    fn missing_field_is_rejected() {
        let err = Config::try_toml("fetch_timeout = 100").expect_err("Should fail");

        assert!(err.to_string().contains("missing field"));
    }
}
