use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use thiserror::Error;

/// The date format of `start_date` & `end_date`
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid date '{0}', expected format YYYY-MM-DD")]
    InvalidDate(String),
    #[error("start_date ({start}) is after end_date ({end})")]
    StartAfterEnd { start: NaiveDate, end: NaiveDate },
}

/// A report request for a single ad network.
///
/// The dimensions & metrics are identifiers from the network specific vocabulary,
/// the order in which they are requested is the order of the keys in the normalized rows.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawQuery")]
pub struct Query {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub dimensions: Vec<String>,
    pub metrics: Vec<String>,
}

impl Query {
    pub fn new(
        start_date: &str,
        end_date: &str,
        dimensions: &[&str],
        metrics: &[&str],
    ) -> Result<Self, Error> {
        RawQuery {
            start_date: start_date.to_string(),
            end_date: end_date.to_string(),
            dimensions: dimensions.iter().map(ToString::to_string).collect(),
            metrics: metrics.iter().map(ToString::to_string).collect(),
        }
        .try_into()
    }

    /// The `start_date` formatted as `YYYY-MM-DD`
    pub fn start(&self) -> String {
        self.start_date.format(DATE_FORMAT).to_string()
    }

    /// The `end_date` formatted as `YYYY-MM-DD`
    pub fn end(&self) -> String {
        self.end_date.format(DATE_FORMAT).to_string()
    }
}

#[derive(Debug, Deserialize)]
struct RawQuery {
    start_date: String,
    end_date: String,
    #[serde(default, deserialize_with = "nullable_list")]
    dimensions: Vec<String>,
    #[serde(default, deserialize_with = "nullable_list")]
    metrics: Vec<String>,
}

impl TryFrom<RawQuery> for Query {
    type Error = Error;

    fn try_from(raw: RawQuery) -> Result<Self, Self::Error> {
        let start_date = parse_date(&raw.start_date)?;
        let end_date = parse_date(&raw.end_date)?;

        if start_date > end_date {
            return Err(Error::StartAfterEnd {
                start: start_date,
                end: end_date,
            });
        }

        Ok(Self {
            start_date,
            end_date,
            dimensions: raw.dimensions,
            metrics: raw.metrics,
        })
    }
}

fn parse_date(date: &str) -> Result<NaiveDate, Error> {
    NaiveDate::parse_from_str(date.trim(), DATE_FORMAT)
        .map_err(|_| Error::InvalidDate(date.to_string()))
}

fn nullable_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
