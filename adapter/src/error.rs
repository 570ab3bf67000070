use parse_display::Display;
use std::{error::Error as StdError, fmt};
use thiserror::Error;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

#[derive(Debug, Error)]
#[error("{inner}")]
pub struct Error {
    inner: Box<Inner>,
}

impl Error {
    pub(crate) fn new<E>(kind: Kind, source: Option<E>) -> Self
    where
        E: Into<BoxError>,
    {
        Self {
            inner: Box::new(Inner {
                kind,
                source: source.map(Into::into),
            }),
        }
    }

    /// The credential exchange failed or returned no usable token,
    /// or the network rejected the credentials (`401`/`403`).
    pub fn authentication<E>(source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::new(Kind::Authentication, Some(source))
    }

    /// The network rejected the shape of the query.
    pub fn bad_request<E>(source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::new(Kind::BadRequest, Some(source))
    }

    /// Transport failures, non-authentication `4xx`/`5xx` statuses and exhausted retries.
    pub fn connection<E>(source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::new(Kind::Connection, Some(source))
    }

    /// The body is not valid JSON, XML or CSV.
    pub fn parse<E>(source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::new(Kind::Parse, Some(source))
    }

    /// A successful response lacks the expected structure,
    /// e.g. the report-row container, the report job id or the CSV header.
    pub fn missing_data<E>(source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::new(Kind::MissingData, Some(source))
    }

    pub fn kind(&self) -> Kind {
        self.inner.kind
    }

    /// The messages of the whole source chain, starting with the error itself.
    pub fn trace(&self) -> Vec<String> {
        let mut trace = vec![self.to_string()];
        let mut source = self.inner.source.as_deref().and_then(|source| source.source());

        while let Some(error) = source {
            trace.push(error.to_string());
            source = error.source();
        }

        trace
    }
}

#[derive(Debug, Error)]
struct Inner {
    kind: Kind,
    source: Option<BoxError>,
}

impl fmt::Display for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            // Writes: "Kind: Error message here"
            Some(source) => write!(f, "{}: {}", self.kind, source),
            // Writes: "Kind"
            None => write!(f, "{}", self.kind),
        }
    }
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    #[display("Authentication")]
    Authentication,
    #[display("Bad request")]
    BadRequest,
    #[display("Connection")]
    Connection,
    #[display("Parse")]
    Parse,
    #[display("Missing data")]
    MissingData,
}
