use std::fmt;

use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};

/// The sentinel used for dimensions which are absent from the network response.
pub const NOT_AVAILABLE: &str = "N/A";

/// A single scalar of a [`NormalizedRow`].
///
/// Serialized untagged, i.e. as a plain JSON number or string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// The `"N/A"` sentinel
    pub fn not_available() -> Self {
        Self::Text(NOT_AVAILABLE.to_string())
    }

    /// Whether the value carries no information:
    /// `"N/A"`, an empty string or a numeric zero.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Integer(int) => *int == 0,
            Value::Float(float) => *float == 0.0,
            Value::Text(text) => text.is_empty() || text == NOT_AVAILABLE,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(int) => Some(*int as f64),
            Value::Float(float) => Some(*float),
            Value::Text(_) => None,
        }
    }

    /// Converts a JSON scalar as returned by a network into a [`Value`] without any coercion.
    ///
    /// - `null` becomes the `"N/A"` sentinel
    /// - arrays are joined with `,`
    /// - objects are kept in their JSON representation
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::Null => Self::not_available(),
            Json::Bool(boolean) => Self::Text(boolean.to_string()),
            Json::Number(number) => match number.as_i64() {
                Some(int) => Self::Integer(int),
                None => Self::Float(number.as_f64().unwrap_or_default()),
            },
            Json::String(string) => Self::Text(string.clone()),
            Json::Array(items) => Self::Text(
                items
                    .iter()
                    .map(|item| Self::from_json(item).to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            Json::Object(_) => Self::Text(json.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(int) => write!(f, "{}", int),
            Value::Float(float) => write!(f, "{}", float),
            Value::Text(text) => f.write_str(text),
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<i64> for Value {
    fn from(int: i64) -> Self {
        Self::Integer(int)
    }
}

impl From<f64> for Value {
    fn from(float: f64) -> Self {
        Self::Float(float)
    }
}

/// One record in the common output shape.
///
/// Keys keep their insertion order, which is the order in which
/// the dimensions and then the metrics were requested.
/// Serialized as a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRow(Vec<(String, Value)>);

impl NormalizedRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value of `key`, replacing any previous value but keeping its position.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();

        match self.0.iter_mut().find(|(existing, _)| *existing == key) {
            Some((_, existing)) => *existing = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0
            .iter()
            .find_map(|(existing, value)| (existing == key).then_some(value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(key, value)| (key.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for NormalizedRow {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut row = Self::new();
        for (key, value) in iter {
            row.insert(key, value);
        }
        row
    }
}

impl Serialize for NormalizedRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// The normalized result of a single report request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Report {
    /// Rows keyed by the requested dimensions & metrics.
    Rows(Vec<NormalizedRow>),
    /// A table which keeps the raw header of the network, returned as `{header, data}`.
    Table {
        header: Vec<String>,
        data: Vec<NormalizedRow>,
    },
}

impl Report {
    pub fn rows(&self) -> &[NormalizedRow] {
        match self {
            Report::Rows(rows) => rows,
            Report::Table { data, .. } => data,
        }
    }

    pub fn len(&self) -> usize {
        self.rows().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows().is_empty()
    }
}
