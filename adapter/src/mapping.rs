//! Static field mapping tables and the generic row building on top of them.
//!
//! Every network describes its vocabulary as a [`FieldMapping`]: which identifiers
//! the caller can select, how they are called in the network's request & response
//! and under which key they end up in the [`NormalizedRow`].
use std::borrow::Cow;

use primitives::{NormalizedRow, Query, Value};
use serde_json::Value as Json;
use slog::{debug, warn, Logger};

use crate::coerce;

/// How the raw value of a field is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Taken verbatim.
    Dimension,
    /// A human readable label of a dimension, e.g. AdMob's `displayLabel`.
    Label,
    /// Integer parsed through a float.
    Integer,
    Float,
    /// Currency in micros, divided by `1_000_000`.
    Micros,
    /// Integer if integral, float otherwise.
    Number,
    /// The network doesn't provide this field, it's always `"N/A"`
    /// and it's never part of the network request.
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// The identifier used in the [`Query`].
    pub selector: Cow<'static, str>,
    /// The name of the column in the network request and response.
    pub native: Cow<'static, str>,
    /// The key in the [`NormalizedRow`].
    pub output: Cow<'static, str>,
    pub kind: FieldKind,
}

impl Field {
    pub const fn new(
        selector: &'static str,
        native: &'static str,
        output: &'static str,
        kind: FieldKind,
    ) -> Self {
        Self {
            selector: Cow::Borrowed(selector),
            native: Cow::Borrowed(native),
            output: Cow::Borrowed(output),
            kind,
        }
    }

    /// A field selected by its output key.
    pub const fn output(output: &'static str, native: &'static str, kind: FieldKind) -> Self {
        Self::new(output, native, output, kind)
    }

    /// A field with the same name everywhere.
    pub const fn same(name: &'static str, kind: FieldKind) -> Self {
        Self::new(name, name, name, kind)
    }
}

/// How identifiers which are not in the table are passed to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fallback {
    Verbatim,
    Lowercase,
    Uppercase,
    /// Requested verbatim, `SOME_METRIC` becomes `Some Metric` in the row.
    TitleCase,
}

impl Fallback {
    fn field(self, identifier: &str, kind: FieldKind) -> Field {
        let (native, output) = match self {
            Fallback::Verbatim => (identifier.to_string(), identifier.to_string()),
            Fallback::Lowercase => (identifier.to_lowercase(), identifier.to_lowercase()),
            Fallback::Uppercase => (identifier.to_uppercase(), identifier.to_uppercase()),
            Fallback::TitleCase => (identifier.to_string(), title_case(identifier)),
        };

        Field {
            selector: Cow::Owned(identifier.to_string()),
            native: Cow::Owned(native),
            output: Cow::Owned(output),
            kind,
        }
    }
}

/// `AD_SOURCE` -> `Ad Source`
pub fn title_case(identifier: &str) -> String {
    identifier
        .split(|c: char| c == '_' || c.is_whitespace())
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(char::to_lowercase))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// The vocabulary of a single network.
#[derive(Debug)]
pub struct FieldMapping {
    pub network: &'static str,
    /// Several fields with the same selector expand into multiple columns.
    pub dimensions: &'static [Field],
    pub metrics: &'static [Field],
    /// Selectors used when the query yields no dimensions.
    pub default_dimensions: &'static [&'static str],
    /// Selectors used when the query yields no metrics.
    pub default_metrics: &'static [&'static str],
    pub fallback: Fallback,
    pub fallback_dimension: FieldKind,
    pub fallback_metric: FieldKind,
}

impl FieldMapping {
    /// Resolves the dimensions & metrics of the query into fields.
    ///
    /// Identifiers are looked up by selector first and by native name second.
    /// Unknown identifiers are passed through with the [`Fallback`] of the network.
    /// An empty side is replaced with the network defaults.
    pub fn select(&self, logger: &Logger, query: &Query) -> Selection {
        let mut selection = Selection::default();

        for dimension in &query.dimensions {
            for field in self.resolve(logger, self.dimensions, dimension, self.fallback_dimension) {
                selection.push_dimension(field);
            }
        }

        if selection.dimensions.is_empty() && !self.default_dimensions.is_empty() {
            warn!(logger, "No dimensions selected, using the defaults"; "network" => self.network, "defaults" => ?self.default_dimensions);

            for dimension in self.default_dimensions {
                for field in self.resolve(logger, self.dimensions, dimension, self.fallback_dimension) {
                    selection.push_dimension(field);
                }
            }
        }

        for metric in &query.metrics {
            for field in self.resolve(logger, self.metrics, metric, self.fallback_metric) {
                selection.push_metric(field);
            }
        }

        if selection.metrics.is_empty() && !self.default_metrics.is_empty() {
            warn!(logger, "No metrics selected, using the defaults"; "network" => self.network, "defaults" => ?self.default_metrics);

            for metric in self.default_metrics {
                for field in self.resolve(logger, self.metrics, metric, self.fallback_metric) {
                    selection.push_metric(field);
                }
            }
        }

        selection
    }

    fn resolve(
        &self,
        logger: &Logger,
        table: &'static [Field],
        identifier: &str,
        fallback_kind: FieldKind,
    ) -> Vec<Field> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return vec![];
        }

        let by_selector = table
            .iter()
            .filter(|field| field.selector == identifier)
            .cloned()
            .collect::<Vec<_>>();

        let fields = if by_selector.is_empty() {
            table
                .iter()
                .filter(|field| field.native == identifier)
                .cloned()
                .collect::<Vec<_>>()
        } else {
            by_selector
        };

        if fields.is_empty() {
            let field = self.fallback.field(identifier, fallback_kind);
            warn!(logger, "Unmapped identifier, passing it through"; "network" => self.network, "identifier" => identifier, "native" => field.native.as_ref());

            return vec![field];
        }

        for field in fields.iter().filter(|field| field.kind == FieldKind::Unavailable) {
            warn!(logger, "Not provided by the network, it will be N/A"; "network" => self.network, "identifier" => field.selector.as_ref());
        }

        fields
    }
}

/// The resolved fields of a query, in the requested order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub dimensions: Vec<Field>,
    pub metrics: Vec<Field>,
}

impl Selection {
    fn contains_output(&self, output: &str) -> bool {
        self.dimensions
            .iter()
            .chain(self.metrics.iter())
            .any(|field| field.output == output)
    }

    /// Adds the dimension unless its output key is already selected.
    pub fn push_dimension(&mut self, field: Field) {
        if !self.contains_output(&field.output) {
            self.dimensions.push(field);
        }
    }

    /// Adds the metric unless its output key is already selected.
    pub fn push_metric(&mut self, field: Field) {
        if !self.contains_output(&field.output) {
            self.metrics.push(field);
        }
    }

    /// The unique selectors of the dimensions, in order.
    pub fn dimension_selectors(&self) -> Vec<&str> {
        unique(self.dimensions.iter().map(|field| field.selector.as_ref()))
    }

    /// The unique selectors of the metrics, in order.
    pub fn metric_selectors(&self) -> Vec<&str> {
        unique(self.metrics.iter().map(|field| field.selector.as_ref()))
    }

    /// The unique native names of the dimensions which the network provides.
    pub fn native_dimensions(&self) -> Vec<&str> {
        native_names(&self.dimensions)
    }

    /// The unique native names of the metrics which the network provides.
    pub fn native_metrics(&self) -> Vec<&str> {
        native_names(&self.metrics)
    }

    /// Builds a row with every selected field, `extract` returns the raw value of a field.
    ///
    /// Absent dimensions become `"N/A"` and absent metrics zero.
    /// Returns [`None`] for rows where no dimension has a value and every metric is zero.
    pub fn build_row<'a, F>(&self, logger: &Logger, mut extract: F) -> Option<NormalizedRow>
    where
        F: FnMut(&Field) -> Option<&'a Json>,
    {
        let mut row = NormalizedRow::new();
        let mut has_data = false;

        for field in &self.dimensions {
            let value = match raw_value(field, &mut extract) {
                Some(raw) => convert(logger, field, raw),
                None => Value::not_available(),
            };

            has_data |= !value.is_empty();
            row.insert(field.output.as_ref(), value);
        }

        for field in &self.metrics {
            let value = match raw_value(field, &mut extract) {
                Some(raw) => convert(logger, field, raw),
                None => zero(field.kind),
            };

            has_data |= value.as_f64().map_or(false, |number| number != 0.0);
            row.insert(field.output.as_ref(), value);
        }

        if has_data {
            Some(row)
        } else {
            debug!(logger, "Skipping row with all N/A dimensions and zero metrics");
            None
        }
    }
}

fn raw_value<'a, F>(field: &Field, extract: &mut F) -> Option<&'a Json>
where
    F: FnMut(&Field) -> Option<&'a Json>,
{
    if field.kind == FieldKind::Unavailable {
        return None;
    }

    extract(field).filter(|raw| !raw.is_null())
}

fn convert(logger: &Logger, field: &Field, raw: &Json) -> Value {
    let name = field.output.as_ref();

    match field.kind {
        FieldKind::Dimension | FieldKind::Label => Value::from_json(raw),
        FieldKind::Integer => Value::Integer(coerce::to_integer(logger, name, raw)),
        FieldKind::Float => Value::Float(coerce::to_float(logger, name, raw)),
        FieldKind::Micros => Value::Float(coerce::from_micros(logger, name, raw)),
        FieldKind::Number => coerce::to_number(logger, name, raw),
        FieldKind::Unavailable => Value::not_available(),
    }
}

fn zero(kind: FieldKind) -> Value {
    match kind {
        FieldKind::Integer => Value::Integer(0),
        FieldKind::Unavailable => Value::not_available(),
        _ => Value::Float(0.0),
    }
}

fn native_names(fields: &[Field]) -> Vec<&str> {
    unique(
        fields
            .iter()
            .filter(|field| field.kind != FieldKind::Unavailable)
            .map(|field| field.native.as_ref()),
    )
}

fn unique<'a>(names: impl Iterator<Item = &'a str>) -> Vec<&'a str> {
    let mut unique = Vec::new();
    for name in names {
        if !unique.contains(&name) {
            unique.push(name);
        }
    }
    unique
}
