//! The `CSV_DUMP` export of a finished report job.
use std::io::Read;

use flate2::read::GzDecoder;
use primitives::{NormalizedRow, Report, Value};
use slog::{debug, warn, Logger};

use crate::Error;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

const IMPRESSIONS: &str = "TOTAL_LINE_ITEM_LEVEL_IMPRESSIONS";
const REVENUE: &str = "TOTAL_LINE_ITEM_LEVEL_CPM_AND_CPC_REVENUE";

/// The normalized header cells which mark the header line,
/// everything above it is report metadata.
const KNOWN_HEADERS: &[&str] = &[
    "DATE",
    "AD_UNIT_NAME",
    "AD_UNIT_ID",
    "PARENT_AD_UNIT_ID",
    "COUNTRY_NAME",
    "COUNTRY_CRITERIA_ID",
    IMPRESSIONS,
    REVENUE,
    "AD UNIT 1",
    "AD UNIT ID 1",
];

/// Gunzips the body if it starts with the gzip magic bytes.
/// Invalid UTF-8 is replaced and NUL bytes are dropped.
pub fn decode(logger: &Logger, bytes: &[u8]) -> String {
    let text = if bytes.starts_with(&GZIP_MAGIC) {
        let mut text = String::new();
        match GzDecoder::new(bytes).read_to_string(&mut text) {
            Ok(_) => text,
            Err(err) => {
                warn!(logger, "Invalid gzip report, reading it as plain text"; "error" => %err);
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    } else {
        String::from_utf8_lossy(bytes).into_owned()
    };

    text.replace('\0', "")
}

/// `Dimension.AD_UNIT_NAME` -> `AD_UNIT_NAME`, the hierarchical
/// `Ad unit 1` & `Ad unit ID 1` columns keep only their first level.
pub fn normalize_header(cell: &str) -> String {
    let upper = cell.trim().to_uppercase();
    let name = upper
        .trim_start_matches("DIMENSION.")
        .trim_start_matches("COLUMN.")
        .trim();

    if !name.starts_with("AD UNIT ") {
        name.to_string()
    } else if name.contains(" ID ") {
        "AD UNIT ID 1".to_string()
    } else {
        "AD UNIT 1".to_string()
    }
}

/// A known header cell is one of the mapped columns or one of the requested ones.
fn is_known_header(cell: &str, requested: &[String]) -> bool {
    let name = normalize_header(cell);

    KNOWN_HEADERS.contains(&name.as_str())
        || requested
            .iter()
            .any(|column| column.trim().eq_ignore_ascii_case(&name))
}

fn is_unsigned_number(cell: &str) -> bool {
    let mut dots = 0;

    !cell.is_empty()
        && cell.chars().all(|c| match c {
            '.' => {
                dots += 1;
                dots == 1
            }
            c => c.is_ascii_digit(),
        })
        && cell != "."
}

/// The value of a cell under the given (normalized) header.
///
/// The impressions and revenue columns are always numbers, `0` unless they are one.
pub fn cell_value(header: &str, cell: &str) -> Value {
    let cell = cell.trim();

    match header {
        IMPRESSIONS => Value::Integer(if is_unsigned_number(cell) {
            cell.parse::<f64>().map_or(0, |number| number as i64)
        } else {
            0
        }),
        REVENUE => Value::Float(if is_unsigned_number(cell) {
            cell.parse().unwrap_or_default()
        } else {
            0.0
        }),
        _ if cell.eq_ignore_ascii_case("n/a") || cell == "-" => Value::not_available(),
        _ if is_unsigned_number(cell) && !cell.contains('.') => cell
            .parse::<i64>()
            .map(Value::Integer)
            .unwrap_or_else(|_| Value::Text(cell.to_string())),
        _ if is_unsigned_number(cell) => cell
            .parse::<f64>()
            .map(Value::Float)
            .unwrap_or_else(|_| Value::Text(cell.to_string())),
        _ => Value::Text(cell.to_string()),
    }
}

fn is_total(record: &csv::StringRecord) -> bool {
    record
        .get(0)
        .map_or(false, |first| first.trim().eq_ignore_ascii_case("total"))
}

/// Parses the decoded CSV into a table keyed by the raw header cells.
///
/// `requested` are the native dimensions & columns of the report query,
/// they mark the header line as well as the mapped ones do.
pub fn parse(logger: &Logger, text: &str, requested: &[String]) -> Result<Report, Error> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut header: Option<Vec<(String, String)>> = None;
    let mut data = vec![];

    for record in reader.records() {
        let record = record.map_err(Error::parse)?;

        if record.iter().all(|cell| cell.trim().is_empty()) || is_total(&record) {
            continue;
        }

        let columns = match &header {
            Some(columns) => columns,
            None => {
                if record.iter().any(|cell| is_known_header(cell, requested)) {
                    let columns = record
                        .iter()
                        .map(|cell| (cell.trim().to_string(), normalize_header(cell)))
                        .collect::<Vec<_>>();
                    debug!(logger, "Found the report header"; "header" => ?columns);
                    header = Some(columns);
                } else {
                    debug!(logger, "Skipping report metadata"; "line" => ?record);
                }
                continue;
            }
        };

        let row = columns
            .iter()
            .enumerate()
            .filter(|(_, (raw, _))| !raw.is_empty())
            .map(|(index, (raw, normalized))| {
                let cell = record.get(index).unwrap_or_default();
                (raw.clone(), cell_value(normalized, cell))
            })
            .collect::<NormalizedRow>();

        data.push(row);
    }

    let header = header
        .ok_or_else(|| Error::missing_data("GAM report has no recognizable CSV header"))?
        .into_iter()
        .map(|(raw, _)| raw)
        .collect();

    Ok(Report::Table { header, data })
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use flate2::{write::GzEncoder, Compression};
    use pretty_assertions::assert_eq;
    use primitives::util::logging::discard_logger;
    use serde_json::json;

    use super::*;
    use crate::Kind;

    const REPORT: &str = "Report job ID,987654\n\
        Date range,\"Jan 1, 2024 - Jan 31, 2024\"\n\
        ,\n\
        Dimension.DATE,Dimension.AD_UNIT_NAME,Dimension.COUNTRY_NAME,Column.TOTAL_LINE_ITEM_LEVEL_IMPRESSIONS,Column.TOTAL_LINE_ITEM_LEVEL_CPM_AND_CPC_REVENUE\n\
        2024-01-01,Home Banner,Germany,1200,3.5\n\
        2024-01-02,Home Banner,-,-,\n\
        Total,,,1200,3.5\n";

    #[test]
    fn skips_metadata_and_totals() {
        let report = parse(&discard_logger(), REPORT, &[]).expect("Should parse");

        assert_eq!(
            json!({
                "header": [
                    "Dimension.DATE",
                    "Dimension.AD_UNIT_NAME",
                    "Dimension.COUNTRY_NAME",
                    "Column.TOTAL_LINE_ITEM_LEVEL_IMPRESSIONS",
                    "Column.TOTAL_LINE_ITEM_LEVEL_CPM_AND_CPC_REVENUE",
                ],
                "data": [
                    {
                        "Dimension.DATE": "2024-01-01",
                        "Dimension.AD_UNIT_NAME": "Home Banner",
                        "Dimension.COUNTRY_NAME": "Germany",
                        "Column.TOTAL_LINE_ITEM_LEVEL_IMPRESSIONS": 1200,
                        "Column.TOTAL_LINE_ITEM_LEVEL_CPM_AND_CPC_REVENUE": 3.5,
                    },
                    {
                        "Dimension.DATE": "2024-01-02",
                        "Dimension.AD_UNIT_NAME": "Home Banner",
                        "Dimension.COUNTRY_NAME": "N/A",
                        "Column.TOTAL_LINE_ITEM_LEVEL_IMPRESSIONS": 0,
                        "Column.TOTAL_LINE_ITEM_LEVEL_CPM_AND_CPC_REVENUE": 0.0,
                    },
                ],
            }),
            serde_json::to_value(&report).expect("Should serialize")
        );
    }

    #[test]
    fn gzipped_and_plain_bodies() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(REPORT.as_bytes()).expect("Should write");
        let gzipped = encoder.finish().expect("Should compress");

        assert_eq!(REPORT, decode(&discard_logger(), &gzipped));
        assert_eq!("a,b\n", decode(&discard_logger(), b"a,\0b\n"));
    }

    #[test]
    fn header_normalization() {
        assert_eq!("AD_UNIT_NAME", normalize_header(" Dimension.AD_UNIT_NAME "));
        assert_eq!("TOTAL_LINE_ITEM_LEVEL_IMPRESSIONS", normalize_header("column.total_line_item_level_impressions"));
        assert_eq!("AD UNIT 1", normalize_header("Ad unit 1"));
        assert_eq!("AD UNIT ID 1", normalize_header("Ad unit ID 1"));
        assert_eq!("AD UNIT ID 1", normalize_header("Ad unit 2 ID 2"));
    }

    #[test]
    fn cell_values() {
        assert_eq!(Value::Integer(42), cell_value("AD_UNIT_ID", "42"));
        assert_eq!(Value::Float(0.25), cell_value("CPM", "0.25"));
        assert_eq!(Value::from("-3"), cell_value("DELTA", "-3"));
        assert_eq!(Value::not_available(), cell_value("COUNTRY_NAME", "N/A"));
        assert_eq!(Value::not_available(), cell_value("COUNTRY_NAME", "n/a"));
        assert_eq!(Value::Integer(0), cell_value(IMPRESSIONS, "n/a"));
        assert_eq!(Value::Float(0.0), cell_value(REVENUE, "1.2.3"));
    }

    #[test]
    fn no_header_is_missing_data() {
        let error = parse(&discard_logger(), "Report job ID,1\nfoo,bar\n", &[]).expect_err("Should fail");

        assert_eq!(Kind::MissingData, error.kind());
    }

    #[test]
    fn requested_columns_mark_the_header() {
        let report = "Report job ID,1\n\
            Dimension.DEVICE_CATEGORY_NAME,Column.AD_SERVER_IMPRESSIONS\n\
            Desktop,10\n\
            Total,10\n";
        let requested = vec![
            "DEVICE_CATEGORY_NAME".to_string(),
            "AD_SERVER_IMPRESSIONS".to_string(),
        ];

        let error = parse(&discard_logger(), report, &[]).expect_err("Should fail");
        assert_eq!(Kind::MissingData, error.kind());

        let report = parse(&discard_logger(), report, &requested).expect("Should parse");
        assert_eq!(
            json!({
                "header": ["Dimension.DEVICE_CATEGORY_NAME", "Column.AD_SERVER_IMPRESSIONS"],
                "data": [{
                    "Dimension.DEVICE_CATEGORY_NAME": "Desktop",
                    "Column.AD_SERVER_IMPRESSIONS": 10,
                }],
            }),
            serde_json::to_value(&report).expect("Should serialize")
        );
    }
}
