//! The SOAP envelopes of the Ad Manager `ReportService`.
use chrono::{Datelike, NaiveDate};
use quick_xml::{
    events::{BytesDecl, BytesText, Event},
    Reader, Writer,
};
use thiserror::Error;

use crate::Error;

pub const API_VERSION: &str = "v202505";
pub const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
pub const PUBLISHER_NS: &str = "https://www.google.com/apis/ads/publisher/v202505";

#[derive(Debug, Error)]
#[error("GAM SOAP fault: {0}")]
pub struct Fault(pub String);

#[derive(Debug, Clone, Copy)]
pub struct RequestHeader<'a> {
    pub network_code: &'a str,
    pub application_name: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportQuery {
    pub dimensions: Vec<String>,
    pub columns: Vec<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

type XmlWriter = Writer<Vec<u8>>;

fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> quick_xml::Result<()> {
    writer
        .create_element(name)
        .write_text_content(BytesText::new(text))?;

    Ok(())
}

fn date_element(writer: &mut XmlWriter, name: &str, date: NaiveDate) -> quick_xml::Result<()> {
    writer.create_element(name).write_inner_content(|writer| {
        text_element(writer, "year", &date.year().to_string())?;
        text_element(writer, "month", &date.month().to_string())?;
        text_element(writer, "day", &date.day().to_string())
    })?;

    Ok(())
}

fn envelope<F>(header: RequestHeader<'_>, body: F) -> Result<String, Error>
where
    F: FnOnce(&mut XmlWriter) -> quick_xml::Result<()>,
{
    let mut writer = Writer::new(Vec::new());

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(Error::parse)?;
    writer
        .create_element("soapenv:Envelope")
        .with_attribute(("xmlns:soapenv", ENVELOPE_NS))
        .with_attribute(("xmlns", PUBLISHER_NS))
        .write_inner_content(|writer| {
            writer
                .create_element("soapenv:Header")
                .write_inner_content(|writer| {
                    writer
                        .create_element("RequestHeader")
                        .write_inner_content(|writer| {
                            text_element(writer, "networkCode", header.network_code)?;
                            text_element(writer, "applicationName", header.application_name)
                        })?;
                    Ok::<(), quick_xml::Error>(())
                })?;
            writer
                .create_element("soapenv:Body")
                .write_inner_content(body)?;
            Ok::<(), quick_xml::Error>(())
        })
        .map_err(Error::parse)?;

    Ok(String::from_utf8_lossy(&writer.into_inner()).into_owned())
}

/// `runReportJob` of a new job (`id = 0`) with a hierarchical ad unit view.
pub fn run_report_job(header: RequestHeader<'_>, query: &ReportQuery) -> Result<String, Error> {
    envelope(header, |writer| {
        writer
            .create_element("runReportJob")
            .write_inner_content(|writer| {
                writer
                    .create_element("reportJob")
                    .write_inner_content(|writer| {
                        text_element(writer, "id", "0")?;
                        writer
                            .create_element("reportQuery")
                            .write_inner_content(|writer| {
                                for dimension in &query.dimensions {
                                    text_element(writer, "dimensions", dimension)?;
                                }
                                text_element(writer, "adUnitView", "HIERARCHICAL")?;
                                for column in &query.columns {
                                    text_element(writer, "columns", column)?;
                                }
                                date_element(writer, "startDate", query.start_date)?;
                                date_element(writer, "endDate", query.end_date)?;
                                text_element(writer, "dateRangeType", "CUSTOM_DATE")
                            })?;
                        Ok::<(), quick_xml::Error>(())
                    })?;
                Ok::<(), quick_xml::Error>(())
            })?;
        Ok(())
    })
}

/// `getReportDownloadURL` of the job as a CSV dump.
pub fn get_report_download_url(header: RequestHeader<'_>, job_id: &str) -> Result<String, Error> {
    envelope(header, |writer| {
        writer
            .create_element("getReportDownloadURL")
            .write_inner_content(|writer| {
                text_element(writer, "reportJobId", job_id)?;
                text_element(writer, "exportFormat", "CSV_DUMP")
            })?;
        Ok(())
    })
}

/// The text of the first element at the end of the given path of local names,
/// the namespace prefixes are ignored.
fn find_text(xml: &str, path: &[&str]) -> Result<Option<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut stack: Vec<Vec<u8>> = vec![];
    let at_path = |stack: &[Vec<u8>]| {
        stack.len() >= path.len()
            && stack[stack.len() - path.len()..]
                .iter()
                .zip(path)
                .all(|(name, expected)| name.as_slice() == expected.as_bytes())
    };

    loop {
        match reader.read_event()? {
            Event::Start(element) => stack.push(element.local_name().as_ref().to_vec()),
            Event::End(_) => {
                stack.pop();
            }
            Event::Text(text) if at_path(&stack) => return Ok(Some(text.unescape()?.into_owned())),
            Event::CData(data) if at_path(&stack) => {
                return Ok(Some(String::from_utf8_lossy(&data.into_inner()).into_owned()))
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// The `faultstring` of a SOAP fault, if the envelope is one.
pub fn fault(xml: &str) -> Option<String> {
    find_text(xml, &["Body", "Fault", "faultstring"]).ok().flatten()
}

fn find_in_response(xml: &str, path: &[&str], missing: &'static str) -> Result<String, Error> {
    if let Some(fault) = fault(xml) {
        return Err(Error::bad_request(Fault(fault)));
    }

    find_text(xml, path)
        .map_err(Error::parse)?
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or_else(|| Error::missing_data(missing))
}

/// `Body/runReportJobResponse/rval/id`
pub fn parse_report_job_id(xml: &str) -> Result<String, Error> {
    find_in_response(
        xml,
        &["Body", "runReportJobResponse", "rval", "id"],
        "GAM report job id not found in the response",
    )
}

/// `Body/getReportDownloadURLResponse/rval`, with any leftover `&amp;` unescaped.
pub fn parse_download_url(xml: &str) -> Result<String, Error> {
    find_in_response(
        xml,
        &["Body", "getReportDownloadURLResponse", "rval"],
        "GAM report download url not found in the response",
    )
    .map(|url| url.replace("&amp;", "&"))
}
