use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};
use std::{
    fs::File,
    path::{Path, PathBuf},
};

use crate::error::PipelineError;

pub const REQUIRED_COLUMNS: [&str; 5] = ["product", "quantity", "price", "date", "region"];

/// One row of a raw point-of-sale extract.
///
/// Fields are looked up by the file's own (lower-cased) header, so column order
/// and header casing may differ between files. A column the file does not carry
/// stays `None`.
#[derive(Debug, Deserialize, PartialEq, Clone, Default)]
#[serde(default)]
pub struct RawRecord {
    pub product: Option<String>,
    pub quantity: Option<String>,
    pub price: Option<String>,
    pub date: Option<String>,
    pub region: Option<String>,
    /// 1-based line in the source file, header included.
    #[serde(skip)]
    pub line: u64,
}

/// All rows of a single extract plus its normalized header.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub records: Vec<RawRecord>,
}

/// The persisted `Sales,Date,Region` row shared by the pipeline and the chart server.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct SalesRecord {
    #[serde(
        rename = "Sales",
        serialize_with = "serialize_sales",
        deserialize_with = "trim_and_parse_f64"
    )]
    pub sales: f64,
    #[serde(rename = "Date", deserialize_with = "trim_and_parse_date")]
    pub date: NaiveDate,
    #[serde(rename = "Region")]
    pub region: String,
}

pub const SALES_COLUMNS: [&str; 3] = ["Sales", "Date", "Region"];

pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<RawTable, PipelineError> {
    let path = path.as_ref();
    let csv_err = |source: csv::Error| PipelineError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|source| PipelineError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    // The CSV reader is buffered automatically, so it does not need to
    // wrap rdr in a buffered reader like io::BufReader
    let mut rdr = csv::Reader::from_reader(file);

    let headers: csv::StringRecord = rdr
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row.map_err(csv_err)?;
        let mut record: RawRecord = row.deserialize(Some(&headers)).map_err(csv_err)?;
        record.line = row.position().map(|p| p.line()).unwrap_or_default();
        records.push(record);
    }

    Ok(RawTable {
        path: path.to_path_buf(),
        columns: headers.iter().map(str::to_owned).collect(),
        records,
    })
}

/// Trims and lower-cases a product name for comparison against the target.
pub fn normalize_product(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Parses a price cell such as `$3.00` or `3.00`.
pub fn parse_price(raw: &str, currency_symbol: char) -> Result<f64, String> {
    let trimmed = raw.trim();
    let amount = trimmed.strip_prefix(currency_symbol).unwrap_or(trimmed);
    parse_finite(amount.trim())
}

pub fn parse_quantity(raw: &str) -> Result<f64, String> {
    parse_finite(raw.trim())
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| e.to_string())
}

fn parse_finite(s: &str) -> Result<f64, String> {
    let value: f64 = s.parse().map_err(|e: std::num::ParseFloatError| e.to_string())?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err("value is not a finite number".to_string())
    }
}

fn trim_and_parse_f64<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = String::deserialize(deserializer)?;
    parse_finite(s.trim()).map_err(serde::de::Error::custom)
}

fn trim_and_parse_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: String = String::deserialize(deserializer)?;
    parse_date(&s).map_err(serde::de::Error::custom)
}

// Shortest representation that reads back to the same f64, always with a
// fractional part (`6.0`, not `6`).
fn serialize_sales<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{:?}", value))
}
