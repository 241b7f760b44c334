//! Output sinks for calculated metrics
//!
//! The format is chosen once at startup. Table and CSV write a header row
//! followed by one row per record; JSON writes one self-describing object
//! per line and has no header.

mod csv;
mod json;
mod table;

pub use self::csv::CsvSink;
pub use self::json::JsonSink;
pub use self::table::TableSink;

use crate::error::{InvalidOption, SinkError};
use crate::models::CalculatedMetrics;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Column names, in row order
pub const HEADER: [&str; 8] = [
    "os", "id", "name", "image", "cpup", "musage", "mlimit", "memp",
];

/// Destination for calculated metrics
pub trait OutputSink: Send {
    fn write_header(&mut self, fields: &[&str]) -> Result<(), SinkError>;

    fn write(&mut self, record: &CalculatedMetrics, human_readable: bool)
        -> Result<(), SinkError>;

    fn flush(&mut self) -> Result<(), SinkError>;
}

impl<T: OutputSink + ?Sized> OutputSink for Box<T> {
    fn write_header(&mut self, fields: &[&str]) -> Result<(), SinkError> {
        (**self).write_header(fields)
    }

    fn write(
        &mut self,
        record: &CalculatedMetrics,
        human_readable: bool,
    ) -> Result<(), SinkError> {
        (**self).write(record, human_readable)
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        (**self).flush()
    }
}

/// Output encoding selected on the command line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Table,
    Csv,
    Json,
}

impl FromStr for OutputFormat {
    type Err = InvalidOption;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            _ => Err(InvalidOption {
                option: "format",
                value: s.to_string(),
                expected: "table, csv, json",
            }),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Table => "table",
            Self::Csv => "csv",
            Self::Json => "json",
        };
        f.write_str(name)
    }
}

/// Build the sink for `format` on top of any writer
pub fn create_sink<W>(format: OutputFormat, writer: W) -> Box<dyn OutputSink>
where
    W: Write + Send + 'static,
{
    match format {
        OutputFormat::Table => Box::new(TableSink::new(writer)),
        OutputFormat::Csv => Box::new(CsvSink::new(writer)),
        OutputFormat::Json => Box::new(JsonSink::new(writer)),
    }
}

/// Row values for the table and CSV sinks, in [`HEADER`] order
pub fn record_fields(record: &CalculatedMetrics, human_readable: bool) -> Vec<String> {
    let mut fields = vec![
        record.os.to_string(),
        record.short_id().to_string(),
        record.name.clone(),
        record.image.clone(),
    ];

    if human_readable {
        fields.push(format!("{:.2}%", record.cpu_percentage));
        fields.push(format_bytes(record.memory_usage));
        fields.push(format_bytes(record.memory_limit));
        fields.push(format!("{:.2}%", record.memory_percentage));
    } else {
        fields.push(format!("{:.2}", record.cpu_percentage));
        fields.push(format!("{:.2}", record.memory_usage));
        fields.push(format!("{:.2}", record.memory_limit));
        fields.push(format!("{:.2}", record.memory_percentage));
    }

    fields
}

/// Format a byte count with binary units and 4 significant digits
pub fn format_bytes(bytes: f64) -> String {
    const UNITS: [&str; 9] = ["B", "KiB", "MiB", "GiB", "TiB", "PiB", "EiB", "ZiB", "YiB"];

    let mut size = bytes.abs();
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    let sign = if bytes < 0.0 { "-" } else { "" };
    format!("{}{}{}", sign, significant(size, 4), UNITS[unit])
}

fn significant(value: f64, digits: i32) -> String {
    if value == 0.0 || !value.is_finite() {
        return "0".to_string();
    }

    let magnitude = value.log10().floor() as i32;
    let decimals = (digits - 1 - magnitude).max(0) as usize;
    let formatted = format!("{:.*}", decimals, value);

    if formatted.contains('.') {
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        formatted
    }
}
