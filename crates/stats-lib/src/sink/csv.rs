use super::{record_fields, OutputSink};
use crate::error::SinkError;
use crate::models::CalculatedMetrics;
use std::borrow::Cow;
use std::io::Write;

/// Comma separated rows with RFC 4180 quoting
pub struct CsvSink<W> {
    writer: W,
}

impl<W: Write> CsvSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    fn write_row<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<(), SinkError> {
        let line = fields
            .iter()
            .map(|field| escape(field.as_ref()))
            .collect::<Vec<_>>()
            .join(",");
        writeln!(self.writer, "{}", line)?;
        Ok(())
    }
}

/// Quote a field if it contains a delimiter, quote or line break, or
/// starts with a space
fn escape(field: &str) -> Cow<'_, str> {
    let needs_quotes = field.starts_with(' ')
        || field.contains(&[',', '"', '\r', '\n'][..]);

    if needs_quotes {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

impl<W: Write + Send> OutputSink for CsvSink<W> {
    fn write_header(&mut self, fields: &[&str]) -> Result<(), SinkError> {
        self.write_row(fields)
    }

    fn write(
        &mut self,
        record: &CalculatedMetrics,
        human_readable: bool,
    ) -> Result<(), SinkError> {
        self.write_row(&record_fields(record, human_readable))
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}
