use super::{record_fields, OutputSink};
use crate::error::SinkError;
use crate::models::CalculatedMetrics;
use std::io::Write;

/// Tab separated rows
pub struct TableSink<W> {
    writer: W,
}

impl<W: Write> TableSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    fn write_row<S: AsRef<str>>(&mut self, fields: &[S]) -> Result<(), SinkError> {
        let line = fields
            .iter()
            .map(|field| field.as_ref())
            .collect::<Vec<&str>>()
            .join("\t");
        writeln!(self.writer, "{}", line)?;
        Ok(())
    }
}

impl<W: Write + Send> OutputSink for TableSink<W> {
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
