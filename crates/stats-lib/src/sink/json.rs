use super::OutputSink;
use crate::error::SinkError;
use crate::models::CalculatedMetrics;
use std::io::Write;

/// One JSON object per line
pub struct JsonSink<W> {
    writer: W,
}

impl<W: Write> JsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write + Send> OutputSink for JsonSink<W> {
    fn write_header(&mut self, _fields: &[&str]) -> Result<(), SinkError> {
        // Field names are embedded in every record
        Ok(())
    }

    fn write(
        &mut self,
        record: &CalculatedMetrics,
        _human_readable: bool,
    ) -> Result<(), SinkError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}
