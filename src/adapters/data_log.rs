//! Comma-separated data log.
//!
//! ```text
//! #Timestamp, t_chamber, t_setp, …, dew_point
//! 1718000000.123, 20.01, 20.00, …, -31.42
//! ```
//!
//! Each record is flushed as soon as it is written so a crashed run keeps
//! every tick recorded up to the crash.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::app::ports::DataLogPort;
use crate::sensors::ReadingSet;

pub struct CsvDataLog<W: Write> {
    out: W,
}

impl CsvDataLog<BufWriter<File>> {
    /// Create (truncate) the file at `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> CsvDataLog<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }
}

impl<W: Write> DataLogPort for CsvDataLog<W> {
    fn begin(&mut self, columns: &[&str]) -> io::Result<()> {
        writeln!(self.out, "#Timestamp, {}", columns.join(", "))?;
        self.out.flush()
    }

    fn record(&mut self, readings: &ReadingSet) -> io::Result<()> {
        writeln!(self.out, "{}", format_record(readings))?;
        self.out.flush()
    }
}

/// One data line: Unix time with millisecond fraction, then every value
/// with two decimals (`None` when missing), then the dew point.
pub fn format_record(readings: &ReadingSet) -> String {
    let ts = readings.timestamp.timestamp_millis() as f64 / 1000.0;
    let mut line = format!("{ts:.3}");
    for value in readings.readings.iter().map(|r| r.value) {
        line.push_str(", ");
        match value {
            Some(v) => line.push_str(&format!("{v:.2}")),
            None => line.push_str("None"),
        }
    }
    line.push_str(&format!(", {:.2}", readings.dew_point));
    line
}
