//! Serialization of normalized records.

use std::fmt;
use std::io::Write;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::normalize::NormalizedRecord;
use crate::record::format_time;

/// Output encodings for a normalized stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Comma-separated, the input schema plus `entity_type,event_name`.
    #[default]
    Csv,
    /// One JSON object per line.
    Jsonl,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Csv => "csv",
            Self::Jsonl => "jsonl",
        })
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "csv" => Ok(Self::Csv),
            "jsonl" | "json" => Ok(Self::Jsonl),
            _ => Err(format!("invalid output format: {s} (expected csv or jsonl)")),
        }
    }
}

/// Writes records in the given format.
pub fn write_normalized<W: Write>(
    writer: W,
    records: &[NormalizedRecord],
    format: OutputFormat,
) -> std::io::Result<()> {
    match format {
        OutputFormat::Csv => write_csv(writer, records),
        OutputFormat::Jsonl => write_jsonl(writer, records),
    }
}

fn write_csv<W: Write>(writer: W, records: &[NormalizedRecord]) -> std::io::Result<()> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(NormalizedRecord::COLUMNS)?;
    for record in records {
        csv.write_record([
            format_time(record.time).as_str(),
            record.name.as_str(),
            record.uid.as_str(),
            record.state.as_str(),
            record.event.as_str(),
            record.msg.as_str(),
            record.entity_type.as_str(),
            record.event_name.as_str(),
        ])?;
    }
    csv.flush()
}

fn write_jsonl<W: Write>(mut writer: W, records: &[NormalizedRecord]) -> std::io::Result<()> {
    for record in records {
        serde_json::to_writer(&mut writer, record)?;
        writeln!(writer)?;
    }
    writer.flush()
}
