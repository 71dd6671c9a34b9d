//! Raw record export for offline analysis.
//!
//! Every field is written as stored: costs as exact decimal strings and
//! timestamps as RFC 3339, so an export can be read back losslessly.

use std::io::{BufWriter, Write};
use std::path::Path;

use serde::Serialize;

use crate::db::{RecordFilter, SpendStore};
use crate::error::Result;
use crate::models::CallRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

/// CSV with a header row, even when there are no records.
pub fn write_csv<W: Write>(records: &[CallRecord], writer: W) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(CallRecord::FIELDS)?;
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Pretty-printed JSON array.
pub fn write_json<W: Write>(records: &[CallRecord], mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, records)?;
    writer.write_all(b"\n")?;
    Ok(())
}

fn write_records<W: Write>(records: &[CallRecord], format: ExportFormat, writer: W) -> Result<()> {
    match format {
        ExportFormat::Csv => write_csv(records, writer),
        ExportFormat::Json => write_json(records, writer),
    }
}

/// Export the records matching `filter` and return how many were written.
pub fn export<W: Write>(
    store: &SpendStore,
    format: ExportFormat,
    filter: &RecordFilter,
    writer: W,
) -> Result<usize> {
    let records = store.records(filter)?;
    write_records(&records, format, writer)?;
    log::debug!("exported {} record(s) as {:?}", records.len(), format);
    Ok(records.len())
}

/// Export to `path`, replacing it only after every record has been written.
///
/// Records are read before any file is touched and the output goes through a
/// temporary file in the target directory that is renamed over `path`. On
/// error an existing file at `path` is left unchanged.
pub fn export_to_path(
    store: &SpendStore,
    format: ExportFormat,
    filter: &RecordFilter,
    path: &Path,
) -> Result<usize> {
    let records = store.records(filter)?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        write_records(&records, format, &mut writer)?;
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| e.error)?;

    log::debug!(
        "exported {} record(s) as {:?} to {}",
        records.len(),
        format,
        path.display()
    );
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample() -> CallRecord {
        CallRecord {
            id: Some(7),
            timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap(),
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            label: "test".to_string(),
            source_file: "src/f.rs".to_string(),
            source_function: "app::g".to_string(),
            source_line: 3,
            input_tokens: 100,
            output_tokens: 50,
            cost_usd: "0.00075".parse().unwrap(),
            duration_ms: 5,
        }
    }

    #[test]
    fn test_csv_layout() {
        let mut out = Vec::new();
        write_csv(&[sample()], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next().unwrap(), CallRecord::FIELDS.join(","));
        assert_eq!(
            lines.next().unwrap(),
            "7,2026-03-01T12:30:00Z,openai,gpt-4o,test,src/f.rs,app::g,3,100,50,0.00075,5"
        );
        assert!(lines.next().is_none());
    }

    #[test]
    fn test_csv_header_without_records() {
        let mut out = Vec::new();
        write_csv(&[], &mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap().trim_end(),
            CallRecord::FIELDS.join(",")
        );
    }

    #[test]
    fn test_export_to_path_replaces_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = SpendStore::open(temp_dir.path().join("spend.db"));
        store.append(&sample()).unwrap();
        let out = temp_dir.path().join("out.csv");
        std::fs::write(&out, "previous export").unwrap();

        let count =
            export_to_path(&store, ExportFormat::Csv, &RecordFilter::default(), &out).unwrap();
        assert_eq!(count, 1);
        let text = std::fs::read_to_string(&out).unwrap();
        assert!(text.starts_with("id,timestamp,"));
        assert!(text.contains("app::g"));
        // only the export and the store files remain
        let leftovers = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".tmp"))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_failed_export_keeps_existing_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let store = SpendStore::open(temp_dir.path().join("spend.db"));
        store.append(&sample()).unwrap();
        let conn = rusqlite::Connection::open(store.path()).unwrap();
        conn.execute("UPDATE calls SET cost_usd = 'abc'", []).unwrap();

        for (format, name) in [(ExportFormat::Csv, "out.csv"), (ExportFormat::Json, "out.json")] {
            let out = temp_dir.path().join(name);
            std::fs::write(&out, "precious data").unwrap();

            let err = export_to_path(&store, format, &RecordFilter::default(), &out).unwrap_err();
            assert!(matches!(err, crate::SpendError::CorruptRecord { id: 1, .. }));
            assert_eq!(std::fs::read_to_string(&out).unwrap(), "precious data");
        }
    }

    #[test]
    fn test_json_cost_is_a_string() {
        let mut out = Vec::new();
        write_json(&[sample()], &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["cost_usd"], "0.00075");
        assert_eq!(value[0]["model"], "gpt-4o");
        assert_eq!(value[0]["timestamp"], "2026-03-01T12:30:00Z");
    }
}
