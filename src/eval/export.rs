// CSV export of the buffer level view
// (c) 2024 Ross Younger

use std::{io::Write, path::Path};

use anyhow::{Context as _, Result};
use serde::Serialize;

use super::views::TimeSeriesRow;
use crate::protocol::Protocol;

#[derive(Serialize)]
struct CsvRow<'a> {
    time: i64,
    operator: &'a str,
    protocol: Protocol,
    file: &'a str,
    #[serde(rename = "bufferLevel")]
    buffer_level: f64,
}

const HEADER: [&str; 5] = ["time", "operator", "protocol", "file", "bufferLevel"];

/// Writes buffer level rows as CSV. The header is written even when there are no rows.
pub fn write_buffer_csv<W: Write>(out: W, rows: &[TimeSeriesRow]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(out);
    writer.write_record(HEADER)?;
    for row in rows {
        writer.serialize(CsvRow {
            time: row.time,
            operator: &row.operator,
            protocol: row.protocol,
            file: &row.file,
            buffer_level: row.value,
        })?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes buffer level rows to a CSV file
pub fn write_buffer_csv_file(path: &Path, rows: &[TimeSeriesRow]) -> Result<()> {
    let file = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    write_buffer_csv(file, rows).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod test {
    use super::write_buffer_csv;
    use crate::eval::views::TimeSeriesRow;
    use crate::protocol::Protocol;

    #[test]
    fn header_and_rows() {
        let rows = [
            TimeSeriesRow {
                time: 0,
                protocol: Protocol::Tcp,
                operator: "starlink".into(),
                file: "a.json".into(),
                value: 0.5,
            },
            TimeSeriesRow {
                time: 1,
                protocol: Protocol::QuicCarefulResume,
                operator: "starlink".into(),
                file: "b.json".into(),
                value: 2.0,
            },
        ];
        let mut out = Vec::new();
        write_buffer_csv(&mut out, &rows).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "time,operator,protocol,file,bufferLevel\n\
             0,starlink,TCP/HTTP2,a.json,0.5\n\
             1,starlink,QUIC (careful resume),b.json,2.0\n"
        );
    }

    #[test]
    fn empty_still_has_header() {
        let mut out = Vec::new();
        write_buffer_csv(&mut out, &[]).unwrap();
        assert_eq!(out, b"time,operator,protocol,file,bufferLevel\n");
    }
}
