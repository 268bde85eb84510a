use std::io::Write;

use csv::{ReaderBuilder, Writer};

use crate::{
    domain::{Table, Value},
    error::ParseFailure,
};

/// Field separators recognised when sniffing a file.
pub const DELIMITERS: [u8; 3] = [b',', b';', b'\t'];

const BOM: char = '\u{feff}';

/// Decode raw bytes as UTF-8, dropping a leading byte-order mark.
pub fn decode(bytes: &[u8]) -> Result<&str, std::str::Utf8Error> {
    let text = std::str::from_utf8(bytes)?;
    Ok(text.strip_prefix(BOM).unwrap_or(text))
}

/// Pick the candidate delimiter occurring most often in the header line.
///
/// Ties on the header are broken by counts on the first data line, then go to
/// the earlier candidate. A header with none of them falls back to a comma.
pub fn sniff_delimiter(text: &str) -> u8 {
    let mut lines = text.lines();
    let header = lines.next().unwrap_or_default();
    let sample = lines.next().unwrap_or_default();
    let count = |line: &str, candidate: u8| line.bytes().filter(|&b| b == candidate).count();

    let mut best = (b',', (0, 0));
    for candidate in DELIMITERS {
        let score = (count(header, candidate), count(sample, candidate));
        if score.0 > 0 && score > best.1 {
            best = (candidate, score);
        }
    }

    best.0
}

/// Parse delimited text into a [`Table`] of untyped cells.
///
/// The first record is the header. Rows whose width differs from the header
/// are rejected by the reader.
pub fn read(text: &str, delimiter: u8) -> Result<Table, ParseFailure> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let columns = reader.headers()?.iter().map(str::to_owned).collect();
    let rows = reader
        .records()
        .map(|record| record.map(|record| record.iter().map(Value::text).collect()))
        .collect::<csv::Result<Vec<_>>>()?;

    Ok(Table::new(columns, rows)?)
}

/// Write a table as comma separated text with a header row and no index.
pub fn write(table: &Table, writer: impl Write) -> csv::Result<()> {
    let mut writer = Writer::from_writer(writer);

    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(ToString::to_string))?;
    }

    writer.flush()?;
    Ok(())
}
