use std::{fs, path::Path};

use tracing::{debug, error, info, warn};

use crate::{
    config::Settings,
    csv,
    domain::{SchemaContract, Table, Value},
    error::{Error, ParseFailure, Result},
};

/// Read the raw sales file into a [`Table`] satisfying
/// [`SchemaContract::INPUT`].
#[tracing::instrument(name = "extract", skip_all)]
pub fn extract(settings: &Settings) -> Result<Table> {
    let path = settings.raw_data_path();
    info!(path = %path.display(), "starting data extraction");

    if !path.exists() {
        error!(path = %path.display(), "raw data file does not exist");
        return Err(Error::SourceNotFound { path });
    }

    let bytes = fs::read(&path).map_err(|source| parse_failed(&path, source.into()))?;
    let text = csv::decode(&bytes).map_err(|source| parse_failed(&path, source.into()))?;

    if text.trim().is_empty() {
        error!(path = %path.display(), "raw data file is empty");
        return Err(Error::EmptySource { path });
    }

    let delimiter = csv::sniff_delimiter(text);
    debug!(delimiter = %char::from(delimiter).escape_default(), "detected delimiter");

    let table = csv::read(text, delimiter)
        .and_then(|table| recover_collapsed(table, delimiter))
        .map_err(|source| parse_failed(&path, source))?;

    if let Err(mismatch) = SchemaContract::INPUT.check(&table) {
        error!(
            expected = ?mismatch.expected,
            observed = ?mismatch.observed,
            missing = ?mismatch.missing,
            "input schema mismatch"
        );
        return Err(mismatch.into());
    }

    info!(
        rows = table.height(),
        columns = table.width(),
        "successfully extracted data"
    );
    Ok(table)
}

/// Repair a table whose every row was collapsed into its first field.
///
/// Spreadsheet exports sometimes quote whole lines, so the reader sees a
/// single column whose header still contains the delimiter. The header and
/// every row's first value are split on `delimiter` and reassigned
/// positionally; any other column is discarded. Tables that do not show the
/// pattern are returned untouched.
pub fn recover_collapsed(
    table: Table,
    delimiter: u8,
) -> std::result::Result<Table, ParseFailure> {
    let delimiter = char::from(delimiter);

    let columns: Vec<String> = match table.columns().first() {
        Some(header) if table.width() <= 2 && header.contains(delimiter) => {
            header.split(delimiter).map(str::to_owned).collect()
        }
        _ => return Ok(table),
    };

    warn!(
        original_columns = table.width(),
        recovered_columns = columns.len(),
        "detected collapsed rows, splitting fields"
    );

    let (_, rows) = table.into_parts();
    let rows = rows
        .into_iter()
        .enumerate()
        .map(|(index, row)| {
            let joined = row.first().map(ToString::to_string).unwrap_or_default();
            let fields: Vec<Value> = joined.split(delimiter).map(Value::text).collect();

            if fields.len() == columns.len() {
                Ok(fields)
            } else {
                Err(ParseFailure::CollapsedRow {
                    row: index + 1,
                    expected: columns.len(),
                    found: fields.len(),
                })
            }
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let table = Table::new(columns, rows)?;
    info!(columns = ?table.columns(), "recovered columns");
    Ok(table)
}

fn parse_failed(path: &Path, source: ParseFailure) -> Error {
    error!(path = %path.display(), error = %source, "could not parse raw data file");
    Error::Parse {
        path: path.to_owned(),
        source,
    }
}
