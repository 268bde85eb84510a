use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{Local, NaiveDateTime};
use tempfile::NamedTempFile;
use tracing::{error, info};

use crate::{
    config::Settings,
    csv,
    domain::{SchemaContract, Table},
    error::{Error, Result},
};

#[cfg(unix)]
const OUTPUT_MODE: u32 = 0o644;

/// Write the transformed table to a new timestamped file under the processed
/// data directory and return its path.
pub fn load(table: &Table, settings: &Settings) -> Result<PathBuf> {
    load_at(table, settings, Local::now().naive_local())
}

/// Same as [`load`] with an explicit run timestamp.
///
/// The file is staged in the destination directory and renamed into place
/// only once fully written. An existing file with the same name is never
/// replaced: two runs within the same second make the second one fail.
#[tracing::instrument(name = "load", skip_all)]
pub fn load_at(table: &Table, settings: &Settings, timestamp: NaiveDateTime) -> Result<PathBuf> {
    info!("starting data load");

    if table.is_empty() {
        error!("cannot load a table with no rows");
        return Err(Error::EmptyOutput);
    }

    if let Err(mismatch) = SchemaContract::OUTPUT.check(table) {
        error!(
            expected = ?mismatch.expected,
            observed = ?mismatch.observed,
            missing = ?mismatch.missing,
            "final schema validation failed"
        );
        return Err(mismatch.into());
    }
    info!("final schema validation passed");

    let directory = settings.processed_data_dir();
    fs::create_dir_all(&directory).map_err(|source| write_failed(&directory, source))?;

    let path = directory.join(file_name(timestamp));
    info!(path = %path.display(), "resolved output path");

    let mut staged =
        NamedTempFile::new_in(&directory).map_err(|source| write_failed(&directory, source))?;
    csv::write(table, &mut staged)
        .map_err(Into::into)
        .and_then(|()| staged.flush())
        .and_then(|()| publishable(staged.as_file()))
        .map_err(|source| write_failed(&path, source))?;

    staged
        .persist_noclobber(&path)
        .map_err(|err| write_failed(&path, err.error))?;

    info!(
        path = %path.display(),
        rows = table.height(),
        columns = table.width(),
        "data successfully written"
    );
    Ok(path)
}

/// `sales_processed_<YYYYMMDD_HHMMSS>.csv`
pub fn file_name(timestamp: NaiveDateTime) -> String {
    format!("sales_processed_{}.csv", timestamp.format("%Y%m%d_%H%M%S"))
}

/// Give the owner-only staged file the published output mode and sync it.
fn publishable(file: &fs::File) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(fs::Permissions::from_mode(OUTPUT_MODE))?;
    }
    file.sync_all()
}

fn write_failed(path: &Path, source: std::io::Error) -> Error {
    error!(path = %path.display(), error = %source, "could not write output");
    Error::write(path, source)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    use super::*;
    use crate::domain::{schema::REVENUE, Boundary, Value};

    fn project() -> (TempDir, Settings) {
        let root = TempDir::new().unwrap();
        let settings = Settings::from_yaml(
            root.path(),
            "raw_data_path: data/raw/sales.csv\n\
             processed_data_path: data/processed/sales\n\
             log_file_path: logs/etl.log\n",
        )
        .unwrap();
        (root, settings)
    }

    fn at(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(12, 30, second)
            .unwrap()
    }

    fn transformed(rows: usize) -> Table {
        let columns = SchemaContract::OUTPUT
            .required()
            .iter()
            .map(|c| c.to_string())
            .collect();
        let row = vec![
            Value::text("1"),
            Value::text("2024-01-01"),
            Value::text("C1"),
            Value::text("Widget"),
            Value::Integer(2),
            Value::Decimal(dec!(9.99)),
            Value::Decimal(dec!(19.98)),
        ];
        Table::new(columns, vec![row; rows]).unwrap()
    }

    #[test]
    fn file_name_embeds_timestamp() {
        assert_eq!(file_name(at(5)), "sales_processed_20240101_123005.csv");
    }

    #[test]
    fn writes_csv_into_created_directory() {
        let (_root, settings) = project();

        let path = load_at(&transformed(1), &settings, at(0)).unwrap();

        assert_eq!(
            path,
            settings
                .processed_data_dir()
                .join("sales_processed_20240101_123000.csv")
        );
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "order_id,order_date,customer_id,product,quantity,price,revenue\n\
             1,2024-01-01,C1,Widget,2,9.99,19.98\n"
        );
    }

    #[test]
    fn empty_table_never_touches_the_filesystem() {
        let (_root, settings) = project();

        let err = load_at(&transformed(0), &settings, at(0)).unwrap_err();

        assert!(matches!(err, Error::EmptyOutput));
        assert!(!settings.processed_data_dir().exists());
    }

    #[test]
    fn missing_revenue_is_rejected_before_writing() {
        let (_root, settings) = project();
        let (mut columns, rows) = transformed(1).into_parts();
        columns.retain(|c| c != REVENUE);
        let rows = rows.into_iter().map(|mut row| {
            row.pop();
            row
        });
        let table = Table::new(columns, rows.collect()).unwrap();

        let err = load_at(&table, &settings, at(0)).unwrap_err();

        assert!(matches!(err, Error::SchemaMismatch(m) if m.boundary == Boundary::Load));
        assert!(!settings.processed_data_dir().exists());
    }

    #[test]
    fn distinct_timestamps_give_distinct_files() {
        let (_root, settings) = project();
        let table = transformed(2);

        let first = load_at(&table, &settings, at(0)).unwrap();
        let second = load_at(&table, &settings, at(1)).unwrap();

        assert_ne!(first, second);
        assert_eq!(
            fs::read_to_string(first).unwrap(),
            fs::read_to_string(second).unwrap()
        );
    }

    #[test]
    fn same_second_collision_does_not_overwrite() {
        let (_root, settings) = project();
        let path = load_at(&transformed(1), &settings, at(0)).unwrap();
        let original = fs::read_to_string(&path).unwrap();

        let err = load_at(&transformed(3), &settings, at(0)).unwrap_err();

        assert!(matches!(err, Error::Write { .. }));
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        assert_eq!(fs::read_dir(settings.processed_data_dir()).unwrap().count(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn published_file_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;
        let (_root, settings) = project();

        let path = load_at(&transformed(1), &settings, at(0)).unwrap();

        let mode = fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }

    #[cfg(unix)]
    #[test]
    fn read_only_destination_is_permission_denied() {
        use std::os::unix::fs::PermissionsExt;
        let (_root, settings) = project();
        let directory = settings.processed_data_dir();
        fs::create_dir_all(&directory).unwrap();
        fs::set_permissions(&directory, fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users bypass directory permissions.
        let canary = directory.join(".canary");
        if fs::File::create(&canary).is_ok() {
            fs::remove_file(canary).unwrap();
            fs::set_permissions(&directory, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let result = load_at(&transformed(1), &settings, at(0));
        fs::set_permissions(&directory, fs::Permissions::from_mode(0o755)).unwrap();

        assert!(matches!(result, Err(Error::PermissionDenied { .. })));
        assert_eq!(fs::read_dir(&directory).unwrap().count(), 0);
    }

    #[test]
    fn load_uses_wall_clock_name() {
        let (_root, settings) = project();

        let path = load(&transformed(1), &settings).unwrap();
        let name = path.file_name().unwrap().to_string_lossy();

        assert!(name.starts_with("sales_processed_"));
        assert!(name.ends_with(".csv"));
        assert_eq!(name.len(), "sales_processed_20240101_123000.csv".len());
    }
}
