//! Delimited text loading.

use crate::error::DataError;
use crate::models::BaseTable;
use polars::prelude::*;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Load a CSV file with a header row into a [`BaseTable`].
///
/// Column types are inferred from the whole file; empty cells become nulls.
pub fn load_csv(path: &Path, name: &str) -> Result<BaseTable, DataError> {
    info!("Loading {} from {}", name, path.display());

    // Report a missing file as I/O rather than as a parse failure.
    std::fs::metadata(path).map_err(|e| DataError::Io(path.to_path_buf(), e))?;

    let csv_err = |e| DataError::Csv(path.to_path_buf(), e);
    let frame = LazyCsvReader::new(PlPath::Local(Arc::from(path)))
        .with_has_header(true)
        .with_infer_schema_length(None)
        .finish()
        .map_err(csv_err)?
        .collect()
        .map_err(csv_err)?;
    debug!("Schema of {}: {:?}", name, frame.schema());

    let table = BaseTable::new(name, frame);
    info!(
        "Loaded {} rows x {} columns into {}",
        table.len(),
        table.frame().width(),
        name
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{scalar_at, Scalar};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_csv_infers_types() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "PassengerId,Survived,Name,Age").unwrap();
        writeln!(file, "1,0,\"Braund, Mr. Owen\",22").unwrap();
        writeln!(file, "2,1,Cumings,").unwrap();
        writeln!(file, "3,1,Heikkinen,26.5").unwrap();

        let table = load_csv(file.path(), "titanic").unwrap();
        let frame = table.frame();
        assert_eq!(table.len(), 3);
        assert_eq!(frame.width(), 4);

        assert_eq!(scalar_at(frame, "Name", 0).unwrap(), Scalar::from("Braund, Mr. Owen"));
        assert_eq!(scalar_at(frame, "Age", 0).unwrap(), Scalar::Float(22.0));
        assert_eq!(scalar_at(frame, "Age", 1).unwrap(), Scalar::Null);
        assert_eq!(scalar_at(frame, "Survived", 2).unwrap(), Scalar::Int(1));
    }

    #[test]
    fn test_load_fixture() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/listings_sample.csv");
        let table = load_csv(&path, "listings").unwrap();
        assert_eq!(table.len(), 8);
        assert!(table.has_column("last_review"));
        assert_eq!(table.name(), "listings");
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_csv(Path::new("/nonexistent/data.csv"), "missing");
        assert!(matches!(result, Err(DataError::Io(_, _))));
    }
}
