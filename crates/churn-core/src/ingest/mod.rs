//! Building raw batches from uploaded tables
//!
//! Both readers resolve headers the same way: trimmed, case-insensitive, with
//! the legacy `reamining_contract` alias and the `client_id`/`customer_id`
//! id aliases. Unknown columns are ignored.

mod csv;
mod json;

pub use self::csv::{read_csv, sniff_delimiter, DELIMITERS};
pub use self::json::{read_json, records_to_batch};

use crate::error::{ChurnError, Result};
use crate::models::{Column, RawBatch};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

/// Supported table encodings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Csv,
    Json,
}

impl InputFormat {
    /// Guess from the file extension, defaulting to CSV
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => InputFormat::Json,
            _ => InputFormat::Csv,
        }
    }
}

/// Read a table from disk
pub fn read_file(path: &Path) -> Result<RawBatch> {
    let bytes = std::fs::read(path)?;
    let batch = match InputFormat::from_path(path) {
        InputFormat::Csv => read_csv(&bytes)?,
        InputFormat::Json => read_json(&bytes)?,
    };
    debug!(path = %path.display(), rows = batch.len(), "Read input table");
    Ok(batch)
}

/// Map each header to a column.
///
/// When both the legacy and the canonical contract header are present the
/// canonical one wins and the alias slot is dropped. Any other repeated
/// column is a schema error.
pub(crate) fn resolve_headers(headers: &[String]) -> Result<Vec<Option<Column>>> {
    let mut slots: Vec<Option<Column>> = Vec::with_capacity(headers.len());
    let mut seen: HashMap<Column, usize> = HashMap::new();

    for (idx, header) in headers.iter().enumerate() {
        let Some(column) = Column::from_header(header) else {
            debug!(header = %header, "Ignoring unknown column");
            slots.push(None);
            continue;
        };
        let is_alias = Column::is_legacy_alias(header);

        if let Some(&prev) = seen.get(&column) {
            let prev_is_alias = Column::is_legacy_alias(&headers[prev]);
            if prev_is_alias == is_alias {
                return Err(ChurnError::Schema(format!(
                    "duplicate column '{}' (headers '{}' and '{}')",
                    column,
                    headers[prev].trim(),
                    header.trim()
                )));
            }
            warn!(
                column = %column,
                "Both legacy and canonical headers present, using the canonical one"
            );
            if is_alias {
                slots.push(None);
            } else {
                slots[prev] = None;
                seen.insert(column, idx);
                slots.push(Some(column));
            }
            continue;
        }

        if is_alias {
            warn!(header = %header.trim(), column = %column, "Renamed legacy column header");
        }
        seen.insert(column, idx);
        slots.push(Some(column));
    }
    Ok(slots)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_resolve_headers_aliases_and_unknowns() {
        let slots = resolve_headers(&headers(&["Customer_ID", "reamining_contract", "churn"])).unwrap();
        assert_eq!(slots, vec![Some(Column::Id), Some(Column::RemainingContract), None]);
    }

    #[test]
    fn test_canonical_header_preferred_over_alias() {
        let slots = resolve_headers(&headers(&["reamining_contract", "remaining_contract"])).unwrap();
        assert_eq!(slots, vec![None, Some(Column::RemainingContract)]);

        let slots = resolve_headers(&headers(&["remaining_contract", "reamining_contract"])).unwrap();
        assert_eq!(slots, vec![Some(Column::RemainingContract), None]);
    }

    #[test]
    fn test_duplicate_header_is_schema_error() {
        let err = resolve_headers(&headers(&["upload_avg", "UPLOAD_AVG"])).unwrap_err();
        assert!(matches!(err, ChurnError::Schema(_)));

        let err = resolve_headers(&headers(&["id", "client_id"])).unwrap_err();
        assert!(err.to_string().contains("duplicate column 'id'"));
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(InputFormat::from_path(Path::new("a/b.JSON")), InputFormat::Json);
        assert_eq!(InputFormat::from_path(Path::new("b.csv")), InputFormat::Csv);
        assert_eq!(InputFormat::from_path(Path::new("b")), InputFormat::Csv);
    }
}
