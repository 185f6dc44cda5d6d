//! Delimited text ingestion

use super::resolve_headers;
use crate::error::{ChurnError, Result};
use crate::models::{Column, RawBatch, RawRecord, RawValue};
use ::csv::{ByteRecord, ErrorKind, ReaderBuilder};
use tracing::debug;

/// Candidate delimiters, in tie-break order
pub const DELIMITERS: [u8; 4] = [b',', b';', b'\t', b'|'];

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Pick the candidate delimiter occurring most often on the header line
pub fn sniff_delimiter(input: &[u8]) -> u8 {
    let header = input.split(|b| *b == b'\n').next().unwrap_or_default();
    let mut best = (b',', 0);
    for delimiter in DELIMITERS {
        let count = header.iter().filter(|b| **b == delimiter).count();
        if count > best.1 {
            best = (delimiter, count);
        }
    }
    best.0
}

/// UTF-8 when valid, otherwise Latin-1
fn decode_field(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => bytes.iter().map(|b| *b as char).collect(),
    }
}

fn to_cell(bytes: &[u8]) -> RawValue {
    let text = decode_field(bytes);
    if text.trim().is_empty() {
        RawValue::Null
    } else {
        RawValue::Text(text)
    }
}

fn csv_error(err: ::csv::Error) -> ChurnError {
    match err.kind() {
        ErrorKind::UnequalLengths { pos, expected_len, len } => {
            let line = pos.as_ref().map(|p| p.line()).unwrap_or_default();
            ChurnError::Schema(format!(
                "line {}: expected {} fields, found {}",
                line, expected_len, len
            ))
        }
        _ => ChurnError::Schema(format!("malformed CSV: {}", err)),
    }
}

/// Parse a CSV upload.
///
/// # Errors
/// * [`ChurnError::Schema`] for empty input, duplicate columns and rows
///   whose field count differs from the header
pub fn read_csv(input: &[u8]) -> Result<RawBatch> {
    let input = input.strip_prefix(UTF8_BOM).unwrap_or(input);
    if input.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ChurnError::Schema("input is empty".to_string()));
    }

    let delimiter = sniff_delimiter(input);
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .from_reader(input);

    let headers: Vec<String> = reader
        .byte_headers()
        .map_err(csv_error)?
        .iter()
        .map(decode_field)
        .collect();
    let slots = resolve_headers(&headers)?;

    let mut records = Vec::new();
    let mut row = ByteRecord::new();
    while reader.read_byte_record(&mut row).map_err(csv_error)? {
        let mut record = RawRecord::new();
        for (slot, field) in slots.iter().zip(row.iter()) {
            if let Some(column) = slot {
                record.set(*column, to_cell(field));
            }
        }
        records.push(record);
    }

    let columns: Vec<Column> = slots.iter().flatten().copied().collect();
    debug!(
        delimiter = %(delimiter as char).escape_default(),
        columns = columns.len(),
        rows = records.len(),
        "Parsed CSV input"
    );
    Ok(RawBatch::new(columns, records))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter(b"id;download_avg;upload_avg\n1;2,5;3"), b';');
        assert_eq!(sniff_delimiter(b"id\tdownload_avg\n"), b'\t');
        assert_eq!(sniff_delimiter(b"id|a|b"), b'|');
        assert_eq!(sniff_delimiter(b"id"), b',');
    }

    #[test]
    fn test_read_semicolon_csv_with_legacy_header() {
        let input = b"customer_id;reamining_contract;download_avg;bill_avg\nc1;0.5;12.5;20\nc2;;8;20\n";
        let batch = read_csv(input).unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.has_column(Column::Id));
        assert!(batch.has_column(Column::RemainingContract));
        assert!(batch.has_column(Column::BillAvg));
        assert!(!batch.has_column(Column::UploadAvg));

        let first = &batch.records()[0];
        assert_eq!(first.id.as_deref(), Some("c1"));
        assert_eq!(first.remaining_contract.to_number(), Ok(Some(0.5)));
        assert_eq!(batch.records()[1].remaining_contract, RawValue::Null);
    }

    #[test]
    fn test_ragged_row_is_schema_error_with_line() {
        let input = b"id,download_avg\n1,2\n2,3,4\n";
        let err = read_csv(input).unwrap_err();
        match err {
            ChurnError::Schema(msg) => assert!(msg.contains("line 3"), "{}", msg),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_empty_input_is_schema_error() {
        assert!(matches!(read_csv(b""), Err(ChurnError::Schema(_))));
        assert!(matches!(read_csv(b"  \n"), Err(ChurnError::Schema(_))));
    }

    #[test]
    fn test_latin1_fallback_and_bom() {
        let mut input = UTF8_BOM.to_vec();
        input.extend_from_slice(b"id,upload_avg\nJos\xE9,1.5\n");
        let batch = read_csv(&input).unwrap();
        assert!(batch.has_column(Column::Id));
        assert_eq!(batch.records()[0].id.as_deref(), Some("José"));
    }

    #[test]
    fn test_header_only_yields_empty_batch() {
        let batch = read_csv(b"id,upload_avg\n").unwrap();
        assert!(batch.is_empty());
        assert!(batch.has_column(Column::UploadAvg));
    }
}
