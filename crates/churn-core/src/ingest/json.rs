//! JSON record ingestion (form submissions and JSON batch uploads)

use super::resolve_headers;
use crate::error::{ChurnError, Result};
use crate::models::{Column, RawBatch, RawRecord, RawValue};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};

/// Resolved headers for one distinct key set
struct KeyShape {
    keys: Vec<String>,
    slots: Vec<Option<Column>>,
}

/// Resolve each distinct key set once; returns the shapes and each object's shape index
fn key_shapes(objects: &[Map<String, Value>]) -> Result<(Vec<KeyShape>, Vec<usize>)> {
    let mut shapes: Vec<KeyShape> = Vec::new();
    let mut lookup: HashMap<Vec<String>, usize> = HashMap::new();
    let mut assignment = Vec::with_capacity(objects.len());

    for object in objects {
        let keys: Vec<String> = object.keys().cloned().collect();
        let idx = match lookup.get(&keys) {
            Some(&idx) => idx,
            None => {
                let slots = resolve_headers(&keys)?;
                lookup.insert(keys.clone(), shapes.len());
                shapes.push(KeyShape { keys, slots });
                shapes.len() - 1
            }
        };
        assignment.push(idx);
    }
    Ok((shapes, assignment))
}

/// Build a batch from JSON objects.
///
/// A column is present when any object carries it; objects lacking a present
/// column read it as null.
pub fn records_to_batch(objects: &[Map<String, Value>]) -> Result<RawBatch> {
    let (shapes, assignment) = key_shapes(objects)?;
    let mut columns = BTreeSet::new();
    let mut records = Vec::with_capacity(objects.len());

    for (object, idx) in objects.iter().zip(assignment) {
        let shape = &shapes[idx];
        let mut record = RawRecord::new();
        for (slot, key) in shape.slots.iter().zip(&shape.keys) {
            if let Some(column) = slot {
                columns.insert(*column);
                record.set(*column, RawValue::from_json(&object[key]));
            }
        }
        records.push(record);
    }

    Ok(RawBatch::new(columns, records))
}

/// Parse a JSON array of objects
pub fn read_json(input: &[u8]) -> Result<RawBatch> {
    let value: Value = serde_json::from_slice(input)
        .map_err(|e| ChurnError::Schema(format!("malformed JSON input: {}", e)))?;
    let Value::Array(items) = value else {
        return Err(ChurnError::Schema(
            "JSON input must be an array of records".to_string(),
        ));
    };
    let objects = items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map),
            _ => Err(ChurnError::Schema(format!("record {} is not a JSON object", i + 1))),
        })
        .collect::<Result<Vec<_>>>()?;
    records_to_batch(&objects)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_is_union_of_keys() {
        let batch = read_json(
            br#"[
                {"id": 7, "download_avg": 10.5, "is_tv_subscriber": true},
                {"id": "c-2", "upload_avg": "3", "reamining_contract": null}
            ]"#,
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
        for column in [Column::Id, Column::DownloadAvg, Column::UploadAvg, Column::RemainingContract] {
            assert!(batch.has_column(column), "{}", column);
        }
        let first = &batch.records()[0];
        assert_eq!(first.id.as_deref(), Some("7"));
        assert_eq!(first.is_tv_subscriber, RawValue::Number(1.0));
        assert_eq!(first.upload_avg, RawValue::Null);
        assert_eq!(batch.records()[1].upload_avg.to_number(), Ok(Some(3.0)));
        assert_eq!(batch.missing_required().len(), 4);
    }

    #[test]
    fn test_non_array_is_schema_error() {
        assert!(matches!(read_json(br#"{"id": 1}"#), Err(ChurnError::Schema(_))));
        assert!(matches!(read_json(b"[1, 2]"), Err(ChurnError::Schema(_))));
        assert!(matches!(read_json(b"not json"), Err(ChurnError::Schema(_))));
    }

    #[test]
    fn test_legacy_header_resolved_once_per_key_set() {
        let objects: Vec<Map<String, Value>> = serde_json::from_str(
            r#"[
                {"id": 1, "reamining_contract": 0.5},
                {"id": 2, "reamining_contract": 0.7},
                {"id": 3, "reamining_contract": null},
                {"id": 4, "upload_avg": 2.0}
            ]"#,
        )
        .unwrap();

        let (shapes, assignment) = key_shapes(&objects).unwrap();
        assert_eq!(shapes.len(), 2);
        assert_eq!(assignment, vec![0, 0, 0, 1]);

        let batch = records_to_batch(&objects).unwrap();
        let contracts: Vec<RawValue> = batch
            .records()
            .iter()
            .map(|r| r.remaining_contract.clone())
            .collect();
        assert_eq!(
            contracts,
            vec![RawValue::Number(0.5), RawValue::Number(0.7), RawValue::Null, RawValue::Null]
        );
        assert!(batch.has_column(Column::RemainingContract));
    }
}
