// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::collections::BTreeMap;

use crate::Value;

/// A loose row: column name to value. Used for fetched rows, CDC
/// images and metadata property maps.
pub type Row = BTreeMap<String, Value>;

/// Convert a row into a JSON object using the [`Value`] wire form.
pub fn row_to_json(row: &Row) -> serde_json::Value {
	serde_json::Value::Object(row.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
}

/// Convert a JSON object into a row. Non-object input yields an empty
/// row.
pub fn row_from_json(value: serde_json::Value) -> Row {
	match value {
		serde_json::Value::Object(map) => {
			map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect()
		}
		_ => Row::new(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_row_round_trip() {
		let mut row = Row::new();
		row.insert("ID".to_string(), Value::Int(1));
		row.insert("NAME".to_string(), Value::Text("Ada".to_string()));
		assert_eq!(row_from_json(row_to_json(&row)), row);
	}

	#[test]
	fn test_non_object_is_empty() {
		assert!(row_from_json(serde_json::json!([1, 2])).is_empty());
	}
}
