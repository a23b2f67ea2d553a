// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

//! Shared contract of trigger-based CDC: the `<table>_CHANGE_LOG`
//! companion table layout and the parsing of its rows into canonical
//! events. Trigger-based engines differ only in the DDL that installs
//! the table and its three AFTER triggers.

use anchor_core::{CdcEvent, CdcOperation};
use anchor_type::{Error, Result, Row, Value};
use chrono::{DateTime, Utc};

pub const CHANGE_OPERATION: &str = "CHANGE_OPERATION";
pub const CHANGE_TIMESTAMP: &str = "CHANGE_TIMESTAMP";
pub const CHANGE_ID: &str = "CHANGE_ID";

pub fn change_log_table_name(table: &str) -> String {
	format!("{table}_CHANGE_LOG")
}

/// Interchange form of a change-id position: fixed-width hex of the
/// monotone 64-bit change id.
pub fn position_from_change_id(change_id: u64) -> String {
	format!("{change_id:016x}")
}

pub fn change_id_from_position(position: &str) -> Result<u64> {
	u64::from_str_radix(position, 16)
		.map_err(|_| Error::invalid_data(format!("malformed position '{position}'")))
}

/// One change-log row into the canonical event. The source-column
/// copy becomes the row image; the three bookkeeping columns move
/// into `metadata` and the position token.
pub fn parse_change_log_row(table: &str, raw: &Row) -> Result<CdcEvent> {
	let operation = match raw.get(CHANGE_OPERATION) {
		Some(Value::Text(op)) => match op.to_ascii_uppercase().as_str() {
			"INSERT" => CdcOperation::Insert,
			"UPDATE" => CdcOperation::Update,
			"DELETE" => CdcOperation::Delete,
			other => {
				return Err(Error::invalid_data(format!(
					"unknown change operation '{other}'"
				)));
			}
		},
		_ => return Err(Error::invalid_data("change-log row has no operation")),
	};

	let change_id = match raw.get(CHANGE_ID) {
		Some(Value::Int(id)) => *id as u64,
		Some(Value::Text(id)) => id
			.parse()
			.map_err(|_| Error::invalid_data(format!("malformed change id '{id}'")))?,
		_ => return Err(Error::invalid_data("change-log row has no change id")),
	};

	let mut image = Row::new();
	for (column, value) in raw {
		if matches!(column.as_str(), CHANGE_OPERATION | CHANGE_TIMESTAMP | CHANGE_ID) {
			continue;
		}
		image.insert(column.clone(), value.clone());
	}

	let mut event = CdcEvent::new(operation, table);
	match operation {
		// Triggers record the new-row image for inserts and updates,
		// the old-row image for deletes.
		CdcOperation::Insert | CdcOperation::Update => event.data = Some(image),
		CdcOperation::Delete => event.old_data = Some(image),
	}
	if let Some(timestamp) = raw.get(CHANGE_TIMESTAMP) {
		match timestamp {
			Value::Timestamp(ts) => event.timestamp = *ts,
			Value::Text(ts) => {
				if let Ok(parsed) = DateTime::parse_from_rfc3339(ts) {
					event.timestamp = parsed.with_timezone(&Utc);
				}
			}
			_ => {}
		}
		event.metadata.insert("change_timestamp".to_string(), timestamp.clone());
	}
	event.metadata.insert("change_id".to_string(), Value::Int(change_id as i64));
	event.lsn = Some(position_from_change_id(change_id));
	Ok(event)
}

#[cfg(test)]
mod tests {
	use super::*;

	fn log_row(op: &str, id: i64) -> Row {
		[
			("ID".to_string(), Value::Int(1)),
			("NAME".to_string(), Value::text("Ada")),
			(CHANGE_OPERATION.to_string(), Value::text(op)),
			(CHANGE_ID.to_string(), Value::Int(id)),
		]
		.into_iter()
		.collect()
	}

	#[test]
	fn test_insert_row_becomes_post_image() {
		let event = parse_change_log_row("EMPLOYEES", &log_row("INSERT", 1)).unwrap();
		assert_eq!(event.operation, CdcOperation::Insert);
		let data = event.data.unwrap();
		assert_eq!(data.get("ID"), Some(&Value::Int(1)));
		// Bookkeeping columns never leak into the image.
		assert!(!data.contains_key(CHANGE_OPERATION));
		assert!(!data.contains_key(CHANGE_ID));
		assert_eq!(event.metadata.get("change_id"), Some(&Value::Int(1)));
	}

	#[test]
	fn test_delete_row_becomes_old_image() {
		let event = parse_change_log_row("EMPLOYEES", &log_row("DELETE", 3)).unwrap();
		assert_eq!(event.operation, CdcOperation::Delete);
		assert!(event.data.is_none());
		assert_eq!(event.old_data.unwrap().get("NAME"), Some(&Value::text("Ada")));
	}

	#[test]
	fn test_position_round_trip() {
		let position = position_from_change_id(42);
		assert_eq!(position, "000000000000002a");
		assert_eq!(change_id_from_position(&position).unwrap(), 42);
	}

	#[test]
	fn test_change_log_table_name() {
		assert_eq!(change_log_table_name("EMPLOYEES"), "EMPLOYEES_CHANGE_LOG");
	}
}
