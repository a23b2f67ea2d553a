// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use std::fmt::{Display, Formatter};

use anchor_type::{Error, Result, Row};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CdcOperation {
	Insert,
	Update,
	Delete,
}

impl Display for CdcOperation {
	fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
		match self {
			CdcOperation::Insert => f.write_str("insert"),
			CdcOperation::Update => f.write_str("update"),
			CdcOperation::Delete => f.write_str("delete"),
		}
	}
}

/// Canonical, dialect-independent change event.
///
/// Dialect bookkeeping fields (operation discriminators, sequence
/// values, LSNs) never appear in `data`/`old_data`; the owning adapter
/// moves them into `metadata` when parsing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CdcEvent {
	pub operation: CdcOperation,
	pub table_name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Row>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub old_data: Option<Row>,
	pub timestamp: DateTime<Utc>,
	/// Hex-encoded engine position token, when the mechanism has one.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub lsn: Option<String>,
	#[serde(default, skip_serializing_if = "Row::is_empty")]
	pub metadata: Row,
}

impl CdcEvent {
	pub fn new(operation: CdcOperation, table_name: impl Into<String>) -> Self {
		Self {
			operation,
			table_name: table_name.into(),
			data: None,
			old_data: None,
			timestamp: Utc::now(),
			lsn: None,
			metadata: Row::new(),
		}
	}

	/// Image to build a WHERE clause from: the before-image, falling
	/// back to the post-image when the dialect only provides one.
	pub fn key_image(&self) -> Option<&Row> {
		self.old_data.as_ref().or(self.data.as_ref())
	}

	/// Enforce the per-operation payload requirements.
	pub fn validate(&self) -> Result<()> {
		let fail = |msg: &str| {
			Err(Error::invalid_data(msg)
				.with_operation(self.operation.to_string())
				.with_context("table", self.table_name.clone()))
		};
		match self.operation {
			CdcOperation::Insert => {
				if self.data.as_ref().is_none_or(Row::is_empty) {
					return fail("insert event requires data");
				}
			}
			CdcOperation::Update => {
				let data_empty = self.data.as_ref().is_none_or(Row::is_empty);
				let old_empty = self.old_data.as_ref().is_none_or(Row::is_empty);
				if data_empty && old_empty {
					return fail("update event requires data or old_data");
				}
			}
			CdcOperation::Delete => {
				if self.key_image().is_none_or(Row::is_empty) {
					return fail("delete event requires old_data");
				}
			}
		}
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use anchor_type::Value;

	use super::*;

	fn row(pairs: &[(&str, i64)]) -> Row {
		pairs.iter().map(|(k, v)| (k.to_string(), Value::Int(*v))).collect()
	}

	#[test]
	fn test_insert_requires_data() {
		let mut event = CdcEvent::new(CdcOperation::Insert, "ORDERS");
		assert!(event.validate().is_err());
		event.data = Some(row(&[("ID", 1)]));
		assert!(event.validate().is_ok());
	}

	#[test]
	fn test_delete_falls_back_to_post_image() {
		let mut event = CdcEvent::new(CdcOperation::Delete, "ORDERS");
		assert!(event.validate().is_err());
		event.data = Some(row(&[("ID", 1)]));
		assert!(event.validate().is_ok());
		assert_eq!(event.key_image(), event.data.as_ref());
	}

	#[test]
	fn test_update_needs_either_image() {
		let mut event = CdcEvent::new(CdcOperation::Update, "ORDERS");
		assert!(event.validate().is_err());
		event.old_data = Some(row(&[("ID", 1)]));
		assert!(event.validate().is_ok());
	}
}
