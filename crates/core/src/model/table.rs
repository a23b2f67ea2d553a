// Copyright (c) reifydb.com 2025
// This file is licensed under the AGPL-3.0-or-later, see license.md file

use anchor_type::Row;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{Constraint, Index};

/// A column of a table or view. `data_type` is the engine's own type
/// name; `unified_data_type` the dialect-agnostic one.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Column {
	pub data_type: String,
	pub unified_data_type: String,
	pub nullable: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub default: Option<String>,
	#[serde(default)]
	pub is_primary_key: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub max_length: Option<i64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub precision: Option<i32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub scale: Option<i32>,
	#[serde(default)]
	pub is_identity: bool,
	#[serde(default)]
	pub is_array: bool,
	#[serde(default, skip_serializing_if = "Row::is_empty")]
	pub options: Row,
}

/// A table: columns keyed by name in declared ordinal order, plus
/// indexes and constraints.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub schema: Option<String>,
	#[serde(default)]
	pub columns: IndexMap<String, Column>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub indexes: Vec<Index>,
	#[serde(default, skip_serializing_if = "Vec::is_empty")]
	pub constraints: Vec<Constraint>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub comment: Option<String>,
	#[serde(default, skip_serializing_if = "Row::is_empty")]
	pub options: Row,
}

impl Table {
	pub fn new(name: impl Into<String>) -> Self {
		Self {
			name: name.into(),
			..Default::default()
		}
	}

	pub fn with_column(mut self, name: impl Into<String>, column: Column) -> Self {
		self.columns.insert(name.into(), column);
		self
	}

	pub fn primary_key_columns(&self) -> Vec<&str> {
		self.columns
			.iter()
			.filter(|(_, c)| c.is_primary_key)
			.map(|(name, _)| name.as_str())
			.collect()
	}

	/// The qualified name used in SQL, `schema.table` when a schema is
	/// present.
	pub fn qualified_name(&self) -> String {
		match &self.schema {
			Some(schema) => format!("{schema}.{}", self.name),
			None => self.name.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn column(pk: bool) -> Column {
		Column {
			data_type: "INTEGER".into(),
			unified_data_type: "int".into(),
			nullable: !pk,
			is_primary_key: pk,
			..Default::default()
		}
	}

	#[test]
	fn test_columns_preserve_ordinal_order() {
		let table = Table::new("EMPLOYEES")
			.with_column("ID", column(true))
			.with_column("NAME", column(false))
			.with_column("EMAIL", column(false));
		let names: Vec<&str> = table.columns.keys().map(String::as_str).collect();
		assert_eq!(names, vec!["ID", "NAME", "EMAIL"]);
	}

	#[test]
	fn test_primary_key_columns() {
		let table = Table::new("T").with_column("A", column(true)).with_column("B", column(false));
		assert_eq!(table.primary_key_columns(), vec!["A"]);
	}

	#[test]
	fn test_qualified_name() {
		let mut table = Table::new("EMPLOYEES");
		assert_eq!(table.qualified_name(), "EMPLOYEES");
		table.schema = Some("HR".into());
		assert_eq!(table.qualified_name(), "HR.EMPLOYEES");
	}
}
